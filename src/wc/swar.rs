//! Bit-parallel byte classification on 64-bit words.
//!
//! A chunk is 8 input bytes packed little-endian into a `u64`, so lane `i`
//! (bits `8*i .. 8*i+8`) always holds the byte at offset `i` of the chunk.
//! Every mask produced here has 0x80 set in a lane when that lane matched
//! and 0x00 otherwise.

/// Bytes per chunk.
pub const CHUNK: usize = 8;

/// 0x01 in every lane.
pub const LO: u64 = 0x0101_0101_0101_0101;

/// 0x80 in every lane.
pub const HI: u64 = 0x8080_8080_8080_8080;

/// 0x7f in every lane.
const LOW7: u64 = 0x7f7f_7f7f_7f7f_7f7f;

/// The whitespace class used for word splitting: space, tab, newline,
/// carriage return, vertical tab, form feed. NUL is not in it.
pub const WHITESPACE: [u8; 6] = [b' ', b'\t', b'\n', b'\r', 0x0b, 0x0c];

/// Per-chunk classification result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkMasks {
    /// 0x80 in each lane holding a whitespace byte.
    pub whitespace: u64,
    /// 0x80 in each lane holding `\n`.
    pub newline: u64,
}

/// Scalar definition of the whitespace class.
#[inline]
pub const fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// `b` copied into all 8 lanes.
#[inline(always)]
pub const fn broadcast(b: u8) -> u64 {
    LO.wrapping_mul(b as u64)
}

/// 0x80 in every lane of `x` that is zero.
///
/// The textbook `(x - LO) & !x & HI` is only exact for "is any lane zero":
/// the borrow out of a zero lane can flag the lane above it when that lane
/// holds 0x01. Adding 0x7f to the low seven bits of each lane never carries
/// across lanes, so this form is exact per lane.
#[inline(always)]
pub const fn zero_lanes(x: u64) -> u64 {
    !(((x & LOW7).wrapping_add(LOW7)) | x | LOW7)
}

/// 0x80 in every lane of `chunk` equal to `target`.
#[inline(always)]
pub const fn eq_mask(chunk: u64, target: u8) -> u64 {
    zero_lanes(chunk ^ broadcast(target))
}

/// Classify one chunk into its whitespace and newline masks.
#[inline(always)]
pub fn classify(chunk: u64) -> ChunkMasks {
    let newline = eq_mask(chunk, b'\n');
    let whitespace = newline
        | eq_mask(chunk, b' ')
        | eq_mask(chunk, b'\t')
        | eq_mask(chunk, b'\r')
        | eq_mask(chunk, 0x0b)
        | eq_mask(chunk, 0x0c);
    ChunkMasks {
        whitespace,
        newline,
    }
}

/// Pack up to [`CHUNK`] bytes into a chunk, zero-filling missing lanes.
#[inline(always)]
pub fn pack(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; CHUNK];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Bounded read of the chunk starting at `offset`.
///
/// Always returns a full chunk: lanes past the end of `data` read as zero,
/// and an offset at or past the end yields 0. Zero lanes are never
/// whitespace, so padding can never start or end a word.
#[inline]
pub fn load_chunk(data: &[u8], offset: usize) -> u64 {
    debug_assert_eq!(offset % CHUNK, 0, "chunk reads must be aligned");
    match data.get(offset..) {
        Some(rest) => pack(&rest[..rest.len().min(CHUNK)]),
        None => 0,
    }
}
