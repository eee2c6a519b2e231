use std::io::{self, Write};
use std::path::Path;

use log::{debug, trace};
use rayon::prelude::*;

use super::popcount::{BitCounter, Hardware, PopcountBackend, Software};
use super::swar::{CHUNK, classify, is_whitespace, load_chunk, pack};
use crate::common::io::load;
use crate::error::WcError;

/// Chunks processed per loop iteration when the caller doesn't choose.
pub const DEFAULT_UNROLL: usize = 4;

/// Largest supported unroll factor. Larger requests are clamped.
pub const MAX_UNROLL: usize = 8;

/// Inputs at least this large are scanned in parallel by [`count_file`].
pub const PARALLEL_THRESHOLD: usize = 1024 * 1024;

/// Smallest range handed to one worker by [`count_parallel`].
/// Amortizes rayon scheduling overhead.
const MIN_RANGE: usize = 1024 * 1024;

/// Results from counting a byte slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WcCounts {
    pub lines: u64,
    pub words: u64,
    pub bytes: u64,
}

/// Whether the byte just before the next chunk was whitespace.
///
/// Threaded through [`step`]; the start of input counts as whitespace so a
/// word at offset 0 is seen like any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryState {
    prev_whitespace: bool,
}

impl BoundaryState {
    pub const START: BoundaryState = BoundaryState {
        prev_whitespace: true,
    };

    /// State after a chunk whose whitespace mask is `whitespace`.
    #[inline(always)]
    pub const fn after(whitespace: u64) -> Self {
        BoundaryState {
            prev_whitespace: whitespace >> 63 != 0,
        }
    }

    pub const fn prev_whitespace(self) -> bool {
        self.prev_whitespace
    }

    /// Lane-0 contribution of the previous byte: 0x80 if it was whitespace.
    #[inline(always)]
    const fn carry(self) -> u64 {
        (self.prev_whitespace as u64) << 7
    }
}

/// Raw output of the chunk loop, before end-of-file correction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTotals {
    pub lines: u64,
    /// Whitespace bytes that directly follow a non-whitespace byte.
    pub word_ends: u64,
}

/// Process one chunk: count its newlines and word ends, return the state
/// for the next chunk.
#[inline(always)]
pub fn step<C: BitCounter>(
    chunk: u64,
    state: BoundaryState,
    totals: &mut ScanTotals,
) -> BoundaryState {
    let masks = classify(chunk);
    totals.lines += C::popcount(masks.newline) as u64;
    // Lane i sees lane i-1's whitespace bit; lane 0 sees the carried state.
    let prev = (masks.whitespace << 8) | state.carry();
    totals.word_ends += C::popcount(masks.whitespace & !prev) as u64;
    BoundaryState::after(masks.whitespace)
}

#[inline(always)]
fn scan_kernel<C: BitCounter, const U: usize>(data: &[u8]) -> ScanTotals {
    let mut totals = ScanTotals::default();
    let mut state = BoundaryState::START;

    let mut blocks = data.chunks_exact(CHUNK * U);
    for block in &mut blocks {
        let mut words = [0u64; U];
        for (w, bytes) in words.iter_mut().zip(block.chunks_exact(CHUNK)) {
            *w = pack(bytes);
        }
        for &w in &words {
            state = step::<C>(w, state, &mut totals);
        }
    }
    // Leftover whole chunks, then the zero-filled final chunk.
    let mut offset = data.len() - blocks.remainder().len();
    while offset < data.len() {
        state = step::<C>(load_chunk(data, offset), state, &mut totals);
        offset += CHUNK;
    }
    totals
}

#[inline(always)]
fn scan_unrolled<C: BitCounter>(data: &[u8], unroll: usize) -> ScanTotals {
    match unroll.clamp(1, MAX_UNROLL) {
        1 => scan_kernel::<C, 1>(data),
        2 => scan_kernel::<C, 2>(data),
        3 => scan_kernel::<C, 3>(data),
        4 => scan_kernel::<C, 4>(data),
        5 => scan_kernel::<C, 5>(data),
        6 => scan_kernel::<C, 6>(data),
        7 => scan_kernel::<C, 7>(data),
        _ => scan_kernel::<C, 8>(data),
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
#[target_feature(enable = "popcnt")]
unsafe fn scan_hardware(data: &[u8], unroll: usize) -> ScanTotals {
    scan_unrolled::<Hardware>(data, unroll)
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
unsafe fn scan_hardware(data: &[u8], unroll: usize) -> ScanTotals {
    scan_unrolled::<Hardware>(data, unroll)
}

/// Chunked scan with an explicit popcount backend and unroll factor.
///
/// `unroll` only changes how many chunks are loaded per iteration; the
/// result is the same for every value.
pub fn scan_with(data: &[u8], backend: PopcountBackend, unroll: usize) -> ScanTotals {
    if backend.is_hardware() {
        // SAFETY: a hardware backend is only constructed when the CPU has popcnt.
        unsafe { scan_hardware(data, unroll) }
    } else {
        scan_unrolled::<Software>(data, unroll)
    }
}

/// Chunked scan with the detected backend and default unroll.
pub fn scan(data: &[u8]) -> ScanTotals {
    scan_with(data, PopcountBackend::detect(), DEFAULT_UNROLL)
}

/// Words still open at the end of the data.
///
/// A word that runs to the last byte has no whitespace after it, so the
/// scan never sees its end. Only the real last byte is inspected.
#[inline]
pub fn eof_correction(data: &[u8]) -> u64 {
    match data.last() {
        Some(&b) => (!is_whitespace(b)) as u64,
        None => 0,
    }
}

/// `(lines, words)` for `data`.
pub fn count_lines_words(data: &[u8]) -> (u64, u64) {
    let totals = scan(data);
    (totals.lines, totals.word_ends + eof_correction(data))
}

/// Lines, words and bytes for `data`, scanned on the calling thread.
pub fn count(data: &[u8]) -> WcCounts {
    let (lines, words) = count_lines_words(data);
    WcCounts {
        lines,
        words,
        bytes: data.len() as u64,
    }
}

/// Counts for one contiguous range of the parallel scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeCounts {
    pub lines: u64,
    /// Words in the range, counting one that runs to its last byte.
    pub words: u64,
    pub first_whitespace: bool,
    pub last_whitespace: bool,
}

impl RangeCounts {
    /// Count a non-empty range as if it were the whole input.
    pub fn of(range: &[u8], backend: PopcountBackend) -> Option<Self> {
        let (&first, &last) = (range.first()?, range.last()?);
        let totals = scan_with(range, backend, DEFAULT_UNROLL);
        Some(RangeCounts {
            lines: totals.lines,
            words: totals.word_ends + eof_correction(range),
            first_whitespace: is_whitespace(first),
            last_whitespace: is_whitespace(last),
        })
    }

    /// Combine with the range that immediately follows this one.
    ///
    /// A word crossing the seam was closed by this range's end correction
    /// and counted again by `next`, so it is taken back once.
    pub fn merge(self, next: RangeCounts) -> RangeCounts {
        let split_word = !self.last_whitespace && !next.first_whitespace;
        RangeCounts {
            lines: self.lines + next.lines,
            words: self.words + next.words - split_word as u64,
            first_whitespace: self.first_whitespace,
            last_whitespace: next.last_whitespace,
        }
    }
}

/// Parallel count with ranges of about `range_len` bytes.
///
/// `range_len` is rounded up to a whole number of chunks so every range
/// starts chunk-aligned. The result never depends on it.
pub fn count_parallel_with(data: &[u8], range_len: usize) -> WcCounts {
    let range_len = range_len.max(CHUNK).next_multiple_of(CHUNK);
    let backend = PopcountBackend::detect();

    // par_chunks never yields an empty range; collect keeps input order.
    let ranges: Vec<Option<RangeCounts>> = data
        .par_chunks(range_len)
        .map(|range| RangeCounts::of(range, backend))
        .collect();
    trace!("{} ranges of {} bytes: {:?}", ranges.len(), range_len, ranges);

    let merged = ranges.into_iter().flatten().reduce(RangeCounts::merge);
    WcCounts {
        lines: merged.map_or(0, |r| r.lines),
        words: merged.map_or(0, |r| r.words),
        bytes: data.len() as u64,
    }
}

/// Parallel count, one range per rayon thread (at least [`MIN_RANGE`] each).
pub fn count_parallel(data: &[u8]) -> WcCounts {
    let threads = rayon::current_num_threads().max(1);
    count_parallel_with(data, (data.len() / threads).max(MIN_RANGE))
}

/// Map `path` and count it, in parallel when it is large enough.
pub fn count_file(path: &Path) -> Result<WcCounts, WcError> {
    let buffer = load(path)?;
    let counts = if buffer.len() >= PARALLEL_THRESHOLD {
        debug!("{}: parallel scan of {} bytes", path.display(), buffer.len());
        count_parallel(&buffer)
    } else {
        debug!("{}: sequential scan of {} bytes", path.display(), buffer.len());
        count(&buffer)
    };
    Ok(counts)
}

/// Write `<lines> <words> <bytes> <name>\n`.
pub fn write_counts(out: &mut impl Write, counts: &WcCounts, name: &[u8]) -> io::Result<()> {
    let mut line = Vec::with_capacity(3 * 21 + name.len() + 1);
    let mut num = itoa::Buffer::new();
    for v in [counts.lines, counts.words, counts.bytes] {
        line.extend_from_slice(num.format(v).as_bytes());
        line.push(b' ');
    }
    line.extend_from_slice(name);
    line.push(b'\n');
    out.write_all(&line)
}
