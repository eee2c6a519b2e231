use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use memmap2::{Mmap, MmapOptions};

use crate::error::WcError;

/// Read-only view of the input bytes.
/// Dereferences to `&[u8]` whose length is the file size.
pub enum ByteBuffer {
    /// Zero-copy mapping of a regular file.
    Mapped(Mmap),
    /// Zero-length input. Nothing is mapped.
    Empty,
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            ByteBuffer::Mapped(m) => m,
            ByteBuffer::Empty => &[],
        }
    }
}

impl ByteBuffer {
    /// True when the bytes come from a memory mapping.
    pub fn is_mapped(&self) -> bool {
        matches!(self, ByteBuffer::Mapped(_))
    }
}

/// Files at least this large get MADV_HUGEPAGE before any page is touched.
#[cfg(target_os = "linux")]
const HUGEPAGE_THRESHOLD: u64 = 2 * 1024 * 1024;

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file with O_NOATIME on Linux to avoid atime inode writes.
/// Caches whether O_NOATIME works to avoid double-open on every call.
#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Open, stat and map `path` read-only.
///
/// A zero-length file is never mapped and yields [`ByteBuffer::Empty`].
/// The mapping is released when the returned buffer is dropped.
pub fn load(path: &Path) -> Result<ByteBuffer, WcError> {
    let file = open_noatime(path).map_err(|error| WcError::Open {
        path: path.to_path_buf(),
        error,
    })?;
    let metadata = file.metadata().map_err(|error| WcError::Stat {
        path: path.to_path_buf(),
        error,
    })?;
    let len = metadata.len();

    if len == 0 {
        debug!("{}: empty, nothing to map", path.display());
        return Ok(ByteBuffer::Empty);
    }
    if !metadata.file_type().is_file() {
        return Err(WcError::Map {
            path: path.to_path_buf(),
            error: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        });
    }

    // SAFETY: read-only private mapping; the buffer never hands out &mut.
    // A concurrent truncation by another process is outside our control,
    // as with every mmap-based reader.
    let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|error| WcError::Map {
        path: path.to_path_buf(),
        error,
    })?;

    #[cfg(target_os = "linux")]
    {
        // HUGEPAGE must come first, before WILLNEED starts faulting pages in.
        if len >= HUGEPAGE_THRESHOLD {
            let _ = mmap.advise(memmap2::Advice::HugePage);
        }
        let _ = mmap.advise(memmap2::Advice::Sequential);
        let _ = mmap.advise(memmap2::Advice::WillNeed);
    }

    debug!("{}: mapped {} bytes", path.display(), len);
    Ok(ByteBuffer::Mapped(mmap))
}
