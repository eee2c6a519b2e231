//! Line, word and byte counting over memory-mapped files, eight bytes at a
//! time.

/// Use mimalloc as the global allocator for all binaries.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod error;
pub mod wc;

pub use error::WcError;
