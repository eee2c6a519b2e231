mod core;
pub mod popcount;
pub mod swar;


pub use self::core::*;
pub use self::popcount::{PopcountBackend, popcount_soft, popcount64};
pub use self::swar::{ChunkMasks, classify, is_whitespace};
