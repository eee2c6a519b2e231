use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::common::io_error_msg;

/// Everything that can stop a count. All variants are fatal.
///
/// The OS error is folded into the message and not exposed as `source()`,
/// so `{:#}` chains print it once and without the `(os error N)` suffix.
#[derive(Debug, Error)]
pub enum WcError {
    /// Wrong argument count or unparsable command line.
    #[error("{0}")]
    Usage(String),

    #[error("cannot open '{}': {}", .path.display(), io_error_msg(.error))]
    Open { path: PathBuf, error: io::Error },

    #[error("cannot stat '{}': {}", .path.display(), io_error_msg(.error))]
    Stat { path: PathBuf, error: io::Error },

    #[error("cannot map '{}': {}", .path.display(), io_error_msg(.error))]
    Map { path: PathBuf, error: io::Error },
}

impl WcError {
    /// The underlying OS error, if any. `Usage` carries none.
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            WcError::Usage(_) => None,
            WcError::Open { error, .. }
            | WcError::Stat { error, .. }
            | WcError::Map { error, .. } => Some(error),
        }
    }
}
