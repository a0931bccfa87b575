use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the asset queue.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Enqueue was called after the startup load already ran.
    #[error("asset queue is closed: '{0}' must be enqueued before load_all")]
    LoadingClosed(PathBuf),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Decoded mesh references vertices that do not exist.
    #[error("mesh in '{path}' has index {index} but only {vertex_count} vertices")]
    IndexOutOfRange {
        path: PathBuf,
        index: u32,
        vertex_count: u32,
    },

    #[error("asset worker thread panicked")]
    WorkerPanicked,
}

impl AssetError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
