use std::path::PathBuf;
use thiserror::Error;

/// Load-time index failures. These are fatal: a `KbIndex` either loads
/// completely or not at all. Query-time misses never surface here; they map
/// to sentinel values ("None" labels, empty lists, zero frequency).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("malformed index file {}: {reason}", file.display())]
    Malformed { file: PathBuf, reason: String },

    #[error("index dictionaries are inconsistent: {0}")]
    Inconsistent(String),

    #[error("failed to read {}: {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub fn malformed(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            file: file.into(),
            reason: reason.into(),
        }
    }

    pub fn io(file: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            file: file.into(),
            source,
        }
    }
}
