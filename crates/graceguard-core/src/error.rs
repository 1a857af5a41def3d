use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraceGuardError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot schedule re-block: {0}")]
    Schedule(String),
    #[error("restore failed: {0}")]
    Restore(String),
}

impl GraceGuardError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
