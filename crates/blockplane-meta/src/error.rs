use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("volume not available: {volume}: {reason}")]
    VolumeUnavailable { volume: String, reason: String },

    #[error("block not found: {0}")]
    NotFound(String),

    #[error("metadata corrupt for block {block}: {reason}")]
    Corrupt { block: String, reason: String },

    #[error("metadata lock busy for volume {0}")]
    LockBusy(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl MetaError {
    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        MetaError::Io { path: path.to_string(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MetaError::NotFound(_))
    }
}
