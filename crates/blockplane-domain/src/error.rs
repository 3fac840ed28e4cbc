use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid block name: {0}")]
    InvalidBlockName(String),

    #[error("invalid volume name: {0}")]
    InvalidVolumeName(String),

    #[error("empty host list")]
    EmptyServerList,

    #[error("empty host entry in server list")]
    EmptyHost,

    #[error("duplicate host in server list: {0}")]
    DuplicateHost(String),

    #[error("unknown status token: {0}")]
    UnknownStatus(String),

    #[error("invalid multipath count: {0}")]
    InvalidMpath(u32),

    #[error("invalid gbid: {0}")]
    InvalidGbid(String),
}
