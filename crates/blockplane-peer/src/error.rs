use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeerError {
    /// The request never reached the peer (connect/socket failure).
    #[error("peer {addr} unreachable: {reason}")]
    Unreachable { addr: String, reason: String },

    /// The request was sent but the deadline expired before a reply arrived.
    #[error("rpc to peer {addr} timed out")]
    Timeout { addr: String },

    /// The peer answered but does not implement the procedure (legacy daemon).
    #[error("procedure unavailable on peer {addr}")]
    ProcUnavailable { addr: String },

    #[error("bad reply from peer {addr}: {reason}")]
    BadReply { addr: String, reason: String },
}

impl PeerError {
    /// Whether the request was actually delivered to the peer. Callers treat
    /// undelivered requests differently: the host's pre-status line stays as
    /// the last word, since the node never saw the command.
    pub fn rpc_sent(&self) -> bool {
        !matches!(self, PeerError::Unreachable { .. })
    }

    pub fn addr(&self) -> &str {
        match self {
            PeerError::Unreachable { addr, .. }
            | PeerError::Timeout { addr }
            | PeerError::ProcUnavailable { addr }
            | PeerError::BadReply { addr, .. } => addr,
        }
    }
}
