use async_trait::async_trait;
use blockplane_domain::{
    Capability, CreateRequest, DeleteRequest, ModifyRequest, ReplaceRequest,
};

use crate::error::PeerError;

/// Outcome of a delivered unary call: the remote handler's exit code and its
/// free-form textual output. A non-zero exit is a remote failure, not a
/// client error: the RPC itself succeeded.
#[derive(Debug, Clone)]
pub struct RemoteReply {
    pub exit: i32,
    pub out: String,
}

/// Typed unary calls to one storage node's daemon.
///
/// Implementations enforce the configured connect/read deadlines and
/// classify failures into [`PeerError`]; they never interpret exit codes.
#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
    async fn create(&self, addr: &str, req: &CreateRequest) -> Result<RemoteReply, PeerError>;

    async fn delete(&self, addr: &str, req: &DeleteRequest) -> Result<RemoteReply, PeerError>;

    async fn modify(&self, addr: &str, req: &ModifyRequest) -> Result<RemoteReply, PeerError>;

    async fn replace(&self, addr: &str, req: &ReplaceRequest) -> Result<RemoteReply, PeerError>;

    /// Query the peer's capability set. A legacy daemon without the
    /// procedure surfaces as [`PeerError::ProcUnavailable`].
    async fn version(&self, addr: &str) -> Result<Vec<Capability>, PeerError>;

    /// Bare reachability check (TCP connect, no request body).
    async fn probe(&self, addr: &str) -> Result<(), PeerError>;
}
