use async_trait::async_trait;
use blockplane_domain::{
    Capability, CreateRequest, DeleteRequest, ModifyRequest, PeerReply, ReplaceRequest,
};

/// Contract of the node-local target configurator, the component that
/// drives the kernel LUN/target layer on one storage node.
///
/// The management plane only ever sees `(exit, out)` from these calls; how a
/// backend gets there (shelling out to the target CLI, talking to configfs,
/// or simulating, as [`crate::local::LocalBackend`] does) is its own
/// business. Handlers must return a terminal reply, never panic mid-way.
#[async_trait]
pub trait NodeBackend: Send + Sync + 'static {
    /// Create the backstore and target for one block and expose one portal
    /// per participating host.
    async fn configure(&self, req: &CreateRequest) -> PeerReply;

    /// Tear the target and backstore down. Unconfiguring a block this node
    /// never had is a success ("No <name>.") so delete fan-outs converge.
    async fn unconfigure(&self, req: &DeleteRequest) -> PeerReply;

    /// Enable or clear CHAP auth on every TPG of the target.
    async fn set_auth(&self, req: &ModifyRequest) -> PeerReply;

    /// Swap the replaced node's portal for the new node's.
    async fn replace_portal(&self, req: &ReplaceRequest) -> PeerReply;

    /// The feature set this node's daemon supports.
    fn capabilities(&self) -> Vec<Capability>;
}
