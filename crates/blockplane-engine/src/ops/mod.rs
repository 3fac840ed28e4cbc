mod create;
mod delete;
mod modify;
mod readonly;
mod replace;

use std::sync::Arc;

use blockplane_domain::{
    BlockReply, CreateCliRequest, DeleteCliRequest, InfoCliRequest, ListCliRequest,
    ModifyCliRequest, ReplaceCliRequest,
};
use blockplane_meta::MetaStore;
use blockplane_peer::PeerClient;

use crate::fanout::FanoutCtx;

/// The multi-node orchestration engine: one entry point per administrative
/// command. Every method returns a fully rendered [`BlockReply`]; errors
/// are folded into the response, never surfaced as `Err` to the transport.
pub struct Engine {
    pub(crate) store: Arc<dyn MetaStore>,
    pub(crate) peers: Arc<dyn PeerClient>,
}

impl Engine {
    pub fn new(store: Arc<dyn MetaStore>, peers: Arc<dyn PeerClient>) -> Self {
        Engine { store, peers }
    }

    pub(crate) fn ctx(&self, volume: &str, block: &str) -> FanoutCtx {
        FanoutCtx {
            store: self.store.clone(),
            peers: self.peers.clone(),
            volume: volume.to_string(),
            block: block.to_string(),
        }
    }

    pub async fn create_cli(&self, req: CreateCliRequest) -> BlockReply {
        create::run(self, req).await
    }

    pub async fn delete_cli(&self, req: DeleteCliRequest) -> BlockReply {
        delete::run(self, req).await
    }

    pub async fn modify_cli(&self, req: ModifyCliRequest) -> BlockReply {
        modify::run(self, req).await
    }

    pub async fn replace_cli(&self, req: ReplaceCliRequest) -> BlockReply {
        replace::run(self, req).await
    }

    pub async fn list_cli(&self, req: ListCliRequest) -> BlockReply {
        readonly::list(self, req).await
    }

    pub async fn info_cli(&self, req: InfoCliRequest) -> BlockReply {
        readonly::info(self, req).await
    }
}
