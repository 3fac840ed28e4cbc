use std::sync::Arc;

use blockplane_engine::Engine;
use blockplane_peer::NodeBackend;

#[derive(Clone)]
pub struct AppState {
    /// Orchestrates the operator (`/cli/*`) procedures.
    pub engine: Arc<Engine>,
    /// Serves the peer-to-peer (`/peer/*`) procedures on this node.
    pub backend: Arc<dyn NodeBackend>,
}
