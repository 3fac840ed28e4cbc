use serde::{Deserialize, Serialize};

/// Raw YAML representation of the daemon config file. Every field is
/// optional; [`crate::loader`] fills in defaults and validates.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawConfig {
    /// Address the admin/peer HTTP listener binds to.
    pub listen: Option<String>,
    /// Port assumed for peers whose address carries none.
    pub peer_port: Option<u16>,
    /// Mount point of the shared cluster filesystem holding block metadata.
    pub meta_root: Option<String>,
    pub rpc: Option<RawRpc>,
    /// tracing env-filter directive, e.g. "info,blockplane_engine=debug".
    pub log_filter: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RawRpc {
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}
