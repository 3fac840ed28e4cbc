use serde::{Deserialize, Serialize};

use crate::types::Capability;

/// Exit codes shared by the operator and peer procedures.
pub mod codes {
    /// Fallback when a command failed but no specific code was set.
    pub const DEFAULT_ERR: i32 = 255;
    /// A sub-operation was intentionally bypassed: its effect was already in
    /// place. Not an error.
    pub const OP_SKIPPED: i32 = 222;
    /// Replace: the old node does not appear in the block's metadata.
    pub const NODE_NOT_EXIST: i32 = 223;
    /// Replace: the new node already serves this block.
    pub const NODE_IN_USE: i32 = 224;
}

// ── Operator procedures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCliRequest {
    pub volume: String,
    pub block_name: String,
    /// Comma-separated candidate hosts, in spare-selection order.
    pub block_hosts: String,
    pub mpath: u32,
    /// Size of the backing file, in bytes.
    pub size: u64,
    #[serde(default)]
    pub auth_mode: bool,
    #[serde(default)]
    pub prealloc: bool,
    #[serde(default)]
    pub json_resp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteCliRequest {
    pub volume: String,
    pub block_name: String,
    /// Remove the backing file as well as the target configuration.
    #[serde(default)]
    pub unlink: bool,
    /// Skip the reachability pre-probe and mask remote failures.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub json_resp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyCliRequest {
    pub volume: String,
    pub block_name: String,
    pub auth_mode: bool,
    #[serde(default)]
    pub json_resp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceCliRequest {
    pub volume: String,
    pub block_name: String,
    pub old_node: String,
    pub new_node: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub json_resp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCliRequest {
    pub volume: String,
    #[serde(default)]
    pub json_resp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoCliRequest {
    pub volume: String,
    pub block_name: String,
    #[serde(default)]
    pub json_resp: bool,
}

/// What every operator procedure returns: the remote handler's exit code and
/// its rendered output (plain text or JSON per the request's `json_resp`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockReply {
    pub exit: i32,
    pub out: String,
}

// ── Peer-to-peer procedures ───────────────────────────────────────────────────

/// Configure one LUN export on one node. `ipaddr` is the node the request is
/// addressed to; `block_hosts` carries every participant so each node can
/// advertise the full portal group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub volume: String,
    pub block_name: String,
    pub gbid: String,
    pub size: u64,
    pub ipaddr: String,
    pub block_hosts: Vec<String>,
    #[serde(default)]
    pub auth_mode: bool,
    #[serde(default)]
    pub passwd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub block_name: String,
    pub gbid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub volume: String,
    pub block_name: String,
    pub gbid: String,
    pub auth_mode: bool,
    #[serde(default)]
    pub passwd: String,
}

/// Swap `ripaddr`'s portal for `ipaddr`'s in the node's portal group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceRequest {
    pub volume: String,
    pub block_name: String,
    pub gbid: String,
    pub ipaddr: String,
    pub ripaddr: String,
}

/// Reply body of every peer procedure. `caps` is only populated by `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerReply {
    pub exit: i32,
    pub out: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps: Option<Vec<Capability>>,
}

impl PeerReply {
    pub fn ok(out: impl Into<String>) -> Self {
        PeerReply { exit: 0, out: out.into(), caps: None }
    }

    pub fn fail(exit: i32, out: impl Into<String>) -> Self {
        PeerReply { exit, out: out.into(), caps: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_cli_defaults_optional_flags() {
        let req: CreateCliRequest = serde_json::from_str(
            r#"{"volume":"v1","block_name":"b1","block_hosts":"h1,h2","mpath":2,"size":1048576}"#,
        )
        .unwrap();
        assert!(!req.auth_mode);
        assert!(!req.prealloc);
        assert!(!req.json_resp);
    }

    #[test]
    fn peer_reply_omits_absent_caps() {
        let reply = PeerReply::ok("done");
        let json = serde_json::to_string(&reply).unwrap();
        assert!(!json.contains("caps"));
    }
}
