use blockplane_domain::{codes, DomainError};
use blockplane_meta::MetaError;
use thiserror::Error;

/// Failure of an orchestrated command before or during execution. Every
/// variant maps to the `errCode`/`errMsg` pair the renderer puts on the
/// wire; fan-out partial failures are not errors here; they surface
/// through the per-host sets in the command summaries.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("multipath req: {mpath} > block-hosts: {hosts}")]
    InsufficientHosts { mpath: u32, hosts: String },

    #[error("BLOCK with name: '{block}' already EXIST")]
    AlreadyExists { block: String },

    #[error("block {volume}/{block} doesn't exist")]
    NotFound { volume: String, block: String },

    #[error("Version check failed between block servers. (capability '{cap}' doesn't exist on {addr})")]
    CapMissing { cap: String, addr: String },

    #[error("Version check failed [{reason}] (Hint: See if all servers are up and running the blockplane daemon)")]
    PeerUnreachable { addr: String, reason: String },

    #[error("Version check failed between block servers. (host {addr} returned {reason})")]
    CapProbeFailed { addr: String, reason: String },

    #[error(
        "block delete: {block}: failed: Some of the nodes are down\n\
         Nodes reachable: {}\nNodes down: {}",
        fmt_hosts(.reachable),
        fmt_hosts(.unreachable)
    )]
    NodesDown {
        block: String,
        reachable: Vec<String>,
        unreachable: Vec<String>,
    },

    #[error("block '{block}' is not configured on node '{node}' for volume '{volume}'")]
    NodeNotExist { block: String, node: String, volume: String },

    #[error("block '{block}' was already configured on node '{node}' for volume '{volume}'")]
    NodeInUse { block: String, node: String, volume: String },

    #[error("failed creating backing file for block {block}: {reason}")]
    EntryCreateFail { block: String, reason: String },

    #[error("{0}")]
    Meta(#[from] MetaError),

    #[error("remote operation failed on one or more nodes")]
    RemoteFailed,
}

fn fmt_hosts(hosts: &[String]) -> String {
    if hosts.is_empty() {
        "None".to_string()
    } else {
        hosts.join(" ")
    }
}

impl EngineError {
    /// The `errCode` the operator sees. Unmapped failures fall back to the
    /// default code.
    pub fn err_code(&self) -> i32 {
        match self {
            EngineError::Domain(_) => 22,
            EngineError::InsufficientHosts { .. } => 19,
            EngineError::AlreadyExists { .. } => 17,
            EngineError::NotFound { .. } => 2,
            EngineError::PeerUnreachable { .. } => 107,
            EngineError::NodeNotExist { .. } => codes::NODE_NOT_EXIST,
            EngineError::NodeInUse { .. } => codes::NODE_IN_USE,
            EngineError::Meta(MetaError::NotFound(_)) => 2,
            EngineError::Meta(MetaError::LockBusy(_)) => 16,
            _ => codes::DEFAULT_ERR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_down_lists_both_sides() {
        let err = EngineError::NodesDown {
            block: "b1".into(),
            reachable: vec!["h1".into()],
            unreachable: vec!["h2".into(), "h3".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Nodes reachable: h1"));
        assert!(msg.contains("Nodes down: h2 h3"));
    }

    #[test]
    fn nodes_down_prints_none_for_empty_side() {
        let err = EngineError::NodesDown {
            block: "b1".into(),
            reachable: vec![],
            unreachable: vec!["h2".into()],
        };
        assert!(err.to_string().contains("Nodes reachable: None"));
    }

    #[test]
    fn replace_codes_are_distinct_sentinels() {
        let not_exist = EngineError::NodeNotExist {
            block: "b".into(),
            node: "h".into(),
            volume: "v".into(),
        };
        let in_use = EngineError::NodeInUse {
            block: "b".into(),
            node: "h".into(),
            volume: "v".into(),
        };
        assert_eq!(not_exist.err_code(), 223);
        assert_eq!(in_use.err_code(), 224);
    }
}
