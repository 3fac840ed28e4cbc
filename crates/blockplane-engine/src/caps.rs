use std::sync::Arc;

use blockplane_domain::{
    Capability, CreateCliRequest, DeleteCliRequest, ModifyCliRequest, ReplaceCliRequest,
    LEGACY_CAPS,
};
use blockplane_peer::{PeerClient, PeerError};
use tracing::{debug, warn};

use crate::error::EngineError;

// ── Minimum capability sets per command ───────────────────────────────────────

pub fn min_caps_create(req: &CreateCliRequest) -> Vec<&'static str> {
    let mut caps = vec!["create"];
    if req.mpath > 1 {
        caps.push("create_ha");
    }
    if req.prealloc {
        caps.push("create_prealloc");
    }
    if req.auth_mode {
        caps.push("create_auth");
    }
    if req.json_resp {
        caps.push("json");
    }
    caps
}

pub fn min_caps_delete(req: &DeleteCliRequest) -> Vec<&'static str> {
    let mut caps = vec!["delete"];
    if req.force {
        caps.push("delete_force");
    }
    if req.json_resp {
        caps.push("json");
    }
    caps
}

pub fn min_caps_modify(req: &ModifyCliRequest) -> Vec<&'static str> {
    let mut caps = vec!["modify"];
    if req.auth_mode {
        caps.push("modify_auth");
    }
    if req.json_resp {
        caps.push("json");
    }
    caps
}

pub fn min_caps_replace(req: &ReplaceCliRequest) -> Vec<&'static str> {
    let mut caps = vec!["replace"];
    if req.json_resp {
        caps.push("json");
    }
    caps
}

// ── Negotiation ───────────────────────────────────────────────────────────────

/// Check that every peer supports every capability the command needs.
///
/// Single-node deployments skip negotiation entirely. A peer whose daemon
/// lacks the `version` procedure is assumed to be a legacy build and gets
/// the fixed legacy capability table; a peer that cannot be reached at all
/// aborts the command before any fan-out.
pub async fn verify(
    peers: &Arc<dyn PeerClient>,
    hosts: &[String],
    min_caps: &[&'static str],
) -> Result<(), EngineError> {
    if hosts.len() <= 1 {
        return Ok(());
    }

    let mut handles = Vec::with_capacity(hosts.len());
    for addr in hosts {
        let peers = peers.clone();
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            let result = peers.version(&addr).await;
            (addr, result)
        }));
    }

    let mut reported: Vec<(String, Vec<Capability>)> = Vec::with_capacity(hosts.len());
    for handle in handles {
        let (addr, result) = handle.await.unwrap_or_else(|e| {
            (
                "<worker>".to_string(),
                Err(PeerError::BadReply {
                    addr: "<worker>".to_string(),
                    reason: e.to_string(),
                }),
            )
        });
        match result {
            Ok(caps) => reported.push((addr, caps)),
            Err(PeerError::ProcUnavailable { .. }) => {
                debug!(addr, "legacy peer, substituting built-in capability set");
                reported.push((addr, LEGACY_CAPS.iter().map(|c| Capability::on(c)).collect()));
            }
            Err(err) if !err.rpc_sent() => {
                warn!(addr, error = %err, "peer unreachable during capability check");
                return Err(EngineError::PeerUnreachable { addr, reason: err.to_string() });
            }
            Err(err) => {
                warn!(addr, error = %err, "capability query failed");
                return Err(EngineError::CapProbeFailed { addr, reason: err.to_string() });
            }
        }
    }

    for cap in min_caps {
        for (addr, caps) in &reported {
            let have = caps.iter().any(|c| c.name == *cap && c.enabled);
            if !have {
                return Err(EngineError::CapMissing {
                    cap: cap.to_string(),
                    addr: addr.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockplane_peer::LocalPeers;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn peers_with(names: &[&str]) -> Arc<dyn PeerClient> {
        let peers = LocalPeers::new();
        for name in names {
            peers.add_node(name);
        }
        Arc::new(peers)
    }

    #[test]
    fn create_min_caps_scale_with_request() {
        let mut req = CreateCliRequest {
            volume: "v".into(),
            block_name: "b".into(),
            block_hosts: "h1".into(),
            mpath: 1,
            size: 1,
            auth_mode: false,
            prealloc: false,
            json_resp: false,
        };
        assert_eq!(min_caps_create(&req), vec!["create"]);

        req.mpath = 3;
        req.auth_mode = true;
        req.json_resp = true;
        assert_eq!(
            min_caps_create(&req),
            vec!["create", "create_ha", "create_auth", "json"]
        );
    }

    #[tokio::test]
    async fn single_host_skips_negotiation() {
        // Not even a registered node: verify must not call out.
        let peers: Arc<dyn PeerClient> = Arc::new(LocalPeers::new());
        verify(&peers, &hosts(&["h1"]), &["create"]).await.unwrap();
    }

    #[tokio::test]
    async fn all_caps_present_passes() {
        let peers = peers_with(&["h1", "h2"]);
        verify(&peers, &hosts(&["h1", "h2"]), &["create", "create_ha", "json"])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn legacy_peer_lacks_replace() {
        let local = LocalPeers::new();
        local.add_node("h1");
        local.add_node("h2");
        local.set_legacy("h2", true);
        let peers: Arc<dyn PeerClient> = Arc::new(local);

        // Legacy set covers the old commands...
        verify(&peers, &hosts(&["h1", "h2"]), &["create", "delete_force"])
            .await
            .unwrap();
        // ...but not replace.
        let err = verify(&peers, &hosts(&["h1", "h2"]), &["replace"])
            .await
            .unwrap_err();
        match err {
            EngineError::CapMissing { cap, addr } => {
                assert_eq!(cap, "replace");
                assert_eq!(addr, "h2");
            }
            other => panic!("expected CapMissing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_peer_aborts() {
        let local = LocalPeers::new();
        local.add_node("h1");
        local.add_node("h2");
        local.set_down("h2", true);
        let peers: Arc<dyn PeerClient> = Arc::new(local);

        let err = verify(&peers, &hosts(&["h1", "h2"]), &["create"])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PeerUnreachable { .. }));
        assert_eq!(err.err_code(), 107);
    }
}
