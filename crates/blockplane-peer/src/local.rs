use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use blockplane_domain::{
    codes, self_capabilities, Capability, CreateRequest, DeleteRequest, ModifyRequest,
    PeerReply, ReplaceRequest, IQN_PREFIX, ISCSI_PORT,
};
use tracing::debug;

use crate::backend::NodeBackend;
use crate::client::{PeerClient, RemoteReply};
use crate::error::PeerError;

// ── LocalBackend ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Target {
    gbid: String,
    portals: Vec<String>,
    /// CHAP secret when auth is enforced.
    passwd: Option<String>,
}

/// A [`NodeBackend`] that simulates one node's target subsystem in memory.
///
/// Used by tests and single-process demos; a production node wires the
/// shell-driven configurator here instead. Output lines follow the same
/// conventions the management plane parses (`IQN: …`, `PORTAL: …`).
#[derive(Debug, Default)]
pub struct LocalBackend {
    addr: String,
    targets: Mutex<HashMap<String, Target>>,
}

impl LocalBackend {
    pub fn new(addr: impl Into<String>) -> Self {
        LocalBackend { addr: addr.into(), targets: Mutex::new(HashMap::new()) }
    }

    /// Portals currently advertised for a block, for test assertions.
    pub fn portals(&self, block_name: &str) -> Option<Vec<String>> {
        let targets = self.targets.lock().unwrap();
        targets.get(block_name).map(|t| t.portals.clone())
    }

    pub fn has_auth(&self, block_name: &str) -> bool {
        let targets = self.targets.lock().unwrap();
        targets.get(block_name).is_some_and(|t| t.passwd.is_some())
    }

    fn render_created(&self, gbid: &str, portals: &[String]) -> String {
        let mut out = format!("IQN: {IQN_PREFIX}{gbid}\n");
        for portal in portals {
            out.push_str(&format!("PORTAL: {portal}\n"));
        }
        out
    }
}

#[async_trait]
impl NodeBackend for LocalBackend {
    async fn configure(&self, req: &CreateRequest) -> PeerReply {
        let mut targets = self.targets.lock().unwrap();
        let portals: Vec<String> = req
            .block_hosts
            .iter()
            .map(|h| format!("{h}:{ISCSI_PORT}"))
            .collect();

        if let Some(existing) = targets.get(&req.block_name) {
            if existing.gbid == req.gbid {
                // Same block re-configured: idempotent.
                let out = self.render_created(&existing.gbid, &existing.portals);
                return PeerReply::ok(out);
            }
            return PeerReply::fail(
                1,
                format!("failed to configure on {}: target name in use", self.addr),
            );
        }

        debug!(addr = %self.addr, block = %req.block_name, "configuring target");
        let target = Target {
            gbid: req.gbid.clone(),
            portals: portals.clone(),
            passwd: req.auth_mode.then(|| req.passwd.clone()),
        };
        let out = self.render_created(&target.gbid, &target.portals);
        targets.insert(req.block_name.clone(), target);
        PeerReply::ok(out)
    }

    async fn unconfigure(&self, req: &DeleteRequest) -> PeerReply {
        let mut targets = self.targets.lock().unwrap();
        let known = targets
            .get(&req.block_name)
            .is_some_and(|t| t.gbid == req.gbid);
        if !known {
            // Nothing of ours here; report success so delete converges.
            return PeerReply::ok(format!("No {}.", req.block_name));
        }
        targets.remove(&req.block_name);
        PeerReply::ok(format!("deleted {}", req.block_name))
    }

    async fn set_auth(&self, req: &ModifyRequest) -> PeerReply {
        let mut targets = self.targets.lock().unwrap();
        let Some(target) = targets.get_mut(&req.block_name) else {
            return PeerReply::ok(format!("No {}.", req.block_name));
        };
        if target.gbid != req.gbid {
            return PeerReply::ok(format!("No {}.", req.block_name));
        }
        if req.auth_mode {
            target.passwd = Some(req.passwd.clone());
            PeerReply::ok(format!("auth set for {}", req.block_name))
        } else {
            target.passwd = None;
            PeerReply::ok(format!("auth cleared for {}", req.block_name))
        }
    }

    async fn replace_portal(&self, req: &ReplaceRequest) -> PeerReply {
        let mut targets = self.targets.lock().unwrap();
        let Some(target) = targets.get_mut(&req.block_name) else {
            return PeerReply::fail(
                1,
                format!("failed to replace portal on {}: no {}", self.addr, req.block_name),
            );
        };
        let new_portal = format!("{}:{ISCSI_PORT}", req.ipaddr);
        let old_portal = format!("{}:{ISCSI_PORT}", req.ripaddr);

        if target.portals.contains(&new_portal) {
            // A previous replace already landed here.
            return PeerReply::fail(
                codes::OP_SKIPPED,
                format!("portal {new_portal} already present"),
            );
        }
        match target.portals.iter().position(|p| *p == old_portal) {
            Some(idx) => {
                target.portals[idx] = new_portal.clone();
                PeerReply::ok(format!("replaced portal {old_portal} with {new_portal}"))
            }
            None => PeerReply::fail(
                1,
                format!("failed to replace portal on {}: {old_portal} not found", self.addr),
            ),
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        self_capabilities()
    }
}

// ── LocalPeers ────────────────────────────────────────────────────────────────

/// An in-process cluster of [`LocalBackend`] nodes behind the [`PeerClient`]
/// interface, with fault injection knobs for exercising partial failures.
#[derive(Default)]
pub struct LocalPeers {
    nodes: RwLock<HashMap<String, Arc<LocalBackend>>>,
    down: RwLock<HashSet<String>>,
    slow: RwLock<HashSet<String>>,
    legacy: RwLock<HashSet<String>>,
    /// `(procedure, addr)` pairs forced to report a remote failure.
    failing: RwLock<HashSet<(String, String)>>,
}

impl LocalPeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, addr: &str) -> Arc<LocalBackend> {
        let backend = Arc::new(LocalBackend::new(addr));
        self.nodes
            .write()
            .unwrap()
            .insert(addr.to_string(), backend.clone());
        backend
    }

    pub fn node(&self, addr: &str) -> Option<Arc<LocalBackend>> {
        self.nodes.read().unwrap().get(addr).cloned()
    }

    /// Drop the node off the network: every call and probe fails to connect.
    pub fn set_down(&self, addr: &str, down: bool) {
        let mut set = self.down.write().unwrap();
        if down {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    /// The node accepts connections but never answers in time.
    pub fn set_slow(&self, addr: &str, slow: bool) {
        let mut set = self.slow.write().unwrap();
        if slow {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    /// The node's daemon predates the `version` procedure.
    pub fn set_legacy(&self, addr: &str, legacy: bool) {
        let mut set = self.legacy.write().unwrap();
        if legacy {
            set.insert(addr.to_string());
        } else {
            set.remove(addr);
        }
    }

    /// Make one procedure on one node report a remote failure (exit 1) while
    /// the daemon itself stays reachable.
    pub fn set_failing(&self, procedure: &str, addr: &str, failing: bool) {
        let key = (procedure.to_string(), addr.to_string());
        let mut set = self.failing.write().unwrap();
        if failing {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    fn injected_failure(&self, procedure: &str, addr: &str) -> Option<RemoteReply> {
        let set = self.failing.read().unwrap();
        set.contains(&(procedure.to_string(), addr.to_string()))
            .then(|| RemoteReply {
                exit: 1,
                out: format!("failed to {procedure} on {addr}"),
            })
    }

    fn dispatch(&self, addr: &str) -> Result<Arc<LocalBackend>, PeerError> {
        if self.down.read().unwrap().contains(addr) {
            return Err(PeerError::Unreachable {
                addr: addr.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        if self.slow.read().unwrap().contains(addr) {
            return Err(PeerError::Timeout { addr: addr.to_string() });
        }
        self.node(addr).ok_or_else(|| PeerError::Unreachable {
            addr: addr.to_string(),
            reason: "no such node".to_string(),
        })
    }
}

#[async_trait]
impl PeerClient for LocalPeers {
    async fn create(&self, addr: &str, req: &CreateRequest) -> Result<RemoteReply, PeerError> {
        let backend = self.dispatch(addr)?;
        if let Some(reply) = self.injected_failure("create", addr) {
            return Ok(reply);
        }
        let reply = backend.configure(req).await;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn delete(&self, addr: &str, req: &DeleteRequest) -> Result<RemoteReply, PeerError> {
        let backend = self.dispatch(addr)?;
        if let Some(reply) = self.injected_failure("delete", addr) {
            return Ok(reply);
        }
        let reply = backend.unconfigure(req).await;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn modify(&self, addr: &str, req: &ModifyRequest) -> Result<RemoteReply, PeerError> {
        let backend = self.dispatch(addr)?;
        if let Some(reply) = self.injected_failure("modify", addr) {
            return Ok(reply);
        }
        let reply = backend.set_auth(req).await;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn replace(&self, addr: &str, req: &ReplaceRequest) -> Result<RemoteReply, PeerError> {
        let backend = self.dispatch(addr)?;
        if let Some(reply) = self.injected_failure("replace", addr) {
            return Ok(reply);
        }
        let reply = backend.replace_portal(req).await;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn version(&self, addr: &str) -> Result<Vec<Capability>, PeerError> {
        let backend = self.dispatch(addr)?;
        if self.legacy.read().unwrap().contains(addr) {
            return Err(PeerError::ProcUnavailable { addr: addr.to_string() });
        }
        Ok(backend.capabilities())
    }

    async fn probe(&self, addr: &str) -> Result<(), PeerError> {
        // A slow node still accepts the TCP connect.
        if self.down.read().unwrap().contains(addr) || self.node(addr).is_none() {
            return Err(PeerError::Unreachable {
                addr: addr.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req(hosts: &[&str]) -> CreateRequest {
        CreateRequest {
            volume: "v1".into(),
            block_name: "b1".into(),
            gbid: "5f4dcc3b-aa12-4b1e-9a2f-000000000001".into(),
            size: 1 << 20,
            ipaddr: hosts[0].into(),
            block_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            auth_mode: false,
            passwd: String::new(),
        }
    }

    #[tokio::test]
    async fn configure_reports_iqn_and_portals() {
        let backend = LocalBackend::new("h1");
        let reply = backend.configure(&create_req(&["h1", "h2"])).await;
        assert_eq!(reply.exit, 0);
        assert!(reply.out.contains(&format!(
            "IQN: {IQN_PREFIX}5f4dcc3b-aa12-4b1e-9a2f-000000000001"
        )));
        assert!(reply.out.contains("PORTAL: h1:3260"));
        assert!(reply.out.contains("PORTAL: h2:3260"));
    }

    #[tokio::test]
    async fn configure_is_idempotent_for_same_gbid() {
        let backend = LocalBackend::new("h1");
        let req = create_req(&["h1"]);
        assert_eq!(backend.configure(&req).await.exit, 0);
        assert_eq!(backend.configure(&req).await.exit, 0);

        let mut clash = req.clone();
        clash.gbid = "5f4dcc3b-aa12-4b1e-9a2f-00000000dead".into();
        assert_ne!(backend.configure(&clash).await.exit, 0);
    }

    #[tokio::test]
    async fn unconfigure_missing_target_succeeds() {
        let backend = LocalBackend::new("h1");
        let reply = backend
            .unconfigure(&DeleteRequest { block_name: "b1".into(), gbid: "g".into() })
            .await;
        assert_eq!(reply.exit, 0);
        assert_eq!(reply.out, "No b1.");
    }

    #[tokio::test]
    async fn replace_portal_swaps_and_skips() {
        let backend = LocalBackend::new("h1");
        backend.configure(&create_req(&["h1", "h2"])).await;
        let req = ReplaceRequest {
            volume: "v1".into(),
            block_name: "b1".into(),
            gbid: "5f4dcc3b-aa12-4b1e-9a2f-000000000001".into(),
            ipaddr: "h4".into(),
            ripaddr: "h2".into(),
        };

        assert_eq!(backend.replace_portal(&req).await.exit, 0);
        assert_eq!(
            backend.portals("b1").unwrap(),
            vec!["h1:3260".to_string(), "h4:3260".to_string()]
        );
        // Re-running the same swap is intentionally a skip.
        assert_eq!(backend.replace_portal(&req).await.exit, codes::OP_SKIPPED);
    }

    #[tokio::test]
    async fn down_node_is_unreachable_but_slow_node_probes_ok() {
        let peers = LocalPeers::new();
        peers.add_node("h1");
        peers.set_down("h1", true);
        assert!(matches!(
            peers.probe("h1").await,
            Err(PeerError::Unreachable { .. })
        ));

        peers.set_down("h1", false);
        peers.set_slow("h1", true);
        peers.probe("h1").await.unwrap();
        assert!(matches!(
            peers.delete("h1", &DeleteRequest { block_name: "b".into(), gbid: "g".into() }).await,
            Err(PeerError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn legacy_node_lacks_version_procedure() {
        let peers = LocalPeers::new();
        peers.add_node("h1");
        peers.set_legacy("h1", true);
        assert!(matches!(
            peers.version("h1").await,
            Err(PeerError::ProcUnavailable { .. })
        ));
    }
}
