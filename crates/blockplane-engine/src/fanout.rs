use std::sync::Arc;

use blockplane_domain::{
    codes, CreateRequest, DeleteRequest, HostStatus, ModifyRequest, ReplaceRequest,
};
use blockplane_meta::info::host_line;
use blockplane_meta::MetaStore;
use blockplane_peer::{PeerClient, PeerError, RemoteReply};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Result slot of one fan-out worker. `exit == 0` means the node ended up in
/// the desired state; anything else (remote exit, transport failure, local
/// metadata failure) is a per-host failure the caller aggregates.
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub addr: String,
    pub exit: i32,
    pub out: String,
}

/// Everything a worker needs to run against one volume's block.
#[derive(Clone)]
pub(crate) struct FanoutCtx {
    pub store: Arc<dyn MetaStore>,
    pub peers: Arc<dyn PeerClient>,
    pub volume: String,
    pub block: String,
}

impl FanoutCtx {
    async fn append_status(&self, addr: &str, statuses: &[HostStatus]) -> Result<(), String> {
        let lines: Vec<String> = statuses.iter().map(|s| host_line(addr, *s)).collect();
        self.store
            .append(&self.volume, &self.block, &lines)
            .await
            .map_err(|e| e.to_string())
    }
}

/// One typed peer call plus its status-line schedule.
#[derive(Debug, Clone)]
pub(crate) enum PeerCall {
    Create(CreateRequest),
    Delete(DeleteRequest),
    Modify(ModifyRequest),
    ReplacePortal(ReplaceRequest),
}

impl PeerCall {
    fn pre(&self) -> HostStatus {
        match self {
            PeerCall::Create(_) => HostStatus::ConfigInProgress,
            PeerCall::Delete(_) => HostStatus::CleanupInProgress,
            PeerCall::Modify(m) if m.auth_mode => HostStatus::AuthEnforcing,
            PeerCall::Modify(_) => HostStatus::AuthClearEnforcing,
            PeerCall::ReplacePortal(_) => HostStatus::RpInProgress,
        }
    }

    fn on_success(&self) -> Vec<HostStatus> {
        match self {
            PeerCall::Create(c) if c.auth_mode => {
                vec![HostStatus::ConfigSuccess, HostStatus::AuthEnforced]
            }
            PeerCall::Create(_) => vec![HostStatus::ConfigSuccess],
            PeerCall::Delete(_) => vec![HostStatus::CleanupSuccess],
            PeerCall::Modify(m) if m.auth_mode => vec![HostStatus::AuthEnforced],
            PeerCall::Modify(_) => vec![HostStatus::AuthClearEnforced],
            PeerCall::ReplacePortal(_) => vec![HostStatus::RpSuccess],
        }
    }

    fn on_fail(&self) -> HostStatus {
        match self {
            PeerCall::Create(_) => HostStatus::ConfigFail,
            PeerCall::Delete(_) => HostStatus::CleanupFail,
            PeerCall::Modify(m) if m.auth_mode => HostStatus::AuthEnforceFail,
            PeerCall::Modify(_) => HostStatus::AuthClearEnforceFail,
            PeerCall::ReplacePortal(_) => HostStatus::RpFail,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            PeerCall::Create(_) => "configure",
            PeerCall::Delete(_) => "delete config on",
            PeerCall::Modify(_) => "configure auth on",
            PeerCall::ReplacePortal(_) => "replace portal on",
        }
    }

    /// Whether a non-zero remote exit still counts as the desired state.
    /// Replace-portal reports `OP_SKIPPED` when the portal swap already
    /// happened; that is success for the fan-out.
    fn exit_is_success(&self, exit: i32) -> bool {
        exit == 0 || (matches!(self, PeerCall::ReplacePortal(_)) && exit == codes::OP_SKIPPED)
    }

    async fn invoke(
        &self,
        peers: &Arc<dyn PeerClient>,
        addr: &str,
    ) -> Result<RemoteReply, PeerError> {
        match self {
            PeerCall::Create(c) => {
                let mut c = c.clone();
                c.ipaddr = addr.to_string();
                peers.create(addr, &c).await
            }
            PeerCall::Delete(d) => peers.delete(addr, d).await,
            PeerCall::Modify(m) => peers.modify(addr, m).await,
            PeerCall::ReplacePortal(r) => peers.replace(addr, r).await,
        }
    }
}

/// Drive one peer through its status-line schedule.
///
/// Ordering contract: the pre-status line is persisted before the RPC goes
/// out and the terminal line after it returns, so per-host history stays
/// monotone. An undelivered request (connect failure) writes no terminal
/// line: the node never saw the command, and the lingering in-progress
/// status is what the audit and cleanup paths key off.
async fn run_worker(ctx: FanoutCtx, addr: String, call: PeerCall) -> HostOutcome {
    if let Err(reason) = ctx.append_status(&addr, &[call.pre()]).await {
        error!(volume = %ctx.volume, block = %ctx.block, addr, %reason, "pre-status append failed");
        return HostOutcome {
            addr: addr.clone(),
            exit: -1,
            out: format!("failed to update metadata for {addr}: {reason}"),
        };
    }

    match call.invoke(&ctx.peers, &addr).await {
        Ok(reply) if call.exit_is_success(reply.exit) => {
            if let Err(reason) = ctx.append_status(&addr, &call.on_success()).await {
                error!(volume = %ctx.volume, block = %ctx.block, addr, %reason, "post-status append failed");
                return HostOutcome {
                    addr: addr.clone(),
                    exit: -1,
                    out: format!("failed to update metadata for {addr}: {reason}"),
                };
            }
            HostOutcome { addr, exit: 0, out: reply.out }
        }
        Ok(reply) => {
            warn!(
                volume = %ctx.volume,
                block = %ctx.block,
                addr,
                exit = reply.exit,
                "remote {} failed",
                call.describe()
            );
            let _ = ctx.append_status(&addr, &[call.on_fail()]).await;
            let out = if reply.out.is_empty() {
                format!("failed to {} {addr}", call.describe())
            } else {
                reply.out
            };
            HostOutcome { addr, exit: reply.exit, out }
        }
        Err(err) if !err.rpc_sent() => {
            // Never delivered: leave the in-progress line as the last word.
            warn!(volume = %ctx.volume, block = %ctx.block, addr, error = %err, "peer unreachable");
            HostOutcome {
                addr: addr.clone(),
                exit: -1,
                out: format!("failed to {} {addr}: {err}", call.describe()),
            }
        }
        Err(err) => {
            warn!(volume = %ctx.volume, block = %ctx.block, addr, error = %err, "rpc failed after send");
            let _ = ctx.append_status(&addr, &[call.on_fail()]).await;
            HostOutcome {
                addr: addr.clone(),
                exit: -1,
                out: format!("failed to {} {addr}: {err}", call.describe()),
            }
        }
    }
}

pub(crate) fn spawn_worker(
    ctx: &FanoutCtx,
    addr: &str,
    call: PeerCall,
) -> JoinHandle<HostOutcome> {
    let ctx = ctx.clone();
    let addr = addr.to_string();
    tokio::spawn(run_worker(ctx, addr, call))
}

pub(crate) async fn join_worker(addr: &str, handle: JoinHandle<HostOutcome>) -> HostOutcome {
    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => HostOutcome {
            addr: addr.to_string(),
            exit: -1,
            out: format!("worker for {addr} aborted: {e}"),
        },
    }
}

/// Fan one call out to every target and join all workers, in order. There is
/// no mid-flight cancellation: even after a failure every sibling is joined
/// so the metadata reflects each host's true outcome.
pub(crate) async fn run_on(
    ctx: &FanoutCtx,
    targets: &[String],
    make_call: impl Fn(&str) -> PeerCall,
) -> Vec<HostOutcome> {
    let handles: Vec<(String, JoinHandle<HostOutcome>)> = targets
        .iter()
        .map(|addr| (addr.clone(), spawn_worker(ctx, addr, make_call(addr))))
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (addr, handle) in handles {
        outcomes.push(join_worker(&addr, handle).await);
    }
    outcomes
}

/// Split outcomes into the `attempted` (failed) and `succeeded` address
/// sets the responses report.
pub fn collect_attempt_success(outcomes: &[HostOutcome]) -> (Vec<String>, Vec<String>) {
    let mut attempted = Vec::new();
    let mut succeeded = Vec::new();
    for outcome in outcomes {
        if outcome.exit != 0 {
            attempted.push(outcome.addr.clone());
        } else {
            succeeded.push(outcome.addr.clone());
        }
    }
    (attempted, succeeded)
}

pub fn any_failed(outcomes: &[HostOutcome]) -> bool {
    outcomes.iter().any(|o| o.exit != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockplane_meta::InMemoryMetaStore;
    use blockplane_peer::LocalPeers;

    fn ctx(peers: Arc<LocalPeers>, store: Arc<InMemoryMetaStore>) -> FanoutCtx {
        FanoutCtx {
            store,
            peers,
            volume: "v1".to_string(),
            block: "b1".to_string(),
        }
    }

    fn create_call(hosts: &[&str], auth: bool) -> PeerCall {
        PeerCall::Create(CreateRequest {
            volume: "v1".into(),
            block_name: "b1".into(),
            gbid: "5f4dcc3b-aa12-4b1e-9a2f-000000000001".into(),
            size: 1 << 20,
            ipaddr: String::new(),
            block_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            auth_mode: auth,
            passwd: if auth { "secret".into() } else { String::new() },
        })
    }

    async fn seed_header(store: &InMemoryMetaStore) {
        store
            .append(
                "v1",
                "b1",
                &[
                    "VOLUME: v1".into(),
                    "GBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001".into(),
                    "HA: 2".into(),
                ],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn successful_fanout_writes_pre_and_post_lines() {
        let peers = Arc::new(LocalPeers::new());
        peers.add_node("h1");
        peers.add_node("h2");
        let store = Arc::new(InMemoryMetaStore::new());
        seed_header(&store).await;

        let ctx = ctx(peers, store.clone());
        let targets = vec!["h1".to_string(), "h2".to_string()];
        let outcomes = run_on(&ctx, &targets, |_| create_call(&["h1", "h2"], false)).await;

        assert!(!any_failed(&outcomes));
        let log = store.raw_log("v1", "b1").unwrap();
        for host in ["h1", "h2"] {
            let pre = log.find(&format!("{host}: CONFIGINPROGRESS")).unwrap();
            let post = log.find(&format!("{host}: CONFIGSUCCESS")).unwrap();
            assert!(pre < post, "pre line must precede post line for {host}");
        }
    }

    #[tokio::test]
    async fn auth_create_appends_enforced_after_success() {
        let peers = Arc::new(LocalPeers::new());
        peers.add_node("h1");
        let store = Arc::new(InMemoryMetaStore::new());
        seed_header(&store).await;

        let ctx = ctx(peers, store.clone());
        run_on(&ctx, &["h1".to_string()], |_| create_call(&["h1"], true)).await;

        let info = store.read_meta("v1", "b1").await.unwrap();
        assert_eq!(info.status_of("h1"), Some(HostStatus::AuthEnforced));
    }

    #[tokio::test]
    async fn unreachable_host_keeps_in_progress_status() {
        let peers = Arc::new(LocalPeers::new());
        peers.add_node("h1");
        peers.add_node("h2");
        peers.set_down("h2", true);
        let store = Arc::new(InMemoryMetaStore::new());
        seed_header(&store).await;

        let ctx = ctx(peers, store.clone());
        let targets = vec!["h1".to_string(), "h2".to_string()];
        let outcomes = run_on(&ctx, &targets, |_| create_call(&["h1", "h2"], false)).await;

        let (attempted, succeeded) = collect_attempt_success(&outcomes);
        assert_eq!(attempted, vec!["h2"]);
        assert_eq!(succeeded, vec!["h1"]);

        let info = store.read_meta("v1", "b1").await.unwrap();
        // The request never reached h2, so no terminal line was written.
        assert_eq!(info.status_of("h2"), Some(HostStatus::ConfigInProgress));
    }

    #[tokio::test]
    async fn slow_host_gets_terminal_fail_line() {
        let peers = Arc::new(LocalPeers::new());
        peers.add_node("h1");
        peers.set_slow("h1", true);
        let store = Arc::new(InMemoryMetaStore::new());
        seed_header(&store).await;

        let ctx = ctx(peers, store.clone());
        let outcomes = run_on(&ctx, &["h1".to_string()], |_| create_call(&["h1"], false)).await;

        assert!(any_failed(&outcomes));
        let info = store.read_meta("v1", "b1").await.unwrap();
        // Timed out after send: the post-fail line is written.
        assert_eq!(info.status_of("h1"), Some(HostStatus::ConfigFail));
    }
}
