use blockplane_domain::{
    validate_block_name, validate_volume_name, BlockReply, DeleteCliRequest,
};
use blockplane_meta::MetaStore;
use blockplane_peer::PeerClient;
use tracing::{info, warn};

use crate::caps;
use crate::cleanup::{cleanup, delete_targets, DeleteAcc};
use crate::error::EngineError;
use crate::ops::Engine;
use crate::response::{engine_error_reply, DeleteSummary, Op};

pub(crate) async fn run(engine: &Engine, req: DeleteCliRequest) -> BlockReply {
    info!(
        volume = %req.volume,
        block = %req.block_name,
        force = req.force,
        unlink = req.unlink,
        "delete cli request"
    );
    match run_inner(engine, &req).await {
        Ok(reply) => reply,
        Err(err) => engine_error_reply(Op::Delete, req.json_resp, &err),
    }
}

async fn run_inner(engine: &Engine, req: &DeleteCliRequest) -> Result<BlockReply, EngineError> {
    validate_volume_name(&req.volume)?;
    validate_block_name(&req.block_name)?;
    engine.store.open_volume(&req.volume).await?;
    let lock = engine.store.lock(&req.volume).await?;

    if !engine.store.exists(&req.volume, &req.block_name).await? {
        return Err(EngineError::NotFound {
            volume: req.volume.clone(),
            block: req.block_name.clone(),
        });
    }
    let info = engine.store.read_meta(&req.volume, &req.block_name).await?;

    if !req.force {
        // Refuse to start while any node that must participate is dark: a
        // half-deleted block is worse than a busy one.
        let candidates = delete_targets(&info, true);
        let (reachable, unreachable) = probe_all(engine, &candidates).await;
        if !unreachable.is_empty() {
            return Err(EngineError::NodesDown {
                block: req.block_name.clone(),
                reachable,
                unreachable,
            });
        }
    }

    // Force is an operator override for half-dead clusters; negotiating
    // with nodes that may be gone would defeat it.
    if !req.force {
        let valid: Vec<String> = info
            .exported_hosts()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        caps::verify(&engine.peers, &valid, &caps::min_caps_delete(req)).await?;
    }

    let ctx = engine.ctx(&req.volume, &req.block_name);
    let mut acc = DeleteAcc::default();
    let err_code = match cleanup(&ctx, true, req.force, req.unlink, &mut acc).await {
        Ok(()) => 0,
        Err(e) => {
            warn!(volume = %req.volume, block = %req.block_name, error = %e, "cleanup failed");
            e.err_code()
        }
    };

    drop(lock);

    Ok(DeleteSummary {
        attempted: acc.attempted,
        succeeded: acc.succeeded,
        err_code,
    }
    .into_reply(req.json_resp))
}

async fn probe_all(engine: &Engine, addrs: &[String]) -> (Vec<String>, Vec<String>) {
    let mut handles = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let peers = engine.peers.clone();
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            let reachable = peers.probe(&addr).await.is_ok();
            (addr, reachable)
        }));
    }

    let mut reachable = Vec::new();
    let mut unreachable = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((addr, true)) => reachable.push(addr),
            Ok((addr, false)) => unreachable.push(addr),
            Err(e) => warn!(error = %e, "probe worker aborted"),
        }
    }
    (reachable, unreachable)
}
