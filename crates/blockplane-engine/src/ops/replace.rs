use blockplane_domain::{
    validate_block_name, validate_volume_name, BlockReply, CreateRequest, DeleteRequest,
    HostStatus, ReplaceCliRequest, ReplaceRequest,
};
use blockplane_meta::info::host_line;
use blockplane_meta::MetaStore;
use tracing::{info, warn};

use crate::caps;
use crate::error::EngineError;
use crate::fanout::{collect_attempt_success, join_worker, spawn_worker, PeerCall};
use crate::ops::Engine;
use crate::response::{engine_error_reply, Op, ReplaceSummary, SubOp};

pub(crate) async fn run(engine: &Engine, req: ReplaceCliRequest) -> BlockReply {
    info!(
        volume = %req.volume,
        block = %req.block_name,
        old = %req.old_node,
        new = %req.new_node,
        force = req.force,
        "replace cli request"
    );
    match run_inner(engine, &req).await {
        Ok(reply) => reply,
        Err(err) => engine_error_reply(Op::Replace, req.json_resp, &err),
    }
}

async fn run_inner(engine: &Engine, req: &ReplaceCliRequest) -> Result<BlockReply, EngineError> {
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

    // Under force the old node may be dead; don't let its daemon veto the
    // capability check.
    let mut valid: Vec<String> = info
        .exported_hosts()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    if req.force {
        valid.retain(|h| h != &req.old_node);
    }
    caps::verify(&engine.peers, &valid, &caps::min_caps_replace(req)).await?;

    // ── Skip-if-already-done guards, from fresh metadata ──────────────────

    let Some(old_status) = info.status_of(&req.old_node) else {
        warn!(
            volume = %req.volume,
            block = %req.block_name,
            node = %req.old_node,
            "replace: old node not in metadata"
        );
        return Err(EngineError::NodeNotExist {
            block: req.block_name.clone(),
            node: req.old_node.clone(),
            volume: req.volume.clone(),
        });
    };
    // Old node already torn down: a previous replace got that far.
    let d_skip = old_status == HostStatus::CleanupSuccess;

    let mut c_skip = false;
    let mut new_in_use = false;
    if let Some(status) = info.status_of(&req.new_node) {
        if status.is_exported() {
            new_in_use = true;
            if matches!(status, HostStatus::ConfigSuccess | HostStatus::AuthEnforced) {
                c_skip = true;
            }
        }
    }
    if new_in_use && !c_skip {
        return Err(node_in_use(req));
    }

    let remaining: Vec<String> = info
        .hosts
        .iter()
        .filter(|h| {
            h.status.is_exported() && h.addr != req.old_node && h.addr != req.new_node
        })
        .map(|h| h.addr.clone())
        .collect();

    // New node configured, but the portal group shows no trace of an
    // in-flight replace: it was claimed by some other prior action, not an
    // interrupted run of this command. An interrupted replace leaves all
    // mpath-1 surviving hosts in an RP state; fewer survivors, or survivors
    // without one, mean the new node is genuinely taken. This check outranks
    // anything the fan-out might report.
    let rp_touched = remaining.len() >= (info.mpath as usize).saturating_sub(1)
        && remaining.iter().all(|addr| {
            matches!(
                info.status_of(addr),
                Some(HostStatus::RpSuccess | HostStatus::RpInProgress | HostStatus::RpFail)
            )
        });
    if c_skip && !rp_touched {
        return Err(node_in_use(req));
    }

    let r_skip = remaining
        .iter()
        .all(|addr| info.status_of(addr) == Some(HostStatus::RpSuccess));

    if c_skip && d_skip && r_skip {
        // Idempotent re-run of a fully successful replace.
        info!(
            volume = %req.volume,
            block = %req.block_name,
            "replace already complete, skipping"
        );
        drop(lock);
        let replace_sub = if remaining.is_empty() {
            SubOp::NotApplicable
        } else {
            SubOp::Skipped { hosts: remaining }
        };
        return Ok(ReplaceSummary {
            name: req.block_name.clone(),
            all_skipped: true,
            force: req.force,
            create: SubOp::Skipped { hosts: vec![req.new_node.clone()] },
            delete: SubOp::Skipped { hosts: vec![req.old_node.clone()] },
            replace: replace_sub,
        }
        .into_reply(req.json_resp));
    }

    // ── Concurrent execution of the non-skipped sub-ops ───────────────────

    let mut block_hosts = vec![req.new_node.clone()];
    block_hosts.extend(remaining.iter().cloned());
    let cobj = CreateRequest {
        volume: req.volume.clone(),
        block_name: req.block_name.clone(),
        gbid: info.gbid.clone(),
        size: info.size,
        ipaddr: req.new_node.clone(),
        block_hosts,
        auth_mode: !info.passwd.is_empty(),
        passwd: info.passwd.clone(),
    };
    let robj = ReplaceRequest {
        volume: req.volume.clone(),
        block_name: req.block_name.clone(),
        gbid: info.gbid.clone(),
        ipaddr: req.new_node.clone(),
        ripaddr: req.old_node.clone(),
    };
    let dobj = DeleteRequest {
        block_name: req.block_name.clone(),
        gbid: info.gbid.clone(),
    };

    let ctx = engine.ctx(&req.volume, &req.block_name);
    let c_handle =
        (!c_skip).then(|| spawn_worker(&ctx, &req.new_node, PeerCall::Create(cobj)));
    let r_handles: Vec<_> = if r_skip {
        Vec::new()
    } else {
        remaining
            .iter()
            .map(|addr| {
                (
                    addr.clone(),
                    spawn_worker(&ctx, addr, PeerCall::ReplacePortal(robj.clone())),
                )
            })
            .collect()
    };
    let d_handle =
        (!d_skip).then(|| spawn_worker(&ctx, &req.old_node, PeerCall::Delete(dobj)));

    let create_sub = match c_handle {
        None => SubOp::Skipped { hosts: vec![req.new_node.clone()] },
        Some(handle) => {
            let outcome = join_worker(&req.new_node, handle).await;
            let (attempted, succeeded) = collect_attempt_success(std::slice::from_ref(&outcome));
            SubOp::Done { attempted, succeeded }
        }
    };

    let replace_sub = if remaining.is_empty() {
        SubOp::NotApplicable
    } else if r_skip {
        SubOp::Skipped { hosts: remaining.clone() }
    } else {
        let mut outcomes = Vec::with_capacity(r_handles.len());
        for (addr, handle) in r_handles {
            outcomes.push(join_worker(&addr, handle).await);
        }
        let (attempted, succeeded) = collect_attempt_success(&outcomes);
        SubOp::Done { attempted, succeeded }
    };

    let delete_sub = match d_handle {
        None => SubOp::Skipped { hosts: vec![req.old_node.clone()] },
        Some(handle) => {
            let outcome = join_worker(&req.old_node, handle).await;
            let (attempted, succeeded) = collect_attempt_success(std::slice::from_ref(&outcome));
            SubOp::Done { attempted, succeeded }
        }
    };

    // Force writes the old node off even when its teardown failed; the next
    // replace must not be blocked by a node that is already gone.
    if req.force {
        if let SubOp::Done { attempted, .. } = &delete_sub {
            if !attempted.is_empty() {
                engine
                    .store
                    .append(
                        &req.volume,
                        &req.block_name,
                        &[host_line(&req.old_node, HostStatus::CleanupSuccess)],
                    )
                    .await?;
            }
        }
    }

    drop(lock);

    Ok(ReplaceSummary {
        name: req.block_name.clone(),
        all_skipped: false,
        force: req.force,
        create: create_sub,
        delete: delete_sub,
        replace: replace_sub,
    }
    .into_reply(req.json_resp))
}

fn node_in_use(req: &ReplaceCliRequest) -> EngineError {
    EngineError::NodeInUse {
        block: req.block_name.clone(),
        node: req.new_node.clone(),
        volume: req.volume.clone(),
    }
}
