use blockplane_domain::{
    codes, generate_password, validate_block_name, validate_volume_name, BlockReply,
    CreateCliRequest, CreateRequest, DomainError, EntryKind, EntryStatus, Gbid, HostStatus,
    ServerList,
};
use blockplane_meta::info::entry_line;
use blockplane_meta::{MetaError, MetaStore};
use tracing::{info, warn};

use crate::caps;
use crate::cleanup::{cleanup, DeleteAcc};
use crate::error::EngineError;
use crate::fanout::{run_on, FanoutCtx, HostOutcome, PeerCall};
use crate::ops::Engine;
use crate::response::{
    engine_error_reply, error_reply, CreateSummary, Op, DEFAULT_ERR_MSG,
};

pub(crate) async fn run(engine: &Engine, req: CreateCliRequest) -> BlockReply {
    info!(
        volume = %req.volume,
        block = %req.block_name,
        mpath = req.mpath,
        hosts = %req.block_hosts,
        auth = req.auth_mode,
        size = req.size,
        "create cli request"
    );
    match run_inner(engine, &req).await {
        Ok(reply) => reply,
        Err(err) => engine_error_reply(Op::Create, req.json_resp, &err),
    }
}

async fn run_inner(engine: &Engine, req: &CreateCliRequest) -> Result<BlockReply, EngineError> {
    validate_volume_name(&req.volume)?;
    validate_block_name(&req.block_name)?;
    let list = ServerList::parse(&req.block_hosts)?;
    if req.mpath == 0 {
        return Err(DomainError::InvalidMpath(req.mpath).into());
    }
    if req.mpath as usize > list.len() {
        return Err(EngineError::InsufficientHosts {
            mpath: req.mpath,
            hosts: req.block_hosts.clone(),
        });
    }

    caps::verify(&engine.peers, list.hosts(), &caps::min_caps_create(req)).await?;

    engine.store.open_volume(&req.volume).await?;
    let lock = engine.store.lock(&req.volume).await?;

    if engine.store.exists(&req.volume, &req.block_name).await? {
        return Err(EngineError::AlreadyExists { block: req.block_name.clone() });
    }

    let gbid = Gbid::generate();
    engine
        .store
        .append(
            &req.volume,
            &req.block_name,
            &[
                format!("VOLUME: {}", req.volume),
                format!("GBID: {gbid}"),
                format!("HA: {}", req.mpath),
                entry_line(EntryKind::Create, EntryStatus::InProgress),
            ],
        )
        .await?;

    if let Err(e) = engine
        .store
        .create_backing(&req.volume, gbid.as_str(), req.size, req.prealloc)
        .await
    {
        // The header stays at ENTRYCREATE: INPROGRESS; a later delete picks
        // the remains up. No node was touched, so nothing to roll back.
        warn!(volume = %req.volume, block = %req.block_name, error = %e, "backing file creation failed");
        return Err(EngineError::EntryCreateFail {
            block: req.block_name.clone(),
            reason: e.to_string(),
        });
    }

    engine
        .store
        .append(
            &req.volume,
            &req.block_name,
            &[
                format!("SIZE: {}", req.size),
                entry_line(EntryKind::Create, EntryStatus::Success),
            ],
        )
        .await?;

    let passwd = if req.auth_mode {
        let passwd = generate_password();
        engine
            .store
            .append(&req.volume, &req.block_name, &[format!("PASSWORD: {passwd}")])
            .await?;
        passwd
    } else {
        String::new()
    };

    let cobj = CreateRequest {
        volume: req.volume.clone(),
        block_name: req.block_name.clone(),
        gbid: gbid.to_string(),
        size: req.size,
        ipaddr: String::new(),
        block_hosts: list.hosts().to_vec(),
        auth_mode: req.auth_mode,
        passwd: passwd.clone(),
    };

    let ctx = engine.ctx(&req.volume, &req.block_name);
    let mut resp = RemoteCreateResp::default();
    let first = run_on(&ctx, &list.hosts()[..req.mpath as usize], |_| {
        PeerCall::Create(cobj.clone())
    })
    .await;
    resp.absorb(&first);

    let mut acc = DeleteAcc::default();
    let err_code = audit(&ctx, req, &cobj, &list, &mut resp, &mut acc).await;

    drop(lock);

    Ok(render(engine, req, &gbid, &passwd, err_code, resp, acc).await)
}

// ── Audit loop ────────────────────────────────────────────────────────────────

/// Recount fresh metadata and repair a partially failed create: retry on
/// spare hosts while any remain, roll the whole create back when they run
/// out. Bounded by the candidate list length, which shrinks the spare pool
/// every round.
async fn audit(
    ctx: &FanoutCtx,
    req: &CreateCliRequest,
    cobj: &CreateRequest,
    list: &ServerList,
    resp: &mut RemoteCreateResp,
    acc: &mut DeleteAcc,
) -> i32 {
    for _ in 0..=list.len() {
        let info = match ctx.store.read_meta(&ctx.volume, &ctx.block).await {
            Ok(info) => info,
            Err(e) => {
                warn!(volume = %ctx.volume, block = %ctx.block, error = %e, "audit re-read failed");
                return codes::DEFAULT_ERR;
            }
        };

        let success_cnt = info.count_with(|s| {
            matches!(s, HostStatus::ConfigSuccess | HostStatus::AuthEnforced)
        });
        let fail_cnt = info.count_with(|s| {
            matches!(s, HostStatus::ConfigInProgress | HostStatus::ConfigFail)
        });

        if success_cnt == req.mpath as usize {
            info!(
                volume = %ctx.volume,
                block = %ctx.block,
                "create request satisfied with given hosts"
            );
            return 0;
        }

        let spent = success_cnt + fail_cnt;
        let spare = list.len() - spent;
        let need = req.mpath as usize - success_cnt;

        if spare == 0 || spare < need {
            warn!(
                volume = %ctx.volume,
                block = %ctx.block,
                spare,
                need,
                "not enough spare nodes, rolling creation back"
            );
            if let Err(e) = cleanup(ctx, true, false, true, acc).await {
                warn!(volume = %ctx.volume, block = %ctx.block, error = %e, "rollback cleanup incomplete");
            }
            return codes::DEFAULT_ERR;
        }

        info!(
            volume = %ctx.volume,
            block = %ctx.block,
            need,
            "retrying create on spare nodes"
        );
        let retry = run_on(ctx, &list.hosts()[spent..spent + need], |_| {
            PeerCall::Create(cobj.clone())
        })
        .await;
        resp.absorb(&retry);
    }

    // Unreachable in practice: each round either returns or consumes spares.
    codes::DEFAULT_ERR
}

// ── Remote output parsing ─────────────────────────────────────────────────────

/// Fields scraped from the per-node configure output: the IQN (identical on
/// every node), the union of advertised portals, and any failure lines worth
/// echoing back to the operator.
#[derive(Debug, Default)]
struct RemoteCreateResp {
    iqn: Option<String>,
    portals: Vec<String>,
    err_msgs: Vec<String>,
}

impl RemoteCreateResp {
    fn absorb(&mut self, outcomes: &[HostOutcome]) {
        for outcome in outcomes {
            for line in outcome.out.lines() {
                if line.starts_with("IQN:") {
                    if self.iqn.is_none() {
                        self.iqn = last_word(line);
                    }
                } else if line.starts_with("PORTAL:") {
                    if let Some(portal) = last_word(line) {
                        if !self.portals.contains(&portal) {
                            self.portals.push(portal);
                        }
                    }
                } else if line.starts_with("failed") {
                    self.err_msgs.push(line.to_string());
                }
            }
        }
    }
}

fn last_word(line: &str) -> Option<String> {
    line.split_whitespace()
        .last()
        .map(|w| w.trim_end_matches('.').to_string())
}

// ── Response assembly ─────────────────────────────────────────────────────────

async fn render(
    engine: &Engine,
    req: &CreateCliRequest,
    gbid: &Gbid,
    passwd: &str,
    err_code: i32,
    resp: RemoteCreateResp,
    acc: DeleteAcc,
) -> BlockReply {
    match engine.store.read_meta(&req.volume, &req.block_name).await {
        Err(MetaError::NotFound(_)) => {
            // Rollback removed the entry; report the collected remote errors.
            let msg = if resp.err_msgs.is_empty() {
                DEFAULT_ERR_MSG.to_string()
            } else {
                resp.err_msgs.join("\n")
            };
            error_reply(Op::Create, req.json_resp, err_code, &msg)
        }
        Err(e) => engine_error_reply(Op::Create, req.json_resp, &EngineError::from(e)),
        Ok(info) => {
            let mut rollback: Vec<String> = Vec::new();
            for addr in acc.attempted.iter().chain(acc.succeeded.iter()) {
                if !rollback.contains(addr) {
                    rollback.push(addr.clone());
                }
            }
            // Hosts left in CONFIGINPROGRESS or CONFIGFAIL still owe a
            // cleanup; report them alongside the rolled-back ones.
            for host in &info.hosts {
                let owes_cleanup = matches!(
                    host.status,
                    HostStatus::ConfigInProgress | HostStatus::ConfigFail
                );
                if owes_cleanup && !rollback.contains(&host.addr) {
                    rollback.push(host.addr.clone());
                }
            }

            let (username, password) = if req.auth_mode && resp.iqn.is_some() {
                (Some(gbid.to_string()), Some(passwd.to_string()))
            } else {
                (None, None)
            };

            CreateSummary {
                iqn: resp.iqn,
                username,
                password,
                portals: resp.portals,
                rollback,
                err_code,
            }
            .into_reply(req.json_resp)
        }
    }
}
