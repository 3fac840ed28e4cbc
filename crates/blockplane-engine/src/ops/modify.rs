use blockplane_domain::{
    codes, generate_password, validate_block_name, validate_volume_name, BlockReply,
    HostStatus, ModifyCliRequest, ModifyRequest, IQN_PREFIX,
};
use blockplane_meta::{MetaInfo, MetaStore};
use tracing::{info, warn};

use crate::caps;
use crate::error::EngineError;
use crate::fanout::{any_failed, collect_attempt_success, run_on, PeerCall};
use crate::ops::Engine;
use crate::response::{engine_error_reply, ModifySummary, Op};

pub(crate) async fn run(engine: &Engine, req: ModifyCliRequest) -> BlockReply {
    info!(
        volume = %req.volume,
        block = %req.block_name,
        auth = req.auth_mode,
        "modify cli request"
    );
    match run_inner(engine, &req).await {
        Ok(reply) => reply,
        Err(err) => engine_error_reply(Op::Modify, req.json_resp, &err),
    }
}

/// Which hosts an auth toggle must visit, by current status.
///
/// Hosts already in the desired terminal state are skipped; hosts caught
/// mid-toggle (either direction) are always revisited so an interrupted
/// modify can be re-driven to a terminal state.
fn modify_targets(info: &MetaInfo, enabling: bool) -> Vec<String> {
    info.hosts
        .iter()
        .filter(|h| match h.status {
            HostStatus::ConfigSuccess
            | HostStatus::AuthEnforceFail
            | HostStatus::AuthClearEnforced
            | HostStatus::RpSuccess
            | HostStatus::RpFail
            | HostStatus::RpInProgress => enabling,
            HostStatus::AuthEnforced => !enabling,
            HostStatus::AuthEnforcing
            | HostStatus::AuthClearEnforcing
            | HostStatus::AuthClearEnforceFail => true,
            _ => false,
        })
        .map(|h| h.addr.clone())
        .collect()
}

async fn run_inner(engine: &Engine, req: &ModifyCliRequest) -> Result<BlockReply, EngineError> {
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

    let valid: Vec<String> = info
        .exported_hosts()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    caps::verify(&engine.peers, &valid, &caps::min_caps_modify(req)).await?;

    let mut mobj = ModifyRequest {
        volume: req.volume.clone(),
        block_name: req.block_name.clone(),
        gbid: info.gbid.clone(),
        auth_mode: req.auth_mode,
        passwd: String::new(),
    };

    if req.auth_mode {
        if info.passwd.is_empty() {
            let passwd = generate_password();
            engine
                .store
                .append(&req.volume, &req.block_name, &[format!("PASSWORD: {passwd}")])
                .await?;
            mobj.passwd = passwd;
        } else {
            mobj.passwd = info.passwd.clone();
        }
    } else {
        // Clearing auth clears the recorded secret first.
        engine
            .store
            .append(&req.volume, &req.block_name, &["PASSWORD: ".to_string()])
            .await?;
    }

    let ctx = engine.ctx(&req.volume, &req.block_name);
    let targets = modify_targets(&info, req.auth_mode);
    let outcomes = run_on(&ctx, &targets, |_| PeerCall::Modify(mobj.clone())).await;
    let (attempted, succeeded) = collect_attempt_success(&outcomes);

    let mut err_code = 0;
    let mut rolled_back = false;
    let mut rb_attempted = Vec::new();
    let mut rb_succeeded = Vec::new();

    if any_failed(&outcomes) {
        err_code = codes::DEFAULT_ERR;
        warn!(
            volume = %req.volume,
            block = %req.block_name,
            auth = req.auth_mode,
            "modify failed on some hosts, rolling the toggle back"
        );

        // Unwind the secret we just recorded, then drive every touched host
        // back to the previous mode. Rollback failures are reported but not
        // re-rolled.
        if req.auth_mode {
            engine
                .store
                .append(&req.volume, &req.block_name, &["PASSWORD: ".to_string()])
                .await?;
        }

        let fresh = engine.store.read_meta(&req.volume, &req.block_name).await?;
        mobj.auth_mode = !mobj.auth_mode;
        rolled_back = true;

        let rb_targets = modify_targets(&fresh, mobj.auth_mode);
        let rb_outcomes = run_on(&ctx, &rb_targets, |_| PeerCall::Modify(mobj.clone())).await;
        let (a, s) = collect_attempt_success(&rb_outcomes);
        rb_attempted = a;
        rb_succeeded = s;
    }

    drop(lock);

    let (username, password) = if err_code == 0 && req.auth_mode {
        (Some(info.gbid.clone()), Some(mobj.passwd.clone()))
    } else {
        (None, None)
    };

    Ok(ModifySummary {
        iqn: format!("{IQN_PREFIX}{}", info.gbid),
        username,
        password,
        attempted,
        succeeded,
        rb_attempted,
        rb_succeeded,
        rolled_back,
        err_code,
    }
    .into_reply(req.json_resp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_from(lines: &str) -> MetaInfo {
        let text = format!(
            "VOLUME: v1\nGBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001\nHA: 3\n{lines}"
        );
        MetaInfo::parse("b1", &text).unwrap()
    }

    #[test]
    fn enabling_targets_unenforced_hosts() {
        let info = info_from("h1: CONFIGSUCCESS\nh2: AUTHENFORCED\nh3: AUTHENFORCEFAIL\n");
        assert_eq!(modify_targets(&info, true), vec!["h1", "h3"]);
    }

    #[test]
    fn disabling_targets_enforced_hosts() {
        let info = info_from("h1: CONFIGSUCCESS\nh2: AUTHENFORCED\nh3: AUTHCLEARENFORCED\n");
        assert_eq!(modify_targets(&info, false), vec!["h2"]);
    }

    #[test]
    fn in_flight_hosts_are_always_revisited() {
        let info = info_from("h1: AUTHENFORCEING\nh2: AUTHCLEARENFORCEING\nh3: AUTHCLEARENFORCEFAIL\n");
        assert_eq!(modify_targets(&info, true), vec!["h1", "h2", "h3"]);
        assert_eq!(modify_targets(&info, false), vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn cleaned_up_hosts_are_never_touched() {
        let info = info_from("h1: CLEANUPSUCCESS\nh2: CONFIGFAIL\n");
        assert!(modify_targets(&info, true).is_empty());
        assert!(modify_targets(&info, false).is_empty());
    }
}
