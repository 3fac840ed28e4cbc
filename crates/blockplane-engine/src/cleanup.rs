use blockplane_domain::{DeleteRequest, EntryKind, EntryStatus, HostStatus};
use blockplane_meta::info::entry_line;
use blockplane_meta::{MetaInfo, MetaStore};
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::fanout::{any_failed, run_on, FanoutCtx, HostOutcome, PeerCall};

/// Accumulated delete fan-out results across cleanup rounds. Create's audit
/// can trigger several rounds on overlapping host sets, so merging dedups.
#[derive(Debug, Default)]
pub struct DeleteAcc {
    pub attempted: Vec<String>,
    pub succeeded: Vec<String>,
}

impl DeleteAcc {
    pub fn merge(&mut self, outcomes: &[HostOutcome]) {
        for outcome in outcomes {
            let set = if outcome.exit != 0 {
                &mut self.attempted
            } else {
                &mut self.succeeded
            };
            if !set.contains(&outcome.addr) {
                set.push(outcome.addr.clone());
            }
        }
    }
}

/// Which hosts a delete fan-out must visit.
///
/// Hosts still exporting the block are only touched on a full teardown;
/// configure/cleanup residue is always retried. A host stuck in
/// `CONFIGINPROGRESS` is left alone: the request may never have reached it,
/// so there is nothing on the node to undo. Already cleaned-up hosts stay
/// cleaned up.
pub(crate) fn delete_targets(info: &MetaInfo, deleteall: bool) -> Vec<String> {
    info.hosts
        .iter()
        .filter(|h| match h.status {
            s if s.is_exported() => deleteall,
            HostStatus::ConfigFail
            | HostStatus::CleanupInProgress
            | HostStatus::CleanupFail => true,
            HostStatus::ConfigInProgress | HostStatus::CleanupSuccess => false,
            _ => false,
        })
        .map(|h| h.addr.clone())
        .collect()
}

/// Tear a block down: delete fan-out, then (on `deleteall`) the entry-level
/// removal once every host has converged, or unconditionally under
/// `forcedel`, which also masks remote failures in the return.
///
/// Caller holds the volume lock.
pub(crate) async fn cleanup(
    ctx: &FanoutCtx,
    deleteall: bool,
    forcedel: bool,
    unlink: bool,
    acc: &mut DeleteAcc,
) -> Result<(), EngineError> {
    let info = ctx.store.read_meta(&ctx.volume, &ctx.block).await?;
    let dobj = DeleteRequest {
        block_name: ctx.block.clone(),
        gbid: info.gbid.clone(),
    };

    let targets = delete_targets(&info, deleteall);
    let outcomes = run_on(ctx, &targets, |_| PeerCall::Delete(dobj.clone())).await;
    acc.merge(&outcomes);
    let fanout_failed = any_failed(&outcomes);
    if fanout_failed {
        warn!(
            volume = %ctx.volume,
            block = %ctx.block,
            "delete fan-out failed on {} of {} hosts",
            outcomes.iter().filter(|o| o.exit != 0).count(),
            outcomes.len()
        );
    }

    if deleteall {
        // Re-read: the fan-out just rewrote per-host statuses.
        let info = ctx.store.read_meta(&ctx.volume, &ctx.block).await?;
        let converged = info.count_with(|s| {
            matches!(s, HostStatus::ConfigInProgress | HostStatus::CleanupSuccess)
        });

        if forcedel || converged == info.nhosts() {
            ctx.store
                .append(
                    &ctx.volume,
                    &ctx.block,
                    &[entry_line(EntryKind::Delete, EntryStatus::InProgress)],
                )
                .await?;

            if unlink {
                if let Err(e) = ctx.store.delete_backing(&ctx.volume, &info.gbid).await {
                    error!(volume = %ctx.volume, block = %ctx.block, error = %e, "unlink of backing file failed");
                    ctx.store
                        .append(
                            &ctx.volume,
                            &ctx.block,
                            &[entry_line(EntryKind::Delete, EntryStatus::Fail)],
                        )
                        .await?;
                    return Err(e.into());
                }
            }

            ctx.store
                .append(
                    &ctx.volume,
                    &ctx.block,
                    &[entry_line(EntryKind::Delete, EntryStatus::Success)],
                )
                .await?;
            ctx.store.delete_meta(&ctx.volume, &ctx.block).await?;
            info!(volume = %ctx.volume, block = %ctx.block, "block entry deleted");
        }
    }

    if fanout_failed && !forcedel {
        return Err(EngineError::RemoteFailed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockplane_meta::MetaInfo;

    fn info_from(lines: &str) -> MetaInfo {
        let text = format!(
            "VOLUME: v1\nGBID: 5f4dcc3b-aa12-4b1e-9a2f-000000000001\nHA: 3\n{lines}"
        );
        MetaInfo::parse("b1", &text).unwrap()
    }

    #[test]
    fn exported_hosts_only_on_full_teardown() {
        let info = info_from("h1: CONFIGSUCCESS\nh2: AUTHENFORCED\n");
        assert!(delete_targets(&info, false).is_empty());
        assert_eq!(delete_targets(&info, true), vec!["h1", "h2"]);
    }

    #[test]
    fn residue_is_always_retried() {
        let info = info_from("h1: CONFIGFAIL\nh2: CLEANUPFAIL\nh3: CLEANUPINPROGRESS\n");
        assert_eq!(delete_targets(&info, false), vec!["h1", "h2", "h3"]);
    }

    #[test]
    fn untouched_and_cleaned_hosts_are_left_alone() {
        let info = info_from("h1: CONFIGINPROGRESS\nh2: CLEANUPSUCCESS\n");
        assert!(delete_targets(&info, true).is_empty());
    }

    #[test]
    fn acc_merge_dedups_across_rounds() {
        let mut acc = DeleteAcc::default();
        let round = vec![
            HostOutcome { addr: "h1".into(), exit: 0, out: String::new() },
            HostOutcome { addr: "h2".into(), exit: 1, out: String::new() },
        ];
        acc.merge(&round);
        acc.merge(&round);
        assert_eq!(acc.succeeded, vec!["h1"]);
        assert_eq!(acc.attempted, vec!["h2"]);
    }
}
