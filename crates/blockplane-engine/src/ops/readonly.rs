use blockplane_domain::{
    validate_block_name, validate_volume_name, BlockReply, InfoCliRequest, ListCliRequest,
};
use blockplane_meta::{MetaError, MetaStore};
use tracing::debug;

use crate::error::EngineError;
use crate::ops::Engine;
use crate::response::{engine_error_reply, InfoSummary, ListSummary, Op};

pub(crate) async fn list(engine: &Engine, req: ListCliRequest) -> BlockReply {
    debug!(volume = %req.volume, "list cli request");
    match list_inner(engine, &req).await {
        Ok(reply) => reply,
        Err(err) => engine_error_reply(Op::List, req.json_resp, &err),
    }
}

async fn list_inner(engine: &Engine, req: &ListCliRequest) -> Result<BlockReply, EngineError> {
    validate_volume_name(&req.volume)?;
    engine.store.open_volume(&req.volume).await?;
    let lock = engine.store.lock(&req.volume).await?;
    let blocks = engine.store.list_blocks(&req.volume).await?;
    drop(lock);
    Ok(ListSummary { blocks }.into_reply(req.json_resp))
}

pub(crate) async fn info(engine: &Engine, req: InfoCliRequest) -> BlockReply {
    debug!(volume = %req.volume, block = %req.block_name, "info cli request");
    match info_inner(engine, &req).await {
        Ok(reply) => reply,
        Err(err) => engine_error_reply(Op::Info, req.json_resp, &err),
    }
}

async fn info_inner(engine: &Engine, req: &InfoCliRequest) -> Result<BlockReply, EngineError> {
    validate_volume_name(&req.volume)?;
    validate_block_name(&req.block_name)?;
    engine.store.open_volume(&req.volume).await?;
    let lock = engine.store.lock(&req.volume).await?;
    let info = engine
        .store
        .read_meta(&req.volume, &req.block_name)
        .await
        .map_err(|e| match e {
            MetaError::NotFound(_) => EngineError::NotFound {
                volume: req.volume.clone(),
                block: req.block_name.clone(),
            },
            other => other.into(),
        })?;
    drop(lock);

    Ok(InfoSummary {
        name: req.block_name.clone(),
        volume: info.volume.clone(),
        gbid: info.gbid.clone(),
        size: info.size,
        mpath: info.mpath,
        passwd: info.passwd.clone(),
        exported: info.exported_hosts().into_iter().map(|s| s.to_string()).collect(),
    }
    .into_reply(req.json_resp))
}
