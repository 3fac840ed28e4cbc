use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use blockplane_api::build_app;
use blockplane_domain::BlockReply;
use blockplane_meta::{FsMetaStore, MetaStore};
use blockplane_peer::{HttpPeer, LocalBackend, NodeBackend, PeerClient};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::output::parse_size;

// ── Daemon ────────────────────────────────────────────────────────────────────

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = blockplane_config::load_config(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.log_filter.clone())),
        )
        .with_target(false)
        .init();

    let store: Arc<dyn MetaStore> = Arc::new(FsMetaStore::new(&cfg.meta_root));
    let peers: Arc<dyn PeerClient> = Arc::new(HttpPeer::new(
        cfg.peer_port,
        cfg.connect_timeout,
        cfg.request_timeout,
    )?);
    let backend: Arc<dyn NodeBackend> = Arc::new(LocalBackend::new(&cfg.listen));

    let app = build_app(store, peers, backend);
    let listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;

    info!(listen = %cfg.listen, meta_root = %cfg.meta_root.display(), "blockplane daemon up");
    axum::serve(listener, app).await?;
    Ok(())
}

// ── Operator commands ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub async fn create(
    server: String,
    json_resp: bool,
    volume: String,
    block: String,
    hosts: String,
    mpath: u32,
    size: String,
    auth: bool,
    prealloc: bool,
) -> Result<()> {
    let size = parse_size(&size).map_err(|e| anyhow!(e))?;
    let body = json!({
        "volume": volume,
        "block_name": block,
        "block_hosts": hosts,
        "mpath": mpath,
        "size": size,
        "auth_mode": auth,
        "prealloc": prealloc,
        "json_resp": json_resp,
    });
    send(&server, "create", body).await
}

pub async fn delete(
    server: String,
    json_resp: bool,
    volume: String,
    block: String,
    keep_backing: bool,
    force: bool,
) -> Result<()> {
    let body = json!({
        "volume": volume,
        "block_name": block,
        "unlink": !keep_backing,
        "force": force,
        "json_resp": json_resp,
    });
    send(&server, "delete", body).await
}

pub async fn modify(
    server: String,
    json_resp: bool,
    volume: String,
    block: String,
    auth: bool,
) -> Result<()> {
    let body = json!({
        "volume": volume,
        "block_name": block,
        "auth_mode": auth,
        "json_resp": json_resp,
    });
    send(&server, "modify", body).await
}

pub async fn replace(
    server: String,
    json_resp: bool,
    volume: String,
    block: String,
    old_node: String,
    new_node: String,
    force: bool,
) -> Result<()> {
    let body = json!({
        "volume": volume,
        "block_name": block,
        "old_node": old_node,
        "new_node": new_node,
        "force": force,
        "json_resp": json_resp,
    });
    send(&server, "replace", body).await
}

pub async fn list(server: String, json_resp: bool, volume: String) -> Result<()> {
    send(&server, "list", json!({ "volume": volume, "json_resp": json_resp })).await
}

pub async fn info(server: String, json_resp: bool, volume: String, block: String) -> Result<()> {
    let body = json!({
        "volume": volume,
        "block_name": block,
        "json_resp": json_resp,
    });
    send(&server, "info", body).await
}

/// POST one operator procedure and mirror the daemon's reply: its output on
/// stdout, its exit code as ours.
async fn send(server: &str, procedure: &str, body: Value) -> Result<()> {
    let reply: BlockReply = reqwest::Client::new()
        .post(format!("{server}/cli/{procedure}"))
        .json(&body)
        .send()
        .await
        .with_context(|| format!("sending {procedure} to {server}"))?
        .json()
        .await
        .context("decoding daemon reply")?;

    print!("{}", reply.out);
    if reply.exit != 0 {
        std::process::exit(reply.exit);
    }
    Ok(())
}
