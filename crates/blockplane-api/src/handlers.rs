use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use blockplane_domain::{
    BlockReply, CreateCliRequest, CreateRequest, DeleteCliRequest, DeleteRequest,
    InfoCliRequest, ListCliRequest, ModifyCliRequest, ModifyRequest, PeerReply,
    ReplaceCliRequest, ReplaceRequest,
};
use blockplane_peer::NodeBackend;

use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Operator procedures ───────────────────────────────────────────────────────
//
// Every orchestrator folds its own errors into the reply; these handlers
// never fail, the transport always carries a well-formed BlockReply.

pub async fn create_cli(
    State(state): State<AppState>,
    Json(req): Json<CreateCliRequest>,
) -> Json<BlockReply> {
    Json(state.engine.create_cli(req).await)
}

pub async fn delete_cli(
    State(state): State<AppState>,
    Json(req): Json<DeleteCliRequest>,
) -> Json<BlockReply> {
    Json(state.engine.delete_cli(req).await)
}

pub async fn modify_cli(
    State(state): State<AppState>,
    Json(req): Json<ModifyCliRequest>,
) -> Json<BlockReply> {
    Json(state.engine.modify_cli(req).await)
}

pub async fn replace_cli(
    State(state): State<AppState>,
    Json(req): Json<ReplaceCliRequest>,
) -> Json<BlockReply> {
    Json(state.engine.replace_cli(req).await)
}

pub async fn list_cli(
    State(state): State<AppState>,
    Json(req): Json<ListCliRequest>,
) -> Json<BlockReply> {
    Json(state.engine.list_cli(req).await)
}

pub async fn info_cli(
    State(state): State<AppState>,
    Json(req): Json<InfoCliRequest>,
) -> Json<BlockReply> {
    Json(state.engine.info_cli(req).await)
}

// ── Peer procedures ───────────────────────────────────────────────────────────

pub async fn peer_create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Json<PeerReply> {
    Json(state.backend.configure(&req).await)
}

pub async fn peer_delete(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Json<PeerReply> {
    Json(state.backend.unconfigure(&req).await)
}

pub async fn peer_modify(
    State(state): State<AppState>,
    Json(req): Json<ModifyRequest>,
) -> Json<PeerReply> {
    Json(state.backend.set_auth(&req).await)
}

pub async fn peer_replace(
    State(state): State<AppState>,
    Json(req): Json<ReplaceRequest>,
) -> Json<PeerReply> {
    Json(state.backend.replace_portal(&req).await)
}

pub async fn peer_version(State(state): State<AppState>) -> Json<PeerReply> {
    Json(PeerReply {
        exit: 0,
        out: String::new(),
        caps: Some(state.backend.capabilities()),
    })
}
