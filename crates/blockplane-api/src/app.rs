use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use blockplane_engine::Engine;
use blockplane_meta::MetaStore;
use blockplane_peer::{NodeBackend, PeerClient};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_app(
    store: Arc<dyn MetaStore>,
    peers: Arc<dyn PeerClient>,
    backend: Arc<dyn NodeBackend>,
) -> Router {
    let state = AppState {
        engine: Arc::new(Engine::new(store, peers)),
        backend,
    };

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Operator procedures
        .route("/cli/create", post(handlers::create_cli))
        .route("/cli/delete", post(handlers::delete_cli))
        .route("/cli/modify", post(handlers::modify_cli))
        .route("/cli/replace", post(handlers::replace_cli))
        .route("/cli/list", post(handlers::list_cli))
        .route("/cli/info", post(handlers::info_cli))
        // Peer-to-peer procedures served by this node
        .route("/peer/create", post(handlers::peer_create))
        .route("/peer/delete", post(handlers::peer_delete))
        .route("/peer/modify", post(handlers::peer_modify))
        .route("/peer/replace", post(handlers::peer_replace))
        .route("/peer/version", post(handlers::peer_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use blockplane_domain::{BlockReply, PeerReply};
    use blockplane_meta::InMemoryMetaStore;
    use blockplane_peer::{LocalBackend, LocalPeers};
    use tower::util::ServiceExt;

    fn test_app() -> Router {
        let store = Arc::new(InMemoryMetaStore::new());
        let peers = Arc::new(LocalPeers::new());
        peers.add_node("h1");
        let backend = Arc::new(LocalBackend::new("h1"));
        build_app(store, peers, backend)
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_200() {
        let app = test_app();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_info_round_trips() {
        let app = test_app();

        let resp = app
            .clone()
            .oneshot(json_post(
                "/cli/create",
                serde_json::json!({
                    "volume": "v1",
                    "block_name": "b1",
                    "block_hosts": "h1",
                    "mpath": 1,
                    "size": 1048576,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let reply: BlockReply = body_json(resp).await;
        assert_eq!(reply.exit, 0, "create failed: {}", reply.out);

        let resp = app
            .oneshot(json_post(
                "/cli/info",
                serde_json::json!({ "volume": "v1", "block_name": "b1" }),
            ))
            .await
            .unwrap();
        let reply: BlockReply = body_json(resp).await;
        assert_eq!(reply.exit, 0);
        assert!(reply.out.contains("EXPORTED NODE(S): h1"));
    }

    #[tokio::test]
    async fn cli_errors_stay_in_the_reply_body() {
        let app = test_app();
        let resp = app
            .oneshot(json_post(
                "/cli/info",
                serde_json::json!({ "volume": "v1", "block_name": "ghost" }),
            ))
            .await
            .unwrap();
        // Transport stays 200: the exit code carries the failure.
        assert_eq!(resp.status(), StatusCode::OK);
        let reply: BlockReply = body_json(resp).await;
        assert_eq!(reply.exit, 2);
    }

    #[tokio::test]
    async fn peer_version_reports_capability_set() {
        let app = test_app();
        let resp = app
            .oneshot(json_post("/peer/version", serde_json::json!({})))
            .await
            .unwrap();
        let reply: PeerReply = body_json(resp).await;
        assert_eq!(reply.exit, 0);
        let caps = reply.caps.unwrap();
        assert!(caps.iter().any(|c| c.name == "create" && c.enabled));
        assert!(caps.iter().any(|c| c.name == "replace" && c.enabled));
    }

    #[tokio::test]
    async fn unknown_procedure_is_404() {
        // Exactly what an old daemon answers for a procedure it predates;
        // callers map it to the legacy capability set.
        let app = test_app();
        let resp = app
            .oneshot(json_post("/peer/frobnicate", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
