use std::time::Duration;

use async_trait::async_trait;
use blockplane_domain::{
    Capability, CreateRequest, DeleteRequest, ModifyRequest, PeerReply, ReplaceRequest,
};
use serde::Serialize;
use tracing::debug;

use crate::client::{PeerClient, RemoteReply};
use crate::error::PeerError;

/// [`PeerClient`] over HTTP: each procedure is a `POST /peer/<proc>` with a
/// JSON body, answered by a [`PeerReply`]. An address without an explicit
/// port gets `default_port` appended.
pub struct HttpPeer {
    client: reqwest::Client,
    default_port: u16,
    connect_timeout: Duration,
}

impl HttpPeer {
    pub fn new(
        default_port: u16,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, PeerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| PeerError::BadReply {
                addr: String::new(),
                reason: format!("building http client: {e}"),
            })?;
        Ok(HttpPeer { client, default_port, connect_timeout })
    }

    fn host_port(&self, addr: &str) -> String {
        if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{addr}:{}", self.default_port)
        }
    }

    fn url(&self, addr: &str, procedure: &str) -> String {
        format!("http://{}/peer/{procedure}", self.host_port(addr))
    }

    async fn call<B: Serialize>(
        &self,
        addr: &str,
        procedure: &str,
        body: &B,
    ) -> Result<PeerReply, PeerError> {
        let url = self.url(addr, procedure);
        debug!(addr, procedure, "peer rpc");
        let resp = match self.client.post(&url).json(body).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Err(PeerError::Timeout { addr: addr.to_string() })
            }
            Err(e) => {
                return Err(PeerError::Unreachable {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            // Older daemons route fewer procedures; the caller substitutes
            // the legacy capability set.
            return Err(PeerError::ProcUnavailable { addr: addr.to_string() });
        }

        resp.json::<PeerReply>().await.map_err(|e| {
            if e.is_timeout() {
                PeerError::Timeout { addr: addr.to_string() }
            } else {
                PeerError::BadReply { addr: addr.to_string(), reason: e.to_string() }
            }
        })
    }
}

#[async_trait]
impl PeerClient for HttpPeer {
    async fn create(&self, addr: &str, req: &CreateRequest) -> Result<RemoteReply, PeerError> {
        let reply = self.call(addr, "create", req).await?;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn delete(&self, addr: &str, req: &DeleteRequest) -> Result<RemoteReply, PeerError> {
        let reply = self.call(addr, "delete", req).await?;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn modify(&self, addr: &str, req: &ModifyRequest) -> Result<RemoteReply, PeerError> {
        let reply = self.call(addr, "modify", req).await?;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn replace(&self, addr: &str, req: &ReplaceRequest) -> Result<RemoteReply, PeerError> {
        let reply = self.call(addr, "replace", req).await?;
        Ok(RemoteReply { exit: reply.exit, out: reply.out })
    }

    async fn version(&self, addr: &str) -> Result<Vec<Capability>, PeerError> {
        let reply = self.call(addr, "version", &serde_json::json!({})).await?;
        reply.caps.ok_or_else(|| PeerError::BadReply {
            addr: addr.to_string(),
            reason: "version reply carried no capability set".to_string(),
        })
    }

    async fn probe(&self, addr: &str) -> Result<(), PeerError> {
        let target = self.host_port(addr);
        match tokio::time::timeout(
            self.connect_timeout,
            tokio::net::TcpStream::connect(&target),
        )
        .await
        {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(PeerError::Unreachable {
                addr: addr.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(PeerError::Unreachable {
                addr: addr.to_string(),
                reason: "connect timed out".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn peer_for(server: &MockServer) -> (HttpPeer, String) {
        let addr = server.address().to_string();
        let peer = HttpPeer::new(
            24177,
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .unwrap();
        (peer, addr)
    }

    fn delete_req() -> DeleteRequest {
        DeleteRequest {
            block_name: "b1".into(),
            gbid: "5f4dcc3b-aa12-4b1e-9a2f-000000000001".into(),
        }
    }

    #[tokio::test]
    async fn remote_exit_code_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/peer/delete"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exit": 7,
                "out": "delete failed",
            })))
            .mount(&server)
            .await;

        let (peer, addr) = peer_for(&server);
        let reply = peer.delete(&addr, &delete_req()).await.unwrap();
        assert_eq!(reply.exit, 7);
        assert_eq!(reply.out, "delete failed");
    }

    #[tokio::test]
    async fn missing_procedure_is_proc_unavailable() {
        let server = MockServer::start().await;
        // No /peer/version route mounted: wiremock answers 404.
        let (peer, addr) = peer_for(&server);
        let err = peer.version(&addr).await.unwrap_err();
        assert!(matches!(err, PeerError::ProcUnavailable { .. }));
        assert!(err.rpc_sent());
    }

    #[tokio::test]
    async fn version_parses_capability_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/peer/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exit": 0,
                "out": "",
                "caps": [
                    {"name": "create", "enabled": true},
                    {"name": "replace", "enabled": false},
                ],
            })))
            .mount(&server)
            .await;

        let (peer, addr) = peer_for(&server);
        let caps = peer.version(&addr).await.unwrap();
        assert_eq!(caps.len(), 2);
        assert!(caps[0].enabled);
        assert!(!caps[1].enabled);
    }

    #[tokio::test]
    async fn connect_failure_is_unreachable_and_not_sent() {
        // Port 1 on localhost: nothing listens there.
        let peer = HttpPeer::new(
            1,
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .unwrap();
        let err = peer.delete("127.0.0.1:1", &delete_req()).await.unwrap_err();
        assert!(matches!(err, PeerError::Unreachable { .. }));
        assert!(!err.rpc_sent());
    }

    #[tokio::test]
    async fn slow_peer_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/peer/delete"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"exit": 0, "out": ""}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let (peer, addr) = peer_for(&server);
        let err = peer.delete(&addr, &delete_req()).await.unwrap_err();
        assert!(matches!(err, PeerError::Timeout { .. }));
        assert!(err.rpc_sent());
    }

    #[tokio::test]
    async fn probe_distinguishes_listening_from_dead() {
        let server = MockServer::start().await;
        let (peer, addr) = peer_for(&server);
        peer.probe(&addr).await.unwrap();
        assert!(peer.probe("127.0.0.1:1").await.is_err());
    }
}
