pub mod backend;
pub mod client;
pub mod error;
pub mod http;
pub mod local;

pub use backend::NodeBackend;
pub use client::{PeerClient, RemoteReply};
pub use error::PeerError;
pub use http::HttpPeer;
pub use local::{LocalBackend, LocalPeers};
