pub mod error;
pub mod status;
pub mod types;
pub mod wire;

pub use error::DomainError;
pub use status::{EntryKind, EntryStatus, HostStatus};
pub use types::{
    generate_password, self_capabilities, validate_block_name, validate_volume_name,
    Capability, Gbid, ServerList, LEGACY_CAPS,
};
pub use wire::{
    codes, BlockReply, CreateCliRequest, CreateRequest, DeleteCliRequest, DeleteRequest,
    InfoCliRequest, ListCliRequest, ModifyCliRequest, ModifyRequest, PeerReply,
    ReplaceCliRequest, ReplaceRequest,
};

/// Prefix of every target IQN; the block's gbid is appended to it.
pub const IQN_PREFIX: &str = "iqn.2025-06.io.blockplane:";

/// Well-known TCP port a storage node's target portal listens on.
pub const ISCSI_PORT: u16 = 3260;
