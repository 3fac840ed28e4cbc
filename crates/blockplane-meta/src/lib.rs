pub mod error;
pub mod fs;
pub mod info;
pub mod memory;
pub mod store;

pub use error::MetaError;
pub use fs::FsMetaStore;
pub use info::{HostEntry, MetaInfo};
pub use memory::InMemoryMetaStore;
pub use store::{MetaStore, VolumeLock};
