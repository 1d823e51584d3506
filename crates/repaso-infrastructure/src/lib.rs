pub mod config;
pub mod migration;
pub mod mirror;
pub mod paths;
pub mod primary;
pub mod remote;
pub mod storage;
pub mod sync_service;

pub use crate::config::AppConfig;
pub use crate::mirror::MirrorStore;
pub use crate::primary::PrimaryStore;
pub use crate::remote::RemoteStore;
pub use crate::sync_service::{LoadHint, LoadSource, LoadedState, StateSyncService};
