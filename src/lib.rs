//! Remote content synchronization and listing cache for z/OSMF-backed editors.
//!
//! Two halves share the attributes registry and the virtual file system:
//!
//! * [`fetch`] lists datasets, members, USS directories, jobs and spool files
//!   and caches the resulting virtual files per query;
//! * [`sync`] keeps an opened document and its remote entity consistent,
//!   with [`queue`] driving background re-synchronization after edits.
//!
//! [`dataops::DataOps`] wires both halves around one [`api::RemoteApi`].

pub mod api;
pub mod attributes;
pub mod config;
pub mod connection;
pub mod content;
pub mod dataops;
pub mod error;
pub mod events;
pub mod fetch;
pub mod logging;
pub mod progress;
pub mod queue;
pub mod storage;
pub mod sync;
pub mod vfs;

pub use config::Config;
pub use connection::ConnectionConfig;
pub use dataops::DataOps;
pub use error::{Result, SyncError};
pub use fetch::{FileFetchProvider, RemoteQuery};
pub use sync::{ContentSynchronizer, SyncProvider};
pub use vfs::{FileHandle, FileKind};
