//! cellarium: an offline-first wine-cellar catalog.
//!
//! The collection lives in memory under a single manager, is cached locally
//! as one JSON blob, and can be synchronized with a remote snapshot store.
//! Remote changes fan out to every subscriber as full snapshots; an
//! echo-suppression gate keeps a client from reprocessing its own writes.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod identity;
pub mod imagery;
pub mod manager;
pub mod model;
pub mod reconcile;
pub mod sse;
pub mod sync;
pub mod vision;

pub use api::{create_router, router_with_hub, SnapshotHub};
pub use cache::CacheStore;
pub use config::CellarConfig;
pub use identity::{spawn_identity_watcher, AuthEvent};
pub use manager::CellarManager;
pub use model::{ArchiveRecord, BottleDraft, CatalogRecord, Collection, Rebuy, RecordId, WineType};
pub use reconcile::MergePolicy;
pub use sync::{
    CollectionKind, CollectionPath, EchoGate, HttpRemoteStore, MemoryRemoteStore, RemoteStore,
    SyncSession,
};
