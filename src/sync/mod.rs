//! Offline-first synchronization: the remote channel contract, the
//! echo-suppression gate, and the per-identity session that ties them to
//! the collection manager.

pub mod gate;
pub mod http;
pub mod remote;
pub mod session;

pub use gate::EchoGate;
pub use http::HttpRemoteStore;
pub use remote::{
    CollectionKind, CollectionPath, MemoryRemoteStore, RemoteError, RemoteStore,
    RemoteSubscription, SnapshotMap,
};
pub use session::SyncSession;
