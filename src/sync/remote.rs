//! The remote sync channel contract, plus an in-process implementation.
//!
//! The channel only ever moves whole snapshots and opaque record payloads;
//! it never interprets or mutates records. That keeps the interface narrow
//! enough that the HTTP store and the in-memory store are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Full contents of one remote collection: record id → record payload.
pub type SnapshotMap = HashMap<String, serde_json::Value>;

/// The two per-identity remote collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Active,
    Archive,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 2] = [CollectionKind::Active, CollectionKind::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Active => "active",
            CollectionKind::Archive => "archive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "active" => Some(CollectionKind::Active),
            "archive" => Some(CollectionKind::Archive),
            _ => None,
        }
    }
}

/// Names one per-identity remote collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    pub uid: String,
    pub kind: CollectionKind,
}

impl CollectionPath {
    pub fn new(uid: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            uid: uid.into(),
            kind,
        }
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "users/{}/collections/{}", self.uid, self.kind.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote request failed: {0}")]
    Transport(String),
    #[error("remote returned unexpected payload: {0}")]
    Payload(String),
    #[error("remote store misconfigured: {0}")]
    Config(String),
}

/// A live subscription to one remote collection. Owns the background task
/// that feeds it; dropping the handle (or calling [`shutdown`]) detaches.
///
/// [`shutdown`]: RemoteSubscription::shutdown
pub struct RemoteSubscription {
    path: CollectionPath,
    receiver: mpsc::Receiver<SnapshotMap>,
    task: Option<JoinHandle<()>>,
}

impl RemoteSubscription {
    pub fn new(
        path: CollectionPath,
        receiver: mpsc::Receiver<SnapshotMap>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            path,
            receiver,
            task,
        }
    }

    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// Next snapshot, or `None` once the channel is detached.
    pub async fn recv(&mut self) -> Option<SnapshotMap> {
        self.receiver.recv().await
    }

    /// Idempotent detach. Must happen before switching identity so a stale
    /// listener cannot leak another user's snapshots into this session.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Unsubscribed from {}", self.path);
        }
        self.receiver.close();
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The remote authoritative store. Point writes and deletes per record;
/// subscribers receive the full snapshot on every change, including changes
/// they originated themselves (the echo the gate exists for).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the full current snapshot.
    async fn fetch(&self, path: &CollectionPath) -> Result<SnapshotMap, RemoteError>;

    /// Register for snapshot fan-out. The first delivery is the current
    /// state.
    async fn subscribe(&self, path: &CollectionPath) -> Result<RemoteSubscription, RemoteError>;

    /// Replace the whole collection.
    async fn set_all(&self, path: &CollectionPath, records: SnapshotMap)
        -> Result<(), RemoteError>;

    /// Write one record.
    async fn set_one(
        &self,
        path: &CollectionPath,
        id: &str,
        record: serde_json::Value,
    ) -> Result<(), RemoteError>;

    /// Delete one record, then re-read to confirm it is gone. Returns the
    /// confirmation; `false` means eventual-consistency lag may still
    /// resurface the record.
    async fn delete_one(&self, path: &CollectionPath, id: &str) -> Result<bool, RemoteError>;
}

/// In-process remote store: a map per collection path with broadcast
/// fan-out. Backs the test suites and local development.
pub struct MemoryRemoteStore {
    collections: RwLock<HashMap<CollectionPath, SnapshotMap>>,
    publishers: RwLock<HashMap<CollectionPath, broadcast::Sender<SnapshotMap>>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            publishers: RwLock::new(HashMap::new()),
        }
    }

    async fn publisher(&self, path: &CollectionPath) -> broadcast::Sender<SnapshotMap> {
        {
            let publishers = self.publishers.read().await;
            if let Some(tx) = publishers.get(path) {
                return tx.clone();
            }
        }

        let mut publishers = self.publishers.write().await;
        if let Some(tx) = publishers.get(path) {
            return tx.clone();
        }
        let (tx, _) = broadcast::channel(64);
        publishers.insert(path.clone(), tx.clone());
        tx
    }

    async fn publish(&self, path: &CollectionPath) {
        let snapshot = self.fetch_now(path).await;
        let tx = self.publisher(path).await;
        let _ = tx.send(snapshot);
    }

    async fn fetch_now(&self, path: &CollectionPath) -> SnapshotMap {
        self.collections
            .read()
            .await
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, path: &CollectionPath) -> Result<SnapshotMap, RemoteError> {
        Ok(self.fetch_now(path).await)
    }

    async fn subscribe(&self, path: &CollectionPath) -> Result<RemoteSubscription, RemoteError> {
        let mut rx = self.publisher(path).await.subscribe();
        let initial = self.fetch_now(path).await;
        let (tx, receiver) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            if tx.send(initial).await.is_err() {
                return;
            }
            loop {
                match rx.recv().await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    // Snapshots are full state: after a lag, the next one
                    // carries everything we missed.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(RemoteSubscription::new(path.clone(), receiver, Some(task)))
    }

    async fn set_all(
        &self,
        path: &CollectionPath,
        records: SnapshotMap,
    ) -> Result<(), RemoteError> {
        self.collections
            .write()
            .await
            .insert(path.clone(), records);
        self.publish(path).await;
        Ok(())
    }

    async fn set_one(
        &self,
        path: &CollectionPath,
        id: &str,
        record: serde_json::Value,
    ) -> Result<(), RemoteError> {
        self.collections
            .write()
            .await
            .entry(path.clone())
            .or_default()
            .insert(id.to_string(), record);
        self.publish(path).await;
        Ok(())
    }

    async fn delete_one(&self, path: &CollectionPath, id: &str) -> Result<bool, RemoteError> {
        {
            let mut collections = self.collections.write().await;
            if let Some(map) = collections.get_mut(path) {
                map.remove(id);
            }
        }
        self.publish(path).await;

        // Confirm by re-reading, same contract as the HTTP store.
        let confirmed = !self.fetch_now(path).await.contains_key(id);
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> CollectionPath {
        CollectionPath::new("user-1", CollectionKind::Active)
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_subsequent_snapshots() {
        let store = MemoryRemoteStore::new();
        store
            .set_one(&path(), "a", serde_json::json!({"name": "A"}))
            .await
            .unwrap();

        let mut sub = store.subscribe(&path()).await.unwrap();
        let initial = sub.recv().await.unwrap();
        assert!(initial.contains_key("a"));

        store
            .set_one(&path(), "b", serde_json::json!({"name": "B"}))
            .await
            .unwrap();
        let next = sub.recv().await.unwrap();
        assert_eq!(next.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_one_confirms_absence() {
        let store = MemoryRemoteStore::new();
        store
            .set_one(&path(), "a", serde_json::json!({"name": "A"}))
            .await
            .unwrap();

        assert!(store.delete_one(&path(), "a").await.unwrap());
        assert!(store.delete_one(&path(), "missing").await.unwrap());
        assert!(store.fetch(&path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_detaches_subscription() {
        let store = MemoryRemoteStore::new();
        let mut sub = store.subscribe(&path()).await.unwrap();
        let _ = sub.recv().await;

        sub.shutdown();
        sub.shutdown(); // idempotent

        store
            .set_one(&path(), "a", serde_json::json!({"name": "A"}))
            .await
            .unwrap();
        assert!(sub.recv().await.is_none());
    }
}
