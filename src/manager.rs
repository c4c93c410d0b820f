//! The collection manager: sole owner and sole mutator of the in-memory
//! cellar. Every local mutation and every applied remote snapshot funnels
//! through here, in the same order: mutate in memory, persist the local
//! cache, then (if a remote is bound) push through the echo gate.

use crate::cache::CacheStore;
use crate::model::{
    clamp_scale, ArchiveRecord, BottleDraft, CatalogRecord, Collection, Rebuy, RecordId,
};
use crate::reconcile::{reconcile, MergePolicy};
use crate::sync::gate::EchoGate;
use crate::sync::remote::{CollectionKind, CollectionPath, RemoteError, RemoteStore, SnapshotMap};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct RemoteBinding {
    store: Arc<dyn RemoteStore>,
    uid: String,
}

impl RemoteBinding {
    fn path(&self, kind: CollectionKind) -> CollectionPath {
        CollectionPath::new(self.uid.clone(), kind)
    }
}

/// One remote write scheduled by a mutation. A single gate engagement covers
/// the whole batch, so a multi-step transition (archive = delete + upsert)
/// cannot be interleaved with its own echo.
enum RemoteOp {
    Upsert(CollectionKind, String, serde_json::Value),
    Delete(CollectionKind, String),
}

pub struct CellarManager {
    collection: RwLock<Collection>,
    cache: CacheStore,
    remote: RwLock<Option<RemoteBinding>>,
    gate: Arc<EchoGate>,
    policy: MergePolicy,
}

impl CellarManager {
    pub fn new(cache: CacheStore, policy: MergePolicy, gate: EchoGate) -> Self {
        Self {
            collection: RwLock::new(Collection::default()),
            cache,
            remote: RwLock::new(None),
            gate: Arc::new(gate),
            policy,
        }
    }

    /// Read the local cache into memory. Called once at startup, before any
    /// remote is bound, for offline availability.
    pub async fn load_from_cache(&self) {
        let cached = self.cache.load().await;
        if !cached.is_empty() {
            info!(
                "Loaded {} active / {} archived records from cache",
                cached.active.len(),
                cached.archive.len()
            );
        }
        *self.collection.write().await = cached;
    }

    pub fn gate(&self) -> &Arc<EchoGate> {
        &self.gate
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Passive status indicator: whether a remote store is currently bound.
    pub async fn remote_enabled(&self) -> bool {
        self.remote.read().await.is_some()
    }

    pub async fn snapshot(&self) -> Collection {
        self.collection.read().await.clone()
    }

    // --- Local mutations -------------------------------------------------

    /// Create a new catalog record from a draft. The id and `added_at` are
    /// assigned here and never change for the record's life.
    pub async fn add(&self, draft: BottleDraft) -> CatalogRecord {
        let record = CatalogRecord::from_draft(draft);

        {
            let mut collection = self.collection.write().await;
            collection.active.push(record.clone());
            collection.sort();
        }
        self.persist().await;

        self.run_remote(vec![upsert_active(&record)]).await;
        record
    }

    /// Full-record replace keyed by id. `added_at` is preserved from the
    /// existing record regardless of what the caller sends.
    pub async fn update(&self, mut record: CatalogRecord) -> bool {
        record.boldness = clamp_scale(record.boldness);
        record.tannins = clamp_scale(record.tannins);
        record.acidity = clamp_scale(record.acidity);
        record.quantity = record.quantity.max(1);

        let found = {
            let mut collection = self.collection.write().await;
            match collection.active.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => {
                    record.added_at = existing.added_at;
                    *existing = record.clone();
                    true
                }
                None => false,
            }
        };
        if !found {
            return false;
        }
        self.persist().await;

        self.run_remote(vec![upsert_active(&record)]).await;
        true
    }

    /// Adjust quantity by ±1 (or any delta). Clamped at 1: decrementing a
    /// single remaining bottle is a no-op and never archives or deletes.
    pub async fn adjust_quantity(&self, id: &RecordId, delta: i64) -> Option<u32> {
        let updated = {
            let mut collection = self.collection.write().await;
            let record = collection.active.iter_mut().find(|r| &r.id == id)?;
            let next = (i64::from(record.quantity) + delta).max(1) as u32;
            if next == record.quantity {
                debug!("Quantity change for {} is a no-op at {}", id, next);
                return Some(record.quantity);
            }
            record.quantity = next;
            record.clone()
        };
        self.persist().await;

        self.run_remote(vec![upsert_active(&updated)]).await;
        Some(updated.quantity)
    }

    /// Delete an active record without archiving it.
    pub async fn delete(&self, id: &RecordId) -> bool {
        let removed = {
            let mut collection = self.collection.write().await;
            let before = collection.active.len();
            collection.active.retain(|r| &r.id != id);
            collection.active.len() != before
        };
        if !removed {
            return false;
        }
        self.persist().await;

        self.run_remote(vec![RemoteOp::Delete(CollectionKind::Active, id.0.clone())])
            .await;
        true
    }

    /// Move an active record to the archive. Always an explicit,
    /// user-confirmed action; quantity exhaustion never triggers it.
    pub async fn archive(
        &self,
        id: &RecordId,
        rating: u8,
        rebuy: Option<Rebuy>,
        archive_notes: String,
    ) -> Option<ArchiveRecord> {
        let entry = {
            let mut collection = self.collection.write().await;
            let index = collection.active.iter().position(|r| &r.id == id)?;
            let record = collection.active.remove(index);
            let entry = ArchiveRecord {
                record,
                rating: rating.min(5),
                rebuy,
                archive_notes,
                archived_at: Utc::now(),
            };
            collection.archive.push(entry.clone());
            collection.sort();
            entry
        };
        self.persist().await;

        self.run_remote(vec![
            RemoteOp::Delete(CollectionKind::Active, entry.id().0.clone()),
            upsert_archive(&entry),
        ])
        .await;
        Some(entry)
    }

    /// Bring an archived record back to the cellar. The restored record gets
    /// a freshly generated id and `added_at`; the archive entry is destroyed.
    pub async fn restore(&self, id: &RecordId) -> Option<CatalogRecord> {
        let (old_id, restored) = {
            let mut collection = self.collection.write().await;
            let index = collection.archive.iter().position(|a| a.id() == id)?;
            let entry = collection.archive.remove(index);

            let mut restored = entry.record;
            let old_id = restored.id.clone();
            restored.id = RecordId::generate();
            restored.added_at = Utc::now();

            collection.active.push(restored.clone());
            collection.sort();
            (old_id, restored)
        };
        self.persist().await;

        self.run_remote(vec![
            RemoteOp::Delete(CollectionKind::Archive, old_id.0),
            upsert_active(&restored),
        ])
        .await;
        Some(restored)
    }

    /// Permanently delete an archive entry.
    pub async fn delete_archived(&self, id: &RecordId) -> bool {
        let removed = {
            let mut collection = self.collection.write().await;
            let before = collection.archive.len();
            collection.archive.retain(|a| a.id() != id);
            collection.archive.len() != before
        };
        if !removed {
            return false;
        }
        self.persist().await;

        self.run_remote(vec![RemoteOp::Delete(
            CollectionKind::Archive,
            id.0.clone(),
        )])
        .await;
        true
    }

    /// Drop all in-memory state; optionally the cache blob too (sign-out).
    pub async fn clear(&self, wipe_cache: bool) {
        *self.collection.write().await = Collection::default();
        if wipe_cache {
            self.cache.clear().await;
        }
    }

    // --- Remote binding and snapshots ------------------------------------

    /// Bind a remote store for an identity: reconcile the in-memory
    /// collection against the remote snapshot under the configured policy,
    /// persist the merged result locally as backup, and push any surviving
    /// local-only records. The cache stops being the source of truth here.
    pub async fn bind_remote(
        &self,
        store: Arc<dyn RemoteStore>,
        uid: &str,
    ) -> Result<(), RemoteError> {
        let binding = RemoteBinding {
            store,
            uid: uid.to_string(),
        };

        let remote_active = decode_records::<CatalogRecord>(
            binding.store.fetch(&binding.path(CollectionKind::Active)).await?,
        );
        let remote_archive = decode_records::<ArchiveRecord>(
            binding
                .store
                .fetch(&binding.path(CollectionKind::Archive))
                .await?,
        );

        let (active_outcome, archive_outcome) = {
            let collection = self.collection.read().await;
            (
                reconcile(&collection.active, &remote_active, self.policy),
                reconcile(&collection.archive, &remote_archive, self.policy),
            )
        };

        {
            let mut collection = self.collection.write().await;
            collection.active = active_outcome.records;
            collection.archive = archive_outcome.records;
        }
        self.persist().await;

        *self.remote.write().await = Some(binding);
        info!(
            "Remote bound for {} ({} local-only active, {} local-only archived to push)",
            uid,
            active_outcome.to_push.len(),
            archive_outcome.to_push.len()
        );

        let mut ops: Vec<RemoteOp> = Vec::new();
        ops.extend(active_outcome.to_push.iter().map(upsert_active));
        ops.extend(archive_outcome.to_push.iter().map(upsert_archive));
        if !ops.is_empty() {
            self.run_remote(ops).await;
        }
        Ok(())
    }

    pub async fn unbind_remote(&self) {
        *self.remote.write().await = None;
    }

    /// Apply a snapshot fanned out by the remote store. Called only by the
    /// sync session, and only while the echo gate is down; post-bind
    /// snapshots are the canonical state and replace the list wholesale.
    pub async fn apply_remote_snapshot(&self, kind: CollectionKind, snapshot: SnapshotMap) {
        {
            let mut collection = self.collection.write().await;
            match kind {
                CollectionKind::Active => {
                    collection.active = decode_records::<CatalogRecord>(snapshot);
                }
                CollectionKind::Archive => {
                    collection.archive = decode_records::<ArchiveRecord>(snapshot);
                }
            }
            collection.sort();
        }
        self.persist().await;
    }

    // --- Internals --------------------------------------------------------

    async fn persist(&self) {
        let collection = self.collection.read().await.clone();
        if let Err(e) = self.cache.save(&collection).await {
            warn!("Cache persist failed: {}", e);
        }
    }

    /// Execute a batch of remote writes under one gate engagement. Remote
    /// failures degrade to local-only state and a warning; they never fail
    /// the local mutation that scheduled them.
    async fn run_remote(&self, ops: Vec<RemoteOp>) {
        let binding = match self.remote.read().await.clone() {
            Some(binding) => binding,
            None => return,
        };

        let token = self.gate.engage();
        for op in ops {
            match op {
                RemoteOp::Upsert(kind, id, value) => {
                    if let Err(e) = binding.store.set_one(&binding.path(kind), &id, value).await {
                        warn!("Remote upsert of {} failed: {}", id, e);
                    }
                }
                RemoteOp::Delete(kind, id) => {
                    match binding.store.delete_one(&binding.path(kind), &id).await {
                        Ok(true) => {}
                        Ok(false) => warn!("Remote delete of {} not confirmed", id),
                        Err(e) => warn!("Remote delete of {} failed: {}", id, e),
                    }
                }
            }
        }
        // Release only after every write resolved; the trailing grace window
        // still has to cover the asynchronous fan-out.
        self.gate.release(token);
    }
}

fn upsert_active(record: &CatalogRecord) -> RemoteOp {
    RemoteOp::Upsert(
        CollectionKind::Active,
        record.id.0.clone(),
        serde_json::to_value(record).unwrap_or(serde_json::Value::Null),
    )
}

fn upsert_archive(entry: &ArchiveRecord) -> RemoteOp {
    RemoteOp::Upsert(
        CollectionKind::Archive,
        entry.id().0.clone(),
        serde_json::to_value(entry).unwrap_or(serde_json::Value::Null),
    )
}

/// Decode a snapshot map into records, in ascending id order so equal
/// timestamps sort identically everywhere. Malformed entries are logged and
/// skipped rather than poisoning the whole snapshot.
fn decode_records<T: serde::de::DeserializeOwned>(snapshot: SnapshotMap) -> Vec<T> {
    let mut entries: Vec<(String, serde_json::Value)> = snapshot.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut records = Vec::with_capacity(entries.len());
    for (id, value) in entries {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed remote record {}: {}", id, e),
        }
    }
    records
}
