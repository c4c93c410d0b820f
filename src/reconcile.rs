//! Merge reconciler: produces one canonical list from a local and a remote
//! snapshot under an explicit policy. Pure and deterministic.

use crate::model::{ArchiveRecord, CatalogRecord, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Reconciliation policy, fixed at manager construction. The two policies
/// have different failure modes (data loss vs duplicate resurrection) and
/// are never blended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Remote wins on id collision; local-only records survive and are
    /// scheduled for a remote push.
    #[default]
    Union,
    /// The remote snapshot replaces local state wholesale; unsynced
    /// local-only records are dropped.
    RemoteAuthoritative,
}

/// Anything the reconciler can order: an identity plus the recency field
/// used as the sole sort key.
pub trait Reconcilable {
    fn record_id(&self) -> &RecordId;
    fn recency(&self) -> DateTime<Utc>;
}

impl Reconcilable for CatalogRecord {
    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn recency(&self) -> DateTime<Utc> {
        self.added_at
    }
}

impl Reconcilable for ArchiveRecord {
    fn record_id(&self) -> &RecordId {
        self.id()
    }

    fn recency(&self) -> DateTime<Utc> {
        self.archived_at
    }
}

/// Result of reconciling one list: the canonical records, sorted descending
/// by recency, plus the local-only records the caller must push remotely.
#[derive(Clone, Debug, Default)]
pub struct MergeOutcome<T> {
    pub records: Vec<T>,
    pub to_push: Vec<T>,
}

/// Reconcile a local list against a remote snapshot.
///
/// Remote entries are taken in ascending id order before the final stable
/// sort, so equal timestamps resolve identically on every client regardless
/// of snapshot map iteration order.
pub fn reconcile<T: Reconcilable + Clone>(
    local: &[T],
    remote: &[T],
    policy: MergePolicy,
) -> MergeOutcome<T> {
    let mut remote_sorted: Vec<T> = remote.to_vec();
    remote_sorted.sort_by(|a, b| a.record_id().as_str().cmp(b.record_id().as_str()));

    match policy {
        MergePolicy::RemoteAuthoritative => {
            let mut records = remote_sorted;
            sort_by_recency(&mut records);
            MergeOutcome {
                records,
                to_push: vec![],
            }
        }
        MergePolicy::Union => {
            let remote_ids: HashSet<&str> = remote_sorted
                .iter()
                .map(|r| r.record_id().as_str())
                .collect();

            let local_only: Vec<T> = local
                .iter()
                .filter(|r| !remote_ids.contains(r.record_id().as_str()))
                .cloned()
                .collect();

            let mut records = remote_sorted;
            records.extend(local_only.iter().cloned());
            sort_by_recency(&mut records);

            MergeOutcome {
                records,
                to_push: local_only,
            }
        }
    }
}

fn sort_by_recency<T: Reconcilable>(records: &mut [T]) {
    records.sort_by(|a, b| b.recency().cmp(&a.recency()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BottleDraft, CatalogRecord};
    use chrono::TimeZone;

    fn bottle(id: &str, name: &str, ts: i64) -> CatalogRecord {
        let mut record = CatalogRecord::from_draft(BottleDraft {
            name: name.to_string(),
            ..Default::default()
        });
        record.id = RecordId(id.to_string());
        record.added_at = Utc.timestamp_opt(ts, 0).unwrap();
        record
    }

    #[test]
    fn test_union_merge_keeps_local_only_and_prefers_remote() {
        // local = {A, B}, remote = {B', C}; expect {B', C, A} with A pushed.
        let a = bottle("a", "A", 300);
        let b = bottle("b", "B", 200);
        let mut b_prime = bottle("b", "B", 200);
        b_prime.notes = "updated remotely".to_string();
        let c = bottle("c", "C", 100);

        let outcome = reconcile(
            &[a.clone(), b],
            &[b_prime.clone(), c.clone()],
            MergePolicy::Union,
        );

        let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let merged_b = outcome.records.iter().find(|r| r.id.as_str() == "b").unwrap();
        assert_eq!(merged_b.notes, "updated remotely");

        assert_eq!(outcome.to_push.len(), 1);
        assert_eq!(outcome.to_push[0].id, a.id);
    }

    #[test]
    fn test_remote_authoritative_drops_local_only() {
        let local = [bottle("a", "A", 300)];
        let remote = [bottle("c", "C", 100)];

        let outcome = reconcile(&local, &remote, MergePolicy::RemoteAuthoritative);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].id.as_str(), "c");
        assert!(outcome.to_push.is_empty());
    }

    #[test]
    fn test_output_sorted_descending_by_added_at() {
        let outcome = reconcile(
            &[bottle("a", "A", 100)],
            &[bottle("b", "B", 300), bottle("c", "C", 200)],
            MergePolicy::Union,
        );
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_equal_timestamps_resolve_by_id_order() {
        // Same recency everywhere: remote entries come out in id order,
        // local-only entries after them, on every run.
        let outcome = reconcile(
            &[bottle("z", "Z", 100)],
            &[bottle("m", "M", 100), bottle("d", "D", 100)],
            MergePolicy::Union,
        );
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "m", "z"]);
    }

    #[test]
    fn test_empty_remote_union_pushes_everything() {
        let local = [bottle("a", "A", 100), bottle("b", "B", 200)];
        let outcome = reconcile(&local, &[], MergePolicy::Union);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.to_push.len(), 2);
    }
}
