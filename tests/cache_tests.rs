//! Integration tests for the local cache store.

use cellarium::{ArchiveRecord, BottleDraft, CacheStore, CatalogRecord, Collection, Rebuy};
use chrono::Utc;
use tempfile::TempDir;

fn sample_collection() -> Collection {
    let mut with_image = CatalogRecord::from_draft(BottleDraft {
        name: "Pictured".to_string(),
        ..Default::default()
    });
    with_image.image = Some("aGVsbG8=".to_string());

    let plain = CatalogRecord::from_draft(BottleDraft {
        name: "Plain".to_string(),
        quantity: 3,
        ..Default::default()
    });

    let archived = ArchiveRecord {
        record: CatalogRecord::from_draft(BottleDraft {
            name: "Finished".to_string(),
            ..Default::default()
        }),
        rating: 5,
        rebuy: Some(Rebuy::Maybe),
        archive_notes: "would buy again".to_string(),
        archived_at: Utc::now(),
    };

    let mut collection = Collection {
        active: vec![with_image, plain],
        archive: vec![archived],
    };
    collection.sort();
    collection
}

#[tokio::test]
async fn test_save_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path().join("cellar.json"));

    let collection = sample_collection();
    store.save(&collection).await.unwrap();

    let loaded = store.load().await;
    assert_eq!(loaded, collection);
}

#[tokio::test]
async fn test_missing_cache_loads_empty() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path().join("nothing-here.json"));

    let loaded = store.load().await;
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn test_corrupt_cache_loads_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cellar.json");
    tokio::fs::write(&path, b"{ not json at all").await.unwrap();

    let store = CacheStore::new(&path);
    let loaded = store.load().await;
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path().join("nested/deeper/cellar.json"));

    store.save(&sample_collection()).await.unwrap();
    assert!(!store.load().await.is_empty());
}

#[tokio::test]
async fn test_clear_removes_blob() {
    let dir = TempDir::new().unwrap();
    let store = CacheStore::new(dir.path().join("cellar.json"));

    store.save(&sample_collection()).await.unwrap();
    store.clear().await;
    store.clear().await; // idempotent

    assert!(store.load().await.is_empty());
}
