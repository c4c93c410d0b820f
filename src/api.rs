use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::sse;
use crate::sync::remote::{CollectionKind, SnapshotMap};

/// Key for one per-identity remote collection held by the server.
pub type HubKey = (String, CollectionKind);

/// Server-side snapshot hub: the authoritative per-identity collections,
/// with broadcast fan-out of the full snapshot on every change, including
/// back to the connection that wrote it.
pub struct SnapshotHub {
    collections: RwLock<HashMap<HubKey, SnapshotMap>>,
    publishers: RwLock<HashMap<HubKey, broadcast::Sender<SnapshotMap>>>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            publishers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn snapshot(&self, key: &HubKey) -> SnapshotMap {
        self.collections
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn replace(&self, key: &HubKey, records: SnapshotMap) {
        self.collections
            .write()
            .await
            .insert(key.clone(), records);
        self.publish(key).await;
    }

    pub async fn upsert(&self, key: &HubKey, id: &str, record: serde_json::Value) {
        self.collections
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .insert(id.to_string(), record);
        self.publish(key).await;
    }

    pub async fn remove(&self, key: &HubKey, id: &str) -> bool {
        let removed = {
            let mut collections = self.collections.write().await;
            collections
                .get_mut(key)
                .map(|map| map.remove(id).is_some())
                .unwrap_or(false)
        };
        if removed {
            self.publish(key).await;
        }
        removed
    }

    /// Subscribe to snapshot fan-out for one collection.
    pub async fn subscribe(&self, key: &HubKey) -> broadcast::Receiver<SnapshotMap> {
        // Check with read lock first
        {
            let publishers = self.publishers.read().await;
            if let Some(tx) = publishers.get(key) {
                return tx.subscribe();
            }
        }

        // Create with write lock, double-checking
        let mut publishers = self.publishers.write().await;
        if let Some(tx) = publishers.get(key) {
            return tx.subscribe();
        }
        let (tx, rx) = broadcast::channel(64);
        publishers.insert(key.clone(), tx);
        rx
    }

    async fn publish(&self, key: &HubKey) {
        let snapshot = self.snapshot(key).await;
        let publishers = self.publishers.read().await;
        if let Some(tx) = publishers.get(key) {
            let _ = tx.send(snapshot);
        }
    }
}

impl Default for SnapshotHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub hub: Arc<SnapshotHub>,
}

pub fn create_router() -> Router {
    router_with_hub(Arc::new(SnapshotHub::new()))
}

pub fn router_with_hub(hub: Arc<SnapshotHub>) -> Router {
    let state = ApiState { hub };

    Router::new()
        .route("/health", get(health))
        .route(
            "/users/:uid/collections/:name",
            get(get_collection).put(put_collection),
        )
        .route(
            "/users/:uid/collections/:name/:id",
            axum::routing::put(put_record).delete(delete_record),
        )
        .route(
            "/sse/users/:uid/collections/:name",
            get(sse::subscribe_to_collection),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_key(uid: String, name: &str) -> Result<HubKey, StatusCode> {
    let kind = CollectionKind::from_name(name).ok_or(StatusCode::NOT_FOUND)?;
    Ok((uid, kind))
}

async fn health() -> &'static str {
    "OK"
}

async fn get_collection(
    State(state): State<ApiState>,
    Path((uid, name)): Path<(String, String)>,
) -> Result<Json<SnapshotMap>, StatusCode> {
    let key = parse_key(uid, &name)?;
    // An identity that has never written still gets an empty map, not 404.
    Ok(Json(state.hub.snapshot(&key).await))
}

async fn put_collection(
    State(state): State<ApiState>,
    Path((uid, name)): Path<(String, String)>,
    Json(records): Json<SnapshotMap>,
) -> Result<StatusCode, StatusCode> {
    let key = parse_key(uid, &name)?;
    state.hub.replace(&key, records).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_record(
    State(state): State<ApiState>,
    Path((uid, name, id)): Path<(String, String, String)>,
    Json(record): Json<serde_json::Value>,
) -> Result<StatusCode, StatusCode> {
    let key = parse_key(uid, &name)?;
    state.hub.upsert(&key, &id, record).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_record(
    State(state): State<ApiState>,
    Path((uid, name, id)): Path<(String, String, String)>,
) -> Result<StatusCode, StatusCode> {
    let key = parse_key(uid, &name)?;
    if state.hub.remove(&key, &id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
