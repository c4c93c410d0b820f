//! HTTP implementation of the remote store, speaking the cellarium-server
//! contract: REST point writes plus an SSE stream of full snapshots.

use super::remote::{
    CollectionPath, RemoteError, RemoteStore, RemoteSubscription, SnapshotMap,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Delay before polling the event source again after a stream error.
const RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct HttpRemoteStore {
    client: Client,
    base: String,
}

impl HttpRemoteStore {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            client: Client::new(),
            base,
        }
    }

    fn collection_url(&self, path: &CollectionPath) -> String {
        format!(
            "{}/users/{}/collections/{}",
            self.base,
            urlencoding::encode(&path.uid),
            path.kind.as_str()
        )
    }

    fn record_url(&self, path: &CollectionPath, id: &str) -> String {
        format!("{}/{}", self.collection_url(path), urlencoding::encode(id))
    }

    fn sse_url(&self, path: &CollectionPath) -> String {
        format!(
            "{}/sse/users/{}/collections/{}",
            self.base,
            urlencoding::encode(&path.uid),
            path.kind.as_str()
        )
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    RemoteError::Transport(e.to_string())
}

fn check_status(resp: &reqwest::Response) -> Result<(), RemoteError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(RemoteError::Transport(format!("HTTP {}", status)))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, path: &CollectionPath) -> Result<SnapshotMap, RemoteError> {
        let resp = self
            .client
            .get(self.collection_url(path))
            .send()
            .await
            .map_err(transport)?;
        check_status(&resp)?;
        resp.json::<SnapshotMap>()
            .await
            .map_err(|e| RemoteError::Payload(e.to_string()))
    }

    async fn subscribe(&self, path: &CollectionPath) -> Result<RemoteSubscription, RemoteError> {
        let url = self.sse_url(path);
        let (tx, receiver) = mpsc::channel(16);
        let label = path.to_string();

        let task = tokio::spawn(async move {
            let mut source = EventSource::get(url.as_str());
            loop {
                match source.next().await {
                    Some(Ok(SseEvent::Open)) => {
                        debug!("Snapshot stream open for {}", label);
                    }
                    Some(Ok(SseEvent::Message(message))) if message.event == "snapshot" => {
                        match serde_json::from_str::<SnapshotMap>(&message.data) {
                            Ok(snapshot) => {
                                if tx.send(snapshot).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Bad snapshot payload for {}: {}", label, e),
                        }
                    }
                    Some(Ok(SseEvent::Message(_))) => {}
                    Some(Err(e)) => {
                        // The event source reconnects on its own; just pace
                        // the retries.
                        warn!("Snapshot stream error for {}: {}", label, e);
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                    None => break,
                }
            }
            source.close();
        });

        Ok(RemoteSubscription::new(path.clone(), receiver, Some(task)))
    }

    async fn set_all(
        &self,
        path: &CollectionPath,
        records: SnapshotMap,
    ) -> Result<(), RemoteError> {
        let resp = self
            .client
            .put(self.collection_url(path))
            .json(&records)
            .send()
            .await
            .map_err(transport)?;
        check_status(&resp)
    }

    async fn set_one(
        &self,
        path: &CollectionPath,
        id: &str,
        record: serde_json::Value,
    ) -> Result<(), RemoteError> {
        let resp = self
            .client
            .put(self.record_url(path, id))
            .json(&record)
            .send()
            .await
            .map_err(transport)?;
        check_status(&resp)
    }

    async fn delete_one(&self, path: &CollectionPath, id: &str) -> Result<bool, RemoteError> {
        let resp = self
            .client
            .delete(self.record_url(path, id))
            .send()
            .await
            .map_err(transport)?;
        // 404 means already gone, which is the outcome we wanted.
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::Transport(format!("HTTP {}", resp.status())));
        }

        // Re-read to confirm: the store is eventually consistent and the
        // delete may not have settled by the time the call resolves.
        let snapshot = self.fetch(path).await?;
        Ok(!snapshot.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::CollectionKind;

    #[test]
    fn test_urls_are_encoded_and_normalized() {
        let store = HttpRemoteStore::new("http://localhost:3200/");
        let path = CollectionPath::new("user one", CollectionKind::Active);

        assert_eq!(
            store.collection_url(&path),
            "http://localhost:3200/users/user%20one/collections/active"
        );
        assert_eq!(
            store.record_url(&path, "id/1"),
            "http://localhost:3200/users/user%20one/collections/active/id%2F1"
        );
        assert_eq!(
            store.sse_url(&path),
            "http://localhost:3200/sse/users/user%20one/collections/active"
        );
    }
}
