//! Per-identity sync session: binds the remote store, subscribes to both
//! collections, and runs the gate-checked snapshot listeners. Torn down as a
//! unit on sign-out so no listener outlives its identity.

use crate::manager::CellarManager;
use crate::sync::remote::{CollectionKind, CollectionPath, RemoteError, RemoteStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct SyncSession {
    uid: String,
    listeners: Vec<JoinHandle<()>>,
}

impl SyncSession {
    /// Bind the manager to the remote store for `uid` and start listening
    /// for snapshot fan-out on both collections. Fails if the connect-time
    /// fetch fails; the caller stays in local-only mode in that case.
    pub async fn establish(
        manager: Arc<CellarManager>,
        remote: Arc<dyn RemoteStore>,
        uid: &str,
    ) -> Result<Self, RemoteError> {
        manager.bind_remote(remote.clone(), uid).await?;

        let mut listeners = Vec::with_capacity(CollectionKind::ALL.len());
        for kind in CollectionKind::ALL {
            let path = CollectionPath::new(uid, kind);
            let mut subscription = remote.subscribe(&path).await?;
            let manager = manager.clone();

            listeners.push(tokio::spawn(async move {
                while let Some(snapshot) = subscription.recv().await {
                    // A snapshot arriving while the gate is up is (or may
                    // interleave with) the echo of our own write: drop it
                    // without merging or re-rendering.
                    if manager.gate().is_engaged() {
                        debug!("Dropped {} snapshot while echo gate up", kind.as_str());
                        continue;
                    }
                    manager.apply_remote_snapshot(kind, snapshot).await;
                }
            }));
        }

        info!("Sync session established for {}", uid);
        Ok(Self {
            uid: uid.to_string(),
            listeners,
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Abort the listeners and drop their subscriptions. Idempotent via
    /// drain; must run before a different identity signs in.
    pub async fn teardown(mut self) {
        for task in self.listeners.drain(..) {
            task.abort();
        }
        info!("Sync session torn down for {}", self.uid);
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        for task in self.listeners.drain(..) {
            task.abort();
        }
    }
}
