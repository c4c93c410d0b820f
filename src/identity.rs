//! Identity-event state machine. The identity provider itself is an
//! external collaborator; this module only consumes its sign-in/sign-out
//! events and drives the sync session lifecycle from them.

use crate::manager::CellarManager;
use crate::sync::remote::RemoteStore;
use crate::sync::session::SyncSession;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { uid: String },
    SignedOut,
}

/// Consume auth events until the channel closes.
///
/// Sign-in establishes a sync session (tearing down any previous one first,
/// so a fast account switch cannot leak a stale listener). Sign-out tears
/// the session down and clears both in-memory state and the cache blob.
/// A failed establish leaves the manager in local-only mode with a warning,
/// never a blocking error.
pub fn spawn_identity_watcher(
    manager: Arc<CellarManager>,
    remote: Arc<dyn RemoteStore>,
    mut events: mpsc::Receiver<AuthEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut session: Option<SyncSession> = None;

        while let Some(event) = events.recv().await {
            match event {
                AuthEvent::SignedIn { uid } => {
                    if let Some(previous) = session.take() {
                        previous.teardown().await;
                        manager.unbind_remote().await;
                    }
                    match SyncSession::establish(manager.clone(), remote.clone(), &uid).await {
                        Ok(established) => session = Some(established),
                        Err(e) => {
                            warn!("Remote unavailable for {}, staying local-only: {}", uid, e);
                        }
                    }
                }
                AuthEvent::SignedOut => {
                    if let Some(previous) = session.take() {
                        previous.teardown().await;
                    }
                    manager.unbind_remote().await;
                    manager.clear(true).await;
                    info!("Signed out, local state cleared");
                }
            }
        }
    })
}
