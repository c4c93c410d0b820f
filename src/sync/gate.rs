//! Echo-suppression gate.
//!
//! Pushing a local mutation to the remote channel makes that channel fan the
//! same change straight back to the pushing client's own snapshot listener.
//! The gate is a single shared flag raised **before** a remote write starts
//! and lowered only after a trailing grace window following the write's
//! confirmed completion, because the fan-out is asynchronous and can arrive
//! after the write call itself resolves. While the gate is up, the snapshot
//! listener drops inbound snapshots unprocessed.
//!
//! This is a timing heuristic, not a causal guarantee: a server-assigned
//! revision compared on receipt would close the race window that the grace
//! delay only shrinks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_GRACE: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(30);

pub struct EchoGate {
    /// Barrier flag: up while a remote write (plus its grace window) is in
    /// flight.
    engaged: AtomicBool,
    /// Monotonic token for write operations. A release only lowers the gate
    /// if no newer engage has happened since.
    current_write: AtomicU64,
    /// When the gate last went up, for stale-barrier detection.
    engaged_at: Mutex<Option<Instant>>,
    grace: Duration,
    max_hold: Duration,
}

impl EchoGate {
    pub fn new(grace: Duration, max_hold: Duration) -> Self {
        Self {
            engaged: AtomicBool::new(false),
            current_write: AtomicU64::new(0),
            engaged_at: Mutex::new(None),
            grace,
            max_hold,
        }
    }

    /// Raise the gate before initiating a remote write. Returns the token to
    /// hand back to [`EchoGate::release`] once the write has completed.
    pub fn engage(&self) -> u64 {
        let token = self.current_write.fetch_add(1, Ordering::SeqCst) + 1;
        self.engaged.store(true, Ordering::SeqCst);
        *self.engaged_at.lock().expect("gate clock poisoned") = Some(Instant::now());
        token
    }

    /// Schedule the gate to drop after the grace window. Called only after
    /// the remote write has resolved. If a newer write engaged the gate in
    /// the meantime, this release is a no-op and the newer write's release
    /// will lower it.
    pub fn release(self: &Arc<Self>, token: u64) {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(gate.grace).await;
            if gate.current_write.load(Ordering::SeqCst) == token {
                gate.engaged.store(false, Ordering::SeqCst);
                *gate.engaged_at.lock().expect("gate clock poisoned") = None;
                debug!("Echo gate released (write {})", token);
            }
        });
    }

    /// Whether inbound snapshots should currently be dropped. A gate held
    /// past the max-hold ceiling reports disengaged, so a write that never
    /// resolved cannot wedge sync forever.
    pub fn is_engaged(&self) -> bool {
        if !self.engaged.load(Ordering::SeqCst) {
            return false;
        }
        let engaged_at = *self.engaged_at.lock().expect("gate clock poisoned");
        match engaged_at {
            Some(at) if at.elapsed() > self.max_hold => {
                warn!("Echo gate held past max-hold, treating as stale");
                false
            }
            _ => true,
        }
    }
}

impl Default for EchoGate {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE, DEFAULT_MAX_HOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_stays_up_through_grace_window() {
        let gate = Arc::new(EchoGate::new(
            Duration::from_millis(40),
            Duration::from_secs(5),
        ));

        let token = gate.engage();
        assert!(gate.is_engaged());

        gate.release(token);
        // Still up immediately after release: the fan-out may lag the write.
        assert!(gate.is_engaged());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!gate.is_engaged());
    }

    #[tokio::test]
    async fn test_newer_write_outlives_older_release() {
        let gate = Arc::new(EchoGate::new(
            Duration::from_millis(30),
            Duration::from_secs(5),
        ));

        let first = gate.engage();
        gate.release(first);
        let second = gate.engage();

        tokio::time::sleep(Duration::from_millis(60)).await;
        // First release fired during a newer write: gate must still be up.
        assert!(gate.is_engaged());

        gate.release(second);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!gate.is_engaged());
    }

    #[tokio::test]
    async fn test_stale_gate_reports_disengaged() {
        let gate = Arc::new(EchoGate::new(
            Duration::from_secs(60),
            Duration::from_millis(20),
        ));

        let _token = gate.engage();
        assert!(gate.is_engaged());

        tokio::time::sleep(Duration::from_millis(50)).await;
        // Release never happened; max-hold keeps sync from wedging.
        assert!(!gate.is_engaged());
    }
}
