//! Fault injection for one device's connection.

use goalsync_sync_protocol::{RemoteError, RemoteResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Failures and delays injected into a device's remote calls.
///
/// Every call passes through [`FaultInjector::enter`], which waits for the
/// gate, counts the call, then fails it if the device is offline or signed
/// out.
#[derive(Debug)]
pub struct FaultInjector {
    offline: AtomicBool,
    auth_revoked: AtomicBool,
    rejected: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    gate: watch::Sender<bool>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FaultInjector {
    /// Creates an injector that lets everything through.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            offline: AtomicBool::new(false),
            auth_revoked: AtomicBool::new(false),
            rejected: Mutex::new(HashSet::new()),
            latency: Mutex::new(None),
            gate,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Makes every call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns true if calls fail with a network error.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Makes every call fail with revoked credentials.
    pub fn set_auth_revoked(&self, revoked: bool) {
        self.auth_revoked.store(revoked, Ordering::SeqCst);
    }

    /// Makes saves of this record name fail validation.
    pub fn reject(&self, record_name: impl Into<String>) {
        self.rejected.lock().insert(record_name.into());
    }

    /// Stops rejecting a record name.
    pub fn accept(&self, record_name: &str) {
        self.rejected.lock().remove(record_name);
    }

    /// Delays every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Holds every call at the gate until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// Releases held calls.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Number of calls made to an operation, including failed ones.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    /// Total calls made.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Runs the injected faults for one call.
    pub async fn enter(&self, operation: &'static str) -> RemoteResult<()> {
        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the gate cannot close under us.
        let _ = gate.wait_for(|open| *open).await;

        *self.calls.lock().entry(operation).or_insert(0) += 1;

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.is_offline() {
            return Err(RemoteError::Network("network unreachable".into()));
        }
        if self.auth_revoked.load(Ordering::SeqCst) {
            return Err(RemoteError::AuthRevoked("account signed out".into()));
        }
        Ok(())
    }

    /// Fails the save of a rejected record name.
    pub fn check_record(&self, record_name: &str) -> RemoteResult<()> {
        if self.rejected.lock().contains(record_name) {
            return Err(RemoteError::Rejected {
                reason: format!("{record_name} failed server validation"),
            });
        }
        Ok(())
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn passes_by_default() {
        let faults = FaultInjector::new();
        assert!(faults.enter("fetch").await.is_ok());
        assert_eq!(faults.calls("fetch"), 1);
        assert_eq!(faults.calls("save"), 0);
    }

    #[tokio::test]
    async fn offline_and_auth() {
        let faults = FaultInjector::new();
        faults.set_offline(true);
        assert!(faults.enter("save").await.unwrap_err().is_transient());

        faults.set_offline(false);
        faults.set_auth_revoked(true);
        assert!(matches!(
            faults.enter("save").await,
            Err(RemoteError::AuthRevoked(_))
        ));
        assert_eq!(faults.total_calls(), 2);
    }

    #[test]
    fn rejected_names() {
        let faults = FaultInjector::new();
        faults.reject("G1");
        assert!(faults.check_record("G1").is_err());
        assert!(faults.check_record("G2").is_ok());
        faults.accept("G1");
        assert!(faults.check_record("G1").is_ok());
    }

    #[tokio::test]
    async fn gate_holds_calls() {
        let faults = Arc::new(FaultInjector::new());
        faults.close_gate();

        let held = tokio::spawn({
            let faults = Arc::clone(&faults);
            async move { faults.enter("fetch_changed").await }
        });
        tokio::task::yield_now().await;
        assert_eq!(faults.calls("fetch_changed"), 0);

        faults.open_gate();
        assert!(held.await.unwrap().is_ok());
        assert_eq!(faults.calls("fetch_changed"), 1);
    }
}
