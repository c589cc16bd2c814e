//! Dependency gates.
//!
//! # Responsibilities
//! - Let a producer announce "my resource is usable" under its name
//! - Let dependents block (without spinning) until that announcement
//! - Re-arm when the producer stops so a later start cycle gates again
//!
//! # Design Decisions
//! - Gates are `watch` channels: an open is never missed, whether the
//!   dependent starts waiting before or after it
//! - Startup order is never declared centrally; it emerges from gate waits
//! - Waits are bounded by an optional timeout and always by shutdown

use std::sync::Arc;
use std::time::Duration;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;

use crate::lifecycle::shutdown::ShutdownSignal;

/// Errors from waiting on a gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The gate did not open within the configured bound.
    #[error("dependency <{gate}> not ready after {after:?}")]
    Timeout { gate: String, after: Duration },

    /// Shutdown fired while waiting.
    #[error("wait for dependency <{gate}> cancelled by shutdown")]
    Cancelled { gate: String },
}

/// A re-armable readiness gate for one named dependency.
#[derive(Clone, Debug)]
pub struct DependencyGate {
    name: Arc<str>,
    tx: Arc<watch::Sender<bool>>,
}

impl DependencyGate {
    /// Create a closed gate.
    pub fn new(name: &str) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            name: Arc::from(name),
            tx: Arc::new(tx),
        }
    }

    /// Name of the dependency this gate guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open the gate, waking every waiter. Idempotent.
    pub fn open(&self) {
        let opened = self.tx.send_if_modified(|open| {
            if *open {
                false
            } else {
                *open = true;
                true
            }
        });
        if opened {
            tracing::debug!(gate = %self.name, "Dependency gate opened");
        }
    }

    /// Close the gate for the next start cycle.
    pub fn reset(&self) {
        let closed = self.tx.send_if_modified(|open| std::mem::replace(open, false));
        if closed {
            tracing::debug!(gate = %self.name, "Dependency gate reset");
        }
    }

    /// Whether the gate is currently open.
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is open.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Wait until the gate is open, giving up after `timeout` (if any) or
    /// when `shutdown` closes.
    pub async fn wait_with(
        &self,
        timeout: Option<Duration>,
        shutdown: &ShutdownSignal,
    ) -> Result<(), GateError> {
        let bounded = async {
            match timeout {
                Some(after) => tokio::time::timeout(after, self.wait())
                    .await
                    .map_err(|_| GateError::Timeout {
                        gate: self.name.to_string(),
                        after,
                    }),
                None => {
                    self.wait().await;
                    Ok(())
                }
            }
        };

        tokio::select! {
            biased;
            result = bounded => result,
            _ = shutdown.done() => Err(GateError::Cancelled {
                gate: self.name.to_string(),
            }),
        }
    }
}

/// Gates keyed by dependency name.
#[derive(Clone, Default)]
pub struct DependencyGates {
    gates: Arc<DashMap<String, DependencyGate>>,
}

impl DependencyGates {
    /// Create an empty set of gates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate for `name`, created closed if absent.
    pub fn gate(&self, name: &str) -> DependencyGate {
        self.gates
            .entry(name.to_string())
            .or_insert_with(|| DependencyGate::new(name))
            .clone()
    }

    /// Open the gate for `name`.
    pub fn open(&self, name: &str) {
        self.gate(name).open();
    }

    /// Reset the gate for `name`.
    pub fn reset(&self, name: &str) {
        self.gate(name).reset();
    }

    /// Whether the gate for `name` is open. Unknown gates are closed.
    pub fn is_open(&self, name: &str) -> bool {
        self.gates.get(name).map(|g| g.is_open()).unwrap_or(false)
    }

    /// Names of every known gate.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.gates.iter().map(|g| g.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_after_open_returns_immediately() {
        let gate = DependencyGate::new("DataDB");
        gate.open();
        gate.open();
        tokio::time::timeout(Duration::from_millis(50), gate.wait())
            .await
            .expect("open gate must not block");
    }

    #[tokio::test]
    async fn test_wait_before_open_is_woken() {
        let gates = DependencyGates::new();
        let waiter = {
            let gate = gates.gate("DataDB");
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gates.open("DataDB");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reset_rearms_gate() {
        let gates = DependencyGates::new();
        gates.open("AttributeS");
        assert!(gates.is_open("AttributeS"));

        gates.reset("AttributeS");
        assert!(!gates.is_open("AttributeS"));
        let shutdown = ShutdownSignal::new();
        let result = gates
            .gate("AttributeS")
            .wait_with(Some(Duration::from_millis(20)), &shutdown)
            .await;
        assert!(matches!(result, Err(GateError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_wait_cancelled_by_shutdown() {
        let gate = DependencyGate::new("DataDB");
        let shutdown = ShutdownSignal::new();
        let waiter = {
            let gate = gate.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { gate.wait_with(None, &shutdown).await })
        };

        shutdown.close_once();
        let result = waiter.await.unwrap();
        assert_eq!(
            result,
            Err(GateError::Cancelled {
                gate: "DataDB".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_gate_is_closed() {
        let gates = DependencyGates::new();
        assert!(!gates.is_open("missing"));
        assert!(gates.names().is_empty());
    }
}
