//! Entry point for capturing and clearing context values.

use crate::error::{first_with_suppressed, PropagationError};
use crate::manager::ContextManager;
use crate::registry::{Registry, TimerList};
use crate::snapshot::{transport, CapturedValue, Snapshot, SnapshotEntry, TransportSnapshot};
use crate::timer::{self, SNAPSHOT_CATEGORY};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{info, warn};

/// Captures snapshots of every manager the registry knows about.
#[derive(Debug, Clone)]
pub struct ContextPropagator {
    registry: Arc<Registry>,
}

impl ContextPropagator {
    pub fn new(registry: Arc<Registry>) -> Self {
        ContextPropagator { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Timers for the active scope. Lookup failures only disable timing.
    fn timers(&self) -> TimerList {
        match self.registry.timers() {
            Ok(timers) => timers,
            Err(err) => {
                warn!(error = %err, "timer lookup failed; continuing without timers");
                Arc::from(Vec::new())
            }
        }
    }

    /// Capture the calling thread's value for every registered manager.
    ///
    /// A manager that fails to report its value is logged and recorded as
    /// [`CapturedValue::Failed`]; the capture still succeeds. Only a failing
    /// registry lookup fails the capture, after the registry cache is cleared.
    pub fn capture(&self) -> Result<Snapshot, PropagationError> {
        let timers = self.timers();
        let started = Instant::now();
        let result = self.capture_with(&timers);
        let error = result
            .as_ref()
            .err()
            .map(|e| e as &(dyn std::error::Error + 'static));
        timer::report(&timers, SNAPSHOT_CATEGORY, "capture", started.elapsed(), error);
        result
    }

    fn capture_with(&self, timers: &TimerList) -> Result<Snapshot, PropagationError> {
        let managers = match self.registry.managers() {
            Ok(managers) => managers,
            Err(err) => {
                self.registry.clear();
                return Err(err.into());
            }
        };
        if managers.is_empty() {
            info!("no context managers registered; capturing an empty snapshot");
        }

        let mut entries = Vec::with_capacity(managers.len());
        let mut any_failed = false;
        for manager in managers.iter() {
            let value = match timer::timed(timers, manager.name(), "current_value", || {
                manager.current_value()
            }) {
                Ok(Some(value)) => CapturedValue::Present(value),
                Ok(None) => CapturedValue::Absent,
                Err(err) => {
                    warn!(
                        manager = %manager.name(),
                        error = %err,
                        "failed to capture context value; it will reactivate as empty"
                    );
                    any_failed = true;
                    CapturedValue::Failed
                }
            };
            entries.push(SnapshotEntry::new(manager.clone(), value));
        }
        if any_failed {
            self.registry.clear();
        }
        Ok(Snapshot::new(entries, self.registry.clone(), timers.clone()))
    }

    /// Capture now and wrap `work` to run inside that capture later.
    pub fn wrap<F, R>(
        &self,
        work: F,
    ) -> Result<impl FnOnce() -> Result<R, PropagationError>, PropagationError>
    where
        F: FnOnce() -> R,
    {
        Ok(self.capture()?.wrap(work))
    }

    /// Spawn a thread that inherits the calling thread's context values.
    pub fn spawn<F, R>(&self, work: F) -> Result<JoinHandle<Result<R, PropagationError>>, PropagationError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.capture()?.spawn(work))
    }

    /// Clear every manager's active contexts on the calling thread.
    ///
    /// Every manager is cleared even when some fail; the first failure is
    /// returned with the rest attached.
    pub fn clear_active_contexts(&self) -> Result<(), PropagationError> {
        let managers = self.registry.managers()?;
        let timers = self.timers();
        let mut errors = Vec::new();
        for manager in managers.iter() {
            if let Err(source) = timer::timed(&timers, manager.name(), "clear", || manager.clear()) {
                errors.push(PropagationError::Clear {
                    manager: manager.name().to_string(),
                    source,
                    suppressed: Vec::new(),
                });
            }
        }
        first_with_suppressed(errors)
    }

    /// Rebuild a snapshot received from another process.
    pub fn snapshot_from_transport(&self, transport: TransportSnapshot) -> Result<Snapshot, PropagationError> {
        let entries = transport::decode(transport, &self.registry)?;
        Ok(Snapshot::new(entries, self.registry.clone(), self.timers()))
    }

    /// Parse and rebuild a JSON-encoded transport snapshot.
    pub fn snapshot_from_json(&self, json: &str) -> Result<Snapshot, PropagationError> {
        self.snapshot_from_transport(TransportSnapshot::from_json(json)?)
    }
}
