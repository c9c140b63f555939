//! Snapshots: immutable captures of every manager's current value.

mod reactivation;
pub mod transport;

pub use reactivation::Reactivation;
pub use transport::TransportSnapshot;

use crate::error::PropagationError;
use crate::manager::{ContextManager, Value};
use crate::registry::{Registry, TimerList};
use crate::timer::{self, SNAPSHOT_CATEGORY};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Value captured for one manager.
#[derive(Clone)]
pub enum CapturedValue {
    Present(Value),
    Absent,
    /// The manager failed while being queried. Reactivated as "no value".
    Failed,
}

impl CapturedValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            CapturedValue::Present(value) => Some(value),
            CapturedValue::Absent | CapturedValue::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CapturedValue::Failed)
    }
}

impl fmt::Debug for CapturedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedValue::Present(_) => write!(f, "Present(..)"),
            CapturedValue::Absent => write!(f, "Absent"),
            CapturedValue::Failed => write!(f, "Failed"),
        }
    }
}

/// One (manager, captured value) pair.
#[derive(Clone)]
pub struct SnapshotEntry {
    manager: Arc<dyn ContextManager>,
    value: CapturedValue,
}

impl SnapshotEntry {
    pub(crate) fn new(manager: Arc<dyn ContextManager>, value: CapturedValue) -> Self {
        SnapshotEntry { manager, value }
    }

    pub fn manager(&self) -> &Arc<dyn ContextManager> {
        &self.manager
    }

    pub fn value(&self) -> &CapturedValue {
        &self.value
    }
}

impl fmt::Debug for SnapshotEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotEntry")
            .field("manager", &self.manager.name())
            .field("value", &self.value)
            .finish()
    }
}

/// Immutable capture of every registered manager's value at one instant.
///
/// Cheap to clone and safe to share across threads. Reactivating it on a
/// thread makes that thread observe the captured values until the returned
/// [`Reactivation`] is closed.
#[derive(Clone)]
pub struct Snapshot {
    entries: Arc<[SnapshotEntry]>,
    registry: Arc<Registry>,
    timers: TimerList,
}

impl Snapshot {
    pub(crate) fn new(entries: Vec<SnapshotEntry>, registry: Arc<Registry>, timers: TimerList) -> Self {
        Snapshot {
            entries: entries.into(),
            registry,
            timers,
        }
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Captured value for the manager with the given name.
    pub fn captured(&self, manager: &str) -> Option<&CapturedValue> {
        self.entries
            .iter()
            .find(|entry| entry.manager.name() == manager)
            .map(|entry| &entry.value)
    }

    /// Typed view of a captured value.
    pub fn get<T: 'static>(&self, manager: &str) -> Option<&T> {
        self.captured(manager)?.value()?.downcast_ref::<T>()
    }

    /// Activate every captured value on the calling thread, in capture order.
    ///
    /// If any activation fails, the contexts opened by this call are closed in
    /// reverse order, the registry cache is cleared and the activation error is
    /// returned with any close errors attached.
    pub fn reactivate(&self) -> Result<Reactivation, PropagationError> {
        let started = Instant::now();
        let result = self.activate_all();
        let error = result
            .as_ref()
            .err()
            .map(|e| e as &(dyn std::error::Error + 'static));
        timer::report(
            &self.timers,
            SNAPSHOT_CATEGORY,
            "reactivate",
            started.elapsed(),
            error,
        );
        result
    }

    fn activate_all(&self) -> Result<Reactivation, PropagationError> {
        let mut reactivation = Reactivation::with_capacity(self.entries.len());
        for entry in self.entries.iter() {
            let manager = &entry.manager;
            let value = entry.value.value().cloned();
            let activated = timer::timed(&self.timers, manager.name(), "activate", || {
                manager.activate(value)
            });
            match activated {
                Ok(context) => reactivation.push(manager.name(), context),
                Err(source) => {
                    let mut error = PropagationError::Activate {
                        manager: manager.name().to_string(),
                        source,
                        suppressed: Vec::new(),
                    };
                    for close_error in reactivation.unwind() {
                        error.add_suppressed(close_error);
                    }
                    self.registry.clear();
                    return Err(error);
                }
            }
        }
        Ok(reactivation)
    }

    /// Run `work` inside a reactivation of this snapshot.
    ///
    /// The reactivation is closed when `work` returns and also when it
    /// panics. A close error replaces the output of `work`.
    pub fn call<F, R>(&self, work: F) -> Result<R, PropagationError>
    where
        F: FnOnce() -> R,
    {
        let mut reactivation = self.reactivate()?;
        let output = work();
        reactivation.close()?;
        Ok(output)
    }

    /// Wrap `work` so that it runs inside a reactivation of this snapshot
    /// wherever it is eventually executed.
    pub fn wrap<F, R>(&self, work: F) -> impl FnOnce() -> Result<R, PropagationError>
    where
        F: FnOnce() -> R,
    {
        let snapshot = self.clone();
        move || snapshot.call(work)
    }

    /// Spawn a thread that inherits this snapshot.
    pub fn spawn<F, R>(&self, work: F) -> JoinHandle<Result<R, PropagationError>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        std::thread::spawn(self.wrap(work))
    }

    /// Transportable form holding only values whose manager can encode them.
    ///
    /// Values that fail to encode are logged and left out.
    pub fn to_transport(&self) -> TransportSnapshot {
        transport::encode(&self.entries)
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("entries", &self.entries)
            .finish()
    }
}
