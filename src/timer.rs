//! Timer observers: duration and error callbacks for every propagation step.

use crate::error::TimerError;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Category used for snapshot-level operations.
pub const SNAPSHOT_CATEGORY: &str = "snapshot";

/// Purely observational callback. Failures are logged and never affect the
/// observed operation.
pub trait Timer: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn update(
        &self,
        category: &str,
        operation: &str,
        duration: Duration,
        error: Option<&(dyn Error + 'static)>,
    ) -> Result<(), TimerError>;
}

/// Emits one `trace!` event per update.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTimer;

impl Timer for TracingTimer {
    fn name(&self) -> &str {
        "tracing"
    }

    fn update(
        &self,
        category: &str,
        operation: &str,
        duration: Duration,
        error: Option<&(dyn Error + 'static)>,
    ) -> Result<(), TimerError> {
        match error {
            Some(err) => trace!(
                category,
                operation,
                duration_ns = duration.as_nanos() as u64,
                error = %err,
                "context operation failed"
            ),
            None => trace!(
                category,
                operation,
                duration_ns = duration.as_nanos() as u64,
                "context operation completed"
            ),
        }
        Ok(())
    }
}

/// Run `op` and report its duration and outcome to every timer.
pub(crate) fn timed<R, E>(
    timers: &[Arc<dyn Timer>],
    category: &str,
    operation: &str,
    op: impl FnOnce() -> Result<R, E>,
) -> Result<R, E>
where
    E: Error + 'static,
{
    if timers.is_empty() {
        return op();
    }
    let started = Instant::now();
    let result = op();
    let elapsed = started.elapsed();
    let error = result.as_ref().err().map(|e| e as &(dyn Error + 'static));
    report(timers, category, operation, elapsed, error);
    result
}

pub(crate) fn report(
    timers: &[Arc<dyn Timer>],
    category: &str,
    operation: &str,
    duration: Duration,
    error: Option<&(dyn Error + 'static)>,
) {
    for timer in timers {
        if let Err(err) = timer.update(category, operation, duration, error) {
            warn!(
                timer = %timer.name(),
                category,
                operation,
                error = %err,
                "timer observer failed"
            );
        }
    }
}
