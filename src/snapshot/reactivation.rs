//! Thread-local replay of a snapshot.

use crate::error::{first_with_suppressed, PropagationError};
use crate::manager::Context;
use std::fmt;
use tracing::warn;

struct Activated {
    manager: String,
    context: Box<dyn Context>,
}

/// Contexts opened by [`Snapshot::reactivate`](crate::Snapshot::reactivate).
///
/// Must be closed on the thread that created it (the type is not `Send`).
/// Closing runs in reverse activation order and is idempotent. Dropping an
/// open reactivation closes it and logs any error.
pub struct Reactivation {
    contexts: Vec<Activated>,
    closed: bool,
}

impl Reactivation {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Reactivation {
            contexts: Vec::with_capacity(capacity),
            closed: false,
        }
    }

    pub(crate) fn push(&mut self, manager: &str, context: Box<dyn Context>) {
        self.contexts.push(Activated {
            manager: manager.to_string(),
            context,
        });
    }

    /// Number of activated contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close every context, newest first, even when some of them fail.
    ///
    /// The first failure is returned with the later ones attached.
    pub fn close(&mut self) -> Result<(), PropagationError> {
        first_with_suppressed(self.unwind())
    }

    /// Close every context in reverse order and collect the failures.
    pub(crate) fn unwind(&mut self) -> Vec<PropagationError> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;

        let mut errors = Vec::new();
        for activated in self.contexts.iter_mut().rev() {
            if let Err(source) = activated.context.close() {
                errors.push(PropagationError::Close {
                    manager: activated.manager.clone(),
                    source,
                    suppressed: Vec::new(),
                });
            }
        }
        errors
    }
}

impl Drop for Reactivation {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close() {
            warn!(
                manager = err.manager().unwrap_or("unknown"),
                error = %err,
                suppressed = err.suppressed().len(),
                "failed to close dropped reactivation"
            );
        }
    }
}

impl fmt::Debug for Reactivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let managers: Vec<&str> = self.contexts.iter().map(|a| a.manager.as_str()).collect();
        f.debug_struct("Reactivation")
            .field("managers", &managers)
            .field("closed", &self.closed)
            .finish()
    }
}
