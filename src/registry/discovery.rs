//! Discovery seam and the explicit registration implementation.

use crate::error::DiscoveryError;
use crate::manager::ContextManager;
use crate::registry::DiscoveryScope;
use crate::timer::Timer;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Parameterless factory producing one implementation.
pub type Factory<T> = Arc<dyn Fn() -> Result<Arc<T>, DiscoveryError> + Send + Sync>;

/// Result of one discovery pass: per-entry failures are kept as `Err` items.
pub type Discovered<T> = Vec<Result<Candidate<T>, DiscoveryError>>;

/// A discovered implementation that has not been constructed yet.
pub struct Candidate<T: ?Sized> {
    name: String,
    priority: Option<i32>,
    factory: Factory<T>,
}

impl<T: ?Sized> Clone for Candidate<T> {
    fn clone(&self) -> Self {
        Candidate {
            name: self.name.clone(),
            priority: self.priority,
            factory: self.factory.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Candidate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

impl<T: ?Sized> Candidate<T> {
    pub fn from_factory<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<T>, DiscoveryError> + Send + Sync + 'static,
    {
        Candidate {
            name: name.into(),
            priority: None,
            factory: Arc::new(factory),
        }
    }

    pub(crate) fn with_factory(name: impl Into<String>, factory: Factory<T>) -> Self {
        Candidate {
            name: name.into(),
            priority: None,
            factory,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub(crate) fn set_priority(&mut self, priority: Option<i32>) {
        self.priority = priority;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    pub fn construct(&self) -> Result<Arc<T>, DiscoveryError> {
        (self.factory)()
    }
}

impl Candidate<dyn ContextManager> {
    /// Candidate that always yields the given manager instance.
    pub fn manager<M: ContextManager>(manager: M) -> Self {
        let name = manager.name().to_string();
        let instance: Arc<dyn ContextManager> = Arc::new(manager);
        Candidate::from_factory(name, move || Ok(instance.clone()))
    }
}

impl Candidate<dyn Timer> {
    /// Candidate that always yields the given timer instance.
    pub fn timer<T: Timer>(timer: T) -> Self {
        let name = timer.name().to_string();
        let instance: Arc<dyn Timer> = Arc::new(timer);
        Candidate::from_factory(name, move || Ok(instance.clone()))
    }
}

/// Source of manager and timer implementations for a scope.
///
/// Returning `Err` means the mechanism itself failed. Failures of a single
/// entry belong inside the returned list.
pub trait Discovery: Send + Sync {
    fn managers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn ContextManager>, DiscoveryError>;

    fn timers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn Timer>, DiscoveryError>;
}

struct Registration<T: ?Sized> {
    scope: Option<String>,
    candidate: Candidate<T>,
}

/// Explicit registration.
///
/// Default registrations are visible from every named scope; scoped
/// registrations only from their own scope. Path scopes are not supported.
#[derive(Default)]
pub struct StaticDiscovery {
    managers: RwLock<Vec<Registration<dyn ContextManager>>>,
    timers: RwLock<Vec<Registration<dyn Timer>>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_manager(&self, candidate: Candidate<dyn ContextManager>) -> &Self {
        self.managers.write().push(Registration {
            scope: None,
            candidate,
        });
        self
    }

    pub fn register_manager_in_scope(
        &self,
        scope: impl Into<String>,
        candidate: Candidate<dyn ContextManager>,
    ) -> &Self {
        self.managers.write().push(Registration {
            scope: Some(scope.into()),
            candidate,
        });
        self
    }

    pub fn register_timer(&self, candidate: Candidate<dyn Timer>) -> &Self {
        self.timers.write().push(Registration {
            scope: None,
            candidate,
        });
        self
    }

    pub fn register_timer_in_scope(
        &self,
        scope: impl Into<String>,
        candidate: Candidate<dyn Timer>,
    ) -> &Self {
        self.timers.write().push(Registration {
            scope: Some(scope.into()),
            candidate,
        });
        self
    }

    fn visible<T: ?Sized>(
        registrations: &[Registration<T>],
        scope: &DiscoveryScope,
    ) -> Result<Discovered<T>, DiscoveryError> {
        let name = match scope {
            DiscoveryScope::Default => None,
            DiscoveryScope::Named(name) => Some(name.as_str()),
            DiscoveryScope::Path(path) => {
                return Err(DiscoveryError::UnsupportedScope(format!(
                    "static registration has no plugin path ({})",
                    path.display()
                )))
            }
        };
        Ok(registrations
            .iter()
            .filter(|r| r.scope.is_none() || r.scope.as_deref() == name)
            .map(|r| Ok(r.candidate.clone()))
            .collect())
    }
}

impl Discovery for StaticDiscovery {
    fn managers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn ContextManager>, DiscoveryError> {
        Self::visible(&self.managers.read(), scope)
    }

    fn timers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn Timer>, DiscoveryError> {
        Self::visible(&self.timers.read(), scope)
    }
}
