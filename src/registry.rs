//! Capability Registry
//!
//! Discovers, caches, invalidates and priority-orders context managers and
//! timer observers. Cached lists are immutable and keyed by discovery scope,
//! so concurrent readers observe either a complete old list or a complete new
//! one. Two racing cache misses may both compute a list; the last insert wins.

pub mod discovery;
pub mod manifest;
pub mod order;

pub use discovery::{Candidate, Discovered, Discovery, Factory, StaticDiscovery};
pub use manifest::{
    plan, read_manifest_dir, FactoryCatalog, InvalidManifest, Manifest, ManifestDiscovery,
    ManifestEntry, ManifestFile, ManifestPlan, PlannedEntry,
};

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::manager::ContextManager;
use crate::timer::Timer;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered, immutable list of managers.
pub type ManagerList = Arc<[Arc<dyn ContextManager>]>;

/// Ordered, immutable list of timers.
pub type TimerList = Arc<[Arc<dyn Timer>]>;

/// Root used when searching for implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum DiscoveryScope {
    #[default]
    Default,
    Named(String),
    Path(PathBuf),
}

impl fmt::Display for DiscoveryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryScope::Default => write!(f, "default"),
            DiscoveryScope::Named(name) => write!(f, "named:{}", name),
            DiscoveryScope::Path(path) => write!(f, "path:{}", path.display()),
        }
    }
}

/// Construct every candidate, skipping failed entries, then order by priority.
fn resolve<T: ?Sized>(kind: &str, discovered: Discovered<T>) -> Vec<Arc<T>> {
    let mut constructed = Vec::with_capacity(discovered.len());
    for entry in discovered {
        let candidate = match entry {
            Ok(candidate) => candidate,
            Err(err) => {
                warn!(kind, error = %err, "skipping undiscoverable entry");
                continue;
            }
        };
        match candidate.construct() {
            Ok(instance) => constructed.push((candidate.priority(), instance)),
            Err(err) => warn!(
                kind,
                name = %candidate.name(),
                error = %err,
                "skipping entry that failed to construct"
            ),
        }
    }
    order::by_priority(constructed)
}

fn cached<T: ?Sized>(
    cache: &DashMap<DiscoveryScope, Arc<[Arc<T>]>>,
    kind: &str,
    scope: DiscoveryScope,
    discover: impl FnOnce(&DiscoveryScope) -> Result<Discovered<T>, DiscoveryError>,
) -> Result<Arc<[Arc<T>]>, DiscoveryError> {
    if let Some(hit) = cache.get(&scope) {
        return Ok(hit.value().clone());
    }

    match discover(&scope) {
        Ok(discovered) => {
            let list: Arc<[Arc<T>]> = resolve(kind, discovered).into();
            debug!(kind, scope = %scope, entries = list.len(), "populated registry cache");
            cache.insert(scope, list.clone());
            Ok(list)
        }
        Err(DiscoveryError::UnsupportedScope(reason)) => {
            Err(DiscoveryError::UnsupportedScope(reason))
        }
        Err(err) => {
            warn!(kind, scope = %scope, error = %err, "discovery failed; using empty list");
            Ok(Arc::from(Vec::new()))
        }
    }
}

/// Cached, invalidatable lookup of managers and timers.
pub struct Registry {
    discovery: Arc<dyn Discovery>,
    scope: Mutex<DiscoveryScope>,
    managers: DashMap<DiscoveryScope, ManagerList>,
    timers: DashMap<DiscoveryScope, TimerList>,
}

impl Registry {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Registry {
            discovery,
            scope: Mutex::new(DiscoveryScope::Default),
            managers: DashMap::new(),
            timers: DashMap::new(),
        }
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self::new(Arc::new(StaticDiscovery::new()))
    }

    /// Registry over `discovery` starting in the configured scope.
    pub fn from_config(config: &DiscoveryConfig, discovery: Arc<dyn Discovery>) -> Self {
        let registry = Self::new(discovery);
        registry.set_scope(config.initial_scope());
        registry
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn scope(&self) -> DiscoveryScope {
        self.scope.lock().clone()
    }

    /// Override the discovery scope process-wide; `None` resets to default.
    ///
    /// Setting the current scope again is a no-op; any other value
    /// invalidates every cached list.
    pub fn set_scope(&self, scope: Option<DiscoveryScope>) {
        let scope = scope.unwrap_or_default();
        let mut current = self.scope.lock();
        if *current == scope {
            return;
        }
        debug!(from = %current, to = %scope, "changing discovery scope");
        *current = scope;
        self.managers.clear();
        self.timers.clear();
    }

    /// Managers for the active scope, in priority order.
    ///
    /// Entries that cannot be discovered or constructed are skipped; a failed
    /// discovery mechanism yields an empty, uncached list. Only a scope the
    /// mechanism does not support is an error.
    pub fn managers(&self) -> Result<ManagerList, DiscoveryError> {
        let discovery = &self.discovery;
        cached(&self.managers, "manager", self.scope(), |scope| {
            discovery.managers(scope)
        })
    }

    /// Timers for the active scope, in priority order.
    pub fn timers(&self) -> Result<TimerList, DiscoveryError> {
        let discovery = &self.discovery;
        cached(&self.timers, "timer", self.scope(), |scope| {
            discovery.timers(scope)
        })
    }

    /// Uncached manager lookup. Mechanism failures propagate and clear the cache.
    pub fn lookup_managers(&self) -> Result<Vec<Arc<dyn ContextManager>>, DiscoveryError> {
        match self.discovery.managers(&self.scope()) {
            Ok(discovered) => Ok(resolve("manager", discovered)),
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Uncached timer lookup. Mechanism failures propagate and clear the cache.
    pub fn lookup_timers(&self) -> Result<Vec<Arc<dyn Timer>>, DiscoveryError> {
        match self.discovery.timers(&self.scope()) {
            Ok(discovered) => Ok(resolve("timer", discovered)),
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Registered manager with the given name, if any.
    pub fn manager_named(&self, name: &str) -> Result<Option<Arc<dyn ContextManager>>, DiscoveryError> {
        Ok(self
            .managers()?
            .iter()
            .find(|manager| manager.name() == name)
            .cloned())
    }

    /// Drop every cached list; the next access recomputes.
    pub fn clear(&self) {
        self.managers.clear();
        self.timers.clear();
        debug!("cleared registry cache");
    }

    /// Drop every cached list and repopulate the active scope.
    pub fn reload(&self) -> Result<(), DiscoveryError> {
        self.clear();
        self.managers()?;
        self.timers()?;
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("scope", &self.scope())
            .field("cached_scopes", &self.managers.len())
            .finish()
    }
}
