//! Shared test utilities for integration tests
//!
//! Scriptable managers and timers whose failures can be switched on per test,
//! plus environment isolation for configuration tests.

use context_relay::error::{DiscoveryError, ManagerError, TimerError};
use context_relay::manager::{Context, ContextManager, ValueManager};
use context_relay::registry::{
    Candidate, Discovered, Discovery, DiscoveryScope, Registry, StaticDiscovery,
};
use context_relay::stack::{NestedContext, NestedStack};
use context_relay::timer::Timer;
use context_relay::ContextPropagator;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// String-valued manager whose operations can be made to fail.
pub struct ScriptedManager {
    stack: NestedStack<String>,
    pub fail_current: AtomicBool,
    pub fail_activate: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_clear: AtomicBool,
    pub activations: AtomicUsize,
}

impl ScriptedManager {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(ScriptedManager {
            stack: NestedStack::new(name),
            fail_current: AtomicBool::new(false),
            fail_activate: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            activations: AtomicUsize::new(0),
        })
    }

    /// Open a scope directly, bypassing any snapshot.
    pub fn enter(&self, value: &str) -> NestedContext<String> {
        self.stack.activate(Some(value.to_string())).unwrap()
    }

    pub fn get(&self) -> Option<String> {
        self.stack.current()
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }
}

struct ScriptedContext {
    inner: NestedContext<String>,
    fail: bool,
}

impl Context for ScriptedContext {
    fn close(&mut self) -> Result<(), ManagerError> {
        let was_open = !self.inner.is_closed();
        self.inner.close();
        if was_open && self.fail {
            Err(ManagerError::failed("scripted close failure"))
        } else {
            Ok(())
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl ValueManager for ScriptedManager {
    type Value = String;

    fn name(&self) -> &str {
        self.stack.name()
    }

    fn activate(&self, value: Option<String>) -> Result<Box<dyn Context>, ManagerError> {
        if self.fail_activate.load(Ordering::SeqCst) {
            return Err(ManagerError::failed("scripted activate failure"));
        }
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedContext {
            inner: self.stack.activate(value)?,
            fail: self.fail_close.load(Ordering::SeqCst),
        }))
    }

    fn current_value(&self) -> Result<Option<String>, ManagerError> {
        if self.fail_current.load(Ordering::SeqCst) {
            return Err(ManagerError::failed("scripted capture failure"));
        }
        Ok(self.stack.current())
    }

    fn clear(&self) -> Result<(), ManagerError> {
        self.stack.clear();
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(ManagerError::failed("scripted clear failure"));
        }
        Ok(())
    }
}

/// Candidate yielding the shared manager instance.
pub fn candidate(manager: &Arc<ScriptedManager>) -> Candidate<dyn ContextManager> {
    let shared = manager.clone();
    let name = ValueManager::name(manager.as_ref()).to_string();
    Candidate::from_factory(name, move || Ok(shared.clone() as Arc<dyn ContextManager>))
}

/// Propagator over an explicit registration of the given managers.
pub fn propagator_for(managers: &[&Arc<ScriptedManager>]) -> ContextPropagator {
    let discovery = StaticDiscovery::new();
    for manager in managers {
        discovery.register_manager(candidate(manager));
    }
    ContextPropagator::new(Registry::new(Arc::new(discovery)).shared())
}

/// Explicit registration that counts discovery passes. Manager discovery can
/// be switched to reject every scope.
#[derive(Default)]
pub struct CountingDiscovery {
    pub inner: StaticDiscovery,
    pub manager_passes: AtomicUsize,
    pub timer_passes: AtomicUsize,
    pub reject_managers: AtomicBool,
}

impl CountingDiscovery {
    pub fn with_managers(managers: &[&Arc<ScriptedManager>]) -> Arc<Self> {
        let discovery = CountingDiscovery::default();
        for manager in managers {
            discovery.inner.register_manager(candidate(manager));
        }
        Arc::new(discovery)
    }

    pub fn manager_passes(&self) -> usize {
        self.manager_passes.load(Ordering::SeqCst)
    }

    pub fn timer_passes(&self) -> usize {
        self.timer_passes.load(Ordering::SeqCst)
    }
}

impl Discovery for CountingDiscovery {
    fn managers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn ContextManager>, DiscoveryError> {
        self.manager_passes.fetch_add(1, Ordering::SeqCst);
        if self.reject_managers.load(Ordering::SeqCst) {
            return Err(DiscoveryError::UnsupportedScope(format!("rejected {}", scope)));
        }
        self.inner.managers(scope)
    }

    fn timers(&self, scope: &DiscoveryScope) -> Result<Discovered<dyn Timer>, DiscoveryError> {
        self.timer_passes.fetch_add(1, Ordering::SeqCst);
        self.inner.timers(scope)
    }
}

/// One recorded timer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub category: String,
    pub operation: String,
    pub failed: bool,
}

impl Update {
    pub fn new(category: &str, operation: &str, failed: bool) -> Self {
        Update {
            category: category.to_string(),
            operation: operation.to_string(),
            failed,
        }
    }
}

#[derive(Default)]
pub struct RecordingTimer {
    pub updates: Mutex<Vec<Update>>,
}

impl RecordingTimer {
    pub fn take(&self) -> Vec<Update> {
        std::mem::take(&mut *self.updates.lock().unwrap())
    }
}

impl Timer for RecordingTimer {
    fn name(&self) -> &str {
        "recording"
    }

    fn update(
        &self,
        category: &str,
        operation: &str,
        _duration: Duration,
        error: Option<&(dyn Error + 'static)>,
    ) -> Result<(), TimerError> {
        self.updates
            .lock()
            .unwrap()
            .push(Update::new(category, operation, error.is_some()));
        Ok(())
    }
}

pub struct FailingTimer;

impl Timer for FailingTimer {
    fn name(&self) -> &str {
        "failing"
    }

    fn update(
        &self,
        _category: &str,
        _operation: &str,
        _duration: Duration,
        _error: Option<&(dyn Error + 'static)>,
    ) -> Result<(), TimerError> {
        Err(TimerError {
            timer: "failing".to_string(),
            reason: "observer unavailable".to_string(),
        })
    }
}

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "CTXRELAY__DISCOVERY__SCOPE",
    "CTXRELAY__DISCOVERY__PLUGIN_DIR",
    "CTXRELAY__LOGGING__LEVEL",
];

/// Run `f` with HOME and XDG_CONFIG_HOME inside `test_dir` and the relay
/// environment variables cleared; everything is restored afterwards.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    for name in ISOLATED_VARS {
        std::env::remove_var(name);
    }
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&home).unwrap();
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path().join("config"));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }
    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
