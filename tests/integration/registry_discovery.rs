//! Integration tests for discovery scopes, plugin manifests and cache behavior

use crate::integration::test_utils::{candidate, propagator_for, CountingDiscovery, ScriptedManager};
use context_relay::config::DiscoveryConfig;
use context_relay::manager::{ContextManager, NestedContextManager};
use context_relay::registry::{
    Candidate, DiscoveryScope, FactoryCatalog, ManifestDiscovery, Registry, StaticDiscovery,
};
use context_relay::timer::{Timer, TracingTimer};
use context_relay::{ContextPropagator, DiscoveryError, PropagationError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn names(registry: &Registry) -> Vec<String> {
    registry
        .managers()
        .unwrap()
        .iter()
        .map(|m| m.name().to_string())
        .collect()
}

fn catalog(constructed: Arc<AtomicUsize>) -> FactoryCatalog {
    let mut catalog = FactoryCatalog::new();
    for name in ["locale", "tenant", "user", "trace"] {
        let constructed = constructed.clone();
        catalog = catalog.manager(name, move || {
            constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NestedContextManager::<String>::new(name)) as Arc<dyn ContextManager>)
        });
    }
    catalog
        .manager("broken", || {
            Err(DiscoveryError::Construction {
                name: "broken".to_string(),
                reason: "missing backend".to_string(),
            })
        })
        .timer("tracing", || Ok(Arc::new(TracingTimer) as Arc<dyn Timer>))
}

#[test]
fn test_manifest_directory_drives_priority_order() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("10-core.toml"),
        r#"
[[managers]]
name = "user"

[[managers]]
name = "trace"
priority = -1

[[timers]]
name = "tracing"
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("20-extra.toml"),
        r#"
[[managers]]
name = "tenant"
priority = 5

[[managers]]
name = "locale"
priority = 0

[[managers]]
name = "broken"

[[managers]]
name = "not-in-catalog"
"#,
    )
    .unwrap();

    let constructed = Arc::new(AtomicUsize::new(0));
    let registry = Registry::from_config(
        &DiscoveryConfig {
            scope: None,
            plugin_dir: Some(dir.path().to_path_buf()),
        },
        Arc::new(ManifestDiscovery::new(catalog(constructed.clone()))),
    );

    assert_eq!(names(&registry), vec!["locale", "tenant", "user", "trace"]);
    assert_eq!(registry.timers().unwrap().len(), 1);

    names(&registry);
    assert_eq!(constructed.load(Ordering::SeqCst), 4);

    registry.reload().unwrap();
    assert_eq!(constructed.load(Ordering::SeqCst), 8);
}

#[test]
fn test_default_plugin_dir_used_without_scope() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("m.toml"), "[[managers]]\nname = \"locale\"\n").unwrap();

    let discovery = ManifestDiscovery::new(catalog(Arc::new(AtomicUsize::new(0))))
        .with_default_dir(dir.path());
    let registry = Registry::new(Arc::new(discovery));
    assert_eq!(names(&registry), vec!["locale"]);
}

#[test]
fn test_missing_plugin_dir_degrades_to_empty_capture() {
    let discovery = ManifestDiscovery::new(catalog(Arc::new(AtomicUsize::new(0))));
    let registry = Registry::new(Arc::new(discovery)).shared();
    registry.set_scope(Some(DiscoveryScope::Path("/no/such/plugins".into())));

    let snapshot = ContextPropagator::new(registry.clone()).capture().unwrap();
    assert!(snapshot.is_empty());
    assert!(registry.lookup_managers().is_err());
}

#[test]
fn test_scope_change_invalidates_and_switches_lists() {
    let global = ScriptedManager::new("global");
    let scoped = ScriptedManager::new("scoped");
    let discovery = StaticDiscovery::new();
    discovery
        .register_manager(candidate(&global))
        .register_manager_in_scope("tenant-a", candidate(&scoped));
    let registry = Registry::new(Arc::new(discovery));

    assert_eq!(names(&registry), vec!["global"]);
    let before = registry.managers().unwrap();

    registry.set_scope(Some(DiscoveryScope::Named("tenant-a".to_string())));
    assert_eq!(names(&registry), vec!["global", "scoped"]);

    registry.set_scope(None);
    let after = registry.managers().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(names(&registry), vec!["global"]);
}

#[test]
fn test_unsupported_scope_fails_capture() {
    let a = ScriptedManager::new("a");
    let propagator = propagator_for(&[&a]);
    let registry = propagator.registry().clone();
    registry.timers().unwrap();

    registry.set_scope(Some(DiscoveryScope::Path("/plugins".into())));
    let err = propagator.capture().unwrap_err();
    assert!(matches!(
        err,
        PropagationError::Discovery(DiscoveryError::UnsupportedScope(_))
    ));

    registry.set_scope(None);
    assert_eq!(propagator.capture().unwrap().len(), 1);
}

#[test]
fn test_registrations_after_caching_need_reload() {
    let discovery = Arc::new(StaticDiscovery::new());
    let registry = Registry::new(discovery.clone());
    assert!(names(&registry).is_empty());

    discovery.register_manager(Candidate::manager(NestedContextManager::<u8>::new("late")));
    assert!(names(&registry).is_empty());

    registry.reload().unwrap();
    assert_eq!(names(&registry), vec!["late"]);
}

#[test]
fn test_failed_reactivation_invalidates_cache() {
    let a = ScriptedManager::new("a");
    let b = ScriptedManager::new("b");
    let discovery = CountingDiscovery::with_managers(&[&a, &b]);
    let registry = Registry::new(discovery.clone()).shared();
    let propagator = ContextPropagator::new(registry.clone());

    let snapshot = propagator.capture().unwrap();
    registry.managers().unwrap();
    assert_eq!(discovery.manager_passes(), 1);

    b.fail_activate.store(true, Ordering::SeqCst);
    snapshot.reactivate().unwrap_err();

    registry.managers().unwrap();
    assert_eq!(discovery.manager_passes(), 2);
}

#[test]
fn test_successful_round_trip_keeps_cache() {
    let a = ScriptedManager::new("a");
    let discovery = CountingDiscovery::with_managers(&[&a]);
    let propagator = ContextPropagator::new(Registry::new(discovery.clone()).shared());

    let _scope = a.enter("steady");
    propagator.capture().unwrap().call(|| ()).unwrap();
    propagator.capture().unwrap();
    assert_eq!(discovery.manager_passes(), 1);
    assert_eq!(discovery.timer_passes(), 1);
}

#[test]
fn test_capture_with_failing_manager_invalidates_cache() {
    let a = ScriptedManager::new("a");
    let b = ScriptedManager::new("b");
    let discovery = CountingDiscovery::with_managers(&[&a, &b]);
    let registry = Registry::new(discovery.clone()).shared();
    let propagator = ContextPropagator::new(registry.clone());

    propagator.capture().unwrap();
    assert_eq!(discovery.manager_passes(), 1);

    a.fail_current.store(true, Ordering::SeqCst);
    let snapshot = propagator.capture().unwrap();
    assert!(snapshot.captured("a").unwrap().is_failed());
    assert_eq!(discovery.manager_passes(), 1);

    registry.managers().unwrap();
    assert_eq!(discovery.manager_passes(), 2);
}

#[test]
fn test_failed_capture_lookup_invalidates_cache() {
    let a = ScriptedManager::new("a");
    let discovery = CountingDiscovery::with_managers(&[&a]);
    let registry = Registry::new(discovery.clone()).shared();
    let propagator = ContextPropagator::new(registry.clone());

    discovery.reject_managers.store(true, Ordering::SeqCst);
    let err = propagator.capture().unwrap_err();
    assert!(matches!(
        err,
        PropagationError::Discovery(DiscoveryError::UnsupportedScope(_))
    ));
    // timers were looked up and cached before the manager lookup failed
    assert_eq!(discovery.timer_passes(), 1);

    registry.timers().unwrap();
    assert_eq!(discovery.timer_passes(), 2);

    discovery.reject_managers.store(false, Ordering::SeqCst);
    assert_eq!(propagator.capture().unwrap().len(), 1);
}
