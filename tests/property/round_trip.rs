//! Property-based tests for capture and reactivation

use context_relay::manager::NestedContextManager;
use context_relay::registry::{Candidate, Registry, StaticDiscovery};
use context_relay::ContextPropagator;
use proptest::prelude::*;
use std::sync::Arc;

/// Whatever was visible at capture time is visible during reactivation, and
/// the later state comes back after close.
#[test]
fn test_reactivation_reproduces_captured_values() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec(prop::option::of(any::<u32>()), 1..6),
                prop::collection::vec(prop::option::of(any::<u32>()), 1..6),
            ),
            |(captured, later)| {
                let managers: Vec<NestedContextManager<u32>> = (0..captured.len())
                    .map(|i| NestedContextManager::new(format!("m{}", i)))
                    .collect();
                let discovery = StaticDiscovery::new();
                for manager in &managers {
                    discovery.register_manager(Candidate::manager(manager.clone()));
                }
                let propagator =
                    ContextPropagator::new(Registry::new(Arc::new(discovery)).shared());

                let snapshot = {
                    let _scopes: Vec<_> = managers
                        .iter()
                        .zip(&captured)
                        .filter_map(|(m, v)| v.map(|v| m.set(v).unwrap()))
                        .collect();
                    propagator.capture().unwrap()
                };
                let _later: Vec<_> = managers
                    .iter()
                    .zip(later.iter().cycle())
                    .filter_map(|(m, v)| v.map(|v| m.set(v).unwrap()))
                    .collect();
                let after: Vec<_> = managers.iter().map(|m| m.get()).collect();

                let mut reactivation = snapshot.reactivate().unwrap();
                let during: Vec<_> = managers.iter().map(|m| m.get()).collect();
                prop_assert_eq!(&during, &captured);

                reactivation.close().unwrap();
                let restored: Vec<_> = managers.iter().map(|m| m.get()).collect();
                prop_assert_eq!(restored, after);
                Ok(())
            },
        )
        .unwrap();
}
