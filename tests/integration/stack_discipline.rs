//! Integration tests for nested scope visibility under arbitrary close order

use context_relay::manager::{Context, ContextManager, NestedContextManager};
use context_relay::stack::NestedStack;
use std::sync::Arc;

#[test]
fn test_out_of_order_close_is_invisible_until_newer_scope_closes() {
    let stack = NestedStack::<&'static str>::new("order-a");
    let mut a = stack.activate(Some("A")).unwrap();
    let mut b = stack.activate(Some("B")).unwrap();

    a.close();
    assert_eq!(stack.current(), Some("B"));

    b.close();
    assert_eq!(stack.current(), None);
    assert_eq!(stack.depth(), 0);
}

#[test]
fn test_in_order_close_restores_each_ancestor() {
    let stack = NestedStack::<&'static str>::new("order-b");
    let mut a = stack.activate(Some("A")).unwrap();
    let mut b = stack.activate(Some("B")).unwrap();

    b.close();
    assert_eq!(stack.current(), Some("A"));
    a.close();
    assert_eq!(stack.current(), None);
}

#[test]
fn test_out_of_order_close_with_enclosing_ancestor() {
    let stack = NestedStack::<&'static str>::new("enclosed");
    let _outer = stack.activate(Some("outer")).unwrap();
    let mut a = stack.activate(Some("A")).unwrap();
    let mut b = stack.activate(Some("B")).unwrap();

    a.close();
    assert_eq!(stack.current(), Some("B"));
    b.close();
    assert_eq!(stack.current(), Some("outer"));
}

#[test]
fn test_triple_nesting_out_of_order() {
    let stack = NestedStack::<String>::new("triple");
    let mut v1 = stack.activate(Some("v1".to_string())).unwrap();
    let mut v2 = stack.activate(Some("v2".to_string())).unwrap();
    let mut v3 = stack.activate(Some("v3".to_string())).unwrap();

    v2.close();
    assert_eq!(stack.current().as_deref(), Some("v3"));
    v3.close();
    assert_eq!(stack.current().as_deref(), Some("v1"));
    v1.close();
    assert_eq!(stack.current(), None);
}

#[test]
fn test_repeated_close_has_no_further_effect() {
    let stack = NestedStack::<u32>::new("idempotent");
    let mut a = stack.activate(Some(1)).unwrap();
    let mut b = stack.activate(Some(2)).unwrap();

    b.close();
    b.close();
    assert_eq!(stack.current(), Some(1));

    // a fresh scope at the slot b used must not be closed by b's stale handle
    let _c = stack.activate(Some(3)).unwrap();
    b.close();
    assert_eq!(stack.current(), Some(3));

    a.close();
    a.close();
    assert_eq!(stack.current(), Some(3));
}

#[test]
fn test_absent_activation_hides_enclosing_value() {
    let manager = NestedContextManager::<String>::new("absent");
    let _outer = manager.set("outer".to_string()).unwrap();

    let erased: &dyn ContextManager = &manager;
    let mut hidden = erased.activate(None).unwrap();
    assert_eq!(manager.get(), None);
    assert!(erased.current_value().unwrap().is_none());

    hidden.close().unwrap();
    assert_eq!(manager.get().as_deref(), Some("outer"));
}

#[test]
fn test_clear_drops_all_depth_and_strands_old_handles() {
    let manager = NestedContextManager::<u8>::new("pool-thread");
    let mut first = manager.set(1).unwrap();
    let _second = manager.set(2).unwrap();
    assert_eq!(manager.stack().depth(), 2);

    ContextManager::clear(&manager).unwrap();
    assert_eq!(manager.get(), None);
    assert_eq!(manager.stack().depth(), 0);

    let _fresh = manager.set(9).unwrap();
    first.close().unwrap();
    assert_eq!(manager.get(), Some(9));
}

#[test]
fn test_threads_never_observe_each_others_scopes() {
    let manager = Arc::new(NestedContextManager::<String>::new("confined"));
    let _main = manager.set("main".to_string()).unwrap();

    let remote = manager.clone();
    let seen = std::thread::spawn(move || {
        let before = remote.get();
        let _scope = remote.set("worker".to_string()).unwrap();
        (before, remote.get())
    })
    .join()
    .unwrap();

    assert_eq!(seen, (None, Some("worker".to_string())));
    assert_eq!(manager.get().as_deref(), Some("main"));
}

#[test]
fn test_sync_hook_mirrors_visible_value() {
    let mirror = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = mirror.clone();
    let stack = NestedStack::<u32>::with_sync_hook("mirrored", move |value| {
        sink.lock().push(value.copied());
        Ok(())
    });

    let mut a = stack.activate(Some(1)).unwrap();
    let mut b = stack.activate(Some(2)).unwrap();
    a.close();
    b.close();

    assert_eq!(*mirror.lock(), vec![Some(1), Some(2), None]);
}
