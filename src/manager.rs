//! Context managers: the pluggable owners of per-thread values.
//!
//! `ContextManager` is the type-erased seam the registry and the snapshot
//! protocol work with. Implementors usually write a `ValueManager` instead and
//! get the erased form through the blanket impl.

mod nested;

pub use nested::NestedContextManager;

use crate::error::ManagerError;
use std::any::Any;
use std::sync::Arc;

/// Type-erased captured value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Scoped handle for one activated value.
///
/// Contexts are bound to the thread that activated them.
pub trait Context {
    /// Close the context. Calling it again has no effect.
    fn close(&mut self) -> Result<(), ManagerError>;

    fn is_closed(&self) -> bool;
}

impl<T: Clone + 'static> Context for crate::stack::NestedContext<T> {
    fn close(&mut self) -> Result<(), ManagerError> {
        crate::stack::NestedContext::close(self);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        crate::stack::NestedContext::is_closed(self)
    }
}

/// Context that was never opened; used for managers with nothing to restore.
#[derive(Debug, Default)]
pub struct NoopContext {
    closed: bool,
}

impl Context for NoopContext {
    fn close(&mut self) -> Result<(), ManagerError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Type-erased manager contract.
pub trait ContextManager: Send + Sync + 'static {
    /// Stable name identifying the manager, also used on the wire.
    fn name(&self) -> &str;

    /// Make `value` current on the calling thread until the context closes.
    /// `None` activates the "no value" state.
    fn activate(&self, value: Option<Value>) -> Result<Box<dyn Context>, ManagerError>;

    /// Current value on the calling thread. Must not change any state.
    fn current_value(&self) -> Result<Option<Value>, ManagerError>;

    /// Drop every active scope on the calling thread.
    fn clear(&self) -> Result<(), ManagerError>;

    /// Serialize a value for transport; `Ok(None)` means not transportable.
    fn encode_value(&self, _value: &Value) -> Result<Option<serde_json::Value>, ManagerError> {
        Ok(None)
    }

    fn decode_value(&self, _raw: serde_json::Value) -> Result<Value, ManagerError> {
        Err(ManagerError::NotSerializable(self.name().to_string()))
    }
}

/// Typed manager contract. Blanket-adapted into [`ContextManager`].
pub trait ValueManager: Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn activate(&self, value: Option<Self::Value>) -> Result<Box<dyn Context>, ManagerError>;

    fn current_value(&self) -> Result<Option<Self::Value>, ManagerError>;

    fn clear(&self) -> Result<(), ManagerError>;

    fn encode(&self, _value: &Self::Value) -> Result<Option<serde_json::Value>, ManagerError> {
        Ok(None)
    }

    fn decode(&self, _raw: serde_json::Value) -> Result<Self::Value, ManagerError> {
        Err(ManagerError::NotSerializable(ValueManager::name(self).to_string()))
    }
}

fn downcast<M: ValueManager + ?Sized>(manager: &M, value: &Value) -> Result<M::Value, ManagerError> {
    value
        .downcast_ref::<M::Value>()
        .cloned()
        .ok_or_else(|| ManagerError::ValueType {
            manager: ValueManager::name(manager).to_string(),
            expected: std::any::type_name::<M::Value>(),
        })
}

impl<M: ValueManager> ContextManager for M {
    fn name(&self) -> &str {
        ValueManager::name(self)
    }

    fn activate(&self, value: Option<Value>) -> Result<Box<dyn Context>, ManagerError> {
        let typed = value.map(|v| downcast(self, &v)).transpose()?;
        ValueManager::activate(self, typed)
    }

    fn current_value(&self) -> Result<Option<Value>, ManagerError> {
        Ok(ValueManager::current_value(self)?.map(|v| Arc::new(v) as Value))
    }

    fn clear(&self) -> Result<(), ManagerError> {
        ValueManager::clear(self)
    }

    fn encode_value(&self, value: &Value) -> Result<Option<serde_json::Value>, ManagerError> {
        let typed = downcast(self, value)?;
        self.encode(&typed)
    }

    fn decode_value(&self, raw: serde_json::Value) -> Result<Value, ManagerError> {
        Ok(Arc::new(self.decode(raw)?) as Value)
    }
}
