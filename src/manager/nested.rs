//! Ready-made manager backed by a [`NestedStack`].

use crate::error::ManagerError;
use crate::manager::{Context, ValueManager};
use crate::stack::NestedStack;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

type Encoder<T> = fn(&T) -> Result<serde_json::Value, serde_json::Error>;
type Decoder<T> = fn(serde_json::Value) -> Result<T, serde_json::Error>;

fn encode_json<T: Serialize>(value: &T) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(value)
}

struct Codec<T> {
    encode: Encoder<T>,
    decode: Decoder<T>,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Codec {
            encode: self.encode,
            decode: self.decode,
        }
    }
}

/// Manager whose per-thread state is a nested context stack.
///
/// ```
/// use context_relay::manager::NestedContextManager;
///
/// let locale = NestedContextManager::<String>::new("locale");
/// let scope = locale.set("de_DE".to_string()).unwrap();
/// assert_eq!(locale.get().as_deref(), Some("de_DE"));
/// drop(scope);
/// assert_eq!(locale.get(), None);
/// ```
///
/// Clones share the same per-thread stack.
pub struct NestedContextManager<T> {
    stack: NestedStack<T>,
    codec: Option<Codec<T>>,
}

impl<T> Clone for NestedContextManager<T> {
    fn clone(&self) -> Self {
        NestedContextManager {
            stack: self.stack.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> NestedContextManager<T> {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::from_stack(NestedStack::new(name))
    }

    pub fn from_stack(stack: NestedStack<T>) -> Self {
        NestedContextManager { stack, codec: None }
    }

    pub fn stack(&self) -> &NestedStack<T> {
        &self.stack
    }

    /// Activate `value` directly, outside of any snapshot.
    pub fn set(&self, value: T) -> Result<Box<dyn Context>, ManagerError> {
        Ok(Box::new(self.stack.activate(Some(value))?))
    }

    pub fn get(&self) -> Option<T> {
        self.stack.current()
    }
}

impl<T> NestedContextManager<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Manager whose values survive snapshot transport as JSON.
    pub fn serializable(name: impl Into<Arc<str>>) -> Self {
        Self::from_stack(NestedStack::new(name)).with_json_codec()
    }

    pub fn with_json_codec(mut self) -> Self {
        self.codec = Some(Codec {
            encode: encode_json::<T>,
            decode: serde_json::from_value::<T>,
        });
        self
    }
}

impl<T: Clone + Send + Sync + 'static> ValueManager for NestedContextManager<T> {
    type Value = T;

    fn name(&self) -> &str {
        self.stack.name()
    }

    fn activate(&self, value: Option<T>) -> Result<Box<dyn Context>, ManagerError> {
        Ok(Box::new(self.stack.activate(value)?))
    }

    fn current_value(&self) -> Result<Option<T>, ManagerError> {
        Ok(self.stack.current())
    }

    fn clear(&self) -> Result<(), ManagerError> {
        self.stack.clear();
        Ok(())
    }

    fn encode(&self, value: &T) -> Result<Option<serde_json::Value>, ManagerError> {
        match &self.codec {
            None => Ok(None),
            Some(codec) => (codec.encode)(value)
                .map(Some)
                .map_err(|e| ManagerError::Other(e.into())),
        }
    }

    fn decode(&self, raw: serde_json::Value) -> Result<T, ManagerError> {
        match &self.codec {
            None => Err(ManagerError::NotSerializable(self.stack.name().to_string())),
            Some(codec) => (codec.decode)(raw).map_err(|e| ManagerError::Other(e.into())),
        }
    }
}

impl<T> fmt::Debug for NestedContextManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedContextManager")
            .field("stack", &self.stack)
            .field("serializable", &self.codec.is_some())
            .finish()
    }
}
