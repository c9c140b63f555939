//! Cross-process snapshot form.
//!
//! Two parallel lists: manager names and their JSON-encoded values. Only
//! present values whose manager can encode them are carried. On the receiving
//! side, names that no registered manager answers to are dropped.

use crate::error::{PropagationError, TransportError};
use crate::manager::ContextManager;
use crate::registry::Registry;
use crate::snapshot::{CapturedValue, SnapshotEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportSnapshot {
    pub manager_names: Vec<String>,
    pub values: Vec<serde_json::Value>,
}

impl TransportSnapshot {
    pub fn len(&self) -> usize {
        self.manager_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manager_names.is_empty()
    }

    /// Both lists must have the same length.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.manager_names.len() != self.values.len() {
            return Err(TransportError::LengthMismatch {
                names: self.manager_names.len(),
                values: self.values.len(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TransportError> {
        let transport: TransportSnapshot = serde_json::from_str(json)?;
        transport.validate()?;
        Ok(transport)
    }
}

pub(crate) fn encode(entries: &[SnapshotEntry]) -> TransportSnapshot {
    let mut transport = TransportSnapshot::default();
    for entry in entries {
        let value = match entry.value() {
            CapturedValue::Present(value) => value,
            CapturedValue::Absent | CapturedValue::Failed => continue,
        };
        let manager = entry.manager();
        match manager.encode_value(value) {
            Ok(Some(raw)) => {
                transport.manager_names.push(manager.name().to_string());
                transport.values.push(raw);
            }
            Ok(None) => debug!(manager = %manager.name(), "value not transportable; omitted"),
            Err(err) => warn!(
                manager = %manager.name(),
                error = %err,
                "failed to encode context value; omitted from transport"
            ),
        }
    }
    transport
}

pub(crate) fn decode(
    transport: TransportSnapshot,
    registry: &Registry,
) -> Result<Vec<SnapshotEntry>, PropagationError> {
    transport.validate()?;
    let managers = registry.managers()?;

    let mut entries = Vec::with_capacity(transport.len());
    for (name, raw) in transport.manager_names.into_iter().zip(transport.values) {
        let manager = match managers.iter().find(|m| m.name() == name) {
            Some(manager) => manager.clone(),
            None => {
                info!(manager = %name, "dropping transported value for unregistered manager");
                continue;
            }
        };
        let value = manager
            .decode_value(raw)
            .map_err(|source| TransportError::Decode {
                manager: name.clone(),
                source,
            })?;
        entries.push(SnapshotEntry::new(manager, CapturedValue::Present(value)));
    }
    Ok(entries)
}
