//! Context Relay: Per-Thread Context Propagation
//!
//! Captures the contextual values of every registered context manager on one
//! thread and replays them on another, with nested scopes that restore the
//! previous value when closed.
//!
//! ```
//! use context_relay::manager::NestedContextManager;
//! use context_relay::registry::{Candidate, Registry, StaticDiscovery};
//! use context_relay::ContextPropagator;
//! use std::sync::Arc;
//!
//! let locale = NestedContextManager::<String>::new("locale");
//! let discovery = StaticDiscovery::new();
//! discovery.register_manager(Candidate::manager(locale.clone()));
//! let propagator = ContextPropagator::new(Registry::new(Arc::new(discovery)).shared());
//!
//! let _scope = locale.set("nl_NL".to_string()).unwrap();
//! let snapshot = propagator.capture().unwrap();
//!
//! let seen = std::thread::spawn(move || snapshot.call(|| locale.get()).unwrap())
//!     .join()
//!     .unwrap();
//! assert_eq!(seen.as_deref(), Some("nl_NL"));
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod propagator;
pub mod registry;
pub mod snapshot;
pub mod stack;
pub mod timer;

pub use error::{
    DiscoveryError, ManagerError, PropagationError, SetupError, TimerError, TransportError,
};
pub use manager::{Context, ContextManager, NestedContextManager, ValueManager};
pub use propagator::ContextPropagator;
pub use registry::{DiscoveryScope, Registry};
pub use snapshot::{CapturedValue, Reactivation, Snapshot, SnapshotEntry, TransportSnapshot};
pub use stack::{NestedContext, NestedStack};
pub use timer::{Timer, TracingTimer};
