//! # Statehub
//!
//! A shared, multi-service reactive state container: any number of
//! independent service facades mutate slices of one core-owned state
//! object and receive push notifications when any slice changes.
//!
//! ## Core Concepts
//!
//! - **StoreCore**: explicitly constructed core owning the canonical
//!   state, history log, global channels, and the service registry
//! - **StoreService**: per-consumer facade with local channels, an
//!   optional slice selector, and per-field settings resolution
//! - **Cloner**: total deep-clone algorithm keeping reads and writes
//!   isolated, even for opaque values with private invariants
//! - **HistoryLog**: shared append-only record of state transitions
//!
//! ## Example
//!
//! ```ignore
//! use statehub::{patch, ServiceSettings, StoreCore, StoreService, Value};
//!
//! let core = StoreCore::new();
//! let orders = StoreService::new(&core, "orders", ServiceSettings::default().with_history(true));
//!
//! let changes = orders.state_changed();
//! orders.set_state(patch([("count", Value::from(1))]), "add_order")?;
//!
//! // Subscribers receive an isolated clone of the new state.
//! let event = changes.recv()?;
//! ```

pub mod cloner;
pub mod error;
pub mod extensions;
pub mod history;
pub mod service;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod value;

// Re-exports
pub use cloner::{deep_clone, deep_clone_map};
pub use error::{Result, StoreError};
pub use extensions::{
    DevtoolsBridge, DevtoolsConfig, DevtoolsConnection, DevtoolsTransport, Extension,
    HostScheduler, ReplayHandler, RouteNavigator, DEVTOOLS_KEY,
};
pub use history::{HistoryEntry, HistoryLog};
pub use service::{patch, StoreService};
pub use store::{ServiceEndpoint, StoreCore};
pub use subscriptions::{Dispatcher, Event, SubscriptionHandle, SubscriptionId};
pub use types::{
    GlobalSettings, ServiceId, ServiceSettings, SetStateOptions, StateFn, StateSliceSelector,
    StateUpdate, StateWithChanges,
};
pub use value::{OpaqueValue, Pattern, StateMap, Timestamp, Value};
