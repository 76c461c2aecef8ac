//! Settings, update payloads, and notification types.

use crate::value::{StateMap, Value};
use std::fmt;
use std::sync::Arc;

/// Pure projection from canonical state to the subset a service cares
/// about. Runs only when state is present.
pub type StateSliceSelector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Function form of a state update: current (service-visible) state in,
/// partial state out.
pub type StateFn = Box<dyn FnOnce(Option<Value>) -> StateMap + Send>;

/// Per-service settings. Unset fields fall back to global settings, then
/// to library defaults (history tracking and change logging both off).
#[derive(Clone, Default)]
pub struct ServiceSettings {
    pub track_state_history: Option<bool>,
    pub log_state_changes: Option<bool>,
    pub state_slice_selector: Option<StateSliceSelector>,
}

impl ServiceSettings {
    pub fn with_history(mut self, track: bool) -> Self {
        self.track_state_history = Some(track);
        self
    }

    pub fn with_change_logging(mut self, log: bool) -> Self {
        self.log_state_changes = Some(log);
        self
    }

    pub fn with_slice_selector(
        mut self,
        selector: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.state_slice_selector = Some(Arc::new(selector));
        self
    }
}

impl fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceSettings")
            .field("track_state_history", &self.track_state_history)
            .field("log_state_changes", &self.log_state_changes)
            .field(
                "state_slice_selector",
                &self.state_slice_selector.as_ref().map(|_| "<selector>"),
            )
            .finish()
    }
}

/// Application-wide settings. Write-once per core; an empty value is
/// rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlobalSettings {
    pub track_state_history: Option<bool>,
    pub log_state_changes: Option<bool>,
}

impl GlobalSettings {
    pub fn is_empty(&self) -> bool {
        self.track_state_history.is_none() && self.log_state_changes.is_none()
    }
}

/// The state argument accepted by `StoreService::set_state`.
pub enum StateUpdate {
    /// A literal partial state.
    Patch(StateMap),
    /// An arbitrary value; must be an object or the call fails.
    Value(Value),
    /// A pure function from current state to a partial state.
    Compute(StateFn),
}

impl StateUpdate {
    pub fn compute(f: impl FnOnce(Option<Value>) -> StateMap + Send + 'static) -> Self {
        StateUpdate::Compute(Box::new(f))
    }
}

impl From<StateMap> for StateUpdate {
    fn from(map: StateMap) -> Self {
        StateUpdate::Patch(map)
    }
}

impl From<Value> for StateUpdate {
    fn from(value: Value) -> Self {
        StateUpdate::Value(value)
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Patch(map) => f.debug_tuple("Patch").field(map).finish(),
            StateUpdate::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StateUpdate::Compute(_) => f.write_str("Compute(<fn>)"),
        }
    }
}

/// A notified state paired with the fragment that triggered it.
#[derive(Clone, Debug, PartialEq)]
pub struct StateWithChanges {
    /// Current (possibly sliced) state at dispatch time.
    pub state: Option<Value>,
    /// The raw fragment passed to the update that triggered the dispatch.
    pub state_changes: Option<Value>,
}

/// Options for `StoreService::set_state_with`.
#[derive(Clone, Copy, Debug)]
pub struct SetStateOptions {
    /// Notify local and global subscribers after the merge.
    pub dispatch: bool,
    /// Run the full clone algorithm on reads and writes; `false` uses the
    /// cheap structural copy, which shares opaque references.
    pub deep_clone: bool,
}

impl Default for SetStateOptions {
    fn default() -> Self {
        Self {
            dispatch: true,
            deep_clone: true,
        }
    }
}

/// Identity of a registered service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServiceId(pub u64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
