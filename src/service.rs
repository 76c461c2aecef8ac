//! Per-consumer service facade over a shared [`StoreCore`].

use crate::cloner;
use crate::error::{Result, StoreError};
use crate::history::HistoryEntry;
use crate::store::{ServiceEndpoint, StoreCore};
use crate::subscriptions::SubscriptionHandle;
use crate::types::{ServiceSettings, SetStateOptions, StateUpdate, StateWithChanges};
use crate::value::{StateMap, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A service facade bound to one [`StoreCore`].
///
/// Each service owns local notification channels and an optional slice
/// selector, and resolves its settings per field: library defaults,
/// overridden by per-service settings, overridden by global settings.
/// Concrete feature stores wrap one of these per feature area.
pub struct StoreService {
    core: Arc<StoreCore>,
    endpoint: Arc<ServiceEndpoint>,
    track_state_history: bool,
    log_state_changes: bool,
    destroyed: AtomicBool,
}

impl StoreService {
    /// Create a service and register it with the core.
    pub fn new(core: &Arc<StoreCore>, name: impl Into<String>, settings: ServiceSettings) -> Self {
        let global = core.global_settings();
        let track_state_history = global
            .and_then(|g| g.track_state_history)
            .or(settings.track_state_history)
            .unwrap_or(false);
        let log_state_changes = global
            .and_then(|g| g.log_state_changes)
            .or(settings.log_state_changes)
            .unwrap_or(false);

        let endpoint = core.register_service(name.into(), settings.state_slice_selector);

        Self {
            core: Arc::clone(core),
            endpoint,
            track_state_history,
            log_state_changes,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.endpoint.name()
    }

    pub fn core(&self) -> &Arc<StoreCore> {
        &self.core
    }

    // --- Reads ---

    /// Current state, or the slice computed by this service's selector.
    pub fn get_state(&self, deep_clone: bool) -> Option<Value> {
        self.endpoint
            .state_or_slice(self.core.get_state(None, deep_clone))
    }

    /// One named property from the full state.
    pub fn get_state_property(&self, name: &str, deep_clone: bool) -> Option<Value> {
        self.core.get_state(Some(name), deep_clone)
    }

    /// One named property from the selector's slice. Absent when no
    /// selector is configured or the property is missing.
    pub fn get_state_slice_property(&self, name: &str, deep_clone: bool) -> Option<Value> {
        if self.endpoint.slice_selector.is_none() {
            return None;
        }
        match self.get_state(deep_clone)? {
            Value::Object(mut map) => map.remove(name),
            _ => None,
        }
    }

    // --- Writes ---

    /// Merge a partial state into the store under the given action, with
    /// default options (dispatch and deep clone both on). Returns the
    /// resulting state.
    pub fn set_state(
        &self,
        update: impl Into<StateUpdate>,
        action: &str,
    ) -> Result<Option<Value>> {
        self.set_state_with(update, action, SetStateOptions::default())
    }

    /// Merge a partial state into the store under the given action.
    ///
    /// Sequence: capture the begin snapshot when history tracking is on,
    /// compute and merge the fragment, capture the end snapshot, append to
    /// the history log, notify subscribers unless dispatch is off, log the
    /// change when change logging is on, and return the end state.
    pub fn set_state_with(
        &self,
        update: impl Into<StateUpdate>,
        action: &str,
        options: SetStateOptions,
    ) -> Result<Option<Value>> {
        let SetStateOptions {
            dispatch,
            deep_clone,
        } = options;

        let begin_state = if self.track_state_history {
            self.get_state(deep_clone)
        } else {
            None
        };

        let partial = match update.into() {
            StateUpdate::Patch(map) => map,
            StateUpdate::Value(value) => match value {
                Value::Object(map) => map,
                _ => return Err(StoreError::InvalidStateParameter),
            },
            StateUpdate::Compute(f) => f(self.get_state(deep_clone)),
        };
        let changes = Value::Object(partial.clone());

        self.core.set_state(partial, deep_clone);

        let end_state = self.get_state(deep_clone);

        if self.track_state_history {
            self.core.history().append(HistoryEntry {
                action: action.to_string(),
                begin_state,
                end_state: end_state.clone(),
            });
        }

        if dispatch {
            self.dispatch_state(Some(changes.clone()), true);
        }

        if self.log_state_changes {
            tracing::info!(
                target: "statehub::changes",
                service = %self.endpoint.name(),
                action = %action,
                changes = ?changes,
                "state changed"
            );
        }

        Ok(end_state)
    }

    /// Record a custom action in the history without touching the store or
    /// notifying anyone. The current state becomes the begin snapshot and
    /// a clone of the given value the end snapshot.
    pub fn log_state_action(&self, state: &Value, action: &str) {
        if self.track_state_history {
            self.core.history().append(HistoryEntry {
                action: action.to_string(),
                begin_state: self.get_state(true),
                end_state: Some(cloner::deep_clone(state)),
            });
        }
    }

    /// Truncate the shared history log. Affects all services on this core.
    pub fn reset_state_history(&self) {
        self.core.history().reset();
    }

    /// Snapshot of the shared history log.
    pub fn state_history(&self) -> Vec<HistoryEntry> {
        self.core.history().entries()
    }

    /// Emit the current (cloned) state or slice to this service's local
    /// subscribers, and the full state to every global subscriber unless
    /// suppressed, each paired with the given fragment.
    pub fn dispatch_state(&self, state_changes: Option<Value>, dispatch_global: bool) {
        self.core
            .dispatch_for_endpoint(&self.endpoint, state_changes, dispatch_global);
    }

    // --- Subscriptions ---

    /// Changes to this service's (possibly sliced) state.
    pub fn state_changed(&self) -> SubscriptionHandle<Option<Value>> {
        self.endpoint.state_changed.subscribe()
    }

    /// Changes to this service's state, paired with the fragment that
    /// triggered them.
    pub fn state_with_changes(&self) -> SubscriptionHandle<StateWithChanges> {
        self.endpoint.state_with_changes.subscribe()
    }

    /// Changes to any slice of the store, as full state.
    pub fn global_state_changed(&self) -> SubscriptionHandle<Option<Value>> {
        self.core.global_state_changed()
    }

    /// Changes to any slice of the store, paired with the fragment that
    /// triggered them.
    pub fn global_state_with_changes(&self) -> SubscriptionHandle<StateWithChanges> {
        self.core.global_state_with_changes()
    }

    /// Close this service's local channels and remove it from the
    /// registry. Safe to call repeatedly; subscribers receive a single
    /// end-of-stream event.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.endpoint.close();
        self.core.remove_service(self.endpoint.id());
    }
}

impl Drop for StoreService {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Convenience constructor for a literal partial state.
pub fn patch(entries: impl IntoIterator<Item = (&'static str, Value)>) -> StateMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
