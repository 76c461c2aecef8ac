//! Store core: canonical state, registries, and global channels.

use crate::cloner;
use crate::error::{Result, StoreError};
use crate::extensions::Extension;
use crate::history::HistoryLog;
use crate::subscriptions::{Dispatcher, SubscriptionHandle};
use crate::types::{GlobalSettings, ServiceId, StateSliceSelector, StateWithChanges};
use crate::value::{StateMap, Value};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Endpoint registered for one service: its identity, slice selector, and
/// local notification channels. Kept in the core registry so
/// registry-scoped operations and extensions can reach every service.
pub struct ServiceEndpoint {
    pub(crate) id: ServiceId,
    name: String,
    pub(crate) slice_selector: Option<StateSliceSelector>,
    pub(crate) state_changed: Dispatcher<Option<Value>>,
    pub(crate) state_with_changes: Dispatcher<StateWithChanges>,
}

impl ServiceEndpoint {
    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project a full-state clone through this service's slice selector.
    pub(crate) fn state_or_slice(&self, state: Option<Value>) -> Option<Value> {
        match (&self.slice_selector, state) {
            (Some(selector), Some(state)) => Some(selector(&state)),
            (_, state) => state,
        }
    }

    pub(crate) fn close(&self) {
        self.state_changed.close();
        self.state_with_changes.close();
    }
}

/// The shared state container core.
///
/// One explicitly constructed instance per process (or per test harness)
/// owns the canonical state, the history log, the global notification
/// channels, and the service and extension registries. Services are thin
/// facades over a shared `Arc<StoreCore>`.
///
/// Canonical state is replaced wholesale on every write and is never
/// mutated in place; locks are released before any notification is
/// published.
pub struct StoreCore {
    state: RwLock<Option<StateMap>>,
    history: HistoryLog,
    services: Mutex<Vec<Arc<ServiceEndpoint>>>,
    extensions: Mutex<Vec<Box<dyn Extension>>>,
    global_settings: RwLock<Option<GlobalSettings>>,
    global_state_changed: Dispatcher<Option<Value>>,
    global_state_with_changes: Dispatcher<StateWithChanges>,
    next_service_id: AtomicU64,
}

impl StoreCore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(None),
            history: HistoryLog::new(),
            services: Mutex::new(Vec::new()),
            extensions: Mutex::new(Vec::new()),
            global_settings: RwLock::new(None),
            global_state_changed: Dispatcher::new(),
            global_state_with_changes: Dispatcher::new(),
            next_service_id: AtomicU64::new(1),
        })
    }

    // --- Canonical State ---

    /// Whether the canonical state has been created.
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Set the starting state. Fails if any state already exists. No
    /// notification is sent.
    pub fn initialize_state(&self, state: StateMap) -> Result<()> {
        if self.is_initialized() {
            return Err(StoreError::AlreadyInitialized);
        }
        self.set_state(state, true);
        Ok(())
    }

    /// Read the canonical state, or one named top-level property.
    ///
    /// Returns `None` if the state is uninitialized or the property is
    /// missing. `deep_clone` selects the full clone algorithm; `false`
    /// takes the cheap structural copy.
    pub fn get_state(&self, property: Option<&str>, deep_clone: bool) -> Option<Value> {
        let guard = self.state.read();
        let map = guard.as_ref()?;
        match property {
            Some(name) => {
                let value = map.get(name)?;
                Some(if deep_clone {
                    cloner::deep_clone(value)
                } else {
                    value.clone()
                })
            }
            None => Some(Value::Object(if deep_clone {
                cloner::deep_clone_map(map)
            } else {
                map.clone()
            })),
        }
    }

    /// Shallow-merge a partial state onto the canonical state, creating it
    /// if absent. The previous state object is replaced wholesale, so
    /// snapshots taken from it stay valid. Top-level keys replace; nested
    /// structures under an existing key are never merged.
    pub fn set_state(&self, partial: StateMap, deep_clone: bool) {
        let mut guard = self.state.write();
        let mut next = match guard.as_ref() {
            Some(current) => {
                if deep_clone {
                    cloner::deep_clone_map(current)
                } else {
                    current.clone()
                }
            }
            None => StateMap::new(),
        };
        for (key, value) in partial {
            let value = if deep_clone {
                cloner::deep_clone(&value)
            } else {
                value
            };
            next.insert(key, value);
        }
        *guard = Some(next);
    }

    /// Null the canonical state; optionally broadcast the absence to every
    /// service.
    pub fn clear_state(&self, dispatch: bool) {
        *self.state.write() = None;
        if dispatch {
            self.dispatch_to_all_services(None);
        }
    }

    /// Replace the canonical state for all services; optionally broadcast
    /// the new state to every service.
    pub fn reset_state(&self, state: StateMap, dispatch: bool) {
        let changes = Some(Value::Object(state.clone()));
        self.set_state(state, true);
        if dispatch {
            self.dispatch_to_all_services(changes);
        }
    }

    // --- History ---

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    // --- Global Settings ---

    /// Apply application-wide settings. May be called at most once; an
    /// empty settings value is rejected.
    pub fn set_global_settings(&self, settings: GlobalSettings) -> Result<()> {
        if settings.is_empty() {
            return Err(StoreError::EmptyGlobalSettings);
        }
        let mut guard = self.global_settings.write();
        if guard.is_some() {
            return Err(StoreError::GlobalSettingsAlreadySet);
        }
        *guard = Some(settings);
        Ok(())
    }

    pub fn global_settings(&self) -> Option<GlobalSettings> {
        *self.global_settings.read()
    }

    // --- Service Registry ---

    pub(crate) fn register_service(
        &self,
        name: String,
        slice_selector: Option<StateSliceSelector>,
    ) -> Arc<ServiceEndpoint> {
        let id = ServiceId(self.next_service_id.fetch_add(1, Ordering::SeqCst));
        let endpoint = Arc::new(ServiceEndpoint {
            id,
            name,
            slice_selector,
            state_changed: Dispatcher::new(),
            state_with_changes: Dispatcher::new(),
        });
        self.services.lock().push(Arc::clone(&endpoint));
        tracing::debug!(target: "statehub::registry", service = %endpoint.name, id = %id, "service registered");
        endpoint
    }

    /// Remove a service from the registry. Removing an unknown or
    /// already-removed service is a no-op.
    pub(crate) fn remove_service(&self, id: ServiceId) {
        self.services.lock().retain(|endpoint| endpoint.id != id);
    }

    /// Read-only view of every registered service, for extensions.
    pub fn services(&self) -> Vec<Arc<ServiceEndpoint>> {
        self.services.lock().clone()
    }

    pub fn service_count(&self) -> usize {
        self.services.lock().len()
    }

    // --- Extensions ---

    /// Append an extension to the registry and invoke its `init` exactly
    /// once.
    pub fn add_extension(self: &Arc<Self>, extension: Box<dyn Extension>) {
        let mut extensions = self.extensions.lock();
        extensions.push(extension);
        if let Some(extension) = extensions.last_mut() {
            extension.init(self);
        }
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.lock().len()
    }

    // --- Notification ---

    /// Subscribe to full-state changes from any service.
    pub fn global_state_changed(&self) -> SubscriptionHandle<Option<Value>> {
        self.global_state_changed.subscribe()
    }

    /// Subscribe to full-state changes paired with the triggering fragment.
    pub fn global_state_with_changes(&self) -> SubscriptionHandle<StateWithChanges> {
        self.global_state_with_changes.subscribe()
    }

    /// Dispatch current state for one endpoint: its (possibly sliced) view
    /// to the local channels, and the full state to the global channels
    /// unless suppressed. State is snapshotted before publishing, so no
    /// lock is held while subscribers are notified.
    pub(crate) fn dispatch_for_endpoint(
        &self,
        endpoint: &ServiceEndpoint,
        changes: Option<Value>,
        dispatch_global: bool,
    ) {
        let local = endpoint.state_or_slice(self.get_state(None, true));
        endpoint.state_changed.publish(local.clone());
        endpoint.state_with_changes.publish(StateWithChanges {
            state: local,
            state_changes: changes.clone(),
        });

        if dispatch_global {
            let full = self.get_state(None, true);
            self.global_state_changed.publish(full.clone());
            self.global_state_with_changes.publish(StateWithChanges {
                state: full,
                state_changes: changes,
            });
        }
    }

    /// Dispatch through every registered service, as a state reset or
    /// clear does. Each service dispatches its local view and the global
    /// state, so global subscribers receive one notification per service.
    fn dispatch_to_all_services(&self, changes: Option<Value>) {
        for endpoint in self.services() {
            self.dispatch_for_endpoint(&endpoint, changes.clone(), true);
        }
    }

    /// Apply a state replayed from a debugger bridge: merge it, dispatch
    /// each service's local view, and dispatch the global state exactly
    /// once, avoiding the per-service global fan-out of a normal reset.
    pub fn replay_state(&self, state: StateMap) {
        let changes = Some(Value::Object(state.clone()));
        self.set_state(state, true);

        for endpoint in self.services() {
            self.dispatch_for_endpoint(&endpoint, changes.clone(), false);
        }

        let full = self.get_state(None, true);
        self.global_state_changed.publish(full.clone());
        self.global_state_with_changes.publish(StateWithChanges {
            state: full,
            state_changes: changes,
        });
    }
}
