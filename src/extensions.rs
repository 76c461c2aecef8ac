//! Extension protocol and the debugger-bridge collaborator.
//!
//! Extensions are registered once and never removed. The devtools bridge
//! is the one extension shipped here: it forwards every state change to an
//! external debugger transport and applies replayed states back to every
//! registered service without echoing them to the debugger again.

use crate::store::StoreCore;
use crate::subscriptions::Event;
use crate::value::{StateMap, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

/// Reserved state key the bridge uses to mark replayed states.
pub const DEVTOOLS_KEY: &str = "__devtools";

const DEBUGGING_KEY: &str = "debugging";
const ROUTER_KEY: &str = "router";
const PATH_KEY: &str = "path";

/// A store add-on with a single initialization entry point, invoked
/// exactly once when the extension is registered. The core reference gives
/// the extension access to the global channels and the service registry.
pub trait Extension: Send {
    fn init(&mut self, core: &Arc<StoreCore>);
}

/// Configuration passed to a devtools transport on connect.
#[derive(Clone, Debug, Default)]
pub struct DevtoolsConfig {
    pub name: Option<String>,
    pub max_age: Option<usize>,
    pub latency_ms: Option<u64>,
}

/// Callback invoked with a state replayed from the debugger.
pub type ReplayHandler = Box<dyn FnMut(Value) + Send>;

/// One live connection to an external debugger.
pub trait DevtoolsConnection: Send {
    /// Report the starting state.
    fn init(&mut self, state: Option<&Value>);
    /// Report one state change.
    fn send(&mut self, action: &str, state: &Value);
    /// Register the handler for replay and time-travel instructions.
    fn subscribe(&mut self, on_change: ReplayHandler);
    /// Stop receiving replay instructions.
    fn unsubscribe(&mut self);
    /// Report a bridge error.
    fn error(&mut self, message: &str);
}

/// Transport able to open debugger connections.
pub trait DevtoolsTransport: Send {
    fn connect(&self, config: &DevtoolsConfig) -> Box<dyn DevtoolsConnection>;
}

/// Host-runtime navigation hook, used when a replayed state carries a
/// route.
pub trait RouteNavigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Optional host wrapper for work that must run inside the host scheduler
/// so its change detection observes replayed state.
pub trait HostScheduler: Send + Sync {
    fn run(&self, work: Box<dyn FnOnce() + Send>);
}

/// Bridge between the store and an external time-travel debugger.
///
/// On init it connects the transport, reports the starting state, wires
/// the replay handler, and starts a background pump over the core's global
/// channel. Every state change is sent to the debugger unless the state
/// carries the replay marker; replayed states are applied to every
/// registered service through [`StoreCore::replay_state`] and suppressed
/// from being sent back.
pub struct DevtoolsBridge {
    transport: Box<dyn DevtoolsTransport>,
    config: DevtoolsConfig,
    scheduler: Option<Arc<dyn HostScheduler>>,
    navigator: Option<Arc<dyn RouteNavigator>>,
}

impl DevtoolsBridge {
    pub fn new(transport: Box<dyn DevtoolsTransport>) -> Self {
        Self {
            transport,
            config: DevtoolsConfig::default(),
            scheduler: None,
            navigator: None,
        }
    }

    pub fn with_config(mut self, config: DevtoolsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn HostScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn RouteNavigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Whether a published state carries the replay marker.
    fn is_replaying(state: &Option<Value>) -> bool {
        state
            .as_ref()
            .and_then(|s| s.get(DEVTOOLS_KEY))
            .and_then(|meta| meta.get(DEBUGGING_KEY))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl Extension for DevtoolsBridge {
    fn init(&mut self, core: &Arc<StoreCore>) {
        let mut connection = self.transport.connect(&self.config);
        connection.init(core.get_state(None, true).as_ref());

        // Replay path: debugger to store. The replayed state is flagged
        // before applying so the pump below does not echo it back.
        {
            let core = Arc::clone(core);
            let scheduler = self.scheduler.clone();
            let navigator = self.navigator.clone();
            connection.subscribe(Box::new(move |state: Value| {
                let Value::Object(mut map) = state else {
                    tracing::debug!(target: "statehub::devtools", "ignoring non-object replay state");
                    return;
                };

                let meta = map
                    .entry(DEVTOOLS_KEY.to_string())
                    .or_insert_with(|| Value::Object(StateMap::new()));
                if let Value::Object(meta) = meta {
                    meta.insert(DEBUGGING_KEY.to_string(), Value::Bool(true));

                    if let Some(navigator) = &navigator {
                        let path = meta
                            .get(ROUTER_KEY)
                            .and_then(|router| router.get(PATH_KEY))
                            .and_then(Value::as_str);
                        if let Some(path) = path {
                            navigator.navigate(path);
                        }
                    }
                }

                let apply_core = Arc::clone(&core);
                let apply = move || apply_core.replay_state(map);
                match &scheduler {
                    Some(scheduler) => scheduler.run(Box::new(apply)),
                    None => apply(),
                }
            }));
        }

        // Forward path: store to debugger. A background pump drains the
        // global channel until the core goes away.
        let handle = core.global_state_changed();
        let core = Arc::clone(core);
        let connection = Arc::new(Mutex::new(connection));
        thread::spawn(move || {
            while let Ok(event) = handle.recv() {
                let state = match event {
                    Event::Next(state) => state,
                    Event::Completed => break,
                };
                if DevtoolsBridge::is_replaying(&state) {
                    continue;
                }
                let Some(state) = state else { continue };
                let action = core
                    .history()
                    .last()
                    .map(|entry| entry.action)
                    .unwrap_or_else(|| "state change".to_string());
                connection.lock().send(&action, &state);
            }
        });
    }
}
