//! The per-page façade binding views to state.
//!
//! A [`Reactive`] owns one [`StateManager`], a table of named mutations,
//! and a registry of component watchers. Views dispatch actions by name;
//! flushed change events route back to every watcher registered under the
//! exact event name, in registration order.
//!
//! The one-time `state:loaded` event reaches late registrants too: a
//! component registering its loaded watcher after the initial load gets an
//! immediate replay, and [`Reactive::loaded`] exposes the same edge as an
//! awaitable signal.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error};
use uuid::Uuid;

use crate::entity::Entity;
use crate::error::StateError;
use crate::event::{ChangeEvent, EventAction, EventSink, STATE_LOADED};
use crate::manager::StateManager;
use crate::mutation::{Mutation, MutationArgs, MutationContext};
use crate::service::{NullUpdateService, UpdateService};
use crate::state::State;

/// What a watcher handler receives: the event, the live state, and the
/// touched entity when the event names one.
pub struct EventData<'a> {
    pub event: &'a ChangeEvent,
    pub state: &'a State,
    pub element: Option<&'a Entity>,
}

impl EventData<'_> {
    pub fn action(&self) -> EventAction {
        self.event.action
    }
}

/// Handler side of a watcher.
pub type WatcherHandler = Arc<dyn Fn(EventData<'_>) + Send + Sync>;

/// A component's declared interest in one event name.
pub struct Watcher {
    /// Exact event name to match, e.g. `"cm:updated"` or `"state:loaded"`.
    pub watch: String,
    pub handler: WatcherHandler,
}

impl Watcher {
    pub fn new(
        watch: impl Into<String>,
        handler: impl Fn(EventData<'_>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            watch: watch.into(),
            handler: Arc::new(handler),
        }
    }
}

/// A UI component: a name plus its declared watcher list.
pub trait Component {
    fn name(&self) -> &str;
    fn watchers(&self) -> Vec<Watcher>;
}

struct RegisteredWatcher {
    component: String,
    handler: WatcherHandler,
}

/// Watchers indexed by exact event name, registration order preserved.
#[derive(Default)]
struct WatcherRegistry {
    handlers: RwLock<HashMap<String, Vec<RegisteredWatcher>>>,
}

impl WatcherRegistry {
    fn insert(&self, watch: String, component: String, handler: WatcherHandler) {
        let mut handlers = self.handlers.write().expect("watcher registry poisoned");
        handlers
            .entry(watch)
            .or_default()
            .push(RegisteredWatcher { component, handler });
    }

    /// Snapshot the handlers for one event so delivery never holds the
    /// registry lock.
    fn matching(&self, name: &str) -> Vec<WatcherHandler> {
        let handlers = self.handlers.read().expect("watcher registry poisoned");
        handlers
            .get(name)
            .map(|entry| entry.iter().map(|w| Arc::clone(&w.handler)).collect())
            .unwrap_or_default()
    }
}

/// Sink that routes flushed events to matching watchers.
struct WatcherSink {
    registry: Arc<WatcherRegistry>,
}

impl EventSink for WatcherSink {
    fn deliver(&self, state: &State, events: &[ChangeEvent]) {
        for event in events {
            let element = state.find(&event.kind, event.id.as_ref());
            for handler in self.registry.matching(&event.name) {
                handler(EventData {
                    event,
                    state,
                    element,
                });
            }
        }
    }
}

/// Builder for a [`Reactive`] instance.
///
/// Pre-supplying state here and calling
/// [`Reactive::set_initial_state`] later are mutually exclusive; the
/// second load fails.
pub struct ReactiveBuilder {
    name: String,
    service: Arc<dyn UpdateService>,
    mutations: HashMap<String, Arc<dyn Mutation>>,
    initial: Option<Value>,
}

impl ReactiveBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: Arc::new(NullUpdateService),
            mutations: HashMap::new(),
            initial: None,
        }
    }

    /// Wire the remote update service mutations call.
    pub fn with_service(mut self, service: Arc<dyn UpdateService>) -> Self {
        self.service = service;
        self
    }

    /// Register one mutation under `name`. Later registrations win.
    pub fn with_mutation(mut self, name: impl Into<String>, mutation: impl Mutation + 'static) -> Self {
        self.mutations.insert(name.into(), Arc::new(mutation));
        self
    }

    /// Merge a whole mutation table. Later registrations win.
    pub fn with_mutations(mut self, mutations: HashMap<String, Arc<dyn Mutation>>) -> Self {
        self.mutations.extend(mutations);
        self
    }

    /// Pre-supply the initial state document.
    pub fn with_state(mut self, initial: Value) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn build(self) -> Result<Reactive, StateError> {
        let registry = Arc::new(WatcherRegistry::default());
        let sink = Arc::new(WatcherSink {
            registry: Arc::clone(&registry),
        });
        let manager = StateManager::new(sink);
        let (loaded_tx, loaded_rx) = watch::channel(false);
        let mut reactive = Reactive {
            name: self.name,
            manager,
            mutations: self.mutations,
            registry,
            service: self.service,
            loaded_tx,
            loaded_rx,
        };
        if let Some(initial) = self.initial {
            reactive.set_initial_state(initial)?;
        }
        Ok(reactive)
    }
}

/// The reactive façade: one state manager, one mutation table, one
/// watcher registry.
pub struct Reactive {
    name: String,
    manager: StateManager,
    mutations: HashMap<String, Arc<dyn Mutation>>,
    registry: Arc<WatcherRegistry>,
    service: Arc<dyn UpdateService>,
    loaded_tx: watch::Sender<bool>,
    loaded_rx: watch::Receiver<bool>,
}

impl Reactive {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live state tree. Reads only — the lock gates writes.
    pub fn state(&self) -> &State {
        self.manager.state()
    }

    /// Direct access to the manager, for hosts embedding their own
    /// mutation machinery.
    pub fn manager_mut(&mut self) -> &mut StateManager {
        &mut self.manager
    }

    /// Load the initial state. Fails when state was pre-supplied to the
    /// builder or this was already called.
    pub fn set_initial_state(&mut self, initial: Value) -> Result<(), StateError> {
        self.manager.set_initial_state(initial)?;
        self.loaded_tx.send_replace(true);
        Ok(())
    }

    /// Whether the initial state has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.manager.is_initialized()
    }

    /// Resolves once the initial state is in, however late the caller
    /// asks. The replay in [`Reactive::register_component`] is the
    /// callback-flavored twin of this signal.
    pub async fn loaded(&self) {
        let mut rx = self.loaded_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Register a component's watchers.
    ///
    /// Fails when a watcher declares no event name. A `state:loaded`
    /// watcher registered after the load replays immediately, exactly
    /// once.
    pub fn register_component(&mut self, component: &dyn Component) -> Result<(), StateError> {
        let component_name = component.name().to_string();
        for watcher in component.watchers() {
            if watcher.watch.is_empty() {
                return Err(StateError::InvalidWatcher {
                    component: component_name,
                });
            }
            let late_loaded = watcher.watch == STATE_LOADED && self.manager.is_initialized();
            if late_loaded {
                let event = ChangeEvent::loaded();
                (watcher.handler)(EventData {
                    event: &event,
                    state: self.manager.state(),
                    element: None,
                });
            }
            self.registry
                .insert(watcher.watch, component_name.clone(), watcher.handler);
        }
        debug!(component = %component_name, reactive = %self.name, "component registered");
        Ok(())
    }

    /// Merge mutations into the table. Later registrations win.
    pub fn add_mutations(&mut self, mutations: HashMap<String, Arc<dyn Mutation>>) {
        self.mutations.extend(mutations);
    }

    /// Replace the whole mutation table.
    pub fn set_mutations(&mut self, mutations: HashMap<String, Arc<dyn Mutation>>) {
        self.mutations = mutations;
    }

    /// Dispatch a named mutation.
    ///
    /// Fails synchronously for an unknown name. Mutation failures are
    /// logged with the correlation id and re-raised; the caller decides
    /// whether to surface or swallow them.
    pub async fn dispatch(&mut self, action: &str, args: MutationArgs) -> Result<()> {
        let mutation = self
            .mutations
            .get(action)
            .cloned()
            .ok_or_else(|| StateError::UnknownMutation(action.to_string()))?;
        let correlation = Uuid::new_v4();
        debug!(reactive = %self.name, action, %correlation, "dispatching mutation");
        let ctx = MutationContext {
            manager: &mut self.manager,
            service: self.service.as_ref(),
            correlation,
        };
        match mutation.apply(ctx, args).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(reactive = %self.name, action, %correlation, error = %err, "mutation failed");
                Err(err)
            }
        }
    }
}
