//! The state manager: locking discipline, update application, event flush.
//!
//! A [`StateManager`] owns the whole state tree and the write gate every
//! entity and collection in it shares. Outside of a mutation the tree is
//! locked; [`StateManager::process_updates`] opens the gate, applies a
//! batch of update records, and re-locks — and re-locking is the flush
//! point where pending events are ordered, deduplicated, and delivered to
//! the sink.
//!
//! There is no rollback: a failing record aborts the rest of its batch,
//! but records applied before it stay applied. The lock is restored on
//! the error path regardless.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::entity::{Entity, EntityId};
use crate::error::StateError;
use crate::event::{ChangeEvent, EventAction, EventSink};
use crate::gate::StateGate;
use crate::service::{UpdateAction, UpdateRecord};
use crate::state::{State, StateNode};
use crate::state_map::StateMap;

/// How `process_update` treats records that do not line up with the tree.
///
/// The strict default fails loudly on anything unexpected. Refresh-style
/// mutations that may legitimately introduce entities the client has never
/// seen opt into the looser settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdatePolicy {
    /// Treat an update of an absent collection entity as a create, and
    /// materialize absent collection kinds on create.
    pub missing_as_create: bool,
    /// Allow creates to introduce or replace scalar kinds.
    pub allow_scalar_create: bool,
}

impl UpdatePolicy {
    /// Fail on anything that does not match the tree.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Accept server truth wholesale: absent targets become creates.
    pub fn upsert() -> Self {
        Self {
            missing_as_create: true,
            allow_scalar_create: true,
        }
    }
}

/// Owner of the state tree, its write gate, and its pending-event queue.
pub struct StateManager {
    state: State,
    gate: Arc<StateGate>,
    sink: Arc<dyn EventSink>,
    initialized: bool,
}

impl StateManager {
    /// A new, empty, uninitialized manager delivering into `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            state: State::new(),
            gate: Arc::new(StateGate::new()),
            sink,
            initialized: false,
        }
    }

    /// The live state tree. Reads only — writes are gated.
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_locked(&self) -> bool {
        self.gate.is_locked()
    }

    /// Whether `set_initial_state` has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Build the state tree from the server-provided document.
    ///
    /// Array-valued keys become collections (loaded silently), everything
    /// else becomes a scalar entity. The tree is then locked, marked
    /// ready, and a single `state:loaded` event is delivered synchronously.
    /// A second call fails.
    pub fn set_initial_state(&mut self, initial: Value) -> Result<(), StateError> {
        if self.initialized {
            return Err(StateError::AlreadyInitialized);
        }
        let Value::Object(document) = initial else {
            return Err(StateError::InvalidInitialState {
                reason: "initial state must be a JSON object".to_string(),
            });
        };
        for (name, value) in document {
            let kind: Arc<str> = Arc::from(name.as_str());
            let node = match value {
                Value::Array(items) => {
                    let mut map = StateMap::new(kind, Arc::clone(&self.gate));
                    map.load_values(items)?;
                    StateNode::Collection(map)
                }
                value @ Value::Object(_) => {
                    StateNode::Scalar(Entity::from_value(&kind, &self.gate, value)?)
                }
                _ => {
                    return Err(StateError::InvalidInitialState {
                        reason: format!("kind `{name}` is neither an object nor an array"),
                    });
                }
            };
            self.state.insert(name, node);
        }
        self.initialized = true;
        self.gate.set_ready();
        self.gate.set_locked(true);
        debug!(kinds = self.state.len(), "initial state loaded");
        self.sink.deliver(&self.state, &[ChangeEvent::loaded()]);
        Ok(())
    }

    /// Toggle the write gate. Locking flushes the pending events.
    ///
    /// Mutations are the only legitimate callers.
    pub fn set_locked(&mut self, locked: bool) {
        self.gate.set_locked(locked);
        if locked {
            self.flush();
        }
    }

    /// Mutable access to an entity for flag-flipping inside an unlocked
    /// window. For scalar kinds the id is ignored.
    pub fn entity_mut(&mut self, kind: &str, id: &EntityId) -> Option<&mut Entity> {
        match self.state.get_mut(kind)? {
            StateNode::Scalar(entity) => Some(entity),
            StateNode::Collection(map) => map.get_mut(id),
        }
    }

    /// Unlock, apply each record in order, re-lock and flush.
    ///
    /// A failing record aborts the remainder of the batch; earlier records
    /// stay applied and the lock is restored either way.
    pub fn process_updates(
        &mut self,
        updates: Vec<UpdateRecord>,
        policy: &UpdatePolicy,
    ) -> Result<(), StateError> {
        self.set_locked(false);
        let mut outcome = Ok(());
        for update in updates {
            if let Err(err) = self.process_update(update, policy) {
                outcome = Err(err);
                break;
            }
        }
        self.set_locked(true);
        outcome
    }

    /// Apply one update record. The gate must already be open.
    pub fn process_update(
        &mut self,
        update: UpdateRecord,
        policy: &UpdatePolicy,
    ) -> Result<(), StateError> {
        let UpdateRecord {
            name,
            action,
            fields,
        } = update;
        if !fields.is_object() {
            return Err(StateError::MalformedUpdate {
                name,
                reason: "fields must be a JSON object".to_string(),
            });
        }
        match action.unwrap_or(UpdateAction::Update) {
            UpdateAction::Create => self.apply_create(name, fields, policy),
            UpdateAction::Update => self.apply_update(name, fields, policy),
            UpdateAction::Delete => self.apply_delete(name, fields),
        }
    }

    fn apply_create(
        &mut self,
        name: String,
        fields: Value,
        policy: &UpdatePolicy,
    ) -> Result<(), StateError> {
        match self.state.get_mut(&name) {
            Some(StateNode::Collection(map)) => {
                map.add(fields)?;
                Ok(())
            }
            Some(StateNode::Scalar(_)) => {
                if !policy.allow_scalar_create {
                    return Err(StateError::ScalarCreate { kind: name });
                }
                self.replace_scalar(name, fields)
            }
            None => self.materialize_kind(name, fields, policy),
        }
    }

    fn apply_update(
        &mut self,
        name: String,
        fields: Value,
        policy: &UpdatePolicy,
    ) -> Result<(), StateError> {
        match self.state.get_mut(&name) {
            Some(StateNode::Collection(map)) => {
                let id = fields
                    .get("id")
                    .and_then(EntityId::from_value)
                    .ok_or_else(|| StateError::UpdateWithoutId { kind: name.clone() })?;
                match map.get_mut(&id) {
                    Some(entity) => assign_fields(entity, fields),
                    None if policy.missing_as_create => {
                        map.add(fields)?;
                        Ok(())
                    }
                    None => Err(StateError::UnknownEntity { kind: name, id }),
                }
            }
            Some(StateNode::Scalar(entity)) => assign_fields(entity, fields),
            None if policy.missing_as_create => self.materialize_kind(name, fields, policy),
            None => Err(StateError::UnknownKind(name)),
        }
    }

    fn apply_delete(&mut self, name: String, fields: Value) -> Result<(), StateError> {
        match self.state.get_mut(&name) {
            Some(StateNode::Collection(map)) => {
                let id = fields
                    .get("id")
                    .and_then(EntityId::from_value)
                    .ok_or_else(|| StateError::UpdateWithoutId { kind: name.clone() })?;
                if !map.delete(&id)? {
                    return Err(StateError::UnknownEntity { kind: name, id });
                }
                Ok(())
            }
            Some(StateNode::Scalar(_)) => {
                self.state.remove(&name);
                if self.gate.is_ready() {
                    self.gate
                        .enqueue([ChangeEvent::entity(&name, None, EventAction::Deleted)]);
                }
                Ok(())
            }
            None => Err(StateError::UnknownKind(name)),
        }
    }

    /// Replace an existing scalar kind wholesale (policy-gated).
    fn replace_scalar(&mut self, name: String, fields: Value) -> Result<(), StateError> {
        let kind: Arc<str> = Arc::from(name.as_str());
        let entity = Entity::from_value(&kind, &self.gate, fields)?;
        self.state.insert(name.clone(), StateNode::Scalar(entity));
        if self.gate.is_ready() {
            self.gate
                .enqueue([ChangeEvent::entity(&name, None, EventAction::Created)]);
        }
        Ok(())
    }

    /// Introduce a kind the tree has never seen: a collection when the
    /// fields carry an id, a scalar otherwise (policy-gated).
    fn materialize_kind(
        &mut self,
        name: String,
        fields: Value,
        policy: &UpdatePolicy,
    ) -> Result<(), StateError> {
        let has_id = fields.get("id").and_then(EntityId::from_value).is_some();
        if has_id {
            if !policy.missing_as_create {
                return Err(StateError::UnknownKind(name));
            }
            let kind: Arc<str> = Arc::from(name.as_str());
            let mut map = StateMap::new(kind, Arc::clone(&self.gate));
            map.add(fields)?;
            self.state.insert(name, StateNode::Collection(map));
            Ok(())
        } else {
            if !policy.allow_scalar_create {
                return Err(StateError::UnknownKind(name));
            }
            self.replace_scalar(name, fields)
        }
    }

    /// Drain, order, deduplicate, and deliver the pending events.
    ///
    /// Ordering: creations, then updates, then deletions; ties broken by
    /// longer event name first, enqueue order after that. One delivery per
    /// `(name, id)` pair.
    pub fn flush(&mut self) {
        let mut pending = self.gate.drain();
        if pending.is_empty() {
            return;
        }
        pending.sort_by(|a, b| {
            a.action
                .weight()
                .cmp(&b.action.weight())
                .then(b.name.len().cmp(&a.name.len()))
        });
        let mut seen: HashSet<(String, Option<EntityId>)> = HashSet::with_capacity(pending.len());
        let mut batch: Vec<ChangeEvent> = Vec::with_capacity(pending.len());
        for event in pending {
            if !seen.insert((event.name.clone(), event.id.clone())) {
                continue;
            }
            batch.push(event);
        }
        debug!(events = batch.len(), "flushing state events");
        self.sink.deliver(&self.state, &batch);
    }

    /// Flush after a coalescing window, collapsing any bursts that land
    /// in the meantime. The immediate flush-on-lock is the default; this
    /// is the opt-in policy for hosts that batch across mutations.
    pub async fn flush_coalesced(&mut self, window: Duration) {
        tokio::time::sleep(window).await;
        self.flush();
    }
}

/// Assign every property of `fields` through the entity setter path.
fn assign_fields(entity: &mut Entity, fields: Value) -> Result<(), StateError> {
    let Value::Object(fields) = fields else {
        return Err(StateError::MalformedEntity {
            kind: entity.kind().to_string(),
        });
    };
    for (field, value) in fields {
        entity.set_field(&field, value)?;
    }
    Ok(())
}
