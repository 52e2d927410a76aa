//! Insertion-ordered, id-keyed collections of entities of one kind.
//!
//! A [`StateMap`] is the unit of storage for list-shaped state like
//! sections or course modules. Its mutators are lock-gated like entity
//! field writes, and announce membership changes (`created`, `updated`,
//! `deleted`) at both the entity and the kind level.
//!
//! Invariant: every stored entity carries a non-null `id`, and the map key
//! equals that id. [`StateMap::set`] enforces both.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::entity::{Entity, EntityId};
use crate::error::StateError;
use crate::event::{ChangeEvent, EventAction};
use crate::gate::StateGate;

/// Ordered collection of entities of one kind, keyed by entity id.
#[derive(Debug, Clone)]
pub struct StateMap {
    kind: Arc<str>,
    entries: IndexMap<EntityId, Entity>,
    gate: Arc<StateGate>,
}

impl StateMap {
    pub(crate) fn new(kind: Arc<str>, gate: Arc<StateGate>) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
            gate,
        }
    }

    /// Kind name of the top-level state key this collection lives under.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entities in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Entity> {
        self.entries.values()
    }

    /// Iterate ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    /// Store `value` under `key`.
    ///
    /// The value must be a JSON object whose `id` equals `key`. Replacing
    /// an existing entry announces `updated` for the entry as a whole even
    /// when the replacement is field-for-field identical — the entry was
    /// swapped, and consumers tracking the element are told so.
    pub fn set(&mut self, key: EntityId, value: Value) -> Result<(), StateError> {
        if self.gate.is_locked() {
            return Err(StateError::LockedCollection {
                kind: self.kind.to_string(),
            });
        }
        let entity = Entity::from_value(&self.kind, &self.gate, value)?;
        let id = entity.id().ok_or_else(|| StateError::MissingId {
            kind: self.kind.to_string(),
        })?;
        if id != key {
            return Err(StateError::KeyIdMismatch {
                kind: self.kind.to_string(),
                key,
                id,
            });
        }
        let action = if self.entries.contains_key(&key) {
            EventAction::Updated
        } else {
            EventAction::Created
        };
        self.entries.insert(key, entity);
        self.announce(&id, action);
        Ok(())
    }

    /// Store `value` under its own id. Fails when the id is missing.
    pub fn add(&mut self, value: Value) -> Result<EntityId, StateError> {
        let id = value
            .get("id")
            .and_then(EntityId::from_value)
            .ok_or_else(|| StateError::MissingId {
                kind: self.kind.to_string(),
            })?;
        self.set(id.clone(), value)?;
        Ok(id)
    }

    /// Remove the entry under `key`. Returns whether it existed.
    pub fn delete(&mut self, key: &EntityId) -> Result<bool, StateError> {
        if self.gate.is_locked() {
            return Err(StateError::LockedCollection {
                kind: self.kind.to_string(),
            });
        }
        if self.entries.shift_remove(key).is_none() {
            return Ok(false);
        }
        self.announce(key, EventAction::Deleted);
        Ok(true)
    }

    /// Bulk-populate during the initial load. No events: the tree is not
    /// ready yet and the load itself is announced once, as `state:loaded`.
    pub(crate) fn load_values(&mut self, values: Vec<Value>) -> Result<(), StateError> {
        for value in values {
            let entity = Entity::from_value(&self.kind, &self.gate, value)?;
            let id = entity.id().ok_or_else(|| StateError::MissingId {
                kind: self.kind.to_string(),
            })?;
            self.entries.insert(id, entity);
        }
        Ok(())
    }

    fn announce(&self, id: &EntityId, action: EventAction) {
        if !self.gate.is_ready() {
            return;
        }
        self.gate.enqueue([
            ChangeEvent::entity(&self.kind, Some(id), action),
            ChangeEvent::entity(&self.kind, None, action),
        ]);
    }
}

/// Serializes as a plain array of entities, not as the internal key map.
impl Serialize for StateMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for entity in self.entries.values() {
            seq.serialize_element(entity)?;
        }
        seq.end()
    }
}
