//! Observable entities: field bags whose writes are gated and announced.
//!
//! An [`Entity`] replaces transparent property interception with explicit
//! setters: [`Entity::set_field`] and [`Entity::remove_field`] are the only
//! ways to change a field, and both consult the shared write gate before
//! touching anything. A successful write enqueues the per-field and
//! per-entity events consumers watch for; a write of a structurally equal
//! value is a silent no-op.
//!
//! Fields are plain JSON values. Nested structures are replaced wholesale;
//! structural equality on the whole value decides whether a replacement is
//! a real change.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::StateError;
use crate::event::{ChangeEvent, EventAction};
use crate::gate::StateGate;

/// Identity of an entity inside its collection.
///
/// Ids arrive as JSON and are either integers or strings; anything else
/// (fractions, objects, null) is rejected at the door.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Num(i64),
    Text(String),
}

impl EntityId {
    /// Parse an id out of a JSON value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Num),
            Value::String(s) => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }

    /// The JSON form of this id.
    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Num(n) => Value::from(*n),
            EntityId::Text(s) => Value::from(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Num(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Num(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Text(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::Text(s)
    }
}

/// One entity: an ordered field bag bound to its kind and write gate.
#[derive(Debug, Clone)]
pub struct Entity {
    kind: Arc<str>,
    fields: IndexMap<String, Value>,
    gate: Arc<StateGate>,
}

impl Entity {
    /// Build an entity from a JSON object. Fails on non-objects.
    pub(crate) fn from_value(
        kind: &Arc<str>,
        gate: &Arc<StateGate>,
        value: Value,
    ) -> Result<Self, StateError> {
        let Value::Object(object) = value else {
            return Err(StateError::MalformedEntity {
                kind: kind.to_string(),
            });
        };
        Ok(Self {
            kind: Arc::clone(kind),
            fields: object.into_iter().collect(),
            gate: Arc::clone(gate),
        })
    }

    /// Kind name of the top-level state key this entity lives under.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The entity's id, when it carries a usable one.
    pub fn id(&self) -> Option<EntityId> {
        self.fields.get("id").and_then(EntityId::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Convenience accessor for integer fields.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }

    /// Convenience accessor for boolean fields.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    /// Convenience accessor for string fields.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterate fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Write one field.
    ///
    /// Fails while the state is locked. Writing a value structurally equal
    /// to the current one is a silent no-op — the lock is still checked
    /// first, so an idempotent write under lock is an error, not a pass.
    pub fn set_field(&mut self, field: &str, value: Value) -> Result<(), StateError> {
        if self.gate.is_locked() {
            return Err(StateError::LockedWrite {
                kind: self.kind.to_string(),
                field: field.to_string(),
            });
        }
        let action = match self.fields.get(field) {
            Some(current) if *current == value => return Ok(()),
            Some(_) => EventAction::Updated,
            None => EventAction::Created,
        };
        self.fields.insert(field.to_string(), value);
        self.announce(field, action);
        Ok(())
    }

    /// Remove one field. Returns whether the field existed.
    pub fn remove_field(&mut self, field: &str) -> Result<bool, StateError> {
        if self.gate.is_locked() {
            return Err(StateError::LockedWrite {
                kind: self.kind.to_string(),
                field: field.to_string(),
            });
        }
        if self.fields.shift_remove(field).is_none() {
            return Ok(false);
        }
        self.announce(field, EventAction::Deleted);
        Ok(true)
    }

    /// Enqueue the event burst for one field change.
    ///
    /// A removed field still leaves the entity itself updated, so the
    /// entity-level events never carry `deleted` from this path.
    fn announce(&self, field: &str, action: EventAction) {
        if !self.gate.is_ready() {
            return;
        }
        let entity_action = match action {
            EventAction::Deleted => EventAction::Updated,
            other => other,
        };
        let id = self.id();
        let mut burst: SmallVec<[ChangeEvent; 4]> = SmallVec::new();
        burst.push(ChangeEvent::field(&self.kind, None, field, action));
        if let Some(id) = &id {
            burst.push(ChangeEvent::field(&self.kind, Some(id), field, action));
            burst.push(ChangeEvent::entity(&self.kind, Some(id), entity_action));
        }
        burst.push(ChangeEvent::entity(&self.kind, None, EventAction::Updated));
        self.gate.enqueue(burst);
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
