//! The state tree: named kinds mapping to scalars or collections.
//!
//! Whether a kind is a scalar entity or a collection is decided exactly
//! once, when the initial state is loaded: array-valued keys become
//! collections, object-valued keys become scalars. The decision is stored
//! as a tagged [`StateNode`], so nothing downstream ever has to duck-type
//! a value to find out what it is.

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::entity::{Entity, EntityId};
use crate::state_map::StateMap;

/// One top-level state kind.
#[derive(Debug, Clone)]
pub enum StateNode {
    /// A single entity, e.g. `course`.
    Scalar(Entity),
    /// An id-keyed collection of entities, e.g. `section` or `cm`.
    Collection(StateMap),
}

impl StateNode {
    pub fn as_scalar(&self) -> Option<&Entity> {
        match self {
            StateNode::Scalar(entity) => Some(entity),
            StateNode::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&StateMap> {
        match self {
            StateNode::Scalar(_) => None,
            StateNode::Collection(map) => Some(map),
        }
    }
}

/// The whole state tree. Kinds keep their initial-document order.
#[derive(Debug, Default, Clone)]
pub struct State {
    nodes: IndexMap<String, StateNode>,
}

impl State {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &str) -> Option<&StateNode> {
        self.nodes.get(kind)
    }

    pub(crate) fn get_mut(&mut self, kind: &str) -> Option<&mut StateNode> {
        self.nodes.get_mut(kind)
    }

    pub(crate) fn insert(&mut self, kind: String, node: StateNode) {
        self.nodes.insert(kind, node);
    }

    pub(crate) fn remove(&mut self, kind: &str) -> Option<StateNode> {
        self.nodes.shift_remove(kind)
    }

    /// The scalar entity stored under `kind`, if that kind is a scalar.
    pub fn scalar(&self, kind: &str) -> Option<&Entity> {
        self.nodes.get(kind).and_then(StateNode::as_scalar)
    }

    /// The collection stored under `kind`, if that kind is a collection.
    pub fn collection(&self, kind: &str) -> Option<&StateMap> {
        self.nodes.get(kind).and_then(StateNode::as_collection)
    }

    /// Resolve the entity an event refers to: a collection member by id,
    /// or the scalar itself.
    pub fn find(&self, kind: &str, id: Option<&EntityId>) -> Option<&Entity> {
        match (self.nodes.get(kind)?, id) {
            (StateNode::Scalar(entity), _) => Some(entity),
            (StateNode::Collection(map), Some(id)) => map.get(id),
            (StateNode::Collection(_), None) => None,
        }
    }

    /// Top-level kind names in initial-document order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Serialize for StateNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StateNode::Scalar(entity) => entity.serialize(serializer),
            StateNode::Collection(map) => map.serialize(serializer),
        }
    }
}

/// Serializes to the same shape the initial-state document had: scalars as
/// objects, collections as arrays.
impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (kind, node) in &self.nodes {
            map.serialize_entry(kind, node)?;
        }
        map.end()
    }
}
