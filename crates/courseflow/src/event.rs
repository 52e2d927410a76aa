//! Change events and their delivery contract.
//!
//! Every observable state change enqueues one or more [`ChangeEvent`]s on
//! the owning manager's pending queue. A flush sorts the queue by action
//! weight, deduplicates repeated `(name, id)` pairs, and hands the
//! surviving events to the manager's [`EventSink`] together with the live
//! state, in that order:
//!
//! creations → updates → deletions
//!
//! Event names are flat strings so watchers can match them exactly:
//!
//! ```text
//! section:updated              whole-kind event
//! section[10]:updated          one entity
//! section.title:updated        one field, any entity
//! section[10].title:updated    one field on one entity
//! state:loaded                 one-time initial-load event
//! ```

use std::fmt;

use crate::entity::EntityId;
use crate::state::State;

/// Name of the one-time event fired when the initial state is loaded.
pub const STATE_LOADED: &str = "state:loaded";

/// Coarse action tag carried by every event.
///
/// The tag decides flush ordering, nothing else; the event name already
/// spells the action out for watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
    /// Only ever carried by the [`STATE_LOADED`] event.
    Loaded,
}

impl EventAction {
    /// Flush weight: creations sort before updates, updates before
    /// deletions.
    pub(crate) fn weight(self) -> u8 {
        match self {
            EventAction::Created => 0,
            EventAction::Updated => 1,
            EventAction::Deleted => 2,
            EventAction::Loaded => 3,
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventAction::Created => "created",
            EventAction::Updated => "updated",
            EventAction::Deleted => "deleted",
            EventAction::Loaded => "loaded",
        })
    }
}

/// One observable state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Flat event name watchers match against, e.g. `"cm[5].name:updated"`.
    pub name: String,
    /// Coarse action tag used for flush ordering.
    pub action: EventAction,
    /// Top-level kind the change happened under.
    pub kind: String,
    /// Id of the touched entity, when it has one.
    pub id: Option<EntityId>,
    /// Field name for per-field events.
    pub field: Option<String>,
}

impl ChangeEvent {
    /// Entity-level event: `"<kind>:<action>"` or `"<kind>[<id>]:<action>"`.
    pub(crate) fn entity(kind: &str, id: Option<&EntityId>, action: EventAction) -> Self {
        let name = match id {
            Some(id) => format!("{kind}[{id}]:{action}"),
            None => format!("{kind}:{action}"),
        };
        Self {
            name,
            action,
            kind: kind.to_string(),
            id: id.cloned(),
            field: None,
        }
    }

    /// Field-level event: `"<kind>.<field>:<action>"` or
    /// `"<kind>[<id>].<field>:<action>"`.
    pub(crate) fn field(
        kind: &str,
        id: Option<&EntityId>,
        field: &str,
        action: EventAction,
    ) -> Self {
        let name = match id {
            Some(id) => format!("{kind}[{id}].{field}:{action}"),
            None => format!("{kind}.{field}:{action}"),
        };
        Self {
            name,
            action,
            kind: kind.to_string(),
            id: id.cloned(),
            field: Some(field.to_string()),
        }
    }

    /// The one-time initial-load event.
    pub(crate) fn loaded() -> Self {
        Self {
            name: STATE_LOADED.to_string(),
            action: EventAction::Loaded,
            kind: "state".to_string(),
            id: None,
            field: None,
        }
    }

}

/// Receives each flushed batch of events together with the live state.
///
/// The manager calls this synchronously at the end of a flush; the sink is
/// expected to route events to interested consumers and return. Hosts that
/// want timer-based coalescing wrap the flush, not the sink.
pub trait EventSink: Send + Sync {
    fn deliver(&self, state: &State, events: &[ChangeEvent]);
}

/// Sink that drops every event. Useful for managers whose host has no
/// observers yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn deliver(&self, _state: &State, _events: &[ChangeEvent]) {}
}
