//! Contract errors raised by the state engine.
//!
//! Every variant here is a caller bug, not a runtime condition to recover
//! from: writing while locked, loading the initial state twice, mismatched
//! ids, dispatching an unregistered mutation. They are raised synchronously
//! and abort the operation that triggered them.
//!
//! Service and mutation failures are a different axis and travel as
//! `anyhow::Error` through the mutation layer (see [`crate::mutation`]).

use crate::entity::EntityId;

/// Error raised when a state-engine contract is violated.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// `set_initial_state` was called on an already-initialized manager.
    #[error("initial state has already been loaded")]
    AlreadyInitialized,

    /// The initial-state document did not have the expected shape.
    #[error("invalid initial state: {reason}")]
    InvalidInitialState { reason: String },

    /// A field write was attempted while the state was locked.
    #[error("state is locked: cannot write field `{field}` on `{kind}`")]
    LockedWrite { kind: String, field: String },

    /// A collection mutation was attempted while the state was locked.
    #[error("state is locked: cannot mutate collection `{kind}`")]
    LockedCollection { kind: String },

    /// An entity destined for a collection carries no usable `id` field.
    #[error("entity of kind `{kind}` is missing an id")]
    MissingId { kind: String },

    /// A collection entity was stored under a key different from its id.
    #[error("key `{key}` does not match entity id `{id}` in `{kind}`")]
    KeyIdMismatch {
        kind: String,
        key: EntityId,
        id: EntityId,
    },

    /// An entity value was not a JSON object.
    #[error("entity of kind `{kind}` must be a JSON object")]
    MalformedEntity { kind: String },

    /// An update record could not be interpreted.
    #[error("malformed update for `{name}`: {reason}")]
    MalformedUpdate { name: String, reason: String },

    /// An update named a top-level kind the state tree does not hold.
    #[error("unknown state kind `{0}`")]
    UnknownKind(String),

    /// An update targeted an entity absent from its collection.
    #[error("no entity `{kind}[{id}]` to update")]
    UnknownEntity { kind: String, id: EntityId },

    /// A create was issued against a scalar kind without the scalar-create
    /// policy.
    #[error("cannot create entities in scalar kind `{kind}`")]
    ScalarCreate { kind: String },

    /// An update or delete against a collection kind carried no id.
    #[error("update for collection kind `{kind}` requires an id")]
    UpdateWithoutId { kind: String },

    /// A mutation name was dispatched without a registered handler.
    #[error("unknown mutation `{0}`")]
    UnknownMutation(String),

    /// A component declared a watcher without an event name.
    #[error("component `{component}` declared a watcher without an event name")]
    InvalidWatcher { component: String },
}
