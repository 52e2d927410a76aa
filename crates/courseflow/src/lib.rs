//! # Courseflow
//!
//! An event-batched, mutation-gated reactive state engine where mutations
//! write, watchers observe, and the lock defines authority.
//!
//! ## Core Concepts
//!
//! Courseflow separates **state** from the **right to change it**:
//! - [`StateManager`] = the state tree plus its write gate
//! - [`Mutation`] = the only sanctioned path through that gate
//!
//! The key principle: **outside a mutation, the tree is locked**. A view
//! component never writes state; it dispatches a named mutation and waits
//! to be told what changed.
//!
//! ## Architecture
//!
//! ```text
//! View component
//!     │
//!     ▼ dispatch("cm_move", args)
//! Reactive ──► Mutation.apply()
//!                  │
//!                  ├─► set_locked(false)  ── busy flags on
//!                  │
//!                  ├─► UpdateService.mutate() ──► [UpdateRecord]
//!                  │
//!                  ├─► StateManager.process_updates()
//!                  │        │  (entities announce field/entity events)
//!                  │        ▼
//!                  └─► set_locked(true) ──► flush
//!                                             │ sort: created→updated→deleted
//!                                             │ dedup: one per (name, id)
//!                                             ▼
//!                                       watcher handlers
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Locked by default** - Writes outside an open gate fail, naming the
//!    field and kind
//! 2. **Keys equal ids** - A collection entry's key always equals its
//!    entity's `id`
//! 3. **Initial load happens once** - A second `set_initial_state` fails
//! 4. **Flushes are ordered** - Consumers see creations before updates
//!    before deletions, one delivery per `(event, id)` pair
//! 5. **Idempotent writes are silent** - Structurally equal field writes
//!    enqueue nothing
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courseflow_core::{course, MutationArgs, ReactiveBuilder, Watcher};
//! use serde_json::json;
//!
//! let mut reactive = ReactiveBuilder::new("course-editor")
//!     .with_service(Arc::new(my_backend))
//!     .with_mutations(course::course_mutations())
//!     .with_state(json!({
//!         "course": {"id": 1, "name": "Rust 101"},
//!         "section": [{"id": 10, "name": "Week 1"}],
//!         "cm": [{"id": 5, "name": "Quiz", "sectionid": 10, "visible": true}],
//!     }))
//!     .build()?;
//!
//! reactive.register_component(&my_section_list)?;
//!
//! reactive
//!     .dispatch("cm_hide", MutationArgs::new(course::IdArgs { ids: vec![5] })?)
//!     .await?;
//! // watchers on "cm[5]:updated" and "cm:updated" have now run
//! ```
//!
//! ## What This Is Not
//!
//! Courseflow is **not**:
//! - A rendering layer (it emits events; hosts draw)
//! - A transport (the update service is a trait the host implements)
//! - A persistence layer (state lives and dies with the page)
//! - A conflict resolver (two racing mutations are the host's problem;
//!   the `&mut` receiver already serializes them per instance)
//!
//! Courseflow **is**:
//! > An event-batched, mutation-gated reactive state engine where
//! > mutations write, watchers observe, and the lock defines authority.

// Core modules
pub mod course;
mod entity;
mod error;
mod event;
mod gate;
mod manager;
mod mutation;
mod reactive;
mod service;
mod state;
mod state_map;
mod upload;


// Randomized update storms (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export entity types
pub use entity::{Entity, EntityId};

// Re-export error types
pub use error::StateError;

// Re-export event types
pub use event::{ChangeEvent, EventAction, EventSink, NoOpSink, STATE_LOADED};

// Re-export manager types
pub use manager::{StateManager, UpdatePolicy};

// Re-export mutation types
pub use mutation::{Mutation, MutationArgs, MutationContext};

// Re-export facade types (primary entry point)
pub use reactive::{
    Component, EventData, Reactive, ReactiveBuilder, Watcher, WatcherHandler,
};

// Re-export service types
pub use service::{NullUpdateService, UpdateAction, UpdateRecord, UpdateRequest, UpdateService};

// Re-export state tree types
pub use state::{State, StateNode};
pub use state_map::StateMap;

// Re-export upload queue types
pub use upload::{UploadJob, UploadQueue, UploadReport, UploadService};

// Re-export commonly used external types
pub use async_trait::async_trait;
