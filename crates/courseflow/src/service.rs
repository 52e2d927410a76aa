//! The remote update-service seam.
//!
//! Mutations do not own a transport. They build an [`UpdateRequest`],
//! hand it to whatever [`UpdateService`] the host wired in, and translate
//! the returned [`UpdateRecord`]s into state changes. Serialization of the
//! request on the wire is the implementor's concern; the types here are
//! plain serde data.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a returned update record asks the state manager to do.
///
/// A record without an action is an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Create,
    Update,
    Delete,
}

/// One `{name, action, fields}` record returned by the update service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// Top-level state kind the record targets.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<UpdateAction>,
    /// Field bag to create from, patch with, or (for deletes) take the
    /// target id from.
    pub fields: Value,
}

impl UpdateRecord {
    pub fn create(name: impl Into<String>, fields: Value) -> Self {
        Self {
            name: name.into(),
            action: Some(UpdateAction::Create),
            fields,
        }
    }

    pub fn update(name: impl Into<String>, fields: Value) -> Self {
        Self {
            name: name.into(),
            action: Some(UpdateAction::Update),
            fields,
        }
    }

    pub fn delete(name: impl Into<String>, fields: Value) -> Self {
        Self {
            name: name.into(),
            action: Some(UpdateAction::Delete),
            fields,
        }
    }
}

/// A course-editor action sent to the update service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Action name, e.g. `"cm_move"`.
    pub action: String,
    /// Course the affected entities belong to.
    pub course_id: i64,
    /// Ids of the affected entities.
    pub ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_section_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cm_id: Option<i64>,
}

/// The remote mutation service: takes an action, returns the state
/// patches that make the client agree with the server.
#[async_trait]
pub trait UpdateService: Send + Sync {
    async fn mutate(&self, request: UpdateRequest) -> Result<Vec<UpdateRecord>>;
}

/// Service for hosts that wire no backend. Every call fails, loudly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUpdateService;

#[async_trait]
impl UpdateService for NullUpdateService {
    async fn mutate(&self, request: UpdateRequest) -> Result<Vec<UpdateRecord>> {
        anyhow::bail!(
            "no update service configured (action `{}` not sent)",
            request.action
        )
    }
}
