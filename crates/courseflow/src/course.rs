//! The course-editor mutation set.
//!
//! These are the named operations a course editing surface dispatches:
//! moving course modules and sections, toggling visibility, deleting,
//! duplicating, and refreshing server truth. They all follow the same
//! shape — validate arguments, mark the affected entities busy, await the
//! update service, apply its records, clear the busy flags — and differ in
//! their action name, target kind, update policy, and failure policy.
//!
//! The busy marker is a plain `locked` field on the entity, a business
//! flag for "operation in progress" UI. It is unrelated to the manager's
//! write gate and is flipped by briefly opening that gate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::entity::EntityId;
use crate::error::StateError;
use crate::manager::{StateManager, UpdatePolicy};
use crate::mutation::{Mutation, MutationArgs, MutationContext};
use crate::service::UpdateRequest;

const CM: &str = "cm";
const SECTION: &str = "section";

/// Arguments for mutations that act on a list of entity ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdArgs {
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// Arguments for [`CmMove`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmMoveArgs {
    pub ids: Vec<i64>,
    #[serde(default)]
    pub target_section_id: Option<i64>,
    #[serde(default)]
    pub target_cm_id: Option<i64>,
}

/// Arguments for [`SectionMove`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionMoveArgs {
    pub ids: Vec<i64>,
    #[serde(default)]
    pub target_section_id: Option<i64>,
}

/// The id of the course the state tree describes.
fn course_id(manager: &StateManager) -> Result<i64> {
    manager
        .state()
        .scalar("course")
        .and_then(|course| course.get_i64("id"))
        .context("state has no course id")
}

/// Flip the business `locked` flag on the given entities. Ids that are no
/// longer present (deleted mid-operation) are skipped.
fn set_busy(
    manager: &mut StateManager,
    kind: &str,
    ids: &[i64],
    busy: bool,
) -> Result<(), StateError> {
    manager.set_locked(false);
    let mut outcome = Ok(());
    for id in ids {
        let Some(entity) = manager.entity_mut(kind, &EntityId::Num(*id)) else {
            continue;
        };
        if let Err(err) = entity.set_field("locked", Value::Bool(busy)) {
            outcome = Err(err);
            break;
        }
    }
    manager.set_locked(true);
    outcome
}

/// The shared round-trip: busy flags on, service call, apply records,
/// busy flags off. The flags come off in success and failure paths alike.
async fn remote_call(
    ctx: &mut MutationContext<'_>,
    kind: &'static str,
    action: &'static str,
    ids: &[i64],
    target_section_id: Option<i64>,
    target_cm_id: Option<i64>,
    policy: UpdatePolicy,
) -> Result<()> {
    let course_id = course_id(ctx.manager)?;
    set_busy(ctx.manager, kind, ids, true)?;
    let request = UpdateRequest {
        action: action.to_string(),
        course_id,
        ids: ids.to_vec(),
        target_section_id,
        target_cm_id,
    };
    let outcome = match ctx.service.mutate(request).await {
        Ok(records) => ctx
            .manager
            .process_updates(records, &policy)
            .map_err(anyhow::Error::from),
        Err(err) => Err(err),
    };
    set_busy(ctx.manager, kind, ids, false)?;
    outcome
}

/// Move course modules to a target section or after a target module.
pub struct CmMove;

#[async_trait]
impl Mutation for CmMove {
    async fn apply(&self, mut ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let args: CmMoveArgs = args.parse()?;
        ensure!(!args.ids.is_empty(), "cm_move: no course module ids supplied");
        ensure!(
            args.target_section_id.is_some() || args.target_cm_id.is_some(),
            "cm_move: a target section or a target course module is required"
        );
        remote_call(
            &mut ctx,
            CM,
            "cm_move",
            &args.ids,
            args.target_section_id,
            args.target_cm_id,
            UpdatePolicy::strict(),
        )
        .await
    }
}

/// Move sections to sit after a target section.
pub struct SectionMove;

#[async_trait]
impl Mutation for SectionMove {
    async fn apply(&self, mut ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let args: SectionMoveArgs = args.parse()?;
        ensure!(!args.ids.is_empty(), "section_move: no section ids supplied");
        ensure!(
            args.target_section_id.is_some(),
            "section_move: a target section is required"
        );
        remote_call(
            &mut ctx,
            SECTION,
            "section_move",
            &args.ids,
            args.target_section_id,
            None,
            UpdatePolicy::strict(),
        )
        .await
    }
}

/// Visibility toggles: one mutation shape, five registered names.
pub struct Visibility {
    kind: &'static str,
    action: &'static str,
}

impl Visibility {
    pub fn cm_hide() -> Self {
        Self { kind: CM, action: "cm_hide" }
    }

    pub fn cm_show() -> Self {
        Self { kind: CM, action: "cm_show" }
    }

    /// Visible on the course page for students who have the link only.
    pub fn cm_stealth() -> Self {
        Self { kind: CM, action: "cm_stealth" }
    }

    pub fn section_hide() -> Self {
        Self { kind: SECTION, action: "section_hide" }
    }

    pub fn section_show() -> Self {
        Self { kind: SECTION, action: "section_show" }
    }
}

#[async_trait]
impl Mutation for Visibility {
    async fn apply(&self, mut ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let args: IdArgs = args.parse()?;
        ensure!(!args.ids.is_empty(), "{}: no ids supplied", self.action);
        remote_call(
            &mut ctx,
            self.kind,
            self.action,
            &args.ids,
            None,
            None,
            UpdatePolicy::strict(),
        )
        .await
    }
}

/// Delete course modules. The service response carries the delete records.
pub struct CmDelete;

#[async_trait]
impl Mutation for CmDelete {
    async fn apply(&self, mut ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let args: IdArgs = args.parse()?;
        ensure!(!args.ids.is_empty(), "cm_delete: no course module ids supplied");
        remote_call(
            &mut ctx,
            CM,
            "cm_delete",
            &args.ids,
            None,
            None,
            UpdatePolicy::strict(),
        )
        .await
    }
}

/// Duplicate course modules. The response introduces entities the client
/// has never seen, so absent targets upsert instead of failing.
pub struct CmDuplicate;

#[async_trait]
impl Mutation for CmDuplicate {
    async fn apply(&self, mut ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let args: IdArgs = args.parse()?;
        ensure!(!args.ids.is_empty(), "cm_duplicate: no course module ids supplied");
        remote_call(
            &mut ctx,
            CM,
            "cm_duplicate",
            &args.ids,
            None,
            None,
            UpdatePolicy::upsert(),
        )
        .await
    }
}

/// Server-truth refresh for one kind.
///
/// Refreshes log and swallow service failures: the view keeps its current
/// (stale but consistent) state and the host is free to retry. This is
/// the one mutation family that does not re-raise.
pub struct Refresh {
    kind: &'static str,
    action: &'static str,
}

impl Refresh {
    pub fn cm() -> Self {
        Self { kind: CM, action: "cm_state" }
    }

    pub fn section() -> Self {
        Self { kind: SECTION, action: "section_state" }
    }

    pub fn course() -> Self {
        Self { kind: "course", action: "course_state" }
    }
}

#[async_trait]
impl Mutation for Refresh {
    async fn apply(&self, mut ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let args: IdArgs = args.parse().unwrap_or_default();
        let correlation = ctx.correlation;
        match remote_call(
            &mut ctx,
            self.kind,
            self.action,
            &args.ids,
            None,
            None,
            UpdatePolicy::upsert(),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(action = self.action, %correlation, error = %err, "state refresh failed; keeping current state");
                Ok(())
            }
        }
    }
}

/// The full course-editor mutation table, keyed by dispatch name.
pub fn course_mutations() -> HashMap<String, Arc<dyn Mutation>> {
    let mut table: HashMap<String, Arc<dyn Mutation>> = HashMap::new();
    table.insert("cm_move".to_string(), Arc::new(CmMove));
    table.insert("section_move".to_string(), Arc::new(SectionMove));
    table.insert("cm_hide".to_string(), Arc::new(Visibility::cm_hide()));
    table.insert("cm_show".to_string(), Arc::new(Visibility::cm_show()));
    table.insert("cm_stealth".to_string(), Arc::new(Visibility::cm_stealth()));
    table.insert("section_hide".to_string(), Arc::new(Visibility::section_hide()));
    table.insert("section_show".to_string(), Arc::new(Visibility::section_show()));
    table.insert("cm_delete".to_string(), Arc::new(CmDelete));
    table.insert("cm_duplicate".to_string(), Arc::new(CmDuplicate));
    table.insert("cm_state".to_string(), Arc::new(Refresh::cm()));
    table.insert("section_state".to_string(), Arc::new(Refresh::section()));
    table.insert("course_state".to_string(), Arc::new(Refresh::course()));
    table
}
