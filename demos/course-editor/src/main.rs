//! # Course Editor Example
//!
//! Wires a `Reactive` instance to a fake backend and walks through the
//! editing loop: load state, register a component, dispatch mutations,
//! watch the events come back.

use anyhow::Result;
use async_trait::async_trait;
use courseflow_core::{
    course, Component, MutationArgs, ReactiveBuilder, UpdateRecord, UpdateRequest,
    UpdateService, Watcher,
};
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Backend (the host's update service)
// ============================================================================

/// A stand-in for the real web service: answers each action with the
/// update records the server would compute.
struct EditorBackend;

#[async_trait]
impl UpdateService for EditorBackend {
    async fn mutate(&self, request: UpdateRequest) -> Result<Vec<UpdateRecord>> {
        println!("-> service: {} ids={:?}", request.action, request.ids);
        match request.action.as_str() {
            "cm_hide" => Ok(request
                .ids
                .iter()
                .map(|id| UpdateRecord::update("cm", json!({"id": id, "visible": false})))
                .collect()),
            "cm_show" => Ok(request
                .ids
                .iter()
                .map(|id| UpdateRecord::update("cm", json!({"id": id, "visible": true})))
                .collect()),
            "cm_move" => {
                let section = request.target_section_id.unwrap_or_default();
                Ok(request
                    .ids
                    .iter()
                    .map(|id| UpdateRecord::update("cm", json!({"id": id, "sectionid": section})))
                    .collect())
            }
            "cm_duplicate" => Ok(vec![UpdateRecord::create(
                "cm",
                json!({"id": 99, "name": "Quiz (copy)", "sectionid": 10, "visible": true}),
            )]),
            other => anyhow::bail!("backend does not handle `{other}`"),
        }
    }
}

// ============================================================================
// Component (the host's view layer)
// ============================================================================

/// Prints every event it watches; a real host would re-render instead.
struct ConsoleView;

impl Component for ConsoleView {
    fn name(&self) -> &str {
        "console-view"
    }

    fn watchers(&self) -> Vec<Watcher> {
        ["state:loaded", "cm:created", "cm:updated", "cm:deleted"]
            .into_iter()
            .map(|watch| {
                Watcher::new(watch, |data| {
                    let element = data
                        .element
                        .and_then(|e| e.get_str("name"))
                        .unwrap_or("<state>");
                    println!("<- event: {} ({element})", data.event.name);
                })
            })
            .collect()
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let mut reactive = ReactiveBuilder::new("course-editor")
        .with_service(Arc::new(EditorBackend))
        .with_mutations(course::course_mutations())
        .with_state(json!({
            "course": {"id": 1, "name": "Rust 101", "editmode": true},
            "section": [
                {"id": 10, "name": "Week 1", "visible": true},
                {"id": 11, "name": "Week 2", "visible": true},
            ],
            "cm": [
                {"id": 5, "name": "Quiz", "sectionid": 10, "visible": true},
                {"id": 6, "name": "Forum", "sectionid": 10, "visible": true},
            ],
        }))
        .build()?;

    reactive.register_component(&ConsoleView)?;

    // Hide the quiz, move the forum, duplicate the quiz
    reactive
        .dispatch("cm_hide", MutationArgs::new(course::IdArgs { ids: vec![5] })?)
        .await?;
    reactive
        .dispatch(
            "cm_move",
            MutationArgs::new(course::CmMoveArgs {
                ids: vec![6],
                target_section_id: Some(11),
                target_cm_id: None,
            })?,
        )
        .await?;
    reactive
        .dispatch("cm_duplicate", MutationArgs::new(course::IdArgs { ids: vec![5] })?)
        .await?;

    println!(
        "final state: {}",
        serde_json::to_string_pretty(reactive.state())?
    );

    Ok(())
}
