//! Facade tests: component registration, watcher routing, dispatch, and
//! the one-time initial-load notification.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use courseflow_testing::{course_fixture, EventRecorder, ScriptedUpdateService};

use courseflow_core::{
    Component, Mutation, MutationArgs, MutationContext, ReactiveBuilder, StateError, UpdateRecord,
    Watcher,
};

// ============================================================================
// Local mutations
// ============================================================================

/// Renames section 10 without any service round-trip.
struct RenameSection;

#[async_trait]
impl Mutation for RenameSection {
    async fn apply(&self, ctx: MutationContext<'_>, args: MutationArgs) -> Result<()> {
        let name: String = args.parse()?;
        ctx.manager.process_updates(
            vec![UpdateRecord::update("section", json!({"id": 10, "name": name}))],
            &courseflow_core::UpdatePolicy::strict(),
        )?;
        Ok(())
    }
}

/// Always fails, before touching anything.
struct Explode;

#[async_trait]
impl Mutation for Explode {
    async fn apply(&self, _ctx: MutationContext<'_>, _args: MutationArgs) -> Result<()> {
        anyhow::bail!("boom")
    }
}

// ============================================================================
// Registration and routing
// ============================================================================

#[tokio::test]
async fn watchers_receive_matching_events_in_registration_order() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_mutation("rename", RenameSection)
        .with_state(course_fixture())
        .build()
        .unwrap();

    let first = EventRecorder::new("first", ["section[10]:updated"]);
    let second = EventRecorder::new("second", ["section[10]:updated", "cm:updated"]);
    reactive.register_component(&first).unwrap();
    reactive.register_component(&second).unwrap();

    reactive
        .dispatch("rename", MutationArgs::new("Week 1 (renamed)").unwrap())
        .await
        .unwrap();

    let events = first.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "section[10]:updated");
    assert_eq!(events[0].element_id, Some(courseflow_core::EntityId::Num(10)));

    // second watched an event that never fired plus the same one
    assert_eq!(second.event_names(), vec!["section[10]:updated".to_string()]);

    assert_eq!(
        reactive
            .state()
            .collection("section")
            .unwrap()
            .get(&courseflow_core::EntityId::Num(10))
            .unwrap()
            .get_str("name"),
        Some("Week 1 (renamed)")
    );
}

#[tokio::test]
async fn same_pattern_handlers_run_in_registration_order() {
    use std::sync::Mutex;

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }
    impl Component for Tagged {
        fn name(&self) -> &str {
            self.tag
        }
        fn watchers(&self) -> Vec<Watcher> {
            let tag = self.tag;
            let log = Arc::clone(&self.log);
            vec![Watcher::new("section[10]:updated", move |_| {
                log.lock().unwrap().push(tag);
            })]
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut reactive = ReactiveBuilder::new("test")
        .with_mutation("rename", RenameSection)
        .with_state(course_fixture())
        .build()
        .unwrap();
    reactive
        .register_component(&Tagged { tag: "alpha", log: Arc::clone(&log) })
        .unwrap();
    reactive
        .register_component(&Tagged { tag: "beta", log: Arc::clone(&log) })
        .unwrap();

    reactive
        .dispatch("rename", MutationArgs::new("ordered").unwrap())
        .await
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["alpha", "beta"]);
}

#[test]
fn watcher_without_event_name_fails_registration() {
    struct Broken;
    impl Component for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn watchers(&self) -> Vec<Watcher> {
            vec![Watcher::new("", |_| {})]
        }
    }

    let mut reactive = ReactiveBuilder::new("test").build().unwrap();
    let err = reactive.register_component(&Broken).unwrap_err();
    assert!(matches!(err, StateError::InvalidWatcher { .. }));
}

// ============================================================================
// Initial-load notification
// ============================================================================

#[test]
fn early_registrant_hears_the_load_once() {
    let mut reactive = ReactiveBuilder::new("test").build().unwrap();
    let recorder = EventRecorder::new("early", ["state:loaded"]);
    reactive.register_component(&recorder).unwrap();

    reactive.set_initial_state(course_fixture()).unwrap();
    assert_eq!(recorder.event_names(), vec!["state:loaded".to_string()]);
}

#[test]
fn late_registrant_gets_an_immediate_replay_once() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_state(course_fixture())
        .build()
        .unwrap();

    let recorder = EventRecorder::new("late", ["state:loaded"]);
    reactive.register_component(&recorder).unwrap();
    assert_eq!(recorder.event_names(), vec!["state:loaded".to_string()]);
}

#[test]
fn presupplied_state_and_manual_load_are_mutually_exclusive() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_state(course_fixture())
        .build()
        .unwrap();
    let err = reactive.set_initial_state(course_fixture());
    assert!(matches!(err, Err(StateError::AlreadyInitialized)));
}

#[tokio::test]
async fn loaded_resolves_for_late_awaiters() {
    let reactive = ReactiveBuilder::new("test")
        .with_state(course_fixture())
        .build()
        .unwrap();
    // already loaded: must resolve immediately rather than hang
    reactive.loaded().await;
    assert!(reactive.is_loaded());
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn dispatching_an_unknown_mutation_fails() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_state(course_fixture())
        .build()
        .unwrap();
    let err = reactive
        .dispatch("does_not_exist", MutationArgs::none())
        .await
        .unwrap_err();
    let err = err.downcast::<StateError>().unwrap();
    assert!(matches!(err, StateError::UnknownMutation(name) if name == "does_not_exist"));
}

#[tokio::test]
async fn mutation_failures_reach_the_caller() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_mutation("explode", Explode)
        .with_state(course_fixture())
        .build()
        .unwrap();
    let err = reactive
        .dispatch("explode", MutationArgs::none())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

#[tokio::test]
async fn later_mutation_registrations_win() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_mutation("rename", Explode)
        .with_state(course_fixture())
        .build()
        .unwrap();

    let mut table: HashMap<String, Arc<dyn Mutation>> = HashMap::new();
    table.insert("rename".to_string(), Arc::new(RenameSection));
    reactive.add_mutations(table);

    reactive
        .dispatch("rename", MutationArgs::new("after override").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn set_mutations_replaces_the_whole_table() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_mutation("rename", RenameSection)
        .with_state(course_fixture())
        .build()
        .unwrap();

    reactive.set_mutations(HashMap::new());
    let err = reactive
        .dispatch("rename", MutationArgs::new("gone").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast::<StateError>().unwrap(),
        StateError::UnknownMutation(_)
    ));
}

// ============================================================================
// Service wiring
// ============================================================================

#[tokio::test]
async fn the_null_service_rejects_remote_mutations() {
    let mut reactive = ReactiveBuilder::new("test")
        .with_mutations(courseflow_core::course::course_mutations())
        .with_state(course_fixture())
        .build()
        .unwrap();
    let err = reactive
        .dispatch(
            "cm_hide",
            MutationArgs::new(courseflow_core::course::IdArgs { ids: vec![5] }).unwrap(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no update service configured"));
}

#[tokio::test]
async fn a_scripted_service_sees_the_request() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_records(vec![UpdateRecord::update(
        "cm",
        json!({"id": 5, "visible": false}),
    )]);

    let mut reactive = ReactiveBuilder::new("test")
        .with_service(service.clone())
        .with_mutations(courseflow_core::course::course_mutations())
        .with_state(course_fixture())
        .build()
        .unwrap();

    reactive
        .dispatch(
            "cm_hide",
            MutationArgs::new(courseflow_core::course::IdArgs { ids: vec![5] }).unwrap(),
        )
        .await
        .unwrap();

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].action, "cm_hide");
    assert_eq!(requests[0].course_id, 1);
    assert_eq!(requests[0].ids, vec![5]);
}
