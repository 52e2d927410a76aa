//! Mutation-set tests: argument validation before I/O, busy-flag
//! discipline around the round-trip, per-mutation failure policy, and the
//! upload queue.

use std::sync::Arc;

use serde_json::json;

use courseflow_testing::{
    course_fixture, EventRecorder, ScriptedUpdateService, ScriptedUploadService,
};

use courseflow_core::course::{course_mutations, CmMoveArgs, IdArgs, SectionMoveArgs};
use courseflow_core::{EntityId, MutationArgs, Reactive, ReactiveBuilder, UpdateRecord, UploadQueue};

fn editor(service: &Arc<ScriptedUpdateService>) -> Reactive {
    ReactiveBuilder::new("course-editor")
        .with_service(Arc::clone(service) as Arc<dyn courseflow_core::UpdateService>)
        .with_mutations(course_mutations())
        .with_state(course_fixture())
        .build()
        .unwrap()
}

fn cm_locked_flag(reactive: &Reactive, id: i64) -> Option<bool> {
    reactive
        .state()
        .collection("cm")
        .unwrap()
        .get(&EntityId::Num(id))
        .and_then(|cm| cm.get_bool("locked"))
}

// ============================================================================
// Argument validation happens before any network call
// ============================================================================

#[tokio::test]
async fn cm_move_without_a_target_fails_before_the_service_is_called() {
    let service = Arc::new(ScriptedUpdateService::new());
    let mut reactive = editor(&service);

    let err = reactive
        .dispatch(
            "cm_move",
            MutationArgs::new(CmMoveArgs {
                ids: vec![5],
                target_section_id: None,
                target_cm_id: None,
            })
            .unwrap(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("target"));
    assert_eq!(service.request_count(), 0, "no request may be sent");
}

#[tokio::test]
async fn section_move_without_a_target_fails_before_the_service_is_called() {
    let service = Arc::new(ScriptedUpdateService::new());
    let mut reactive = editor(&service);

    let err = reactive
        .dispatch(
            "section_move",
            MutationArgs::new(SectionMoveArgs {
                ids: vec![10],
                target_section_id: None,
            })
            .unwrap(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("target"));
    assert_eq!(service.request_count(), 0);
}

#[tokio::test]
async fn empty_id_lists_are_rejected() {
    let service = Arc::new(ScriptedUpdateService::new());
    let mut reactive = editor(&service);
    let err = reactive
        .dispatch("cm_hide", MutationArgs::new(IdArgs { ids: vec![] }).unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no ids"));
    assert_eq!(service.request_count(), 0);
}

// ============================================================================
// The round-trip
// ============================================================================

#[tokio::test]
async fn cm_hide_applies_the_response_and_clears_the_busy_flag() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_records(vec![UpdateRecord::update(
        "cm",
        json!({"id": 5, "visible": false}),
    )]);
    let mut reactive = editor(&service);

    let recorder = EventRecorder::new("probe", ["cm[5]:updated"]);
    reactive.register_component(&recorder).unwrap();

    reactive
        .dispatch("cm_hide", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .unwrap();

    let cm = reactive
        .state()
        .collection("cm")
        .unwrap()
        .get(&EntityId::Num(5))
        .unwrap();
    assert_eq!(cm.get_bool("visible"), Some(false));
    assert_eq!(cm_locked_flag(&reactive, 5), Some(false), "busy flag cleared");
    assert!(!recorder.events().is_empty());
}

#[tokio::test]
async fn the_busy_flag_is_visible_while_the_call_is_in_flight() {
    // the service answer itself flips visible; the "locked" field was set
    // in a separate flush before the request went out, so a watcher saw
    // locked=true before it saw visible=false
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_records(vec![UpdateRecord::update(
        "cm",
        json!({"id": 5, "visible": false}),
    )]);
    let mut reactive = editor(&service);

    let recorder = EventRecorder::new("probe", ["cm[5].locked:created", "cm[5].visible:updated"]);
    reactive.register_component(&recorder).unwrap();

    reactive
        .dispatch("cm_hide", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .unwrap();

    let names = recorder.event_names();
    let busy_on = names.iter().position(|n| n == "cm[5].locked:created").unwrap();
    let applied = names.iter().position(|n| n == "cm[5].visible:updated").unwrap();
    assert!(busy_on < applied, "busy flag must land first: {names:?}");
}

#[tokio::test]
async fn editing_mutations_rethrow_service_failures_but_clear_flags() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_failure("server said no");
    let mut reactive = editor(&service);

    let err = reactive
        .dispatch("cm_hide", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("server said no"));
    assert_eq!(cm_locked_flag(&reactive, 5), Some(false), "flag cleared on failure");
}

#[tokio::test]
async fn refresh_mutations_swallow_service_failures() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_failure("backend down");
    let mut reactive = editor(&service);

    reactive
        .dispatch("cm_state", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .expect("refresh failures are swallowed");
    assert_eq!(
        reactive
            .state()
            .collection("cm")
            .unwrap()
            .get(&EntityId::Num(5))
            .unwrap()
            .get_str("name"),
        Some("Quiz"),
        "state kept as-is"
    );
}

#[tokio::test]
async fn refresh_upserts_entities_the_client_has_never_seen() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_records(vec![
        UpdateRecord::update("cm", json!({"id": 5, "name": "Quiz v2"})),
        UpdateRecord::update("cm", json!({"id": 99, "name": "Brand new", "sectionid": 11})),
    ]);
    let mut reactive = editor(&service);

    reactive
        .dispatch("cm_state", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .unwrap();

    let cms = reactive.state().collection("cm").unwrap();
    assert_eq!(cms.get(&EntityId::Num(5)).unwrap().get_str("name"), Some("Quiz v2"));
    assert_eq!(cms.get(&EntityId::Num(99)).unwrap().get_str("name"), Some("Brand new"));
}

#[tokio::test]
async fn cm_duplicate_accepts_newly_introduced_modules() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_records(vec![UpdateRecord::create(
        "cm",
        json!({"id": 7, "name": "Quiz (copy)", "sectionid": 10}),
    )]);
    let mut reactive = editor(&service);

    reactive
        .dispatch("cm_duplicate", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .unwrap();
    assert!(reactive
        .state()
        .collection("cm")
        .unwrap()
        .contains(&EntityId::Num(7)));
}

#[tokio::test]
async fn cm_delete_applies_delete_records_without_a_stuck_flag() {
    let service = Arc::new(ScriptedUpdateService::new());
    service.push_records(vec![UpdateRecord::delete("cm", json!({"id": 5}))]);
    let mut reactive = editor(&service);

    reactive
        .dispatch("cm_delete", MutationArgs::new(IdArgs { ids: vec![5] }).unwrap())
        .await
        .unwrap();
    assert!(reactive
        .state()
        .collection("cm")
        .unwrap()
        .get(&EntityId::Num(5))
        .is_none());
}

// ============================================================================
// Upload queue
// ============================================================================

#[tokio::test]
async fn the_upload_queue_drains_in_order_and_applies_responses() {
    let uploads = Arc::new(ScriptedUploadService::new());
    uploads.push_records(vec![UpdateRecord::create(
        "cm",
        json!({"id": 50, "name": "slides.pdf", "sectionid": 10}),
    )]);
    uploads.push_records(vec![UpdateRecord::create(
        "cm",
        json!({"id": 51, "name": "notes.txt", "sectionid": 10}),
    )]);

    let mut reactive = ReactiveBuilder::new("uploader")
        .with_state(course_fixture())
        .build()
        .unwrap();
    let mut queue = UploadQueue::new(Arc::clone(&uploads) as Arc<dyn courseflow_core::UploadService>);
    queue.enqueue(10, "slides.pdf", b"pdf".to_vec());
    queue.enqueue(10, "notes.txt", b"txt".to_vec());
    assert_eq!(queue.len(), 2);

    let report = queue.drain(reactive.manager_mut()).await;
    assert_eq!(report.completed.len(), 2);
    assert!(report.failed.is_empty());
    assert!(queue.is_empty());
    assert_eq!(uploads.uploaded(), vec!["slides.pdf".to_string(), "notes.txt".to_string()]);

    let cms = reactive.state().collection("cm").unwrap();
    assert!(cms.contains(&EntityId::Num(50)));
    assert!(cms.contains(&EntityId::Num(51)));
}

#[tokio::test]
async fn one_failed_upload_does_not_stall_the_queue() {
    let uploads = Arc::new(ScriptedUploadService::new());
    uploads.push_failure("disk full");
    uploads.push_records(vec![UpdateRecord::create(
        "cm",
        json!({"id": 51, "name": "notes.txt", "sectionid": 10}),
    )]);

    let mut reactive = ReactiveBuilder::new("uploader")
        .with_state(course_fixture())
        .build()
        .unwrap();
    let mut queue = UploadQueue::new(Arc::clone(&uploads) as Arc<dyn courseflow_core::UploadService>);
    let failed_id = queue.enqueue(10, "slides.pdf", b"pdf".to_vec());
    queue.enqueue(10, "notes.txt", b"txt".to_vec());

    let report = queue.drain(reactive.manager_mut()).await;
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, failed_id);
    assert!(reactive
        .state()
        .collection("cm")
        .unwrap()
        .contains(&EntityId::Num(51)));
}
