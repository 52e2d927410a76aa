//! Testing utilities for the Courseflow state engine.
//!
//! Scripted service doubles and an event-recording component, for tests
//! of hosts built on `courseflow-core` (and for the engine's own tests).
//!
//! # Usage
//!
//! ```rust,ignore
//! use courseflow_testing::{course_fixture, EventRecorder, ScriptedUpdateService};
//!
//! let service = Arc::new(ScriptedUpdateService::new());
//! service.push_records(vec![UpdateRecord::update("cm", json!({"id": 5, "visible": false}))]);
//!
//! let mut reactive = ReactiveBuilder::new("test")
//!     .with_service(service.clone())
//!     .with_state(course_fixture())
//!     .build()?;
//!
//! let recorder = EventRecorder::new("probe", ["cm:updated"]);
//! reactive.register_component(&recorder)?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use courseflow_core::{
    Component, EntityId, EventAction, UpdateRecord, UpdateRequest, UpdateService, UploadJob,
    UploadService, Watcher,
};

/// One scripted outcome for a service double.
#[derive(Debug, Clone)]
enum ScriptedOutcome {
    Records(Vec<UpdateRecord>),
    Fail(String),
}

/// Update service double: returns scripted responses in order and records
/// every request it receives.
///
/// Calling it with nothing scripted fails, which keeps tests honest about
/// how many round-trips they expect.
#[derive(Default)]
pub struct ScriptedUpdateService {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    requests: Mutex<Vec<UpdateRequest>>,
}

impl ScriptedUpdateService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful response.
    pub fn push_records(&self, records: Vec<UpdateRecord>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Records(records));
    }

    /// Script a failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Fail(message.into()));
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<UpdateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl UpdateService for ScriptedUpdateService {
    async fn mutate(&self, request: UpdateRequest) -> Result<Vec<UpdateRecord>> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(ScriptedOutcome::Records(records)) => Ok(records),
            Some(ScriptedOutcome::Fail(message)) => anyhow::bail!("{message}"),
            None => anyhow::bail!(
                "no scripted response left for action `{}`",
                request.action
            ),
        }
    }
}

/// Upload service double with the same scripting model.
#[derive(Default)]
pub struct ScriptedUploadService {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    uploaded: Mutex<Vec<String>>,
}

impl ScriptedUploadService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_records(&self, records: Vec<UpdateRecord>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Records(records));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedOutcome::Fail(message.into()));
    }

    /// Filenames uploaded so far, in order.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadService for ScriptedUploadService {
    async fn upload(&self, job: &UploadJob) -> Result<Vec<UpdateRecord>> {
        self.uploaded.lock().unwrap().push(job.filename.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(ScriptedOutcome::Records(records)) => Ok(records),
            Some(ScriptedOutcome::Fail(message)) => anyhow::bail!("{message}"),
            None => anyhow::bail!("no scripted response left for upload `{}`", job.filename),
        }
    }
}

/// One event observed by an [`EventRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub name: String,
    pub action: EventAction,
    /// Id of the element the event named, when it named one.
    pub element_id: Option<EntityId>,
}

/// A component whose watchers record every delivery.
pub struct EventRecorder {
    name: String,
    watches: Vec<String>,
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    pub fn new<I, S>(name: impl Into<String>, watches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            watches: watches.into_iter().map(Into::into).collect(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Everything recorded so far, in delivery order.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded event names, in delivery order.
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Component for EventRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn watchers(&self) -> Vec<Watcher> {
        self.watches
            .iter()
            .map(|watch| {
                let events = Arc::clone(&self.events);
                Watcher::new(watch.clone(), move |data| {
                    events.lock().unwrap().push(RecordedEvent {
                        name: data.event.name.clone(),
                        action: data.action(),
                        element_id: data.element.and_then(|e| e.id()),
                    });
                })
            })
            .collect()
    }
}

/// A small course document: one course, two sections, two modules.
pub fn course_fixture() -> Value {
    json!({
        "course": {"id": 1, "name": "Rust 101", "editmode": true},
        "section": [
            {"id": 10, "name": "Week 1", "number": 1, "visible": true, "cmlist": [5, 6]},
            {"id": 11, "name": "Week 2", "number": 2, "visible": true, "cmlist": []},
        ],
        "cm": [
            {"id": 5, "name": "Quiz", "sectionid": 10, "visible": true},
            {"id": 6, "name": "Forum", "sectionid": 10, "visible": true},
        ],
    })
}
