//! The file upload queue.
//!
//! Drag-and-dropped files are queued per target section and uploaded one
//! at a time. The upload service returns the same update records the
//! mutation service does, and they are applied with the upsert policy —
//! a finished upload introduces course modules the client has never seen.
//!
//! The queue is an explicitly constructed instance owned by the hosting
//! page, never a module-level global. One failed job is recorded and
//! skipped; the rest of the queue still drains.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::manager::{StateManager, UpdatePolicy};
use crate::service::UpdateRecord;

/// One queued file upload.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: Uuid,
    /// Position in the queue, monotonically increasing per queue instance.
    pub position: u64,
    /// Section the file is dropped into.
    pub section_id: i64,
    pub filename: String,
    pub content: Vec<u8>,
}

/// Transport seam for file uploads: sends one job, returns the update
/// records describing what the server created.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn upload(&self, job: &UploadJob) -> Result<Vec<UpdateRecord>>;
}

/// What a drain pass accomplished.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub completed: Vec<Uuid>,
    /// Failed job ids with the failure text.
    pub failed: Vec<(Uuid, String)>,
}

/// Ordered queue of pending uploads bound to one upload service.
pub struct UploadQueue {
    service: Arc<dyn UploadService>,
    pending: VecDeque<UploadJob>,
    next_position: u64,
}

impl UploadQueue {
    pub fn new(service: Arc<dyn UploadService>) -> Self {
        Self {
            service,
            pending: VecDeque::new(),
            next_position: 0,
        }
    }

    /// Queue one file for upload into `section_id`. Returns the job id.
    pub fn enqueue(&mut self, section_id: i64, filename: impl Into<String>, content: Vec<u8>) -> Uuid {
        let id = Uuid::new_v4();
        let position = self.next_position;
        self.next_position += 1;
        self.pending.push_back(UploadJob {
            id,
            position,
            section_id,
            filename: filename.into(),
            content,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Upload every queued job in order, applying each successful
    /// response to the state. Failures are logged, recorded, and skipped.
    pub async fn drain(&mut self, manager: &mut StateManager) -> UploadReport {
        let mut report = UploadReport::default();
        while let Some(job) = self.pending.pop_front() {
            debug!(job = %job.id, position = job.position, file = %job.filename, "uploading");
            match self.service.upload(&job).await {
                Ok(records) => match manager.process_updates(records, &UpdatePolicy::upsert()) {
                    Ok(()) => report.completed.push(job.id),
                    Err(err) => {
                        warn!(job = %job.id, error = %err, "upload response could not be applied");
                        report.failed.push((job.id, err.to_string()));
                    }
                },
                Err(err) => {
                    warn!(job = %job.id, file = %job.filename, error = %err, "upload failed");
                    report.failed.push((job.id, err.to_string()));
                }
            }
        }
        report
    }
}
