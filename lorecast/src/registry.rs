//! One-active-job-per-user registry.
//!
//! The registry owns the user-to-job mapping and nothing else: jobs are
//! driven by the pipeline on their own tokio task, and the slot is cleared
//! exactly once, after the pipeline's terminal transition (which has already
//! purged the scratch area).

use crate::cancellation::CancellationToken;
use crate::errors::SubmitError;
use crate::job::{Job, JobId, JobStatus, StateCell, UserId};
use crate::pipeline::VideoPipeline;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
struct ActiveJob {
    job_id: JobId,
    topic: String,
    created_at: DateTime<Utc>,
    state: StateCell,
    cancel: Arc<CancellationToken>,
}

/// Tracks the single active job per user and exposes cancellation.
#[derive(Debug)]
pub struct JobRegistry {
    pipeline: Arc<VideoPipeline>,
    active: Arc<DashMap<UserId, ActiveJob>>,
}

impl JobRegistry {
    /// Creates a registry driving jobs through the given pipeline.
    #[must_use]
    pub fn new(pipeline: Arc<VideoPipeline>) -> Self {
        Self {
            pipeline,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Accepts a topic for a user, or rejects it while another job is in
    /// flight. On acceptance the job runs on its own task.
    pub fn submit(
        &self,
        user_id: UserId,
        topic: impl Into<String>,
    ) -> Result<JobId, SubmitError> {
        let topic = topic.into();

        match self.active.entry(user_id) {
            Entry::Occupied(slot) => Err(SubmitError::AlreadyActive {
                user_id,
                job_id: slot.get().job_id,
            }),
            Entry::Vacant(slot) => {
                let mut job = Job::new(user_id, topic.clone());
                let job_id = job.id();

                slot.insert(ActiveJob {
                    job_id,
                    topic,
                    created_at: job.created_at(),
                    state: job.state_cell(),
                    cancel: job.cancel_token(),
                });
                debug!(job_id = %job_id, user_id = %user_id, "job slot claimed");

                let pipeline = Arc::clone(&self.pipeline);
                let active = Arc::clone(&self.active);
                tokio::spawn(async move {
                    let outcome = pipeline.run(&mut job).await;
                    info!(
                        job_id = %job_id,
                        user_id = %user_id,
                        outcome = outcome.label(),
                        "job finished, releasing slot"
                    );
                    active.remove_if(&user_id, |_, entry| entry.job_id == job_id);
                });

                Ok(job_id)
            }
        }
    }

    /// Requests cooperative cancellation of the user's active job.
    ///
    /// Returns false if the user has no job in flight. Cancellation takes
    /// effect at the next stage boundary.
    pub fn cancel(&self, user_id: UserId) -> bool {
        match self.active.get(&user_id) {
            Some(active) => {
                active.cancel.cancel("cancelled by user");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the user's active job, if any.
    #[must_use]
    pub fn lookup(&self, user_id: UserId) -> Option<JobStatus> {
        self.active.get(&user_id).map(|active| JobStatus {
            job_id: active.job_id,
            topic: active.topic.clone(),
            state: *active.state.read(),
            created_at: active.created_at,
        })
    }

    /// Number of jobs currently in flight across all users.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
