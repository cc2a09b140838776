//! The pipeline state machine.
//!
//! Advances a job through the fixed stage order, deriving each stage's input
//! from prior outputs, invoking the stage's client through the retry policy,
//! and deciding continuation vs abort. Every terminal transition flows
//! through one of the `finish_*` paths, which purge the scratch area and
//! emit exactly one terminal progress event.

use crate::artifacts::ArtifactStore;
use crate::clients::{
    AssemblyRequest, BackupUploadRequest, ImageRequest, NarrationRequest, PrimaryUploadRequest,
    ScriptRequest, SharedClient, StageClients,
};
use crate::config::OrchestratorConfig;
use crate::errors::{JobError, StageFailure};
use crate::job::{Job, JobId, JobState, Stage};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::retry::RetryPolicy;
use crate::utils::sanitize_title;
use std::sync::Arc;
use tracing::{debug, error, info, warn};


/// Terminal result of one job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Both uploads completed; the share links are ready.
    Succeeded {
        /// URL at the primary destination.
        primary_url: String,
        /// URL of the backup copy.
        backup_url: String,
    },
    /// A stage failed terminally.
    Failed {
        /// The stage that failed.
        stage: Stage,
        /// The terminal error.
        error: JobError,
    },
    /// The job was cancelled at a stage boundary.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

impl JobOutcome {
    /// Short label for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Returns true for the succeeded outcome.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Drives one job from topic to published video.
///
/// Stages within a job are strictly sequential; cancellation is checked at
/// every stage boundary and never interrupts an in-flight call.
pub struct VideoPipeline {
    clients: StageClients,
    store: Arc<ArtifactStore>,
    retry: RetryPolicy,
    sink: Arc<dyn ProgressSink>,
    config: OrchestratorConfig,
}

impl VideoPipeline {
    /// Creates a pipeline over the given collaborators.
    #[must_use]
    pub fn new(
        clients: StageClients,
        store: Arc<ArtifactStore>,
        sink: Arc<dyn ProgressSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            clients,
            store,
            retry: RetryPolicy::from_config(&config.retry),
            sink,
            config,
        }
    }

    /// The artifact store backing this pipeline.
    #[must_use]
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Runs the job to a terminal state.
    pub async fn run(&self, job: &mut Job) -> JobOutcome {
        info!(
            job_id = %job.id(),
            user_id = %job.user_id(),
            topic = job.topic(),
            "job started"
        );

        for stage in Stage::ALL {
            if let Some(reason) = job.cancel_reason() {
                return self.finish_cancelled(job, reason).await;
            }

            job.set_state(JobState::InStage(stage));
            debug!(job_id = %job.id(), stage = %stage, "stage started");
            self.sink.try_notify(ProgressEvent::started(job.id(), stage));

            if let Err(err) = self.execute_stage(job, stage).await {
                return self.finish_failed(job, stage, err).await;
            }

            for kind in stage.releases_after() {
                for handle in job.outputs().handles_of(*kind) {
                    self.store.release(&handle).await;
                }
            }

            self.sink
                .try_notify(ProgressEvent::completed(job.id(), stage));
        }

        self.finish_succeeded(job).await
    }

    /// Executes one stage: derive input from prior outputs, call the client
    /// through the retry policy, record the result.
    async fn execute_stage(&self, job: &mut Job, stage: Stage) -> Result<(), JobError> {
        match stage {
            Stage::Scripting => {
                let request = ScriptRequest {
                    job_id: job.id(),
                    topic: job.topic().to_string(),
                };
                let mut bundle = self
                    .call_stage(job.id(), stage, &self.clients.scripting, request)
                    .await?;

                let budget = self.config.max_script_words;
                if bundle.word_count() > budget {
                    warn!(
                        job_id = %job.id(),
                        words = bundle.word_count(),
                        budget,
                        "script over word budget, truncating"
                    );
                    bundle.truncate_words(budget);
                }
                job.outputs_mut().record_script(bundle);
            }

            Stage::ImageSourcing => {
                let request = ImageRequest {
                    job_id: job.id(),
                    keywords: job.outputs().script()?.keywords.clone(),
                };
                let mut images = self
                    .call_stage(job.id(), stage, &self.clients.image_sourcing, request)
                    .await?;

                if images.len() < self.config.min_images {
                    return Err(JobError::stage(
                        stage,
                        StageFailure::permanent(format!(
                            "only {} relevant images found, need at least {}",
                            images.len(),
                            self.config.min_images
                        )),
                    ));
                }
                if images.len() > self.config.max_images {
                    for surplus in images.split_off(self.config.max_images) {
                        self.store.release(&surplus).await;
                    }
                }
                job.outputs_mut().record_images(images);
            }

            Stage::Narrating => {
                let request = NarrationRequest {
                    job_id: job.id(),
                    script: job.outputs().script()?.script.clone(),
                };
                let audio = self
                    .call_stage(job.id(), stage, &self.clients.narration, request)
                    .await?;
                job.outputs_mut().record_audio(audio);
            }

            Stage::Assembling => {
                let request = AssemblyRequest {
                    job_id: job.id(),
                    images: job.outputs().images()?.to_vec(),
                    audio: job.outputs().audio()?.clone(),
                    specs: self.config.video.clone(),
                };
                let video = self
                    .call_stage(job.id(), stage, &self.clients.assembly, request)
                    .await?;
                job.outputs_mut().record_video(video);
            }

            Stage::UploadingPrimary => {
                let request = {
                    let bundle = job.outputs().script()?;
                    PrimaryUploadRequest {
                        job_id: job.id(),
                        video: job.outputs().video()?.clone(),
                        title: bundle.title.clone(),
                        description: bundle.description.clone(),
                        keywords: bundle.keywords.clone(),
                    }
                };
                let receipt = self
                    .call_stage(job.id(), stage, &self.clients.primary_upload, request)
                    .await?;
                info!(job_id = %job.id(), content_id = %receipt.id, "primary upload accepted");
                job.outputs_mut().record_primary(receipt);
            }

            Stage::UploadingBackup => {
                let request = {
                    let outputs = job.outputs();
                    BackupUploadRequest {
                        job_id: job.id(),
                        video: outputs.video()?.clone(),
                        primary_id: outputs.primary()?.id.clone(),
                        filename: format!("{}.mp4", sanitize_title(&outputs.script()?.title)),
                    }
                };
                let receipt = self
                    .call_stage(job.id(), stage, &self.clients.backup_upload, request)
                    .await?;
                job.outputs_mut().record_backup(receipt);
            }
        }

        Ok(())
    }

    /// Invokes one client through the retry policy.
    async fn call_stage<I, O>(
        &self,
        job_id: JobId,
        stage: Stage,
        client: &SharedClient<I, O>,
        request: I,
    ) -> Result<O, JobError>
    where
        I: Clone + Send + 'static,
        O: Send + 'static,
    {
        let client = Arc::clone(client);
        self.retry
            .run(job_id, stage, self.sink.as_ref(), move || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await
            .map_err(|failure| JobError::stage(stage, failure))
    }

    async fn finish_succeeded(&self, job: &mut Job) -> JobOutcome {
        let primary = job.outputs().primary().map(|receipt| receipt.url.clone());
        let primary_url = match primary {
            Ok(url) => url,
            Err(err) => return self.finish_failed(job, Stage::UploadingPrimary, err).await,
        };
        let backup = job.outputs().backup().map(|receipt| receipt.url.clone());
        let backup_url = match backup {
            Ok(url) => url,
            Err(err) => return self.finish_failed(job, Stage::UploadingBackup, err).await,
        };

        self.store.purge_all(job.id()).await;
        job.set_state(JobState::Succeeded);
        self.sink.try_notify(ProgressEvent::succeeded(
            job.id(),
            vec![primary_url.clone(), backup_url.clone()],
        ));
        info!(job_id = %job.id(), primary = %primary_url, backup = %backup_url, "job succeeded");

        JobOutcome::Succeeded {
            primary_url,
            backup_url,
        }
    }

    async fn finish_failed(&self, job: &mut Job, stage: Stage, err: JobError) -> JobOutcome {
        if matches!(err, JobError::InvariantViolation(_)) {
            // A stage-ordering break is a defect in this machine, not an
            // external condition.
            error!(job_id = %job.id(), stage = %stage, error = %err, "pipeline defect");
        } else {
            warn!(job_id = %job.id(), stage = %stage, error = %err, "job failed");
        }

        job.record_error(err.clone());
        self.store.purge_all(job.id()).await;
        job.set_state(JobState::Failed);
        self.sink
            .try_notify(ProgressEvent::failed(job.id(), stage, err.to_string()));

        JobOutcome::Failed { stage, error: err }
    }

    async fn finish_cancelled(&self, job: &mut Job, reason: String) -> JobOutcome {
        info!(job_id = %job.id(), reason = %reason, "job cancelled");

        self.store.purge_all(job.id()).await;
        job.set_state(JobState::Cancelled);
        self.sink
            .try_notify(ProgressEvent::cancelled(job.id(), reason.clone()));

        JobOutcome::Cancelled { reason }
    }
}

impl std::fmt::Debug for VideoPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoPipeline")
            .field("retry", &self.retry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
