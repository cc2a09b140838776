//! Job identity, stage enumeration and per-job bookkeeping.
//!
//! A [`Job`] is owned by the pipeline state machine for its whole lifetime.
//! The registry keeps only shared read handles (state cell, cancellation
//! token) so `lookup` and `cancel` never touch the machine's exclusive state.

use crate::artifacts::{ArtifactHandle, ArtifactKind};
use crate::cancellation::CancellationToken;
use crate::clients::{BackupReceipt, ScriptBundle, UploadReceipt};
use crate::errors::JobError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Creates a fresh random job id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the requesting chat user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(i64);

impl UserId {
    /// Wraps a raw chat user id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One ordered unit of pipeline work, delegated to an external collaborator.
///
/// The enum doubles as the stage descriptor: it carries the execution order,
/// the display name, the user-facing start message and the artifact-release
/// metadata the machine consults after each completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Generate script, title, description and keywords from the topic.
    Scripting,
    /// Source 3-4 relevant image artifacts from the script keywords.
    ImageSourcing,
    /// Synthesize the narration audio from the script text.
    Narrating,
    /// Mux images and audio into a vertical video.
    Assembling,
    /// Upload the video to the primary destination.
    UploadingPrimary,
    /// Copy the video to backup storage, tagged with the primary id.
    UploadingBackup,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Self; 6] = [
        Self::Scripting,
        Self::ImageSourcing,
        Self::Narrating,
        Self::Assembling,
        Self::UploadingPrimary,
        Self::UploadingBackup,
    ];

    /// Position of the stage in the execution order.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        match self {
            Self::Scripting => 0,
            Self::ImageSourcing => 1,
            Self::Narrating => 2,
            Self::Assembling => 3,
            Self::UploadingPrimary => 4,
            Self::UploadingBackup => 5,
        }
    }

    /// Stable snake_case name of the stage.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scripting => "scripting",
            Self::ImageSourcing => "image_sourcing",
            Self::Narrating => "narrating",
            Self::Assembling => "assembling",
            Self::UploadingPrimary => "uploading_primary",
            Self::UploadingBackup => "uploading_backup",
        }
    }

    /// Human-readable message pushed to the progress reporter when the stage
    /// starts.
    #[must_use]
    pub const fn start_message(self) -> &'static str {
        match self {
            Self::Scripting => "Generating lore script",
            Self::ImageSourcing => "Collecting imagery",
            Self::Narrating => "Synthesizing narration",
            Self::Assembling => "Assembling vertical video",
            Self::UploadingPrimary => "Publishing to primary destination",
            Self::UploadingBackup => "Copying to backup storage",
        }
    }

    /// Artifact kinds no later stage needs once this stage has completed.
    ///
    /// Raw images and the narration audio are consumed by the mux; only the
    /// rendered video must survive until both uploads are done.
    #[must_use]
    pub const fn releases_after(self) -> &'static [ArtifactKind] {
        match self {
            Self::Assembling => &[ArtifactKind::Image, ArtifactKind::Audio],
            _ => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted, not yet started.
    Pending,
    /// Currently executing the named stage.
    InStage(Stage),
    /// All stages completed; both upload links are available.
    Succeeded,
    /// A stage failed terminally.
    Failed,
    /// Cancelled at a stage boundary.
    Cancelled,
}

impl JobState {
    /// Returns true once no further stage execution will occur.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InStage(stage) => write!(f, "{stage}"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Shared, registry-readable cell holding a job's current state.
pub type StateCell = Arc<RwLock<JobState>>;

/// Typed record of completed stage outputs.
///
/// Later stages derive their inputs from here; asking for an output that is
/// not present is a stage-ordering break and surfaces as an
/// [`JobError::InvariantViolation`].
#[derive(Debug, Default)]
pub struct StageOutputs {
    script: Option<ScriptBundle>,
    images: Option<Vec<ArtifactHandle>>,
    audio: Option<ArtifactHandle>,
    video: Option<ArtifactHandle>,
    primary: Option<UploadReceipt>,
    backup: Option<BackupReceipt>,
}

impl StageOutputs {
    fn missing(what: &str, stage: Stage) -> JobError {
        JobError::invariant(format!(
            "{what} requested before stage '{stage}' completed"
        ))
    }

    /// The script bundle produced by [`Stage::Scripting`].
    pub fn script(&self) -> Result<&ScriptBundle, JobError> {
        self.script
            .as_ref()
            .ok_or_else(|| Self::missing("script", Stage::Scripting))
    }

    /// The image artifacts produced by [`Stage::ImageSourcing`].
    pub fn images(&self) -> Result<&[ArtifactHandle], JobError> {
        self.images
            .as_deref()
            .ok_or_else(|| Self::missing("image set", Stage::ImageSourcing))
    }

    /// The audio artifact produced by [`Stage::Narrating`].
    pub fn audio(&self) -> Result<&ArtifactHandle, JobError> {
        self.audio
            .as_ref()
            .ok_or_else(|| Self::missing("narration audio", Stage::Narrating))
    }

    /// The video artifact produced by [`Stage::Assembling`].
    pub fn video(&self) -> Result<&ArtifactHandle, JobError> {
        self.video
            .as_ref()
            .ok_or_else(|| Self::missing("rendered video", Stage::Assembling))
    }

    /// The receipt returned by [`Stage::UploadingPrimary`].
    pub fn primary(&self) -> Result<&UploadReceipt, JobError> {
        self.primary
            .as_ref()
            .ok_or_else(|| Self::missing("primary upload receipt", Stage::UploadingPrimary))
    }

    /// The receipt returned by [`Stage::UploadingBackup`].
    pub fn backup(&self) -> Result<&BackupReceipt, JobError> {
        self.backup
            .as_ref()
            .ok_or_else(|| Self::missing("backup upload receipt", Stage::UploadingBackup))
    }

    /// Records the scripting output.
    pub fn record_script(&mut self, bundle: ScriptBundle) {
        self.script = Some(bundle);
    }

    /// Records the sourced images.
    pub fn record_images(&mut self, images: Vec<ArtifactHandle>) {
        self.images = Some(images);
    }

    /// Records the narration audio.
    pub fn record_audio(&mut self, audio: ArtifactHandle) {
        self.audio = Some(audio);
    }

    /// Records the rendered video.
    pub fn record_video(&mut self, video: ArtifactHandle) {
        self.video = Some(video);
    }

    /// Records the primary upload receipt.
    pub fn record_primary(&mut self, receipt: UploadReceipt) {
        self.primary = Some(receipt);
    }

    /// Records the backup upload receipt.
    pub fn record_backup(&mut self, receipt: BackupReceipt) {
        self.backup = Some(receipt);
    }

    /// All recorded handles of the given kind.
    #[must_use]
    pub fn handles_of(&self, kind: ArtifactKind) -> Vec<ArtifactHandle> {
        match kind {
            ArtifactKind::Image => self.images.clone().unwrap_or_default(),
            ArtifactKind::Audio => self.audio.clone().into_iter().collect(),
            ArtifactKind::Video => self.video.clone().into_iter().collect(),
        }
    }
}

/// A single user-visible unit of work: topic in, two share links out.
///
/// Mutated only by the pipeline state machine, one stage at a time.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    user_id: UserId,
    topic: String,
    created_at: DateTime<Utc>,
    state: StateCell,
    cancel: Arc<CancellationToken>,
    outputs: StageOutputs,
    error: Option<JobError>,
}

impl Job {
    /// Creates a pending job for the given user and topic.
    #[must_use]
    pub fn new(user_id: UserId, topic: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            user_id,
            topic: topic.into(),
            created_at: Utc::now(),
            state: Arc::new(RwLock::new(JobState::Pending)),
            cancel: Arc::new(CancellationToken::new()),
            outputs: StageOutputs::default(),
            error: None,
        }
    }

    /// The job id.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The requesting user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The requested topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> JobState {
        *self.state.read()
    }

    /// Moves the job to a new state.
    pub fn set_state(&self, state: JobState) {
        *self.state.write() = state;
    }

    /// Shared handle to the state cell, for registry lookups.
    #[must_use]
    pub fn state_cell(&self) -> StateCell {
        Arc::clone(&self.state)
    }

    /// Shared handle to the cancellation token, for registry cancel.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancel)
    }

    /// Returns the cancellation reason if cancellation has been requested.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        if self.cancel.is_cancelled() {
            Some(
                self.cancel
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string()),
            )
        } else {
            None
        }
    }

    /// Completed stage outputs.
    #[must_use]
    pub fn outputs(&self) -> &StageOutputs {
        &self.outputs
    }

    /// Mutable access to the outputs record.
    pub fn outputs_mut(&mut self) -> &mut StageOutputs {
        &mut self.outputs
    }

    /// Records the terminal error.
    pub fn record_error(&mut self, error: JobError) {
        self.error = Some(error);
    }

    /// The accumulated terminal error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }
}

/// Read-only snapshot of an active job, returned by registry lookups.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    /// The job id.
    pub job_id: JobId,
    /// The requested topic.
    pub topic: String,
    /// Current state.
    pub state: JobState,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
