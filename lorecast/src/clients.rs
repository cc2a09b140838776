//! Capability contracts for the six external collaborators.
//!
//! Each collaborator implements the one uniform [`StageClient`] contract:
//! given typed input, produce typed output or fail with a classified
//! [`StageFailure`]. The orchestrator never sees transport details; requests
//! carry the owning job id so implementations can allocate into the right
//! scratch scope.

use crate::artifacts::ArtifactHandle;
use crate::config::VideoSpecs;
use crate::errors::StageFailure;
use crate::job::JobId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The uniform capability contract a collaborator implements to participate
/// in the pipeline.
#[async_trait]
pub trait StageClient<I, O>: Send + Sync
where
    I: Send + 'static,
    O: 'static,
{
    /// Performs the external call.
    async fn call(&self, input: I) -> Result<O, StageFailure>;
}

/// Shared handle to a stage client.
pub type SharedClient<I, O> = Arc<dyn StageClient<I, O>>;

/// Input for the Scripting capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRequest {
    /// The owning job.
    pub job_id: JobId,
    /// The user-supplied topic.
    pub topic: String,
}

/// Output of the Scripting capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBundle {
    /// Narration text.
    pub script: String,
    /// Video title.
    pub title: String,
    /// Video description.
    pub description: String,
    /// Search keywords for image sourcing.
    pub keywords: Vec<String>,
}

impl ScriptBundle {
    /// Number of whitespace-separated words in the script.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.script.split_whitespace().count()
    }

    /// Truncates the script to at most `max_words` words.
    pub fn truncate_words(&mut self, max_words: usize) {
        if self.word_count() > max_words {
            self.script = self
                .script
                .split_whitespace()
                .take(max_words)
                .collect::<Vec<_>>()
                .join(" ");
        }
    }
}

/// Input for the ImageSourcing capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// The owning job.
    pub job_id: JobId,
    /// Keywords from the script bundle.
    pub keywords: Vec<String>,
}

/// Input for the Narrating capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationRequest {
    /// The owning job.
    pub job_id: JobId,
    /// Text to synthesize.
    pub script: String,
}

/// Input for the Assembling capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyRequest {
    /// The owning job.
    pub job_id: JobId,
    /// Ordered still images.
    pub images: Vec<ArtifactHandle>,
    /// Narration audio.
    pub audio: ArtifactHandle,
    /// Target resolution and duration ceiling.
    pub specs: VideoSpecs,
}

/// Input for the PrimaryUpload capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryUploadRequest {
    /// The owning job.
    pub job_id: JobId,
    /// The rendered video.
    pub video: ArtifactHandle,
    /// Video title.
    pub title: String,
    /// Video description.
    pub description: String,
    /// Content keywords.
    pub keywords: Vec<String>,
}

/// Receipt from the primary destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// External content identifier.
    pub id: String,
    /// Public URL of the published video.
    pub url: String,
}

/// Input for the BackupUpload capability. Runs only after the primary upload
/// succeeded because it embeds the primary's identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupUploadRequest {
    /// The owning job.
    pub job_id: JobId,
    /// The rendered video.
    pub video: ArtifactHandle,
    /// Identifier returned by the primary destination.
    pub primary_id: String,
    /// Filename to store the copy under.
    pub filename: String,
}

/// Receipt from backup storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReceipt {
    /// Shareable URL of the stored copy.
    pub url: String,
}

/// The six injected capabilities the pipeline drives, bundled for wiring.
#[derive(Clone)]
pub struct StageClients {
    /// Topic to script bundle.
    pub scripting: SharedClient<ScriptRequest, ScriptBundle>,
    /// Keywords to image artifacts.
    pub image_sourcing: SharedClient<ImageRequest, Vec<ArtifactHandle>>,
    /// Script text to audio artifact.
    pub narration: SharedClient<NarrationRequest, ArtifactHandle>,
    /// Images plus audio to video artifact.
    pub assembly: SharedClient<AssemblyRequest, ArtifactHandle>,
    /// Video to primary destination.
    pub primary_upload: SharedClient<PrimaryUploadRequest, UploadReceipt>,
    /// Video to backup storage.
    pub backup_upload: SharedClient<BackupUploadRequest, BackupReceipt>,
}

impl std::fmt::Debug for StageClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageClients").finish_non_exhaustive()
    }
}
