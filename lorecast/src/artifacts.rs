//! Per-job scratch area management.
//!
//! Every intermediate file a job produces lives under one per-job directory
//! and is tracked here. [`ArtifactStore::purge_all`] is the single cleanup
//! path the state machine invokes on every terminal transition, so no
//! scratch file can outlive its job.

use crate::job::JobId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// The kind of scratch file an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A sourced still image.
    Image,
    /// Synthesized narration audio.
    Audio,
    /// The assembled video.
    Video,
}

impl ArtifactKind {
    /// File extension used for scratch files of this kind.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A scratch-area file reference owned by a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Unique id of the artifact.
    pub id: Uuid,
    /// The owning job.
    pub job_id: JobId,
    /// What the file holds.
    pub kind: ArtifactKind,
    /// Location of the scratch file.
    pub path: PathBuf,
}

/// Tracks and cleans up per-job scratch files.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    live: DashMap<JobId, Vec<ArtifactHandle>>,
}

impl ArtifactStore {
    /// Creates a store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            live: DashMap::new(),
        }
    }

    /// The scratch directory for a job.
    #[must_use]
    pub fn scratch_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Reserves a uniquely named scratch location scoped to the job.
    ///
    /// The job directory is created eagerly; writing the file itself is the
    /// producer's business.
    pub async fn allocate(
        &self,
        job_id: JobId,
        kind: ArtifactKind,
    ) -> io::Result<ArtifactHandle> {
        let dir = self.scratch_dir(job_id);
        tokio::fs::create_dir_all(&dir).await?;

        let id = Uuid::new_v4();
        let handle = ArtifactHandle {
            id,
            job_id,
            kind,
            path: dir.join(format!("{kind}-{id}.{}", kind.extension())),
        };

        debug!(job_id = %job_id, artifact = %kind, path = %handle.path.display(), "artifact allocated");
        self.live.entry(job_id).or_default().push(handle.clone());
        Ok(handle)
    }

    /// Deletes a single artifact no longer needed by any pending stage.
    ///
    /// Tolerates files that were never written or are already gone.
    pub async fn release(&self, handle: &ArtifactHandle) {
        remove_file_quiet(&handle.path).await;
        if let Some(mut handles) = self.live.get_mut(&handle.job_id) {
            handles.retain(|h| h.id != handle.id);
        }
        debug!(job_id = %handle.job_id, artifact = %handle.kind, "artifact released");
    }

    /// Removes every scratch file belonging to the job. Idempotent.
    pub async fn purge_all(&self, job_id: JobId) {
        self.live.remove(&job_id);

        let dir = self.scratch_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(job_id = %job_id, "scratch area purged"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id = %job_id, error = %e, "failed to purge scratch area"),
        }
    }

    /// Number of live (unreleased) artifacts tracked for a job.
    #[must_use]
    pub fn live_count(&self, job_id: JobId) -> usize {
        self.live.get(&job_id).map_or(0, |handles| handles.len())
    }
}

async fn remove_file_quiet(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        (tmp, store)
    }

    #[tokio::test]
    async fn test_allocate_creates_job_dir_and_tracks() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        let handle = store.allocate(job_id, ArtifactKind::Audio).await.unwrap();

        assert!(store.scratch_dir(job_id).is_dir());
        assert!(handle.path.starts_with(store.scratch_dir(job_id)));
        assert!(handle.path.to_string_lossy().ends_with(".mp3"));
        assert_eq!(store.live_count(job_id), 1);
    }

    #[tokio::test]
    async fn test_allocations_are_unique() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        let a = store.allocate(job_id, ArtifactKind::Image).await.unwrap();
        let b = store.allocate(job_id, ArtifactKind::Image).await.unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(store.live_count(job_id), 2);
    }

    #[tokio::test]
    async fn test_release_removes_file_and_untracks() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        let handle = store.allocate(job_id, ArtifactKind::Image).await.unwrap();
        tokio::fs::write(&handle.path, b"jpeg bytes").await.unwrap();

        store.release(&handle).await;

        assert!(!handle.path.exists());
        assert_eq!(store.live_count(job_id), 0);
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_file() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        // Never written.
        let handle = store.allocate(job_id, ArtifactKind::Video).await.unwrap();
        store.release(&handle).await;
        store.release(&handle).await;

        assert_eq!(store.live_count(job_id), 0);
    }

    #[tokio::test]
    async fn test_purge_all_removes_everything() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        for _ in 0..3 {
            let handle = store.allocate(job_id, ArtifactKind::Image).await.unwrap();
            tokio::fs::write(&handle.path, b"data").await.unwrap();
        }
        let audio = store.allocate(job_id, ArtifactKind::Audio).await.unwrap();
        tokio::fs::write(&audio.path, b"data").await.unwrap();

        store.purge_all(job_id).await;

        assert_eq!(store.live_count(job_id), 0);
        assert!(!store.scratch_dir(job_id).exists());
    }

    #[tokio::test]
    async fn test_purge_all_idempotent() {
        let (_tmp, store) = store();
        let job_id = JobId::new();

        store.purge_all(job_id).await;
        store.purge_all(job_id).await;

        assert_eq!(store.live_count(job_id), 0);
    }

    #[tokio::test]
    async fn test_jobs_do_not_share_scratch() {
        let (_tmp, store) = store();
        let a = JobId::new();
        let b = JobId::new();

        let handle_a = store.allocate(a, ArtifactKind::Image).await.unwrap();
        tokio::fs::write(&handle_a.path, b"a").await.unwrap();
        let handle_b = store.allocate(b, ArtifactKind::Image).await.unwrap();
        tokio::fs::write(&handle_b.path, b"b").await.unwrap();

        store.purge_all(a).await;

        assert!(!handle_a.path.exists());
        assert!(handle_b.path.exists());
        assert_eq!(store.live_count(b), 1);
    }
}
