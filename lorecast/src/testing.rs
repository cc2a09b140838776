//! Test support: configurable fakes for the six stage clients, a call
//! recorder for ordering assertions, and small async test helpers.

use crate::artifacts::{ArtifactHandle, ArtifactKind, ArtifactStore};
use crate::clients::{
    AssemblyRequest, BackupReceipt, BackupUploadRequest, ImageRequest, NarrationRequest,
    PrimaryUploadRequest, ScriptBundle, ScriptRequest, SharedClient, StageClient, StageClients,
    UploadReceipt,
};
use crate::errors::StageFailure;
use crate::job::Stage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Initializes tracing output for tests. Safe to call repeatedly.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Polls a condition until it holds or the timeout elapses.
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Shared log of stage invocations, for asserting execution order.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder(Arc<Mutex<Vec<String>>>);

impl CallRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an invocation.
    pub fn record(&self, name: &str) {
        self.0.lock().push(name.to_string());
    }

    /// The recorded invocation names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Failure injection shared by all fakes: an always-on failure, or a number
/// of transient failures before the fake starts succeeding.
#[derive(Debug, Default)]
struct FailurePlan {
    always: Mutex<Option<StageFailure>>,
    transient_remaining: AtomicU32,
}

impl FailurePlan {
    fn set_always(&self, failure: StageFailure) {
        *self.always.lock() = Some(failure);
    }

    fn set_transient(&self, count: u32) {
        self.transient_remaining.store(count, Ordering::SeqCst);
    }

    fn next(&self) -> Option<StageFailure> {
        if let Some(failure) = self.always.lock().clone() {
            return Some(failure);
        }
        let drained = self
            .transient_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if drained.is_ok() {
            return Some(StageFailure::transient("injected transient failure"));
        }
        None
    }
}

/// Fake scripting client returning a fixed bundle.
#[derive(Debug)]
pub struct FakeScripting {
    bundle: ScriptBundle,
    plan: FailurePlan,
    recorder: Option<CallRecorder>,
    calls: AtomicUsize,
}

impl FakeScripting {
    /// Creates a fake returning the given bundle.
    #[must_use]
    pub fn new(bundle: ScriptBundle) -> Self {
        Self {
            bundle,
            plan: FailurePlan::default(),
            recorder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A ready-made bundle in the shape real script generation produces.
    #[must_use]
    pub fn lore_sample() -> Self {
        Self::new(ScriptBundle {
            script: "Long before the first dawn, a hero forged a burning sword \
                     and drove the darkness back beyond the wall of ice."
                .to_string(),
            title: "The Prophecy of the Burning Sword".to_string(),
            description: "The legend behind the prince that was promised.".to_string(),
            keywords: vec![
                "prophecy".to_string(),
                "burning sword".to_string(),
                "ancient hero".to_string(),
                "ice wall".to_string(),
                "darkness".to_string(),
            ],
        })
    }

    /// Makes every call fail with the given failure.
    #[must_use]
    pub fn with_failure(self, failure: StageFailure) -> Self {
        self.plan.set_always(failure);
        self
    }

    /// Makes the first `count` calls fail transiently.
    #[must_use]
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.plan.set_transient(count);
        self
    }

    /// Attaches a call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of times the client was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageClient<ScriptRequest, ScriptBundle> for FakeScripting {
    async fn call(&self, _input: ScriptRequest) -> Result<ScriptBundle, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.record(Stage::Scripting.name());
        }
        if let Some(failure) = self.plan.next() {
            return Err(failure);
        }
        Ok(self.bundle.clone())
    }
}

/// Fake image sourcing client producing `count` image artifacts.
#[derive(Debug)]
pub struct FakeImageSourcing {
    store: Arc<ArtifactStore>,
    count: usize,
    plan: FailurePlan,
    recorder: Option<CallRecorder>,
    calls: AtomicUsize,
}

impl FakeImageSourcing {
    /// Creates a fake writing `count` small images per call.
    #[must_use]
    pub fn new(store: Arc<ArtifactStore>, count: usize) -> Self {
        Self {
            store,
            count,
            plan: FailurePlan::default(),
            recorder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every call fail with the given failure.
    #[must_use]
    pub fn with_failure(self, failure: StageFailure) -> Self {
        self.plan.set_always(failure);
        self
    }

    /// Attaches a call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of times the client was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageClient<ImageRequest, Vec<ArtifactHandle>> for FakeImageSourcing {
    async fn call(&self, input: ImageRequest) -> Result<Vec<ArtifactHandle>, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.record(Stage::ImageSourcing.name());
        }
        if let Some(failure) = self.plan.next() {
            return Err(failure);
        }
        if self.count == 0 {
            return Err(StageFailure::permanent(
                "no images matched the requested keywords",
            ));
        }

        let mut handles = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let handle = self
                .store
                .allocate(input.job_id, ArtifactKind::Image)
                .await
                .map_err(|e| StageFailure::transient(format!("image download failed: {e}")))?;
            tokio::fs::write(&handle.path, b"jpeg bytes")
                .await
                .map_err(|e| StageFailure::transient(format!("image download failed: {e}")))?;
            handles.push(handle);
        }
        Ok(handles)
    }
}

/// Fake narration client producing one audio artifact.
#[derive(Debug)]
pub struct FakeNarration {
    store: Arc<ArtifactStore>,
    plan: FailurePlan,
    recorder: Option<CallRecorder>,
    calls: AtomicUsize,
}

impl FakeNarration {
    /// Creates a fake writing one small audio file per call.
    #[must_use]
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            plan: FailurePlan::default(),
            recorder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every call fail with the given failure.
    #[must_use]
    pub fn with_failure(self, failure: StageFailure) -> Self {
        self.plan.set_always(failure);
        self
    }

    /// Attaches a call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of times the client was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageClient<NarrationRequest, ArtifactHandle> for FakeNarration {
    async fn call(&self, input: NarrationRequest) -> Result<ArtifactHandle, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.record(Stage::Narrating.name());
        }
        if let Some(failure) = self.plan.next() {
            return Err(failure);
        }
        if input.script.trim().is_empty() {
            return Err(StageFailure::permanent("empty narration text"));
        }

        let handle = self
            .store
            .allocate(input.job_id, ArtifactKind::Audio)
            .await
            .map_err(|e| StageFailure::transient(format!("synthesis failed: {e}")))?;
        tokio::fs::write(&handle.path, b"mp3 bytes")
            .await
            .map_err(|e| StageFailure::transient(format!("synthesis failed: {e}")))?;
        Ok(handle)
    }
}

/// Fake assembly client producing one video artifact, optionally slowly.
#[derive(Debug)]
pub struct FakeAssembly {
    store: Arc<ArtifactStore>,
    delay: Duration,
    plan: FailurePlan,
    recorder: Option<CallRecorder>,
    calls: AtomicUsize,
}

impl FakeAssembly {
    /// Creates a fake writing one small video file per call.
    #[must_use]
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            delay: Duration::ZERO,
            plan: FailurePlan::default(),
            recorder: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes each call take at least `delay` before completing, to keep a
    /// stage in flight while a test cancels or observes the job.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every call fail with the given failure.
    #[must_use]
    pub fn with_failure(self, failure: StageFailure) -> Self {
        self.plan.set_always(failure);
        self
    }

    /// Attaches a call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of times the client was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageClient<AssemblyRequest, ArtifactHandle> for FakeAssembly {
    async fn call(&self, input: AssemblyRequest) -> Result<ArtifactHandle, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.record(Stage::Assembling.name());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = self.plan.next() {
            return Err(failure);
        }

        let handle = self
            .store
            .allocate(input.job_id, ArtifactKind::Video)
            .await
            .map_err(|e| StageFailure::transient(format!("encode failed: {e}")))?;
        tokio::fs::write(&handle.path, b"mp4 bytes")
            .await
            .map_err(|e| StageFailure::transient(format!("encode failed: {e}")))?;
        Ok(handle)
    }
}

/// Fake primary upload client returning a fixed receipt.
#[derive(Debug)]
pub struct FakePrimaryUpload {
    receipt: UploadReceipt,
    plan: FailurePlan,
    recorder: Option<CallRecorder>,
    calls: AtomicUsize,
    last_request: Mutex<Option<PrimaryUploadRequest>>,
}

impl FakePrimaryUpload {
    /// Creates a fake returning the given content id and URL.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            receipt: UploadReceipt {
                id: id.into(),
                url: url.into(),
            },
            plan: FailurePlan::default(),
            recorder: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Makes every call fail with the given failure.
    #[must_use]
    pub fn with_failure(self, failure: StageFailure) -> Self {
        self.plan.set_always(failure);
        self
    }

    /// Makes the first `count` calls fail transiently.
    #[must_use]
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.plan.set_transient(count);
        self
    }

    /// Attaches a call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of times the client was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<PrimaryUploadRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl StageClient<PrimaryUploadRequest, UploadReceipt> for FakePrimaryUpload {
    async fn call(&self, input: PrimaryUploadRequest) -> Result<UploadReceipt, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.record(Stage::UploadingPrimary.name());
        }
        *self.last_request.lock() = Some(input);
        if let Some(failure) = self.plan.next() {
            return Err(failure);
        }
        Ok(self.receipt.clone())
    }
}

/// Fake backup upload client returning a fixed shareable URL.
#[derive(Debug)]
pub struct FakeBackupUpload {
    url: String,
    plan: FailurePlan,
    recorder: Option<CallRecorder>,
    calls: AtomicUsize,
    last_request: Mutex<Option<BackupUploadRequest>>,
}

impl FakeBackupUpload {
    /// Creates a fake returning the given shareable URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            plan: FailurePlan::default(),
            recorder: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Makes every call fail with the given failure.
    #[must_use]
    pub fn with_failure(self, failure: StageFailure) -> Self {
        self.plan.set_always(failure);
        self
    }

    /// Attaches a call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of times the client was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request, if any.
    #[must_use]
    pub fn last_request(&self) -> Option<BackupUploadRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl StageClient<BackupUploadRequest, BackupReceipt> for FakeBackupUpload {
    async fn call(&self, input: BackupUploadRequest) -> Result<BackupReceipt, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(recorder) = &self.recorder {
            recorder.record(Stage::UploadingBackup.name());
        }
        *self.last_request.lock() = Some(input);
        if let Some(failure) = self.plan.next() {
            return Err(failure);
        }
        Ok(BackupReceipt {
            url: self.url.clone(),
        })
    }
}

/// Builder assembling a [`StageClients`] bundle for tests.
#[derive(Default)]
pub struct StageClientsBuilder {
    scripting: Option<SharedClient<ScriptRequest, ScriptBundle>>,
    image_sourcing: Option<SharedClient<ImageRequest, Vec<ArtifactHandle>>>,
    narration: Option<SharedClient<NarrationRequest, ArtifactHandle>>,
    assembly: Option<SharedClient<AssemblyRequest, ArtifactHandle>>,
    primary_upload: Option<SharedClient<PrimaryUploadRequest, UploadReceipt>>,
    backup_upload: Option<SharedClient<BackupUploadRequest, BackupReceipt>>,
}

impl StageClientsBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scripting client.
    #[must_use]
    pub fn scripting(mut self, client: SharedClient<ScriptRequest, ScriptBundle>) -> Self {
        self.scripting = Some(client);
        self
    }

    /// Sets the image sourcing client.
    #[must_use]
    pub fn image_sourcing(
        mut self,
        client: SharedClient<ImageRequest, Vec<ArtifactHandle>>,
    ) -> Self {
        self.image_sourcing = Some(client);
        self
    }

    /// Sets the narration client.
    #[must_use]
    pub fn narration(mut self, client: SharedClient<NarrationRequest, ArtifactHandle>) -> Self {
        self.narration = Some(client);
        self
    }

    /// Sets the assembly client.
    #[must_use]
    pub fn assembly(mut self, client: SharedClient<AssemblyRequest, ArtifactHandle>) -> Self {
        self.assembly = Some(client);
        self
    }

    /// Sets the primary upload client.
    #[must_use]
    pub fn primary_upload(
        mut self,
        client: SharedClient<PrimaryUploadRequest, UploadReceipt>,
    ) -> Self {
        self.primary_upload = Some(client);
        self
    }

    /// Sets the backup upload client.
    #[must_use]
    pub fn backup_upload(
        mut self,
        client: SharedClient<BackupUploadRequest, BackupReceipt>,
    ) -> Self {
        self.backup_upload = Some(client);
        self
    }

    /// Builds the bundle.
    ///
    /// # Panics
    ///
    /// Panics if any of the six clients was not set.
    #[must_use]
    pub fn build(self) -> StageClients {
        StageClients {
            scripting: self.scripting.expect("scripting client not set"),
            image_sourcing: self.image_sourcing.expect("image sourcing client not set"),
            narration: self.narration.expect("narration client not set"),
            assembly: self.assembly.expect("assembly client not set"),
            primary_upload: self.primary_upload.expect("primary upload client not set"),
            backup_upload: self.backup_upload.expect("backup upload client not set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    #[test]
    fn test_call_recorder_orders() {
        let recorder = CallRecorder::new();
        recorder.record("a");
        recorder.record("b");
        assert_eq!(recorder.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_transient_injection_drains() {
        let fake = FakeScripting::lore_sample().with_transient_failures(2);
        let request = ScriptRequest {
            job_id: JobId::new(),
            topic: "topic".to_string(),
        };

        assert!(fake.call(request.clone()).await.is_err());
        assert!(fake.call(request.clone()).await.is_err());
        assert!(fake.call(request).await.is_ok());
        assert_eq!(fake.call_count(), 3);
    }

    #[tokio::test]
    async fn test_narration_rejects_empty_script() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::new(tmp.path()));
        let fake = FakeNarration::new(store);

        let failure = fake
            .call(NarrationRequest {
                job_id: JobId::new(),
                script: "   ".to_string(),
            })
            .await
            .unwrap_err();
        assert!(!failure.is_transient());
    }
}
