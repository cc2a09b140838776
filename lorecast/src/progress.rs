//! Progress events and the reporter sink contract.
//!
//! The pipeline pushes status into a [`ProgressSink`] and never depends on
//! the sink succeeding; `try_notify` must not block stage advancement.

use crate::job::{JobId, Stage};
use crate::utils::iso_timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Status carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// A stage began executing.
    Started,
    /// A transient failure is being retried.
    Retrying,
    /// A stage completed successfully.
    Completed,
    /// Terminal: the job finished and both links are available.
    Succeeded,
    /// Terminal: the job failed at the named stage.
    Failed,
    /// Terminal: the job was cancelled.
    Cancelled,
}

impl ProgressStatus {
    /// Returns true for the three terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Retrying => write!(f, "retrying"),
            Self::Completed => write!(f, "completed"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One status update pushed to the progress reporter.
///
/// Per job, events arrive in stage order and exactly one terminal event is
/// emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The job the event belongs to.
    pub job_id: JobId,
    /// The stage concerned, absent on the Succeeded terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// The status.
    pub status: ProgressStatus,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result links; the Succeeded terminal carries primary and backup URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    /// When the event was emitted (ISO 8601).
    pub timestamp: String,
}

impl ProgressEvent {
    fn new(job_id: JobId, stage: Option<Stage>, status: ProgressStatus) -> Self {
        Self {
            job_id,
            stage,
            status,
            message: None,
            links: Vec::new(),
            timestamp: iso_timestamp(),
        }
    }

    /// Creates a stage-started event with the stage's user-facing message.
    #[must_use]
    pub fn started(job_id: JobId, stage: Stage) -> Self {
        let mut event = Self::new(job_id, Some(stage), ProgressStatus::Started);
        event.message = Some(stage.start_message().to_string());
        event
    }

    /// Creates a non-terminal retry notice so the user sees "retrying"
    /// rather than silence.
    #[must_use]
    pub fn retrying(
        job_id: JobId,
        stage: Stage,
        attempt: u32,
        max_attempts: u32,
        reason: &str,
    ) -> Self {
        let mut event = Self::new(job_id, Some(stage), ProgressStatus::Retrying);
        event.message = Some(format!(
            "retrying {stage} (attempt {attempt} of {max_attempts}): {reason}"
        ));
        event
    }

    /// Creates a stage-completed event.
    #[must_use]
    pub fn completed(job_id: JobId, stage: Stage) -> Self {
        Self::new(job_id, Some(stage), ProgressStatus::Completed)
    }

    /// Creates the Succeeded terminal event carrying the share links.
    #[must_use]
    pub fn succeeded(job_id: JobId, links: Vec<String>) -> Self {
        let mut event = Self::new(job_id, None, ProgressStatus::Succeeded);
        event.message = Some("video published".to_string());
        event.links = links;
        event
    }

    /// Creates the Failed terminal event naming the failed stage.
    #[must_use]
    pub fn failed(job_id: JobId, stage: Stage, reason: impl Into<String>) -> Self {
        let mut event = Self::new(job_id, Some(stage), ProgressStatus::Failed);
        event.message = Some(reason.into());
        event
    }

    /// Creates the Cancelled terminal event.
    #[must_use]
    pub fn cancelled(job_id: JobId, reason: impl Into<String>) -> Self {
        let mut event = Self::new(job_id, None, ProgressStatus::Cancelled);
        event.message = Some(reason.into());
        event
    }

    /// Returns true if this is one of the terminal events.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Converts the event to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("job_id".to_string(), serde_json::json!(self.job_id));
        map.insert(
            "status".to_string(),
            serde_json::json!(self.status.to_string()),
        );
        map.insert("timestamp".to_string(), serde_json::json!(self.timestamp));

        if let Some(stage) = self.stage {
            map.insert("stage".to_string(), serde_json::json!(stage.name()));
        }
        if let Some(ref message) = self.message {
            map.insert("message".to_string(), serde_json::json!(message));
        }
        if !self.links.is_empty() {
            map.insert("links".to_string(), serde_json::json!(self.links));
        }

        map
    }
}

/// Sink the state machine pushes status events to.
///
/// Consumed, not implemented, by the orchestrator; a chat frontend would
/// forward events back to the requesting user.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Delivers an event asynchronously.
    async fn notify(&self, event: ProgressEvent);

    /// Delivers an event without blocking. Must never fail loudly; errors
    /// are logged and suppressed.
    fn try_notify(&self, event: ProgressEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

#[async_trait]
impl ProgressSink for NoOpProgressSink {
    async fn notify(&self, _event: ProgressEvent) {}

    fn try_notify(&self, _event: ProgressEvent) {}
}

/// A sink that logs events through the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgressSink;

impl LoggingProgressSink {
    fn log(event: &ProgressEvent) {
        let dict = event.to_dict();
        match event.status {
            ProgressStatus::Failed => {
                warn!(event = ?dict, "job progress: {}", event.status);
            }
            _ => {
                info!(event = ?dict, "job progress: {}", event.status);
            }
        }
    }
}

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn notify(&self, event: ProgressEvent) {
        Self::log(&event);
    }

    fn try_notify(&self, event: ProgressEvent) {
        Self::log(&event);
    }
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: parking_lot::RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns the collected events for one job.
    #[must_use]
    pub fn events_for(&self, job_id: JobId) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Returns the terminal events for one job.
    #[must_use]
    pub fn terminal_events_for(&self, job_id: JobId) -> Vec<ProgressEvent> {
        self.events_for(job_id)
            .into_iter()
            .filter(ProgressEvent::is_terminal)
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl ProgressSink for CollectingProgressSink {
    async fn notify(&self, event: ProgressEvent) {
        self.events.write().push(event);
    }

    fn try_notify(&self, event: ProgressEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(ProgressStatus::Succeeded.is_terminal());
        assert!(ProgressStatus::Failed.is_terminal());
        assert!(ProgressStatus::Cancelled.is_terminal());
        assert!(!ProgressStatus::Started.is_terminal());
        assert!(!ProgressStatus::Retrying.is_terminal());
    }

    #[test]
    fn test_started_event_carries_stage_message() {
        let event = ProgressEvent::started(JobId::new(), Stage::Scripting);
        assert_eq!(event.status, ProgressStatus::Started);
        assert_eq!(event.message.as_deref(), Some("Generating lore script"));
    }

    #[test]
    fn test_retrying_event_message() {
        let event =
            ProgressEvent::retrying(JobId::new(), Stage::UploadingPrimary, 2, 3, "rate limited");
        let message = event.message.unwrap();
        assert!(message.contains("uploading_primary"));
        assert!(message.contains("attempt 2 of 3"));
        assert!(message.contains("rate limited"));
    }

    #[test]
    fn test_succeeded_event_links() {
        let links = vec!["https://a".to_string(), "https://b".to_string()];
        let event = ProgressEvent::succeeded(JobId::new(), links.clone());
        assert!(event.is_terminal());
        assert_eq!(event.links, links);
        assert!(event.stage.is_none());
    }

    #[test]
    fn test_to_dict() {
        let event = ProgressEvent::failed(JobId::new(), Stage::Narrating, "synthesis failure");
        let dict = event.to_dict();
        assert_eq!(dict.get("stage"), Some(&serde_json::json!("narrating")));
        assert_eq!(dict.get("status"), Some(&serde_json::json!("failed")));
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpProgressSink;
        sink.notify(ProgressEvent::completed(JobId::new(), Stage::Scripting))
            .await;
        sink.try_notify(ProgressEvent::completed(JobId::new(), Stage::Scripting));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingProgressSink::new();
        let job_id = JobId::new();
        assert!(sink.is_empty());

        sink.notify(ProgressEvent::started(job_id, Stage::Scripting))
            .await;
        sink.try_notify(ProgressEvent::succeeded(job_id, vec![]));
        sink.try_notify(ProgressEvent::started(JobId::new(), Stage::Scripting));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_for(job_id).len(), 2);
        assert_eq!(sink.terminal_events_for(job_id).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
