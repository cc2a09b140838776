//! Configuration for the orchestrator and its retry policy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Root directory for per-job scratch areas.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Retry behavior for external calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Output video constraints.
    #[serde(default)]
    pub video: VideoSpecs,
    /// Minimum number of sourced images; fewer fails the job.
    #[serde(default = "default_min_images")]
    pub min_images: usize,
    /// Maximum number of sourced images; surplus images are discarded.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// Word budget for generated scripts; longer scripts are truncated.
    #[serde(default = "default_max_script_words")]
    pub max_script_words: usize,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("lorecast")
}

fn default_min_images() -> usize {
    3
}

fn default_max_images() -> usize {
    4
}

fn default_max_script_words() -> usize {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            retry: RetryConfig::default(),
            video: VideoSpecs::default(),
            min_images: default_min_images(),
            max_images: default_max_images(),
            max_script_words: default_max_script_words(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scratch root.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the video constraints.
    #[must_use]
    pub fn with_video(mut self, video: VideoSpecs) -> Self {
        self.video = video;
        self
    }
}

/// Retry configuration for external stage calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff, in seconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: f64,
    /// Upper bound on a single backoff delay, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,
    /// Per-call timeout, in seconds. A timed-out call counts as transient.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    0.5
}

fn default_max_delay() -> f64 {
    30.0
}

fn default_call_timeout() -> f64 {
    120.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay(),
            max_delay_seconds: default_max_delay(),
            call_timeout_seconds: default_call_timeout(),
        }
    }
}

impl RetryConfig {
    /// Base backoff delay as a Duration.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_seconds)
    }

    /// Backoff cap as a Duration.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay_seconds)
    }

    /// Per-call timeout as a Duration.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.call_timeout_seconds)
    }
}

/// Constraints on the assembled video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSpecs {
    /// Output width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,
    /// Output height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,
    /// Maximum duration in seconds.
    #[serde(default = "default_max_duration")]
    pub max_duration_seconds: u32,
}

fn default_width() -> u32 {
    1080
}

fn default_height() -> u32 {
    1920
}

fn default_max_duration() -> u32 {
    60
}

impl Default for VideoSpecs {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            max_duration_seconds: default_max_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_short_form_profile() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.video.width, 1080);
        assert_eq!(config.video.height, 1920);
        assert_eq!(config.video.max_duration_seconds, 60);
        assert_eq!(config.min_images, 3);
        assert_eq!(config.max_images, 4);
        assert_eq!(config.max_script_words, 500);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_builder_setters() {
        let config = OrchestratorConfig::new()
            .with_scratch_dir("/tmp/elsewhere")
            .with_retry(RetryConfig {
                max_attempts: 5,
                ..RetryConfig::default()
            });

        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = OrchestratorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: OrchestratorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.video, config.video);
        assert_eq!(back.max_images, config.max_images);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.video, VideoSpecs::default());
    }

    #[test]
    fn test_durations() {
        let retry = RetryConfig::default();
        assert_eq!(retry.base_delay(), Duration::from_millis(500));
        assert_eq!(retry.call_timeout(), Duration::from_secs(120));
    }
}
