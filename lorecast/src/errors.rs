//! Error taxonomy for the orchestrator.
//!
//! External collaborators fail with a classified [`StageFailure`]; the
//! pipeline converts everything a caller can observe into a [`JobError`]
//! attached to the job's terminal state. Raw errors never escape a stage.

use crate::job::{JobId, Stage, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of an external failure, driving the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Worth retrying: network timeout, rate limit, 5xx-equivalent.
    Transient,
    /// Not worth retrying: invalid input, auth failure, quota exhausted.
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// A classified failure reported by a stage client.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} failure: {message}")]
pub struct StageFailure {
    /// Whether the failure is retry-eligible.
    pub kind: FailureKind,
    /// Human-readable description, surfaced to the user on terminal failure.
    pub message: String,
}

impl StageFailure {
    /// Creates a transient (retryable) failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a permanent (non-retryable) failure.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }

    /// Returns true if the failure may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }

    /// Converts a transient failure whose retry ceiling was exhausted into a
    /// permanent one for propagation.
    #[must_use]
    pub fn exhausted(self, attempts: u32) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: format!(
                "{} (retry ceiling of {} attempts exhausted)",
                self.message, attempts
            ),
        }
    }
}

/// Terminal error attached to a failed or cancelled job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// An external stage failed terminally.
    #[error("stage '{stage}' failed: {failure}")]
    Stage {
        /// The stage that failed.
        stage: Stage,
        /// The classified failure.
        failure: StageFailure,
    },

    /// The pipeline broke one of its own invariants, e.g. a stage asked for
    /// an output its predecessor never produced. Fatal, logged as a defect.
    #[error("pipeline invariant violated: {0}")]
    InvariantViolation(String),

    /// The job was cancelled by its user. A clean terminal state, not a
    /// defect.
    #[error("job cancelled: {0}")]
    Cancelled(String),
}

impl JobError {
    /// Creates a stage failure error.
    #[must_use]
    pub fn stage(stage: Stage, failure: StageFailure) -> Self {
        Self::Stage { stage, failure }
    }

    /// Creates an invariant violation error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

/// Rejection returned by the registry at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The user already has a job in flight.
    #[error("user {user_id} already has active job {job_id}")]
    AlreadyActive {
        /// The submitting user.
        user_id: UserId,
        /// The job currently occupying the slot.
        job_id: JobId,
    },
}
