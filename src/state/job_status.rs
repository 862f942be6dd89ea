/// Job status definitions for tracking crawl lifecycle
///
/// This module defines every state a crawl job can be in and which
/// transitions between them are legal.
use serde::Serialize;
use std::fmt;

/// Represents the current state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job has been created but no runner has started yet
    Idle,

    /// A runner is attached and crawling
    Running,

    // ===== Resumable State =====
    /// Crawl stopped cooperatively (user request or page limit) and may resume
    Paused,

    // ===== Terminal States =====
    /// Paused job that the user discarded
    Stopped,

    /// Every block up to the frozen latest block is covered
    Completed,

    /// A non-retryable API error ended the crawl
    Failed,
}

impl JobStatus {
    /// Returns true if no further crawling can happen for this job
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// Returns true if a runner is (or is about to be) attached
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }

    /// Returns true if the job can be resumed
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Checks whether moving from this state to `next` is allowed
    ///
    /// | From | To |
    /// |------|----|
    /// | Idle | Running |
    /// | Running | Paused, Completed, Failed |
    /// | Paused | Running, Stopped |
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Paused)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Paused, Self::Running)
                | (Self::Paused, Self::Stopped)
        )
    }

    /// Converts the status to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its string representation
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible job statuses
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Paused,
            Self::Stopped,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
