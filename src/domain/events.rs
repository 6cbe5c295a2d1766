//! Incoming events from external systems.
//!
//! Events are transient: they are routed to handlers and never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A Koji task changed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateEvent {
    /// Task identifier, matches `ArtifactBuild::build_id`
    pub task_id: String,

    /// New state in Koji's vocabulary (e.g. "CLOSED")
    pub task_state: String,
}

impl TaskStateEvent {
    pub fn new(task_id: impl Into<String>, task_state: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_state: task_state.into(),
        }
    }

    /// Parse the raw state string
    pub fn state(&self) -> KojiTaskState {
        KojiTaskState::parse(&self.task_state)
    }
}

/// Koji task states. Parsing never fails; unknown strings are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KojiTaskState {
    Free,
    Open,
    Closed,
    Canceled,
    Assigned,
    Failed,
    Other(String),
}

impl KojiTaskState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "FREE" => Self::Free,
            "OPEN" => Self::Open,
            "CLOSED" => Self::Closed,
            "CANCELED" => Self::Canceled,
            "ASSIGNED" => Self::Assigned,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for KojiTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Free => "FREE",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Canceled => "CANCELED",
            Self::Assigned => "ASSIGNED",
            Self::Failed => "FAILED",
            Self::Other(raw) => raw.as_str(),
        };
        f.write_str(name)
    }
}

/// Every event the dispatcher can route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A build-system task moved to a new state
    TaskStateChanged(TaskStateEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TaskStateChanged(_) => EventKind::TaskStateChanged,
        }
    }
}

impl From<TaskStateEvent> for Event {
    fn from(event: TaskStateEvent) -> Self {
        Self::TaskStateChanged(event)
    }
}

/// Fieldless mirror of [`Event`], used as the routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TaskStateChanged,
}
