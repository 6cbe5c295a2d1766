//! Artifact builds tracked against the external build system.
//!
//! An artifact build is one build task (image, rpm or module) submitted to
//! Koji. The persistence layer owns these records; the reconciler only
//! reads them and moves their `state`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted build record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBuild {
    /// Store-assigned row identifier
    pub id: i64,

    /// Human-readable artifact name (e.g. the image component)
    pub name: String,

    /// Task identifier assigned by the build system
    pub build_id: String,

    /// Kind of artifact being built
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,

    /// Current lifecycle state
    pub state: BuildState,

    /// When the build was recorded
    pub time_submitted: DateTime<Utc>,

    /// When the build reached a terminal state
    pub time_completed: Option<DateTime<Utc>>,
}

impl ArtifactBuild {
    /// Check if the build has finished (successfully or not)
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Fields needed to record a new build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewArtifactBuild {
    pub name: String,
    pub build_id: String,
    pub artifact_type: ArtifactType,
}

impl NewArtifactBuild {
    pub fn new(
        name: impl Into<String>,
        build_id: impl Into<String>,
        artifact_type: ArtifactType,
    ) -> Self {
        Self {
            name: name.into(),
            build_id: build_id.into(),
            artifact_type,
        }
    }

    /// Shorthand for an image build
    pub fn image(name: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self::new(name, build_id, ArtifactType::Image)
    }
}

/// Kinds of artifacts the build system produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Rpm,
    Image,
    Module,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
            Self::Image => "image",
            Self::Module => "module",
        }
    }
}

/// Lifecycle state of a build record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    /// Submitted and still building
    Build,

    /// Finished successfully
    Done,

    /// Finished with a failure
    Failed,

    /// Abandoned before completion
    Canceled,
}

impl Default for BuildState {
    fn default() -> Self {
        Self::Build
    }
}

impl BuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Build)
    }
}

/// A stored value did not name a known variant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for ArtifactType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rpm" => Ok(Self::Rpm),
            "image" => Ok(Self::Image),
            "module" => Ok(Self::Module),
            other => Err(UnknownVariant {
                kind: "artifact type",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for BuildState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Self::Build),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(UnknownVariant {
                kind: "build state",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
