//! Domain types for repotrack.
//!
//! This module contains the core data structures:
//! - Artifact builds: persisted build records and their states
//! - Events: incoming notifications from the build system

pub mod artifact;
pub mod events;

// Re-export commonly used types
pub use artifact::{ArtifactBuild, ArtifactType, BuildState, NewArtifactBuild, UnknownVariant};
pub use events::{Event, EventKind, KojiTaskState, TaskStateEvent};
