//! Persistence for artifact build records.
//!
//! The reconciler talks to storage only through [`BuildStore`]; callers pass
//! a store handle into each invocation.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{ArtifactBuild, ArtifactType, BuildState, NewArtifactBuild};

pub use memory::MemoryBuildStore;
pub use sqlite::SqliteBuildStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by build stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Artifact build not found: {id}")]
    NotFound { id: i64 },

    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Selects build records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFilter {
    pub build_id: Option<String>,
    pub artifact_type: Option<ArtifactType>,
}

impl BuildFilter {
    /// Match every build
    pub fn all() -> Self {
        Self::default()
    }

    /// Match builds of one type sharing a build system task id
    pub fn by_build(build_id: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            build_id: Some(build_id.into()),
            artifact_type: Some(artifact_type),
        }
    }

    pub fn matches(&self, build: &ArtifactBuild) -> bool {
        self.build_id.as_deref().map_or(true, |id| build.build_id == id)
            && self
                .artifact_type
                .map_or(true, |ty| build.artifact_type == ty)
    }
}

/// Build record persistence contract
pub trait BuildStore: Send + Sync {
    /// Return every build matching the filter, ordered by id
    fn find_builds(&self, filter: &BuildFilter) -> StoreResult<Vec<ArtifactBuild>>;

    /// Set a build's state and commit immediately.
    ///
    /// Returns [`StoreError::NotFound`] when no record has the given id.
    fn update_state(
        &self,
        id: i64,
        state: BuildState,
        time_completed: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Record a new build in the `build` state
    fn insert(&self, build: &NewArtifactBuild) -> StoreResult<ArtifactBuild>;
}
