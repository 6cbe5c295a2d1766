//! In-memory build store for tests and dry runs.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{BuildFilter, BuildStore, StoreError, StoreResult};
use crate::domain::{ArtifactBuild, BuildState, NewArtifactBuild};

#[derive(Debug, Default)]
struct Inner {
    builds: Vec<ArtifactBuild>,
    next_id: i64,
    commits: usize,
    unavailable: bool,
}

/// Build store backed by a `Vec<ArtifactBuild>`.
///
/// Counts committed updates so callers can assert that nothing was written.
#[derive(Debug, Default)]
pub struct MemoryBuildStore {
    inner: Mutex<Inner>,
}

impl MemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `update_state` commits so far
    pub fn commit_count(&self) -> usize {
        self.inner().commits
    }

    /// Look up a build by id
    pub fn get(&self, id: i64) -> Option<ArtifactBuild> {
        self.inner().builds.iter().find(|b| b.id == id).cloned()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner().unavailable = unavailable;
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

impl BuildStore for MemoryBuildStore {
    fn find_builds(&self, filter: &BuildFilter) -> StoreResult<Vec<ArtifactBuild>> {
        let inner = self.inner();
        inner.check_available()?;
        Ok(inner
            .builds
            .iter()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }

    fn update_state(
        &self,
        id: i64,
        state: BuildState,
        time_completed: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut inner = self.inner();
        inner.check_available()?;

        let build = inner
            .builds
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::NotFound { id })?;
        build.state = state;
        build.time_completed = time_completed;
        inner.commits += 1;
        Ok(())
    }

    fn insert(&self, build: &NewArtifactBuild) -> StoreResult<ArtifactBuild> {
        let mut inner = self.inner();
        inner.check_available()?;

        inner.next_id += 1;
        let record = ArtifactBuild {
            id: inner.next_id,
            name: build.name.clone(),
            build_id: build.build_id.clone(),
            artifact_type: build.artifact_type,
            state: BuildState::default(),
            time_submitted: Utc::now(),
            time_completed: None,
        };
        inner.builds.push(record.clone());
        Ok(record)
    }
}
