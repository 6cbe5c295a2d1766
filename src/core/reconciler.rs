//! Applies Koji task state changes to tracked image builds.
//!
//! | task state | build state |
//! |------------|-------------|
//! | CLOSED     | done        |
//! | FAILED     | failed      |
//! | other      | unchanged   |
//!
//! Only `image` builds are considered. Re-transitions are allowed: the last
//! event wins.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::domain::{ArtifactType, BuildState, KojiTaskState, TaskStateEvent};
use crate::store::{BuildFilter, BuildStore, StoreError};

/// Errors that abort reconciliation. Nothing is written when one occurs.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Found {count} image builds with build id '{build_id}' in db")]
    DuplicateBuild { build_id: String, count: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a single event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// No image build is tracked for the task
    Untracked,

    /// The task state does not move builds
    Ignored { id: i64, task_state: KojiTaskState },

    /// The build's state was committed
    Updated {
        id: i64,
        from: BuildState,
        to: BuildState,
    },
}

/// Moves image build records in response to task state events
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStateReconciler;

impl BuildStateReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Build state a task state maps to, if any
    pub fn target_state(task_state: &KojiTaskState) -> Option<BuildState> {
        match task_state {
            KojiTaskState::Closed => Some(BuildState::Done),
            KojiTaskState::Failed => Some(BuildState::Failed),
            _ => None,
        }
    }

    /// Apply one event. At most one record is written, with one commit.
    #[instrument(skip(self, event, store), fields(task_id = %event.task_id, task_state = %event.task_state))]
    pub fn reconcile(
        &self,
        event: &TaskStateEvent,
        store: &dyn BuildStore,
    ) -> Result<Reconciliation, ReconcileError> {
        let filter = BuildFilter::by_build(event.task_id.as_str(), ArtifactType::Image);
        let mut builds = store.find_builds(&filter)?;

        if builds.len() > 1 {
            return Err(ReconcileError::DuplicateBuild {
                build_id: event.task_id.clone(),
                count: builds.len(),
            });
        }

        let Some(build) = builds.pop() else {
            debug!("No image build tracked for task");
            return Ok(Reconciliation::Untracked);
        };

        let task_state = event.state();
        let Some(target) = Self::target_state(&task_state) else {
            debug!(build = build.id, "Task state does not affect builds");
            return Ok(Reconciliation::Ignored {
                id: build.id,
                task_state,
            });
        };

        if build.is_terminal() {
            debug!(build = build.id, state = %build.state, "Build already finished, overwriting");
        }
        info!(
            build = build.id,
            from = %build.state,
            to = %target,
            "Image build '{}' state changed in koji, updating it in db",
            event.task_id
        );
        store.update_state(build.id, target, Some(Utc::now()))?;

        Ok(Reconciliation::Updated {
            id: build.id,
            from: build.state,
            to: target,
        })
    }
}
