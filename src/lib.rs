//! repotrack - Pulp repository metadata client and Koji build-state tracker
//!
//! Two independent pieces share this crate:
//! - A resilient client for the Pulp repository API that resolves
//!   repository ids to content sets and docker repository names, retrying
//!   transient failures under an explicit [`RetryPolicy`]
//! - A reconciler that moves a tracked image build to `done` or `failed`
//!   when the Koji task behind it closes or fails
//!
//! # Modules
//!
//! - `adapters`: HTTP transport and the Pulp client
//! - `core`: Retry policy, reconciler and event dispatch
//! - `domain`: Data structures (ArtifactBuild, TaskStateEvent, Event)
//! - `store`: Build record persistence (SQLite, in-memory)
//! - `config`: Config file and environment resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Content sets, in the order given
//! repotrack content-sets rhel-7-hpc-node-rpms__7ComputeNode__x86_64 rhel-7-desktop-rpms__7Client__x86_64
//!
//! # Docker repository name
//! repotrack repo-name foo-526
//!
//! # Track an image build and apply a Koji state change
//! repotrack track 42 --name foo-container
//! repotrack task-state 42 CLOSED
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{PulpClient, PulpError};
pub use crate::core::{BuildStateReconciler, Dispatcher, ReconcileError, Reconciliation, RetryPolicy};
pub use domain::{ArtifactBuild, ArtifactType, BuildState, Event, TaskStateEvent};
pub use store::{BuildFilter, BuildStore, MemoryBuildStore, SqliteBuildStore};
