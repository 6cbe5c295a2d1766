//! Core logic.
//!
//! This module contains:
//! - Retry: bounded blocking retry policy
//! - Reconciler: task state → build state transitions
//! - Dispatch: event routing to handlers

pub mod dispatch;
pub mod reconciler;
pub mod retry;

// Re-export commonly used types
pub use dispatch::{Dispatcher, Handler, HandlerError};
pub use reconciler::{BuildStateReconciler, ReconcileError, Reconciliation};
pub use retry::{Attempted, InvalidPolicy, RetryPolicy, Sleeper, ThreadSleeper};
