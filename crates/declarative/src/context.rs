//! Execution context and host callbacks
//!
//! These let the declarative crate run without depending on a particular
//! terminal UI or scheduler.

use crate::retry::RetryConfig;
use crate::types::{Action, ExecuteSummary, ExecutionResult, ResourceKey};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called once before the first step
    fn on_pass_start(&mut self, count: usize);

    /// Called when a step is about to be dispatched
    fn on_step_start(&mut self, key: &ResourceKey, action: Action);

    /// Called when a step has a result (including skips)
    fn on_step_complete(&mut self, key: &ResourceKey, result: &ExecutionResult);

    /// Called once after the last step
    fn on_pass_complete(&mut self, summary: &ExecuteSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_pass_start(&mut self, _count: usize) {}
    fn on_step_start(&mut self, _key: &ResourceKey, _action: Action) {}
    fn on_step_complete(&mut self, _key: &ResourceKey, _result: &ExecutionResult) {}
    fn on_pass_complete(&mut self, _summary: &ExecuteSummary) {}
}

/// Cooperative cancellation flag shared between the host and a pass.
///
/// Checked before every dispatch; an in-flight remote call is not
/// interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Options for one execution pass
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Whether this is a dry run (no remote mutations)
    pub dry_run: bool,
    /// Local retry policy for transient failures
    pub retry: RetryConfig,
}

impl ExecuteOptions {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
