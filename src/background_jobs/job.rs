use super::context::JobContext;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// When the scheduler starts a job on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Every `Duration`, counted from registration and then from the start of the previous run
    Interval(Duration),
    /// Never on its own; only through `SchedulerHandle::trigger_job`
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job not found")]
    NotFound,

    #[error("Job is already running")]
    AlreadyRunning,

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Job was cancelled")]
    Cancelled,
}

/// A unit of periodic catalog work.
///
/// `execute` runs on the tokio runtime and is dropped as soon as shutdown
/// starts, so a run must leave the catalog consistent at every await point.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Stable id used by the admin API.
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn schedule(&self) -> JobSchedule;

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
