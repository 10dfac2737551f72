//! Background job scheduling and execution.
//!
//! Periodic work (the catalog refresh pass) runs here, outside of request
//! handling, and can also be triggered from the admin API.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, JobError, JobSchedule};
pub use scheduler::{create_scheduler, JobScheduler};
