use super::context::JobContext;
use super::handle::{JobRun, JobRunStatus, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError, JobSchedule};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Longest the scheduler sleeps before re-checking due jobs.
const MAX_IDLE: Duration = Duration::from_secs(60);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Task handles of running jobs, managed by the scheduler loop only
    running_handles: HashMap<String, JoinHandle<()>>,

    job_cancel_tokens: HashMap<String, CancellationToken>,

    command_receiver: mpsc::Receiver<SchedulerCommand>,

    shutdown_token: CancellationToken,

    job_context: JobContext,
}

fn next_run_after(schedule: &JobSchedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        JobSchedule::Interval(interval) => {
            Some(from + chrono::Duration::from_std(*interval).unwrap_or_default())
        }
        JobSchedule::Manual => None,
    }
}

impl JobScheduler {
    pub fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        if let Some(next_run) = next_run_after(&job.schedule(), Utc::now()) {
            state.next_runs.insert(job_id.clone(), next_run);
        }
        state.jobs.insert(job_id, job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            self.cleanup_completed_jobs();

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        {
            let state = self.shared_state.read().await;
            if !state.jobs.contains_key(job_id) {
                return Err(JobError::NotFound);
            }
            if state.running_jobs.contains(job_id) {
                return Err(JobError::AlreadyRunning);
            }
        }

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    async fn time_until_next_scheduled_job(&self) -> Duration {
        let state = self.shared_state.read().await;
        let now = Utc::now();
        state
            .next_runs
            .iter()
            .filter(|(job_id, _)| !state.running_jobs.contains(*job_id))
            .map(|(_, next_run)| (*next_run - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE)
    }

    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let due: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .next_runs
                .iter()
                .filter(|(job_id, next_run)| {
                    **next_run <= now && !state.running_jobs.contains(*job_id)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in due {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let mut state = self.shared_state.write().await;
            let Some(job) = state.jobs.get(job_id).map(Arc::clone) else {
                error!("Attempted to spawn unknown job: {}", job_id);
                return;
            };
            state.running_jobs.insert(job_id.to_string());
            // Move the next run forward now so a slow job is not re-spawned.
            if let Some(next_run) = next_run_after(&job.schedule(), Utc::now()) {
                state.next_runs.insert(job_id.to_string(), next_run);
            }
            state.last_runs.insert(
                job_id.to_string(),
                JobRun {
                    started_at: Utc::now(),
                    finished_at: None,
                    status: JobRunStatus::Running,
                    error_message: None,
                    triggered_by: triggered_by.to_string(),
                },
            );
            job
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);
        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());

        let ctx = JobContext::new(
            cancel_token.clone(),
            Arc::clone(&self.job_context.sync_service),
        );

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let task = tokio::spawn(async move {
                tokio::select! {
                    result = job.execute(&ctx) => result,
                    _ = cancel_token.cancelled() => Err(JobError::Cancelled),
                }
            });
            let result = task.await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, status_label) = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    (JobRunStatus::Completed, None, "success")
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (
                        JobRunStatus::Failed,
                        Some("Cancelled".to_string()),
                        "cancelled",
                    )
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), "failed")
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (
                        JobRunStatus::Failed,
                        Some(format!("Task panic: {}", e)),
                        "panic",
                    )
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_background_job_running(&job_id_owned, false);

            let mut state = shared_state.write().await;
            state.running_jobs.remove(&job_id_owned);
            if let Some(run) = state.last_runs.get_mut(&job_id_owned) {
                run.finished_at = Some(Utc::now());
                run.status = status;
                run.error_message = error_msg;
            }
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            self.running_handles.remove(&job_id);
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// Cancel running jobs and wait up to 30s for them to wind down.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        for (job_id, token) in &self.job_cancel_tokens {
            debug!("Cancelling job: {}", job_id);
            token.cancel();
        }

        for (job_id, handle) in self.running_handles.drain() {
            info!("Waiting for job {} to finish...", job_id);
            let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::sync::test_support::FakeCatalogApi;
    use crate::sync::{SyncService, SyncSettings};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        execution_count: Arc<AtomicUsize>,
        should_fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            self.execution_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail.load(Ordering::SeqCst) {
                Err(JobError::ExecutionFailed("Test failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Never finishes on its own.
    struct StuckJob;

    #[async_trait]
    impl BackgroundJob for StuckJob {
        fn id(&self) -> &'static str {
            "stuck_job"
        }

        fn name(&self) -> &'static str {
            "Stuck Job"
        }

        fn description(&self) -> &'static str {
            "Waits forever"
        }

        fn schedule(&self) -> JobSchedule {
            JobSchedule::Manual
        }

        async fn execute(&self, _ctx: &JobContext) -> Result<(), JobError> {
            std::future::pending().await
        }
    }

    fn test_job(id: &'static str, schedule: JobSchedule) -> (Arc<TestJob>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(TestJob {
            id,
            schedule,
            execution_count: count.clone(),
            should_fail: Arc::new(AtomicBool::new(false)),
        });
        (job, count)
    }

    fn create_test_scheduler() -> (JobScheduler, SchedulerHandle, TempDir, CancellationToken) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(temp_dir.path().join("catalog.db"), 1).unwrap());
        let sync_service = Arc::new(SyncService::new(
            store,
            Arc::new(FakeCatalogApi::default()),
            SyncSettings::default(),
        ));
        let shutdown_token = CancellationToken::new();
        let job_context = JobContext::new(shutdown_token.child_token(), sync_service);
        let (scheduler, handle) = create_scheduler(shutdown_token.clone(), job_context);
        (scheduler, handle, temp_dir, shutdown_token)
    }

    async fn wait_until_idle(handle: &SchedulerHandle, job_id: &str) {
        for _ in 0..100 {
            let finished = handle
                .get_job(job_id)
                .await
                .and_then(|job| job.last_run)
                .is_some_and(|run| run.finished_at.is_some());
            if finished {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_register_and_list_jobs() {
        let (mut scheduler, handle, _temp_dir, _shutdown) = create_test_scheduler();
        assert!(handle.list_jobs().await.is_empty());

        for id in ["job_c", "job_a", "job_b"] {
            let (job, _) = test_job(id, JobSchedule::Manual);
            scheduler.register_job(job).await;
        }

        let jobs = handle.list_jobs().await;
        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["job_a", "job_b", "job_c"]);
        assert!(!jobs[0].is_running);
        assert!(jobs[0].last_run.is_none());
        assert!(jobs[0].next_run_at.is_none());
    }

    #[tokio::test]
    async fn test_interval_job_has_next_run() {
        let (mut scheduler, handle, _temp_dir, _shutdown) = create_test_scheduler();
        let (job, _) = test_job("interval_job", JobSchedule::Interval(Duration::from_secs(3600)));
        scheduler.register_job(job).await;

        let info = handle.get_job("interval_job").await.unwrap();
        assert_eq!(info.schedule.schedule_type, "interval");
        assert_eq!(info.schedule.value_secs, Some(3600));
        assert!(info.next_run_at.is_some());
    }

    #[tokio::test]
    async fn test_manual_trigger_runs_job() {
        let (mut scheduler, handle, _temp_dir, shutdown) = create_test_scheduler();
        let (job, count) = test_job("manual_job", JobSchedule::Manual);
        scheduler.register_job(job).await;
        let scheduler_task = tokio::spawn(async move { scheduler.run().await });

        handle.trigger_job("manual_job").await.unwrap();
        wait_until_idle(&handle, "manual_job").await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let run = handle.get_job("manual_job").await.unwrap().last_run.unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.triggered_by, "manual");

        assert_eq!(
            handle.trigger_job("missing").await.unwrap_err(),
            JobError::NotFound
        );

        shutdown.cancel();
        scheduler_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_job_is_recorded() {
        let (mut scheduler, handle, _temp_dir, shutdown) = create_test_scheduler();
        let (job, _) = test_job("failing_job", JobSchedule::Manual);
        job.should_fail.store(true, Ordering::SeqCst);
        scheduler.register_job(job).await;
        let scheduler_task = tokio::spawn(async move { scheduler.run().await });

        handle.trigger_job("failing_job").await.unwrap();
        wait_until_idle(&handle, "failing_job").await;

        let run = handle.get_job("failing_job").await.unwrap().last_run.unwrap();
        assert_eq!(run.status, "failed");
        assert!(run.error_message.unwrap().contains("Test failure"));

        shutdown.cancel();
        scheduler_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_job() {
        let (mut scheduler, handle, _temp_dir, shutdown) = create_test_scheduler();
        scheduler.register_job(Arc::new(StuckJob)).await;
        let scheduler_task = tokio::spawn(async move { scheduler.run().await });

        handle.trigger_job("stuck_job").await.unwrap();
        for _ in 0..100 {
            if handle.get_job("stuck_job").await.unwrap().is_running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(handle.get_job("stuck_job").await.unwrap().is_running);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), scheduler_task)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let job = handle.get_job("stuck_job").await.unwrap();
        assert!(!job.is_running);
        let run = job.last_run.unwrap();
        assert_eq!(run.status, "failed");
        assert_eq!(run.error_message.as_deref(), Some("Cancelled"));
    }
}
