//! Worker loop: claim, run, report, repeat.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};

use reel_models::{Heartbeat, JobId, JobStatus, QueueType, RawJob, WorkerStat, WorkerStatus};

use crate::backend::QueueBackend;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{JobContext, Pipeline, PipelineOutcome};
use crate::retry::FailureTracker;
use crate::services::Notifier;

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Claiming,
    Busy,
    Reporting,
    Stopped,
}

/// First GPU reported by `nvidia-smi`, if any.
pub async fn detect_gpu() -> Option<String> {
    let output = tokio::process::Command::new("nvidia-smi")
        .args(["--query-gpu=name", "--format=csv,noheader"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match tokio::time::timeout(Duration::from_secs(5), output).await {
        Ok(Ok(out)) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Runs one pipeline against one queue until shut down.
pub struct WorkerRuntime {
    worker_id: String,
    poll_interval: Duration,
    loop_error_backoff: Duration,
    work_dir: PathBuf,
    hostname: Option<String>,
    gpu_model: Option<String>,
    backend: Arc<dyn QueueBackend>,
    pipeline: Arc<dyn Pipeline>,
    notifier: Arc<dyn Notifier>,
    shutdown: watch::Sender<bool>,
    state: watch::Sender<RuntimeState>,
    heartbeat_failures: Mutex<FailureTracker>,
}

impl WorkerRuntime {
    pub fn new(
        config: &WorkerConfig,
        backend: Arc<dyn QueueBackend>,
        pipeline: Arc<dyn Pipeline>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (state, _) = watch::channel(RuntimeState::Idle);
        Self {
            worker_id: config.worker_id.clone(),
            poll_interval: config.poll_interval,
            loop_error_backoff: config.loop_error_backoff,
            work_dir: config.work_dir.clone(),
            hostname: None,
            gpu_model: None,
            backend,
            pipeline,
            notifier,
            shutdown,
            state,
            heartbeat_failures: Mutex::new(FailureTracker::new(3)),
        }
    }

    /// Host details sent with every heartbeat.
    pub fn with_host(mut self, hostname: Option<String>, gpu_model: Option<String>) -> Self {
        self.hostname = hostname;
        self.gpu_model = gpu_model;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn queue_type(&self) -> QueueType {
        self.pipeline.queue_type()
    }

    /// Sender that stops the loop once the current job is reported.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RuntimeState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: RuntimeState) {
        self.state.send_replace(state);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep, waking early on shutdown. Returns `true` if shutdown was requested.
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            return true;
        }
        tokio::select! {
            _ = shutdown_rx.changed() => *shutdown_rx.borrow(),
            _ = tokio::time::sleep(duration) => false,
        }
    }

    async fn heartbeat(&self, status: WorkerStatus, current_job: Option<&JobId>) {
        let mut beat = Heartbeat::new(&self.worker_id, status).with_host(self.hostname.clone(), self.gpu_model.clone());
        if let Some(job_id) = current_job {
            beat = beat.with_current_job(job_id.as_str());
        }

        let result = self.backend.heartbeat(self.queue_type(), &beat).await;
        let mut tracker = self.heartbeat_failures.lock().await;
        match result {
            Ok(()) => tracker.record_success(),
            Err(e) => {
                if tracker.record_failure() {
                    warn!(worker_id = %self.worker_id, error = %e, "Heartbeat failed");
                }
            }
        }
    }

    /// Poll until shutdown, then report the worker offline.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            worker_id = %self.worker_id,
            queue = %self.queue_type(),
            pipeline = self.pipeline.operation(),
            backend = self.backend.name(),
            "Worker started"
        );

        while !self.is_shutting_down() {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(queue = %self.queue_type(), "No jobs available");
                    if self.pause(self.poll_interval).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Worker loop error");
                    self.set_state(RuntimeState::Idle);
                    if self.pause(self.loop_error_backoff).await {
                        break;
                    }
                }
            }
        }

        self.heartbeat(WorkerStatus::Offline, None).await;
        self.set_state(RuntimeState::Stopped);
        info!(worker_id = %self.worker_id, "Worker stopped");
        Ok(())
    }

    /// One iteration: heartbeat, claim, process. `false` if the queue was empty.
    pub async fn run_once(&self) -> WorkerResult<bool> {
        self.heartbeat(WorkerStatus::Online, None).await;

        self.set_state(RuntimeState::Claiming);
        let claimed = self.backend.claim(self.queue_type(), &self.worker_id).await;
        let job = match claimed {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.set_state(RuntimeState::Idle);
                return Ok(false);
            }
            Err(e) => {
                self.set_state(RuntimeState::Idle);
                return Err(e);
            }
        };

        let result = self.process(job).await;
        self.heartbeat(WorkerStatus::Online, None).await;
        self.set_state(RuntimeState::Idle);
        result.map(|()| true)
    }

    async fn process(&self, job: RawJob) -> WorkerResult<()> {
        let job_id = job.job_id.clone();
        self.set_state(RuntimeState::Busy);
        self.heartbeat(WorkerStatus::Busy, Some(&job_id)).await;

        let ctx = match JobContext::new(
            job.clone(),
            self.queue_type(),
            &self.worker_id,
            self.pipeline.operation(),
            &self.work_dir,
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.set_state(RuntimeState::Reporting);
                return self.report_failure(&job, &e).await;
            }
        };

        let span = ctx.logger.span();
        ctx.logger.log_start(&format!("attempt {}", ctx.logger.attempt()));

        let outcome = AssertUnwindSafe(self.pipeline.run(&ctx))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| Err(WorkerError::job_failed(panic_message(panic.as_ref()))));

        self.set_state(RuntimeState::Reporting);
        let reported = async {
            match outcome {
                Ok(outcome) => {
                    ctx.logger.log_completion("pipeline finished");
                    self.report_success(&ctx, outcome).await
                }
                Err(e) => {
                    ctx.logger.log_error(&e.to_string());
                    self.report_failure(&ctx.job, &e).await
                }
            }
        }
        .instrument(span)
        .await;

        // Removes the job's temp dir
        drop(ctx);
        reported
    }

    async fn report_success(&self, ctx: &JobContext, outcome: PipelineOutcome) -> WorkerResult<()> {
        let queue_type = self.queue_type();
        let completed = self
            .backend
            .complete(queue_type, ctx.job_id(), &self.worker_id, outcome.result)
            .await?;
        if !completed {
            warn!(job_id = %ctx.job_id(), "Job already resolved, skipping follow-ups");
            return Ok(());
        }

        self.bump_stat(WorkerStat::JobsCompleted).await;

        for follow_up in outcome.follow_ups {
            match self
                .backend
                .enqueue(follow_up.queue_type, follow_up.payload, follow_up.priority)
                .await
            {
                Ok(job_id) => info!(queue = %follow_up.queue_type, job_id = %job_id, "Follow-up job queued"),
                Err(e) => error!(queue = %follow_up.queue_type, error = %e, "Could not queue follow-up job"),
            }
        }

        if let Some(message) = outcome.notification {
            self.notifier.notify(ctx.field("username"), &message).await;
        }
        Ok(())
    }

    async fn report_failure(&self, job: &RawJob, error: &WorkerError) -> WorkerResult<()> {
        let report = self
            .backend
            .fail(self.queue_type(), &job.job_id, &self.worker_id, &error.to_string())
            .await?;

        match report {
            None => {
                warn!(job_id = %job.job_id, "Job already resolved, failure not recorded");
                return Ok(());
            }
            Some(report) if report.status == JobStatus::Pending => {
                info!(job_id = %job.job_id, retry_count = report.retry_count, "Job will be retried");
            }
            Some(report) => {
                warn!(job_id = %job.job_id, retry_count = report.retry_count, "Job failed permanently");
            }
        }

        self.bump_stat(WorkerStat::JobsFailed).await;
        let username = job.payload.get("username").and_then(|v| v.as_str());
        self.notifier
            .notify(username, &self.pipeline.failure_message(job, error))
            .await;
        Ok(())
    }

    async fn bump_stat(&self, stat: WorkerStat) {
        match self.backend.increment_stat(self.queue_type(), &self.worker_id, stat).await {
            Ok(Some(value)) => debug!(stat = %stat, value, "Worker stat incremented"),
            Ok(None) => warn!(worker_id = %self.worker_id, "Worker record missing, stat not recorded"),
            Err(e) => warn!(worker_id = %self.worker_id, error = %e, "Could not increment worker stat"),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("pipeline panicked: {}", detail)
}
