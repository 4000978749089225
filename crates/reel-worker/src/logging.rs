//! Per-job log context.
//!
//! Every event a pipeline emits for a claimed job is recorded inside one
//! `job` span carrying the queue, worker, job id, pipeline and attempt, so a
//! single job can be followed across workers and retries.

use tracing::{error, info, info_span, warn, Span};

use reel_models::{QueueType, RawJob};

/// Log context for one claimed job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    queue: QueueType,
    worker_id: String,
    operation: String,
    attempt: u32,
    span: Span,
}

impl JobLogger {
    /// `attempt` is one more than the job's recorded retry count.
    pub fn for_job(job: &RawJob, queue: QueueType, worker_id: &str, operation: &str) -> Self {
        let attempt = job.retry_count + 1;
        let span = info_span!(
            "job",
            queue = %queue,
            worker_id = %worker_id,
            job_id = %job.job_id,
            operation = %operation,
            attempt,
        );
        Self {
            job_id: job.job_id.as_str().to_string(),
            queue,
            worker_id: worker_id.to_string(),
            operation: operation.to_string(),
            attempt,
            span,
        }
    }

    pub fn log_start(&self, message: &str) {
        self.span.in_scope(|| info!(stage = "start", "{}", message));
    }

    pub fn log_progress(&self, message: &str) {
        self.span.in_scope(|| info!(stage = "progress", "{}", message));
    }

    pub fn log_warning(&self, message: &str) {
        self.span.in_scope(|| warn!(stage = "warning", "{}", message));
    }

    pub fn log_error(&self, message: &str) {
        self.span.in_scope(|| error!(stage = "error", "{}", message));
    }

    pub fn log_completion(&self, message: &str) {
        self.span.in_scope(|| info!(stage = "done", "{}", message));
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The job span, for instrumenting the pipeline future.
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use reel_models::JobId;
    use serde_json::Map;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn retried_job() -> RawJob {
        let mut job = RawJob::new(JobId::from_string("job-42"), 0, Map::new());
        job.retry_count = 2;
        job
    }

    #[test]
    fn test_logger_identifies_job_worker_and_attempt() {
        let logger = JobLogger::for_job(&retried_job(), QueueType::Shorts, "gpu-1", "shorts");

        assert_eq!(logger.job_id(), "job-42");
        assert_eq!(logger.queue(), QueueType::Shorts);
        assert_eq!(logger.worker_id(), "gpu-1");
        assert_eq!(logger.operation(), "shorts");
        assert_eq!(logger.attempt(), 3);
    }

    #[test]
    fn test_events_carry_span_fields() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let logger = JobLogger::for_job(&retried_job(), QueueType::Audio, "w1", "audio");
            logger.log_progress("narration synthesized");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("narration synthesized"));
        assert!(output.contains("queue=audio"));
        assert!(output.contains("worker_id=w1"));
        assert!(output.contains("job_id=job-42"));
        assert!(output.contains("attempt=3"));
        assert!(output.contains("stage=\"progress\""));
    }
}
