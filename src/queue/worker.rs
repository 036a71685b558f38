use chrono::{DateTime, Duration, Utc};

use super::upload::process_cf_images_upload;
use super::{Disposition, Job, JobQueue};
use crate::backends::Backends;
use crate::config::WorkerConfig;
use crate::db::Database;
use crate::error::Result;

/// Longest wait between two attempts of one job.
const MAX_BACKOFF_SECS: i64 = 3600;

/// Outcome counts for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead: usize,
}

pub struct Worker {
    backends: Backends,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(backends: Backends, config: WorkerConfig) -> Self {
        Self { backends, config }
    }

    /// Delay before the next attempt of a job that has failed `attempts`
    /// times before this failure: base, 2x base, 4x base, ...
    pub fn backoff(&self, attempts: u32) -> Duration {
        let base = self.config.retry_base_secs.max(1) as i64;
        let factor = 1i64 << attempts.min(20);
        Duration::seconds(base.saturating_mul(factor).min(MAX_BACKOFF_SECS))
    }

    fn handle(&self, db: &Database, job: &Job) -> (Disposition, Option<String>) {
        match process_cf_images_upload(db, &self.backends, &job.message) {
            Ok(()) => (Disposition::Ack, None),
            Err(e) => (Disposition::Retry, Some(e.to_string())),
        }
    }

    /// Settle every job due at `now`, up to the configured batch size.
    pub fn run_once_at(&self, db: &Database, now: DateTime<Utc>) -> Result<WorkerStats> {
        let jobs = db.receive(self.config.batch_size, now)?;
        let mut stats = WorkerStats {
            received: jobs.len(),
            ..Default::default()
        };

        for job in &jobs {
            match self.handle(db, job) {
                (Disposition::Ack, _) => {
                    db.ack(job)?;
                    stats.succeeded += 1;
                }
                (Disposition::Retry, error) => {
                    let error = error.unwrap_or_default();
                    let attempts = job.attempts + 1;
                    if attempts >= self.config.max_attempts {
                        tracing::error!(
                            job_id = %job.id,
                            item_id = %job.message.item_id,
                            attempts,
                            error = %error,
                            "Upload job failed permanently"
                        );
                        db.dead_letter(job, &error)?;
                        stats.dead += 1;
                    } else {
                        let delay = self.backoff(job.attempts);
                        tracing::warn!(
                            job_id = %job.id,
                            item_id = %job.message.item_id,
                            attempts,
                            retry_in_secs = delay.num_seconds(),
                            error = %error,
                            "Upload job failed, will retry"
                        );
                        db.retry(job, &error, now + delay)?;
                        stats.retried += 1;
                    }
                }
            }
        }

        if stats.received > 0 {
            tracing::info!(
                received = stats.received,
                succeeded = stats.succeeded,
                retried = stats.retried,
                dead = stats.dead,
                "Processed upload jobs"
            );
        }
        Ok(stats)
    }

    pub fn run_once(&self, db: &Database) -> Result<WorkerStats> {
        self.run_once_at(db, Utc::now())
    }
}
