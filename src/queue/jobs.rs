//! SQLite-backed job queue (`cf_images_jobs`).

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use std::collections::HashMap;

use super::{CfImagesMessage, Job, JobQueue};
use crate::db::{new_id, now, timestamp, Database};
use crate::error::Result;

/// How long a received job stays hidden before it is redelivered.
pub const LEASE_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Dead => "dead",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "dead" => Some(JobStatus::Dead),
            _ => None,
        }
    }
}

impl JobQueue for Database {
    fn send(&self, message: &CfImagesMessage) -> Result<()> {
        let created_at = now();
        self.conn.execute(
            r#"
            INSERT INTO cf_images_jobs (id, item_id, image_id, status, attempts, available_at, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
            params![
                new_id(),
                message.item_id,
                message.image_id,
                JobStatus::Pending.as_str(),
                created_at,
                created_at,
            ],
        )?;
        tracing::debug!(item_id = %message.item_id, image_id = %message.image_id, "Queued upload job");
        Ok(())
    }

    fn receive(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let due = timestamp(now);
        let lease_until = timestamp(now + Duration::seconds(LEASE_SECS));

        self.batch_immediate(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, item_id, image_id, attempts FROM cf_images_jobs
                WHERE status = ? AND available_at <= ?
                ORDER BY available_at ASC, id ASC
                LIMIT ?
                "#,
            )?;
            let jobs: Vec<Job> = stmt
                .query_map(
                    params![JobStatus::Pending.as_str(), due, limit as i64],
                    |row| {
                        Ok(Job {
                            id: row.get(0)?,
                            message: CfImagesMessage {
                                item_id: row.get(1)?,
                                image_id: row.get(2)?,
                            },
                            attempts: row.get(3)?,
                        })
                    },
                )?
                .filter_map(|r| r.ok())
                .collect();

            for job in &jobs {
                conn.execute(
                    "UPDATE cf_images_jobs SET available_at = ? WHERE id = ?",
                    params![lease_until, job.id],
                )?;
            }
            Ok(jobs)
        })
    }

    fn ack(&self, job: &Job) -> Result<()> {
        self.conn
            .execute("DELETE FROM cf_images_jobs WHERE id = ?", [&job.id])?;
        Ok(())
    }

    fn retry(&self, job: &Job, error: &str, available_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE cf_images_jobs
            SET attempts = attempts + 1, available_at = ?, last_error = ?
            WHERE id = ?
            "#,
            params![timestamp(available_at), error, job.id],
        )?;
        Ok(())
    }

    fn dead_letter(&self, job: &Job, error: &str) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE cf_images_jobs
            SET status = ?, attempts = attempts + 1, last_error = ?
            WHERE id = ?
            "#,
            params![JobStatus::Dead.as_str(), error, job.id],
        )?;
        Ok(())
    }
}

impl Database {
    /// Number of jobs per status.
    pub fn job_counts(&self) -> Result<HashMap<JobStatus, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM cf_images_jobs GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .filter_map(|(status, count)| JobStatus::from_str(&status).map(|s| (s, count)))
            .collect();
        Ok(counts)
    }

    /// Dead-lettered jobs with their last error, newest first.
    pub fn dead_jobs(&self) -> Result<Vec<(Job, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_id, image_id, attempts, last_error FROM cf_images_jobs
            WHERE status = ?
            ORDER BY created_at DESC
            "#,
        )?;
        let jobs = stmt
            .query_map([JobStatus::Dead.as_str()], |row| {
                Ok((
                    Job {
                        id: row.get(0)?,
                        message: CfImagesMessage {
                            item_id: row.get(1)?,
                            image_id: row.get(2)?,
                        },
                        attempts: row.get(3)?,
                    },
                    row.get(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(jobs)
    }
}
