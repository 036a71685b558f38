//! Background copy of item images into Cloudflare Images.
//!
//! Producers call [`upload::enqueue_cf_images_upload`]; the worker binary
//! drains the queue through [`worker::Worker`]. Delivery is at least once,
//! so handlers must tolerate redelivery.

pub mod jobs;
pub mod upload;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use jobs::JobStatus;
pub use upload::{enqueue_cf_images_upload, process_cf_images_upload, source_url_for_upload};
pub use worker::{Worker, WorkerStats};

/// Queue payload. The image id is captured at enqueue time so a handler can
/// tell whether the item changed since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfImagesMessage {
    pub item_id: String,
    pub image_id: String,
}

/// A received message plus its delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub message: CfImagesMessage,
    /// Failed deliveries so far.
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done, or nothing to do. Remove the job.
    Ack,
    /// Transient failure. Deliver again later.
    Retry,
}

pub trait JobQueue {
    fn send(&self, message: &CfImagesMessage) -> Result<()>;

    /// Claim up to `limit` jobs due at `now`. Claimed jobs stay invisible
    /// to other receivers for a lease period and reappear if never settled.
    fn receive(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Job>>;

    fn ack(&self, job: &Job) -> Result<()>;

    /// Record the failure and make the job due again at `available_at`.
    fn retry(&self, job: &Job, error: &str, available_at: DateTime<Utc>) -> Result<()>;

    /// Park the job permanently; it is never delivered again.
    fn dead_letter(&self, job: &Job, error: &str) -> Result<()>;
}
