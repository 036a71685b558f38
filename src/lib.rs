//! Photo portfolio administration core.
//!
//! Albums, items and tags live in SQLite, and every mutation records a
//! versioned outbox event in the same transaction. Item images may sit on a
//! WebDAV share, in PhotoPrism, or in Cloudflare Images; [`images`] resolves
//! a stored image id to bytes or a CDN URL, and [`queue`] migrates images
//! into Cloudflare Images in the background.

pub mod api;
pub mod auth;
pub mod backends;
pub mod config;
pub mod db;
pub mod error;
pub mod image_ref;
pub mod images;
pub mod logging;
pub mod metadata;
pub mod queue;

pub use error::{Error, Result};
