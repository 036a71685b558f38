mod schema;
pub mod albums;
pub mod guard;
pub mod items;
pub mod meta;
pub mod outbox;
pub mod tags;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

pub use albums::{Album, AlbumKind, AlbumUpdate, NewAlbum, PublicAlbum, PublicAlbumItem};
pub use guard::Owned;
pub use items::{AlbumItem, ItemUpdate, RemoveResult};
pub use meta::{ExifMeta, FocalPoint, ItemMeta};
pub use outbox::{AggregateType, EventType, OutboxEvent};
pub use schema::{MIGRATIONS, SCHEMA};
pub use tags::{EntityType, Tag, TagUpdate};

/// Handle on the relational store. Every public operation takes the caller's
/// user id explicitly; there is no ambient tenant.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        // The worker and the request path may share one file.
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations();
        Ok(())
    }

    fn run_migrations(&self) {
        for migration in MIGRATIONS {
            if let Err(e) = self.conn.execute(migration, []) {
                tracing::trace!(migration, error = %e, "Migration skipped");
            }
        }
    }

    /// Run `f` inside one transaction. Commits when `f` returns `Ok`, rolls
    /// back on error or panic.
    pub fn batch<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.batch_with(TransactionBehavior::Deferred, f)
    }

    /// Like [`batch`](Self::batch), but takes the write lock up front so a
    /// read-then-write batch waits on the busy timeout instead of failing
    /// with `SQLITE_BUSY` when another connection writes first.
    pub fn batch_immediate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.batch_with(TransactionBehavior::Immediate, f)
    }

    fn batch_with<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, behavior)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
pub fn now() -> String {
    timestamp(Utc::now())
}

/// Stored timestamp form. Fixed width, so text order is time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Time-ordered unique identifier.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Lowercase, collapse every run of non `[a-z0-9]` characters into `-`, and
/// trim leading and trailing dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
pub(crate) fn test_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.initialize().unwrap();
    db
}
