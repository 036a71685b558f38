//! Row ownership checks.
//!
//! Every owner-scoped mutation goes through [`Database::require_owner`] (or
//! [`owns`] inside a batch) before touching rows.

use rusqlite::{Connection, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};

/// An owner-scoped row, identified by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owned<'a> {
    Album(&'a str),
    Item(&'a str),
}

impl Owned<'_> {
    fn probe_sql(&self) -> &'static str {
        match self {
            Owned::Album(_) => "SELECT 1 FROM albums WHERE id = ? AND owner_user_id = ?",
            Owned::Item(_) => {
                "SELECT 1 FROM items WHERE id = ? AND owner_user_id = ? AND deleted_at IS NULL"
            }
        }
    }

    fn id(&self) -> &str {
        match self {
            Owned::Album(id) | Owned::Item(id) => id,
        }
    }

    pub fn not_found(&self) -> Error {
        match self {
            Owned::Album(_) => Error::not_found("Album not found"),
            Owned::Item(_) => Error::not_found("Item not found"),
        }
    }
}

pub(crate) fn owns(conn: &Connection, target: Owned<'_>, owner_user_id: &str) -> Result<bool> {
    let found = conn
        .query_row(target.probe_sql(), [target.id(), owner_user_id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

impl Database {
    /// `NotFound` unless `owner_user_id` owns the row. Soft-deleted items
    /// count as missing.
    pub fn require_owner(&self, target: Owned<'_>, owner_user_id: &str) -> Result<()> {
        if owns(&self.conn, target, owner_user_id)? {
            Ok(())
        } else {
            Err(target.not_found())
        }
    }
}
