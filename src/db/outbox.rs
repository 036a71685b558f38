//! Versioned event log written alongside every published mutation.
//!
//! Rows are only ever appended here. The external consumer reads pending
//! rows in creation order and stamps `processed_at` once delivered.

use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;

use super::{new_id, now, Database};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Album,
    Item,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Album => "album",
            AggregateType::Item => "item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "album" => Some(AggregateType::Album),
            "item" => Some(AggregateType::Item),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Upsert,
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Upsert => "upsert",
            EventType::Delete => "delete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "upsert" => Some(EventType::Upsert),
            "delete" => Some(EventType::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: String,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub version: i64,
    pub created_at: String,
    pub processed_at: Option<String>,
}

/// Append one event. Call inside the same [`Database::batch`] as the domain
/// write, after it.
pub(crate) fn append(
    conn: &Connection,
    aggregate_type: AggregateType,
    aggregate_id: &str,
    event_type: EventType,
    payload: &serde_json::Value,
    version: i64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload, version, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            new_id(),
            aggregate_type.as_str(),
            aggregate_id,
            event_type.as_str(),
            payload.to_string(),
            version,
            now(),
        ],
    )?;
    Ok(())
}

const EVENT_COLUMNS: &str =
    "id, aggregate_type, aggregate_id, event_type, payload, version, created_at, processed_at";

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Option<OutboxEvent>> {
    let id: String = row.get(0)?;
    let aggregate_type: String = row.get(1)?;
    let event_type: String = row.get(3)?;
    let payload: String = row.get(4)?;
    let (Some(aggregate_type), Some(event_type)) = (
        AggregateType::from_str(&aggregate_type),
        EventType::from_str(&event_type),
    ) else {
        tracing::warn!(
            event_id = %id,
            aggregate_type = %aggregate_type,
            event_type = %event_type,
            "Skipping outbox event of unknown type"
        );
        return Ok(None);
    };
    let payload = serde_json::from_str(&payload).unwrap_or_else(|e| {
        tracing::warn!(event_id = %id, error = %e, "Outbox event payload is not valid JSON");
        serde_json::Value::Null
    });
    Ok(Some(OutboxEvent {
        id,
        aggregate_type,
        aggregate_id: row.get(2)?,
        event_type,
        payload,
        version: row.get(5)?,
        created_at: row.get(6)?,
        processed_at: row.get(7)?,
    }))
}

fn readable(row: rusqlite::Result<Option<OutboxEvent>>) -> Option<OutboxEvent> {
    match row {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unreadable outbox row");
            None
        }
    }
}

impl Database {
    /// Unprocessed events, oldest first.
    pub fn pending_outbox_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM outbox_events WHERE processed_at IS NULL ORDER BY created_at ASC, id ASC LIMIT ?",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map([limit as i64], row_to_event)?
            .filter_map(readable)
            .collect();
        Ok(events)
    }

    /// Stamp events as delivered. Already processed ids are left untouched.
    pub fn mark_outbox_processed(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "UPDATE outbox_events SET processed_at = ? WHERE processed_at IS NULL AND id IN ({})",
            placeholders
        );
        let stamp = now();
        let bindings = std::iter::once(stamp.as_str()).chain(ids.iter().map(String::as_str));
        let changed = self.conn.execute(&sql, params_from_iter(bindings))?;
        Ok(changed)
    }

    /// Full event history of one aggregate, oldest first.
    pub fn outbox_events_for(&self, aggregate_id: &str) -> Result<Vec<OutboxEvent>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM outbox_events WHERE aggregate_id = ? ORDER BY created_at ASC, id ASC",
            EVENT_COLUMNS
        ))?;
        let events = stmt
            .query_map([aggregate_id], row_to_event)?
            .filter_map(readable)
            .collect();
        Ok(events)
    }
}
