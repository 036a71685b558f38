//! Albums: owner-scoped photo collections.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;

use super::guard::{owns, Owned};
use super::outbox::{self, AggregateType, EventType};
use super::{new_id, now, slugify, Database};
use crate::error::{Error, Result};

/// Slug collisions that slip past the probe are retried this many times.
const SLUG_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumKind {
    Portfolio,
    ClientDelivery,
}

impl AlbumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumKind::Portfolio => "portfolio",
            AlbumKind::ClientDelivery => "client_delivery",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "portfolio" => Some(AlbumKind::Portfolio),
            "client_delivery" => Some(AlbumKind::ClientDelivery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub owner_user_id: String,
    pub kind: AlbumKind,
    pub is_public: bool,
    pub order_id: Option<String>,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub model: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub cover_item_id: Option<String>,
    pub public_version: i64,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Album {
    /// Snapshot carried by album upsert events.
    pub(crate) fn event_payload(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "slug": self.slug,
            "name": self.name,
            "kind": self.kind.as_str(),
            "isPublic": self.is_public,
            "coverItemId": self.cover_item_id,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAlbum {
    pub name: String,
    /// Explicit slug; derived from `name` when absent.
    pub slug: Option<String>,
    pub kind: Option<AlbumKind>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub is_public: bool,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl NewAlbum {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial update. `None` leaves a field unchanged; for the nullable
/// fields, `Some(None)` clears the stored value.
///
/// An explicit `slug` is slugified before the uniqueness probe. Without one,
/// a new `name` derives a fresh slug and an update touching neither keeps
/// the current slug.
#[derive(Debug, Clone, Default)]
pub struct AlbumUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub kind: Option<AlbumKind>,
    pub description: Option<Option<String>>,
    pub model: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub lat: Option<Option<f64>>,
    pub lng: Option<Option<f64>>,
    pub cover_item_id: Option<Option<String>>,
}

fn updated<T: Clone>(update: &Option<Option<T>>, existing: &Option<T>) -> Option<T> {
    match update {
        Some(value) => value.clone(),
        None => existing.clone(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAlbumItem {
    pub id: String,
    pub image_id: Option<String>,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAlbum {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub cover_item_id: Option<String>,
    pub items: Vec<PublicAlbumItem>,
}

const ALBUM_COLUMNS: &str = "id, owner_user_id, kind, is_public, order_id, slug, name, description, \
     model, lat, lng, cover_item_id, public_version, created_at, updated_at";

fn row_to_album(row: &rusqlite::Row) -> rusqlite::Result<Album> {
    let kind: String = row.get(2)?;
    let kind = AlbumKind::from_str(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown album kind: {}", kind).into(),
        )
    })?;
    Ok(Album {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        kind,
        is_public: row.get(3)?,
        order_id: row.get(4)?,
        slug: row.get(5)?,
        name: row.get(6)?,
        description: row.get(7)?,
        model: row.get(8)?,
        lat: row.get(9)?,
        lng: row.get(10)?,
        cover_item_id: row.get(11)?,
        public_version: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

pub(crate) fn fetch_album(conn: &Connection, id: &str, owner_user_id: &str) -> Result<Option<Album>> {
    let album = conn
        .query_row(
            &format!(
                "SELECT {} FROM albums WHERE id = ? AND owner_user_id = ?",
                ALBUM_COLUMNS
            ),
            [id, owner_user_id],
            row_to_album,
        )
        .optional()?;
    Ok(album)
}

/// First free slug for `owner_user_id`: the base itself, then `base-1`,
/// `base-2`, ... An empty base becomes `untitled`. `exclude_id` lets an
/// album keep its own slug on update.
pub(crate) fn ensure_unique_slug(
    conn: &Connection,
    owner_user_id: &str,
    slug: &str,
    exclude_id: Option<&str>,
) -> Result<String> {
    let base = if slug.is_empty() { "untitled" } else { slug };
    let mut candidate = base.to_string();
    let mut suffix = 0u32;
    loop {
        let taken = conn
            .query_row(
                "SELECT 1 FROM albums WHERE owner_user_id = ? AND slug = ? AND id != ?",
                params![owner_user_id, candidate, exclude_id.unwrap_or("")],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !taken {
            return Ok(candidate);
        }
        suffix += 1;
        candidate = format!("{}-{}", base, suffix);
    }
}

/// Republish a public album whose content (tags, items) changed: bump
/// `public_version` and append an album upsert. Returns the new version, or
/// `None` when the album is missing or private, which writes nothing.
pub(crate) fn publish_album_change(conn: &Connection, album_id: &str) -> Result<Option<i64>> {
    let changed = conn.execute(
        "UPDATE albums SET public_version = public_version + 1, updated_at = ? WHERE id = ? AND is_public = 1",
        params![now(), album_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    let album = conn.query_row(
        &format!("SELECT {} FROM albums WHERE id = ?", ALBUM_COLUMNS),
        [album_id],
        row_to_album,
    )?;
    outbox::append(
        conn,
        AggregateType::Album,
        &album.id,
        EventType::Upsert,
        &album.event_payload(),
        album.public_version,
    )?;
    Ok(Some(album.public_version))
}

impl Database {
    /// Run a slug-assigning write, re-probing if a concurrent writer took the
    /// slug between probe and insert.
    fn with_slug_retry<T, F>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt() {
                Err(e) if e.is_constraint_violation() && tries < SLUG_ATTEMPTS => {
                    tracing::warn!(attempt = tries, "Slug collided on write, retrying");
                }
                other => return other,
            }
        }
    }

    /// Albums owned by `owner_user_id`, newest first.
    pub fn list_albums(&self, owner_user_id: &str) -> Result<Vec<Album>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM albums WHERE owner_user_id = ? ORDER BY created_at DESC, id DESC",
            ALBUM_COLUMNS
        ))?;
        let albums = stmt
            .query_map([owner_user_id], row_to_album)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(albums)
    }

    pub fn get_album(&self, id: &str, owner_user_id: &str) -> Result<Option<Album>> {
        fetch_album(&self.conn, id, owner_user_id)
    }

    pub fn create_album(&self, owner_user_id: &str, input: NewAlbum) -> Result<Album> {
        let kind = input.kind.unwrap_or(AlbumKind::Portfolio);
        let base_slug = slugify(input.slug.as_deref().unwrap_or(&input.name));

        let album = self.with_slug_retry(|| {
            self.batch(|conn| {
                let slug = ensure_unique_slug(conn, owner_user_id, &base_slug, None)?;
                let id = new_id();
                let created_at = now();
                conn.execute(
                    r#"
                    INSERT INTO albums (id, owner_user_id, kind, is_public, slug, name, description, model,
                                        lat, lng, public_version, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                    "#,
                    params![
                        id,
                        owner_user_id,
                        kind.as_str(),
                        input.is_public,
                        slug,
                        input.name,
                        input.description,
                        input.model,
                        input.lat,
                        input.lng,
                        created_at,
                        created_at,
                    ],
                )?;
                conn.execute(
                    "INSERT INTO album_members (user_id, album_id, role, created_at) VALUES (?, ?, 'owner', ?)",
                    params![owner_user_id, id, created_at],
                )?;
                let album = fetch_album(conn, &id, owner_user_id)?
                    .ok_or_else(|| Error::not_found("Album not found"))?;
                outbox::append(
                    conn,
                    AggregateType::Album,
                    &album.id,
                    EventType::Upsert,
                    &album.event_payload(),
                    0,
                )?;
                Ok(album)
            })
        })?;

        tracing::info!(album_id = %album.id, slug = %album.slug, "Created album");
        Ok(album)
    }

    /// Apply a partial update and publish the result at `public_version + 1`.
    pub fn update_album(&self, id: &str, owner_user_id: &str, input: AlbumUpdate) -> Result<Album> {
        self.with_slug_retry(|| self.batch(|conn| apply_update(conn, id, owner_user_id, &input)))
    }

    /// Set or clear the cover. A new cover must be a live item in this album.
    pub fn set_album_cover(
        &self,
        id: &str,
        owner_user_id: &str,
        cover_item_id: Option<&str>,
    ) -> Result<Album> {
        self.batch(|conn| {
            if !owns(conn, Owned::Album(id), owner_user_id)? {
                return Err(Owned::Album(id).not_found());
            }
            if let Some(item_id) = cover_item_id {
                let member = conn
                    .query_row(
                        r#"
                        SELECT 1 FROM album_items ai
                        JOIN items i ON i.id = ai.item_id
                        WHERE ai.album_id = ? AND ai.item_id = ? AND i.deleted_at IS NULL
                        "#,
                        [id, item_id],
                        |_| Ok(()),
                    )
                    .optional()?;
                if member.is_none() {
                    return Err(Error::validation("Item not in this album"));
                }
            }
            let update = AlbumUpdate {
                cover_item_id: Some(cover_item_id.map(str::to_string)),
                ..Default::default()
            };
            apply_update(conn, id, owner_user_id, &update)
        })
    }

    /// Remove the album, its memberships, item links and tag refs, and append
    /// a `delete` event at `public_version + 1`. Items themselves survive.
    pub fn delete_album(&self, id: &str, owner_user_id: &str) -> Result<()> {
        self.batch(|conn| {
            let existing = fetch_album(conn, id, owner_user_id)?
                .ok_or_else(|| Owned::Album(id).not_found())?;

            conn.execute("DELETE FROM album_items WHERE album_id = ?", [id])?;
            conn.execute("DELETE FROM album_members WHERE album_id = ?", [id])?;
            conn.execute(
                "DELETE FROM tag_refs WHERE entity_type = 'album' AND entity_id = ?",
                [id],
            )?;
            conn.execute(
                "DELETE FROM albums WHERE id = ? AND owner_user_id = ?",
                [id, owner_user_id],
            )?;
            outbox::append(
                conn,
                AggregateType::Album,
                id,
                EventType::Delete,
                &json!({}),
                existing.public_version + 1,
            )
        })?;
        tracing::info!(album_id = %id, "Deleted album");
        Ok(())
    }

    /// Every public album with its live, image-bearing items in display order.
    pub fn list_public_albums(&self) -> Result<Vec<PublicAlbum>> {
        let mut album_stmt = self.conn.prepare(
            r#"
            SELECT id, slug, name, description, cover_item_id
            FROM albums
            WHERE is_public = 1
            ORDER BY order_id ASC, created_at ASC
            "#,
        )?;
        let mut item_stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.image_id, ai.sort_order
            FROM album_items ai
            JOIN items i ON i.id = ai.item_id AND i.deleted_at IS NULL AND i.image_id IS NOT NULL
            WHERE ai.album_id = ?
            ORDER BY ai.sort_order ASC, ai.created_at ASC
            "#,
        )?;

        let albums: Vec<PublicAlbum> = album_stmt
            .query_map([], |row| {
                Ok(PublicAlbum {
                    id: row.get(0)?,
                    slug: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    cover_item_id: row.get(4)?,
                    items: Vec::new(),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut result = Vec::with_capacity(albums.len());
        for mut album in albums {
            album.items = item_stmt
                .query_map([&album.id], |row| {
                    Ok(PublicAlbumItem {
                        id: row.get(0)?,
                        image_id: row.get(1)?,
                        sort_order: row.get(2)?,
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();
            result.push(album);
        }
        Ok(result)
    }
}

fn apply_update(conn: &Connection, id: &str, owner_user_id: &str, input: &AlbumUpdate) -> Result<Album> {
    let existing =
        fetch_album(conn, id, owner_user_id)?.ok_or_else(|| Owned::Album(id).not_found())?;

    let name = input.name.clone().unwrap_or_else(|| existing.name.clone());
    let slug = match (&input.slug, &input.name) {
        (Some(slug), _) => ensure_unique_slug(conn, owner_user_id, &slugify(slug), Some(id))?,
        (None, Some(name)) => ensure_unique_slug(conn, owner_user_id, &slugify(name), Some(id))?,
        (None, None) => existing.slug.clone(),
    };
    let new_version = existing.public_version + 1;

    conn.execute(
        r#"
        UPDATE albums
        SET name = ?, slug = ?, kind = ?, description = ?, model = ?, is_public = ?,
            lat = ?, lng = ?, cover_item_id = ?, public_version = ?, updated_at = ?
        WHERE id = ? AND owner_user_id = ?
        "#,
        params![
            name,
            slug,
            input.kind.unwrap_or(existing.kind).as_str(),
            updated(&input.description, &existing.description),
            updated(&input.model, &existing.model),
            input.is_public.unwrap_or(existing.is_public),
            updated(&input.lat, &existing.lat),
            updated(&input.lng, &existing.lng),
            updated(&input.cover_item_id, &existing.cover_item_id),
            new_version,
            now(),
            id,
            owner_user_id,
        ],
    )?;

    let album = fetch_album(conn, id, owner_user_id)?.ok_or_else(|| Owned::Album(id).not_found())?;
    outbox::append(
        conn,
        AggregateType::Album,
        id,
        EventType::Upsert,
        &album.event_payload(),
        new_version,
    )?;
    Ok(album)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, Owned};

    fn event_count(db: &Database, aggregate_id: &str) -> usize {
        db.outbox_events_for(aggregate_id).unwrap().len()
    }

    #[test]
    fn test_create_album_scenario() {
        let db = test_db();
        let album = db.create_album("U1", NewAlbum::named("Spring 2024")).unwrap();
        assert_eq!(album.slug, "spring-2024");
        assert_eq!(album.public_version, 0);
        assert_eq!(album.kind, AlbumKind::Portfolio);
        assert!(!album.is_public);

        let events = db.outbox_events_for(&album.id).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Upsert);
        assert_eq!(events[0].aggregate_type, AggregateType::Album);
        assert_eq!(events[0].version, 0);
        assert_eq!(events[0].payload["slug"], "spring-2024");

        let second = db.create_album("U1", NewAlbum::named("Spring 2024")).unwrap();
        assert_eq!(second.slug, "spring-2024-1");
        let third = db.create_album("U1", NewAlbum::named("spring  2024!")).unwrap();
        assert_eq!(third.slug, "spring-2024-2");
    }

    #[test]
    fn test_slug_is_per_owner() {
        let db = test_db();
        db.create_album("U1", NewAlbum::named("Spring 2024")).unwrap();
        let other = db.create_album("U2", NewAlbum::named("Spring 2024")).unwrap();
        assert_eq!(other.slug, "spring-2024");
    }

    #[test]
    fn test_empty_name_slug_is_untitled() {
        let db = test_db();
        let a = db.create_album("U1", NewAlbum::named("!!!")).unwrap();
        let b = db.create_album("U1", NewAlbum::named("")).unwrap();
        assert_eq!(a.slug, "untitled");
        assert_eq!(b.slug, "untitled-1");
    }

    #[test]
    fn test_create_writes_owner_membership() {
        let db = test_db();
        let album = db.create_album("U1", NewAlbum::named("Members")).unwrap();
        let role: String = db
            .conn
            .query_row(
                "SELECT role FROM album_members WHERE user_id = 'U1' AND album_id = ?",
                [&album.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(role, "owner");
    }

    #[test]
    fn test_unique_constraint_backs_the_probe() {
        let db = test_db();
        db.create_album("U1", NewAlbum::named("Dup")).unwrap();
        let err = db
            .conn
            .execute(
                "INSERT INTO albums (id, owner_user_id, kind, slug, name, created_at) VALUES ('x', 'U1', 'portfolio', 'dup', 'Dup', 'now')",
                [],
            )
            .map_err(Error::from)
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_list_and_get_are_owner_scoped() {
        let db = test_db();
        let a = db.create_album("U1", NewAlbum::named("First")).unwrap();
        let b = db.create_album("U1", NewAlbum::named("Second")).unwrap();
        db.create_album("U2", NewAlbum::named("Theirs")).unwrap();

        let listed = db.list_albums("U1").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);

        assert!(db.get_album(&a.id, "U1").unwrap().is_some());
        assert!(db.get_album(&a.id, "U2").unwrap().is_none());
    }

    #[test]
    fn test_update_bumps_version_and_keeps_own_slug() {
        let db = test_db();
        let album = db.create_album("U1", NewAlbum::named("Trip")).unwrap();

        let updated = db
            .update_album(
                &album.id,
                "U1",
                AlbumUpdate {
                    name: Some("Trip".into()),
                    is_public: Some(true),
                    kind: Some(AlbumKind::ClientDelivery),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.slug, "trip");
        assert_eq!(updated.public_version, 1);
        assert!(updated.is_public);
        assert_eq!(updated.kind, AlbumKind::ClientDelivery);

        let events = db.outbox_events_for(&album.id).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].version, 1);
        assert_eq!(events[1].payload["isPublic"], true);
        assert_eq!(events[1].payload["kind"], "client_delivery");
    }

    #[test]
    fn test_update_without_name_keeps_custom_slug() {
        let db = test_db();
        let album = db
            .create_album(
                "U1",
                NewAlbum {
                    slug: Some("custom-path".into()),
                    ..NewAlbum::named("Anything")
                },
            )
            .unwrap();
        assert_eq!(album.slug, "custom-path");

        let updated = db
            .update_album(
                &album.id,
                "U1",
                AlbumUpdate {
                    description: Some(Some("notes".into())),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.slug, "custom-path");
        assert_eq!(updated.description.as_deref(), Some("notes"));
    }

    #[test]
    fn test_update_can_clear_nullable_fields() {
        let db = test_db();
        let album = db
            .create_album(
                "U1",
                NewAlbum {
                    description: Some("dunes at dusk".into()),
                    model: Some("Ada".into()),
                    lat: Some(24.5),
                    lng: Some(54.4),
                    ..NewAlbum::named("Desert")
                },
            )
            .unwrap();

        let kept = db
            .update_album(
                &album.id,
                "U1",
                AlbumUpdate {
                    lat: Some(Some(25.0)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(kept.lat, Some(25.0));
        assert_eq!(kept.lng, Some(54.4));
        assert_eq!(kept.description.as_deref(), Some("dunes at dusk"));

        let cleared = db
            .update_album(
                &album.id,
                "U1",
                AlbumUpdate {
                    description: Some(None),
                    model: Some(None),
                    lat: Some(None),
                    lng: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(cleared.description.is_none());
        assert!(cleared.model.is_none());
        assert!(cleared.lat.is_none());
        assert!(cleared.lng.is_none());
        assert_eq!(cleared.name, "Desert");
    }

    #[test]
    fn test_update_explicit_slug_is_normalized() {
        let db = test_db();
        db.create_album("U1", NewAlbum::named("Taken Path")).unwrap();
        let album = db.create_album("U1", NewAlbum::named("Anything")).unwrap();

        let updated = db
            .update_album(
                &album.id,
                "U1",
                AlbumUpdate {
                    slug: Some("  Taken PATH! ".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.slug, "taken-path-1");
        assert_eq!(updated.name, "Anything");
    }

    #[test]
    fn test_update_rename_avoids_sibling_slug() {
        let db = test_db();
        db.create_album("U1", NewAlbum::named("Beach")).unwrap();
        let album = db.create_album("U1", NewAlbum::named("Mountains")).unwrap();
        let renamed = db
            .update_album(
                &album.id,
                "U1",
                AlbumUpdate {
                    name: Some("Beach".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.slug, "beach-1");
    }

    #[test]
    fn test_update_foreign_album_is_not_found() {
        let db = test_db();
        let album = db.create_album("U1", NewAlbum::named("Mine")).unwrap();
        let err = db
            .update_album(&album.id, "U2", AlbumUpdate::default())
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(event_count(&db, &album.id), 1);
    }

    #[test]
    fn test_set_cover_requires_membership() {
        let db = test_db();
        let album = db.create_album("U1", NewAlbum::named("Covers")).unwrap();
        let other = db.create_album("U1", NewAlbum::named("Elsewhere")).unwrap();
        let inside = db.add_item_to_album(&album.id, "U1", "covers/1.jpg", None).unwrap();
        let outside = db.add_item_to_album(&other.id, "U1", "else/1.jpg", None).unwrap();

        let err = db.set_album_cover(&album.id, "U1", Some(&outside)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.to_string(), "Item not in this album");

        let updated = db.set_album_cover(&album.id, "U1", Some(&inside)).unwrap();
        assert_eq!(updated.cover_item_id.as_deref(), Some(inside.as_str()));
        assert_eq!(updated.public_version, 1);

        let cleared = db.set_album_cover(&album.id, "U1", None).unwrap();
        assert!(cleared.cover_item_id.is_none());
        assert_eq!(cleared.public_version, 2);
    }

    #[test]
    fn test_delete_album_cascades_and_emits_tombstone() {
        let db = test_db();
        let album = db.create_album("U1", NewAlbum::named("Gone")).unwrap();
        db.add_item_to_album(&album.id, "U1", "gone/1.jpg", None).unwrap();
        db.add_item_to_album(&album.id, "U1", "gone/2.jpg", None).unwrap();
        db.set_tags_for_entity("U1", Owned::Album(&album.id), &["travel", "film"])
            .unwrap();
        let before = db.get_album(&album.id, "U1").unwrap().unwrap();

        db.delete_album(&album.id, "U1").unwrap();

        let count = |sql: &str| -> i64 {
            db.conn.query_row(sql, [&album.id], |row| row.get(0)).unwrap()
        };
        assert_eq!(count("SELECT COUNT(*) FROM album_items WHERE album_id = ?"), 0);
        assert_eq!(count("SELECT COUNT(*) FROM album_members WHERE album_id = ?"), 0);
        assert_eq!(
            count("SELECT COUNT(*) FROM tag_refs WHERE entity_type = 'album' AND entity_id = ?"),
            0
        );
        assert_eq!(count("SELECT COUNT(*) FROM albums WHERE id = ?"), 0);

        let deletes: Vec<_> = db
            .outbox_events_for(&album.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == EventType::Delete)
            .collect();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].version, before.public_version + 1);

        assert!(db.delete_album(&album.id, "U1").is_err());
    }

    #[test]
    fn test_list_public_albums() {
        let db = test_db();
        let public = db
            .create_album(
                "U1",
                NewAlbum {
                    is_public: true,
                    ..NewAlbum::named("Shown")
                },
            )
            .unwrap();
        db.create_album("U1", NewAlbum::named("Hidden")).unwrap();
        let first = db.add_item_to_album(&public.id, "U1", "s/1.jpg", None).unwrap();
        let second = db.add_item_to_album(&public.id, "U1", "s/2.jpg", None).unwrap();
        let deleted = db.add_item_to_album(&public.id, "U1", "s/3.jpg", None).unwrap();
        db.delete_item(&deleted, "U1").unwrap();

        let albums = db.list_public_albums().unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].slug, "shown");
        let ids: Vec<_> = albums[0].items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);
    }

    #[test]
    fn test_album_kind_from_str() {
        assert_eq!(AlbumKind::from_str("portfolio"), Some(AlbumKind::Portfolio));
        assert_eq!(AlbumKind::from_str("client_delivery"), Some(AlbumKind::ClientDelivery));
        assert_eq!(AlbumKind::from_str("Portfolio"), None);
        assert_eq!(AlbumKind::ClientDelivery.as_str(), "client_delivery");
    }
}
