//! Photo items and their album membership.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use super::albums::publish_album_change;
use super::guard::{owns, Owned};
use super::meta::{FocalPoint, ItemMeta};
use super::outbox::{self, AggregateType, EventType};
use super::{new_id, now, Database};
use crate::backends::webdav::WebDavClient;
use crate::error::{Error, Result};

const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// An item as listed inside one album.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumItem {
    pub id: String,
    pub image_id: String,
    pub sort_order: i64,
    pub created_at: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub meta: Option<String>,
}

impl AlbumItem {
    pub fn item_meta(&self) -> ItemMeta {
        ItemMeta::parse_lossy(self.meta.as_deref())
    }
}

/// Partial item update. For `title`/`description`, `Some(None)` clears the
/// field. `crop` replaces the whole crop map when present.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub title: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub crop: Option<BTreeMap<String, FocalPoint>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoveResult {
    pub removed: usize,
}

/// Bump an item's version and append an upsert carrying its current state.
pub(crate) fn publish_item_change(conn: &Connection, item_id: &str) -> Result<Option<i64>> {
    let changed = conn.execute(
        "UPDATE items SET version = version + 1, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        params![now(), item_id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    let (payload, version) = item_snapshot(conn, item_id)?;
    outbox::append(conn, AggregateType::Item, item_id, EventType::Upsert, &payload, version)?;
    Ok(Some(version))
}

fn item_snapshot(conn: &Connection, item_id: &str) -> Result<(serde_json::Value, i64)> {
    let (image_id, title, description, meta, version): (
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
    ) = conn.query_row(
        "SELECT image_id, title, description, meta, version FROM items WHERE id = ?",
        [item_id],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
    )?;
    let meta = meta
        .as_deref()
        .and_then(|m| serde_json::from_str::<serde_json::Value>(m).ok())
        .unwrap_or(serde_json::Value::Null);
    let payload = json!({
        "id": item_id,
        "imageId": image_id,
        "albumId": first_album_id(conn, item_id)?,
        "title": title,
        "description": description,
        "meta": meta,
    });
    Ok((payload, version))
}

fn first_album_id(conn: &Connection, item_id: &str) -> Result<Option<String>> {
    let album_id = conn
        .query_row(
            "SELECT album_id FROM album_items WHERE item_id = ? ORDER BY created_at ASC LIMIT 1",
            [item_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(album_id)
}

/// Take a deleted item out of every album that shows it: clear it as a
/// cover, republish public albums, and bump a private album only when its
/// cover changed.
fn withdraw_from_albums(conn: &Connection, item_id: &str) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, is_public, COALESCE(cover_item_id = ?1, 0)
        FROM albums
        WHERE cover_item_id = ?1
           OR id IN (SELECT album_id FROM album_items WHERE item_id = ?1)
        "#,
    )?;
    let albums = stmt
        .query_map([item_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, row.get::<_, bool>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for (album_id, is_public, was_cover) in albums {
        if was_cover {
            conn.execute(
                "UPDATE albums SET cover_item_id = NULL WHERE id = ?",
                [&album_id],
            )?;
        }
        if is_public {
            publish_album_change(conn, &album_id)?;
        } else if was_cover {
            conn.execute(
                "UPDATE albums SET public_version = public_version + 1, updated_at = ? WHERE id = ?",
                params![now(), album_id],
            )?;
        }
    }
    Ok(())
}

fn is_jpeg(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| JPEG_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Database {
    /// Create an item for `image_id` and append it to the album after the
    /// current last position. Returns the new item id.
    pub fn add_item_to_album(
        &self,
        album_id: &str,
        owner_user_id: &str,
        image_id: &str,
        meta: Option<&ItemMeta>,
    ) -> Result<String> {
        let meta_json = meta.map(ItemMeta::to_json).transpose()?;

        let item_id = self.batch(|conn| {
            if !owns(conn, Owned::Album(album_id), owner_user_id)? {
                return Err(Owned::Album(album_id).not_found());
            }
            let sort_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM album_items WHERE album_id = ?",
                [album_id],
                |row| row.get(0),
            )?;

            let item_id = new_id();
            let created_at = now();
            conn.execute(
                r#"
                INSERT INTO items (id, owner_user_id, type, image_id, meta, version, created_at, updated_at)
                VALUES (?, ?, 'photo', ?, ?, 0, ?, ?)
                "#,
                params![item_id, owner_user_id, image_id, meta_json, created_at, created_at],
            )?;
            conn.execute(
                "INSERT INTO album_items (album_id, item_id, sort_order, created_at) VALUES (?, ?, ?, ?)",
                params![album_id, item_id, sort_order, created_at],
            )?;
            outbox::append(
                conn,
                AggregateType::Item,
                &item_id,
                EventType::Upsert,
                &json!({ "id": item_id, "imageId": image_id, "albumId": album_id }),
                0,
            )?;
            Ok(item_id)
        })?;

        tracing::debug!(album_id, item_id = %item_id, image_id, "Added item to album");
        Ok(item_id)
    }

    /// Live, image-bearing items of an album in display order.
    pub fn list_album_items(&self, album_id: &str, owner_user_id: &str) -> Result<Vec<AlbumItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.image_id, ai.sort_order, ai.created_at, i.title, i.description, i.meta
            FROM album_items ai
            JOIN items i ON i.id = ai.item_id
            WHERE ai.album_id = ? AND i.owner_user_id = ?
              AND i.image_id IS NOT NULL AND i.deleted_at IS NULL
            ORDER BY ai.sort_order ASC, ai.created_at ASC
            "#,
        )?;
        let items = stmt
            .query_map([album_id, owner_user_id], |row| {
                Ok(AlbumItem {
                    id: row.get(0)?,
                    image_id: row.get(1)?,
                    sort_order: row.get(2)?,
                    created_at: row.get(3)?,
                    title: row.get(4)?,
                    description: row.get(5)?,
                    meta: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }

    /// Update title, description and crop focal points. Other meta keys are
    /// kept. Stored meta that is not valid JSON is never overwritten; the
    /// update fails instead.
    pub fn update_item(&self, item_id: &str, owner_user_id: &str, input: ItemUpdate) -> Result<()> {
        self.batch(|conn| {
            let existing: Option<(Option<String>, Option<String>, Option<String>)> = conn
                .query_row(
                    "SELECT title, description, meta FROM items WHERE id = ? AND owner_user_id = ? AND deleted_at IS NULL",
                    [item_id, owner_user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let (title, description, meta) =
                existing.ok_or_else(|| Owned::Item(item_id).not_found())?;

            let meta = match &input.crop {
                Some(crop) => {
                    let mut parsed = ItemMeta::parse(meta.as_deref()).map_err(|e| {
                        Error::validation(format!("Stored item meta is not valid JSON: {}", e))
                    })?;
                    parsed.crop = crop.clone();
                    Some(parsed.to_json()?)
                }
                None => meta,
            };

            conn.execute(
                r#"
                UPDATE items SET title = ?, description = ?, meta = ?, updated_at = ?
                WHERE id = ? AND owner_user_id = ?
                "#,
                params![
                    input.title.clone().unwrap_or(title),
                    input.description.clone().unwrap_or(description),
                    meta,
                    now(),
                    item_id,
                    owner_user_id,
                ],
            )?;
            publish_item_change(conn, item_id)?;
            Ok(())
        })
    }

    /// Soft delete. The row stays for history; listings and image routes
    /// stop returning it. Albums showing the item lose it as a cover and,
    /// when public, are republished.
    pub fn delete_item(&self, item_id: &str, owner_user_id: &str) -> Result<()> {
        self.batch(|conn| {
            let stamp = now();
            let changed = conn.execute(
                r#"
                UPDATE items SET deleted_at = ?, updated_at = ?, version = version + 1
                WHERE id = ? AND owner_user_id = ? AND deleted_at IS NULL
                "#,
                params![stamp, stamp, item_id, owner_user_id],
            )?;
            if changed == 0 {
                return Err(Owned::Item(item_id).not_found());
            }
            let version: i64 =
                conn.query_row("SELECT version FROM items WHERE id = ?", [item_id], |row| {
                    row.get(0)
                })?;
            outbox::append(
                conn,
                AggregateType::Item,
                item_id,
                EventType::Delete,
                &json!({}),
                version,
            )?;
            withdraw_from_albums(conn, item_id)
        })?;
        tracing::info!(item_id, "Deleted item");
        Ok(())
    }

    /// Unlink items from an album. Removing the cover clears it; a public
    /// album gets one upsert listing the removed ids.
    pub fn remove_items_from_album(
        &self,
        album_id: &str,
        item_ids: &[String],
        owner_user_id: &str,
    ) -> Result<RemoveResult> {
        let valid: Vec<&str> = item_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .collect();

        self.batch(|conn| {
            let (cover_item_id, is_public, public_version): (Option<String>, bool, i64) = conn
                .query_row(
                    "SELECT cover_item_id, is_public, public_version FROM albums WHERE id = ? AND owner_user_id = ?",
                    [album_id, owner_user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?
                .ok_or_else(|| Owned::Album(album_id).not_found())?;

            if valid.is_empty() {
                return Ok(RemoveResult { removed: 0 });
            }

            let mut removed = 0;
            for &item_id in &valid {
                removed += conn.execute(
                    "DELETE FROM album_items WHERE album_id = ? AND item_id = ?",
                    [album_id, item_id],
                )?;
            }

            let cover_removed = cover_item_id
                .as_deref()
                .map(|cover| valid.contains(&cover))
                .unwrap_or(false);
            let new_version = public_version + 1;

            if cover_removed || is_public {
                conn.execute(
                    r#"
                    UPDATE albums
                    SET cover_item_id = CASE WHEN cover_item_id = ? THEN NULL ELSE cover_item_id END,
                        public_version = ?, updated_at = ?
                    WHERE id = ? AND owner_user_id = ?
                    "#,
                    params![
                        if cover_removed { cover_item_id.as_deref() } else { None },
                        new_version,
                        now(),
                        album_id,
                        owner_user_id,
                    ],
                )?;
            }
            if is_public {
                outbox::append(
                    conn,
                    AggregateType::Album,
                    album_id,
                    EventType::Upsert,
                    &json!({ "id": album_id, "removedItemIds": valid }),
                    new_version,
                )?;
            }
            Ok(RemoveResult { removed })
        })
    }

    pub fn is_item_in_public_album(&self, item_id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                r#"
                SELECT 1 FROM album_items ai
                JOIN albums a ON a.id = ai.album_id
                WHERE ai.item_id = ? AND a.is_public = 1
                LIMIT 1
                "#,
                [item_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Image reference of an owned, live item.
    pub fn item_image_id(&self, item_id: &str, owner_user_id: &str) -> Result<String> {
        let image_id: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT image_id FROM items WHERE id = ? AND owner_user_id = ? AND deleted_at IS NULL",
                [item_id, owner_user_id],
                |row| row.get(0),
            )
            .optional()?;
        match image_id {
            None => Err(Owned::Item(item_id).not_found()),
            Some(None) => Err(Error::not_found("Item has no image")),
            Some(Some(image_id)) => Ok(image_id),
        }
    }

    /// Image reference of a live item that appears in at least one public
    /// album. Anything else is reported as not found.
    pub fn public_item_image_id(&self, item_id: &str) -> Result<String> {
        let image_id: Option<String> = self
            .conn
            .query_row(
                "SELECT image_id FROM items WHERE id = ? AND deleted_at IS NULL AND image_id IS NOT NULL",
                [item_id],
                |row| row.get(0),
            )
            .optional()?;
        match image_id {
            Some(image_id) if self.is_item_in_public_album(item_id)? => Ok(image_id),
            _ => Err(Error::not_found("Not found")),
        }
    }

    /// Current image reference of a live item, ignoring ownership. `None`
    /// when the item is gone or has no image.
    pub fn live_item_image_id(&self, item_id: &str) -> Result<Option<String>> {
        let image_id = self
            .conn
            .query_row(
                "SELECT image_id FROM items WHERE id = ? AND deleted_at IS NULL",
                [item_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
        Ok(image_id)
    }

    /// Swap `expected` for `replacement` on a live item and publish the new
    /// reference. Returns false, writing nothing, when the item was deleted
    /// or its image changed in the meantime.
    pub fn replace_item_image(&self, item_id: &str, expected: &str, replacement: &str) -> Result<bool> {
        self.batch(|conn| {
            let changed = conn.execute(
                r#"
                UPDATE items SET image_id = ?, version = version + 1, updated_at = ?
                WHERE id = ? AND image_id = ? AND deleted_at IS NULL
                "#,
                params![replacement, now(), item_id, expected],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            let version: i64 =
                conn.query_row("SELECT version FROM items WHERE id = ?", [item_id], |row| {
                    row.get(0)
                })?;
            outbox::append(
                conn,
                AggregateType::Item,
                item_id,
                EventType::Upsert,
                &json!({
                    "id": item_id,
                    "imageId": replacement,
                    "albumId": first_album_id(conn, item_id)?,
                }),
                version,
            )?;
            Ok(true)
        })
    }

    /// Store a JPEG on WebDAV under `{album_id}/{new id}.jpg` and add it to
    /// the album, with any EXIF found copied into the item meta.
    pub fn upload_photo_to_album(
        &self,
        webdav: &WebDavClient,
        album_id: &str,
        owner_user_id: &str,
        filename: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<String> {
        self.require_owner(Owned::Album(album_id), owner_user_id)?;
        if filename.is_empty() {
            return Err(Error::validation("No file provided"));
        }
        if !is_jpeg(filename) {
            return Err(Error::validation("Only JPEG images (.jpg, .jpeg) are allowed"));
        }

        let storage_path = format!("{}/{}.jpg", album_id, new_id());
        let content_type = content_type.filter(|c| !c.is_empty()).unwrap_or("image/jpeg");
        webdav.put(&storage_path, bytes, content_type)?;

        let meta = crate::metadata::extract_exif(bytes).map(ItemMeta::with_exif);
        let item_id = self.add_item_to_album(album_id, owner_user_id, &storage_path, meta.as_ref())?;
        tracing::info!(album_id, item_id = %item_id, path = %storage_path, "Uploaded photo");
        Ok(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, AlbumUpdate, NewAlbum};
    use httpmock::prelude::*;

    fn album(db: &Database, name: &str, public: bool) -> String {
        db.create_album(
            "U1",
            NewAlbum {
                is_public: public,
                ..NewAlbum::named(name)
            },
        )
        .unwrap()
        .id
    }

    fn item_version(db: &Database, item_id: &str) -> i64 {
        db.conn
            .query_row("SELECT version FROM items WHERE id = ?", [item_id], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_add_item_assigns_increasing_sort_order() {
        let db = test_db();
        let album_id = album(&db, "Order", false);
        let a = db.add_item_to_album(&album_id, "U1", "o/a.jpg", None).unwrap();
        let b = db.add_item_to_album(&album_id, "U1", "photoprism:ff", None).unwrap();

        let items = db.list_album_items(&album_id, "U1").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!((items[0].id.as_str(), items[0].sort_order), (a.as_str(), 0));
        assert_eq!((items[1].id.as_str(), items[1].sort_order), (b.as_str(), 1));

        let events = db.outbox_events_for(&a).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].version, 0);
        assert_eq!(events[0].payload["imageId"], "o/a.jpg");
        assert_eq!(events[0].payload["albumId"], album_id.as_str());
    }

    #[test]
    fn test_sort_order_continues_after_gaps() {
        let db = test_db();
        let album_id = album(&db, "Gaps", false);
        let a = db.add_item_to_album(&album_id, "U1", "g/a.jpg", None).unwrap();
        let b = db.add_item_to_album(&album_id, "U1", "g/b.jpg", None).unwrap();
        db.remove_items_from_album(&album_id, &[a], "U1").unwrap();
        let c = db.add_item_to_album(&album_id, "U1", "g/c.jpg", None).unwrap();

        let items = db.list_album_items(&album_id, "U1").unwrap();
        assert_eq!(items[0].id, b);
        assert_eq!(items[1].id, c);
        assert_eq!(items[1].sort_order, 2);
    }

    #[test]
    fn test_add_to_foreign_album_is_not_found() {
        let db = test_db();
        let album_id = album(&db, "Mine", false);
        let err = db.add_item_to_album(&album_id, "U2", "x.jpg", None).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_remove_cover_from_private_album() {
        let db = test_db();
        let album_id = album(&db, "Private", false);
        let cover = db.add_item_to_album(&album_id, "U1", "p/1.jpg", None).unwrap();
        db.add_item_to_album(&album_id, "U1", "p/2.jpg", None).unwrap();
        let before = db.set_album_cover(&album_id, "U1", Some(&cover)).unwrap();
        let events_before = db.outbox_events_for(&album_id).unwrap().len();

        let result = db
            .remove_items_from_album(&album_id, &[cover.clone()], "U1")
            .unwrap();
        assert_eq!(result.removed, 1);

        let after = db.get_album(&album_id, "U1").unwrap().unwrap();
        assert!(after.cover_item_id.is_none());
        assert_eq!(after.public_version, before.public_version + 1);
        assert_eq!(db.outbox_events_for(&album_id).unwrap().len(), events_before);
    }

    #[test]
    fn test_remove_from_public_album_emits_one_upsert() {
        let db = test_db();
        let album_id = album(&db, "Public", true);
        let a = db.add_item_to_album(&album_id, "U1", "p/1.jpg", None).unwrap();
        let b = db.add_item_to_album(&album_id, "U1", "p/2.jpg", None).unwrap();
        db.add_item_to_album(&album_id, "U1", "p/3.jpg", None).unwrap();
        let events_before = db.outbox_events_for(&album_id).unwrap().len();

        db.remove_items_from_album(&album_id, &[a.clone(), b.clone(), String::new()], "U1")
            .unwrap();

        let events = db.outbox_events_for(&album_id).unwrap();
        assert_eq!(events.len(), events_before + 1);
        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::Upsert);
        assert_eq!(last.version, 1);
        assert_eq!(last.payload["removedItemIds"], json!([a, b]));
        assert_eq!(db.list_album_items(&album_id, "U1").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_non_cover_from_private_album_changes_nothing_published() {
        let db = test_db();
        let album_id = album(&db, "Quiet", false);
        let a = db.add_item_to_album(&album_id, "U1", "q/1.jpg", None).unwrap();

        db.remove_items_from_album(&album_id, &[a], "U1").unwrap();
        let after = db.get_album(&album_id, "U1").unwrap().unwrap();
        assert_eq!(after.public_version, 0);
        assert_eq!(db.outbox_events_for(&album_id).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_with_no_ids() {
        let db = test_db();
        let album_id = album(&db, "Empty", true);
        let result = db.remove_items_from_album(&album_id, &[], "U1").unwrap();
        assert_eq!(result.removed, 0);
        assert_eq!(db.get_album(&album_id, "U1").unwrap().unwrap().public_version, 0);
    }

    #[test]
    fn test_update_item_merges_crop_and_keeps_unknown_keys() {
        let db = test_db();
        let album_id = album(&db, "Crops", false);
        let item = db.add_item_to_album(&album_id, "U1", "c/1.jpg", None).unwrap();
        db.conn
            .execute(
                r#"UPDATE items SET meta = '{"exif":{"iso":200},"rating":4}' WHERE id = ?"#,
                [&item],
            )
            .unwrap();

        let mut crop = BTreeMap::new();
        crop.insert("hero".to_string(), FocalPoint::new(0.25, 0.75));
        db.update_item(
            &item,
            "U1",
            ItemUpdate {
                title: Some(Some("Dunes".into())),
                crop: Some(crop),
                ..Default::default()
            },
        )
        .unwrap();

        let items = db.list_album_items(&album_id, "U1").unwrap();
        assert_eq!(items[0].title.as_deref(), Some("Dunes"));
        let meta = items[0].item_meta();
        assert_eq!(meta.focal_point("hero"), Some(FocalPoint::new(0.25, 0.75)));
        assert_eq!(meta.exif.unwrap().iso, Some(200));
        assert_eq!(meta.extra["rating"], 4);

        assert_eq!(item_version(&db, &item), 1);
        let events = db.outbox_events_for(&item).unwrap();
        assert_eq!(events.last().unwrap().version, 1);
        assert_eq!(events.last().unwrap().payload["title"], "Dunes");
    }

    #[test]
    fn test_update_item_refuses_to_overwrite_broken_meta() {
        let db = test_db();
        let album_id = album(&db, "Broken", false);
        let item = db.add_item_to_album(&album_id, "U1", "b/1.jpg", None).unwrap();
        db.conn
            .execute("UPDATE items SET meta = '{oops' WHERE id = ?", [&item])
            .unwrap();

        let err = db
            .update_item(
                &item,
                "U1",
                ItemUpdate {
                    crop: Some(BTreeMap::new()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let raw: String = db
            .conn
            .query_row("SELECT meta FROM items WHERE id = ?", [&item], |row| row.get(0))
            .unwrap();
        assert_eq!(raw, "{oops");
        assert_eq!(item_version(&db, &item), 0);
    }

    #[test]
    fn test_update_item_title_only_leaves_description() {
        let db = test_db();
        let album_id = album(&db, "Text", false);
        let item = db.add_item_to_album(&album_id, "U1", "t/1.jpg", None).unwrap();
        db.update_item(
            &item,
            "U1",
            ItemUpdate {
                description: Some(Some("first".into())),
                ..Default::default()
            },
        )
        .unwrap();
        db.update_item(
            &item,
            "U1",
            ItemUpdate {
                title: Some(Some("Named".into())),
                ..Default::default()
            },
        )
        .unwrap();
        let items = db.list_album_items(&album_id, "U1").unwrap();
        assert_eq!(items[0].description.as_deref(), Some("first"));
        assert!(db.update_item(&item, "U2", ItemUpdate::default()).is_err());
    }

    #[test]
    fn test_delete_item_is_soft() {
        let db = test_db();
        let album_id = album(&db, "Soft", false);
        let item = db.add_item_to_album(&album_id, "U1", "s/1.jpg", None).unwrap();

        db.delete_item(&item, "U1").unwrap();
        assert!(db.list_album_items(&album_id, "U1").unwrap().is_empty());
        assert_eq!(db.live_item_image_id(&item).unwrap(), None);

        let events = db.outbox_events_for(&item).unwrap();
        assert_eq!(events.last().unwrap().event_type, EventType::Delete);
        assert_eq!(events.last().unwrap().version, 1);

        assert_eq!(db.delete_item(&item, "U1").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_delete_cover_item_republishes_public_album() {
        let db = test_db();
        let album_id = album(&db, "Shown", true);
        let cover = db.add_item_to_album(&album_id, "U1", "c/1.jpg", None).unwrap();
        db.add_item_to_album(&album_id, "U1", "c/2.jpg", None).unwrap();
        let before = db.set_album_cover(&album_id, "U1", Some(&cover)).unwrap();
        let events_before = db.outbox_events_for(&album_id).unwrap().len();

        db.delete_item(&cover, "U1").unwrap();

        let after = db.get_album(&album_id, "U1").unwrap().unwrap();
        assert!(after.cover_item_id.is_none());
        assert_eq!(after.public_version, before.public_version + 1);

        let events = db.outbox_events_for(&album_id).unwrap();
        assert_eq!(events.len(), events_before + 1);
        let last = events.last().unwrap();
        assert_eq!(last.event_type, EventType::Upsert);
        assert_eq!(last.version, after.public_version);
        assert!(last.payload["coverItemId"].is_null());
    }

    #[test]
    fn test_delete_item_in_private_album() {
        let db = test_db();
        let album_id = album(&db, "Hidden", false);
        let cover = db.add_item_to_album(&album_id, "U1", "h/1.jpg", None).unwrap();
        let plain = db.add_item_to_album(&album_id, "U1", "h/2.jpg", None).unwrap();
        db.set_album_cover(&album_id, "U1", Some(&cover)).unwrap();
        let events_before = db.outbox_events_for(&album_id).unwrap().len();

        db.delete_item(&plain, "U1").unwrap();
        assert_eq!(db.get_album(&album_id, "U1").unwrap().unwrap().public_version, 1);

        db.delete_item(&cover, "U1").unwrap();
        let after = db.get_album(&album_id, "U1").unwrap().unwrap();
        assert!(after.cover_item_id.is_none());
        assert_eq!(after.public_version, 2);
        assert_eq!(db.outbox_events_for(&album_id).unwrap().len(), events_before);
    }

    #[test]
    fn test_image_lookups() {
        let db = test_db();
        let private = album(&db, "Private", false);
        let public = album(&db, "Public", true);
        let hidden = db.add_item_to_album(&private, "U1", "h/1.jpg", None).unwrap();
        let shown = db.add_item_to_album(&public, "U1", "cf:abc", None).unwrap();

        assert_eq!(db.item_image_id(&hidden, "U1").unwrap(), "h/1.jpg");
        assert_eq!(db.item_image_id(&hidden, "U2").unwrap_err().status_code(), 404);

        assert!(db.is_item_in_public_album(&shown).unwrap());
        assert!(!db.is_item_in_public_album(&hidden).unwrap());
        assert_eq!(db.public_item_image_id(&shown).unwrap(), "cf:abc");
        assert_eq!(db.public_item_image_id(&hidden).unwrap_err().status_code(), 404);

        db.update_album(
            &public,
            "U1",
            AlbumUpdate {
                is_public: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(db.public_item_image_id(&shown).is_err());
    }

    #[test]
    fn test_item_without_image() {
        let db = test_db();
        let album_id = album(&db, "Bare", false);
        let item = db.add_item_to_album(&album_id, "U1", "x.jpg", None).unwrap();
        db.conn
            .execute("UPDATE items SET image_id = NULL WHERE id = ?", [&item])
            .unwrap();
        let err = db.item_image_id(&item, "U1").unwrap_err();
        assert_eq!(err.to_string(), "Item has no image");
    }

    #[test]
    fn test_replace_item_image_is_guarded() {
        let db = test_db();
        let album_id = album(&db, "Swap", false);
        let item = db.add_item_to_album(&album_id, "U1", "w/1.jpg", None).unwrap();

        assert!(!db.replace_item_image(&item, "w/other.jpg", "cf:new").unwrap());
        assert_eq!(db.outbox_events_for(&item).unwrap().len(), 1);

        assert!(db.replace_item_image(&item, "w/1.jpg", "cf:new").unwrap());
        assert_eq!(db.live_item_image_id(&item).unwrap().as_deref(), Some("cf:new"));
        let events = db.outbox_events_for(&item).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].version, 1);
        assert_eq!(events[1].payload["imageId"], "cf:new");
        assert_eq!(events[1].payload["albumId"], album_id.as_str());

        // A repeat delivery finds the image already replaced.
        assert!(!db.replace_item_image(&item, "w/1.jpg", "cf:new").unwrap());
    }

    #[test]
    fn test_jpeg_extension_check() {
        assert!(is_jpeg("IMG_001.JPG"));
        assert!(is_jpeg("a.b.jpeg"));
        assert!(!is_jpeg("photo.png"));
        assert!(!is_jpeg("jpg"));
    }

    #[test]
    fn test_upload_photo_to_album() {
        let server = MockServer::start();
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path_contains("/dav/")
                .header("Content-Type", "image/jpeg")
                .header_exists("authorization");
            then.status(201);
        });
        let webdav = WebDavClient::new(
            ureq::Agent::new(),
            &server.url("/dav"),
            "nas",
            "secret",
        );

        let db = test_db();
        let album_id = album(&db, "Uploads", false);

        let err = db
            .upload_photo_to_album(&webdav, &album_id, "U1", "shot.png", b"png", None)
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let item = db
            .upload_photo_to_album(&webdav, &album_id, "U1", "shot.jpg", b"not really a jpeg", None)
            .unwrap();
        put.assert();

        let image_id = db.item_image_id(&item, "U1").unwrap();
        assert!(image_id.starts_with(&format!("{}/", album_id)));
        assert!(image_id.ends_with(".jpg"));

        let err = db
            .upload_photo_to_album(&webdav, &album_id, "U2", "shot.jpg", b"x", None)
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
