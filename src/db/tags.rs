//! Shared tag vocabulary and polymorphic tag references.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::albums::publish_album_change;
use super::guard::{owns, Owned};
use super::items::publish_item_change;
use super::{new_id, now, slugify, Database};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Album,
    Item,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Album => "album",
            EntityType::Item => "item",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "album" => Some(EntityType::Album),
            "item" => Some(EntityType::Item),
            _ => None,
        }
    }
}

impl<'a> Owned<'a> {
    fn tag_target(&self) -> (EntityType, &'a str) {
        match *self {
            Owned::Album(id) => (EntityType::Album, id),
            Owned::Item(id) => (EntityType::Item, id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub kind: Option<String>,
    pub hero_title: Option<String>,
    pub hero_subtitle: Option<String>,
    pub hero_item_id: Option<String>,
}

/// Editable tag fields. Blank hero strings are stored as NULL.
#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub name: String,
    pub slug: Option<String>,
    pub hero_title: Option<String>,
    pub hero_subtitle: Option<String>,
    pub hero_item_id: Option<String>,
}

const TAG_COLUMNS: &str = "t.id, t.name, t.slug, t.kind, t.hero_title, t.hero_subtitle, t.hero_item_id";

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        kind: row.get(3)?,
        hero_title: row.get(4)?,
        hero_subtitle: row.get(5)?,
        hero_item_id: row.get(6)?,
    })
}

/// Matching key for a tag name: trimmed, slugified, `untitled` if empty.
pub fn tag_slug(name: &str) -> String {
    let slug = slugify(name.trim());
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Trimmed, non-empty names with one entry per slug, first spelling wins.
fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.as_ref().trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(tag_slug(n)))
        .collect()
}

fn get_or_create_in(conn: &Connection, name: &str) -> Result<Tag> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Tag name is required"));
    }
    let slug = tag_slug(name);
    conn.execute(
        "INSERT INTO tags (id, name, slug, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(slug) DO NOTHING",
        params![new_id(), name, slug, now()],
    )?;
    let tag = conn.query_row(
        &format!("SELECT {} FROM tags t WHERE t.slug = ?", TAG_COLUMNS),
        [&slug],
        row_to_tag,
    )?;
    Ok(tag)
}

fn tags_for(conn: &Connection, entity_type: EntityType, entity_id: &str) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(&format!(
        r#"
        SELECT {}
        FROM tag_refs tr
        JOIN tags t ON t.id = tr.tag_id
        WHERE tr.entity_type = ? AND tr.entity_id = ?
        ORDER BY t.name ASC
        "#,
        TAG_COLUMNS
    ))?;
    let tags = stmt
        .query_map([entity_type.as_str(), entity_id], row_to_tag)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(tags)
}

fn insert_ref(conn: &Connection, tag_id: &str, entity_type: EntityType, entity_id: &str) -> Result<usize> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tag_refs (tag_id, entity_type, entity_id, created_at) VALUES (?, ?, ?, ?)",
        params![tag_id, entity_type.as_str(), entity_id, now()],
    )?;
    Ok(inserted)
}

/// Publish the tagged entity after its tag set changed. Private albums are
/// not observed downstream, so their tags change silently.
fn publish_entity(conn: &Connection, target: Owned<'_>) -> Result<()> {
    match target {
        Owned::Album(id) => publish_album_change(conn, id)?,
        Owned::Item(id) => publish_item_change(conn, id)?,
    };
    Ok(())
}

fn require_owned(conn: &Connection, target: Owned<'_>, owner_user_id: &str) -> Result<()> {
    if owns(conn, target, owner_user_id)? {
        Ok(())
    } else {
        Err(target.not_found())
    }
}

impl Database {
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tags t ORDER BY t.name ASC", TAG_COLUMNS))?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

    pub fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        let tag = self
            .conn
            .query_row(
                &format!("SELECT {} FROM tags t WHERE t.id = ?", TAG_COLUMNS),
                [id],
                row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    /// Find the tag whose slug matches `name`, creating it if none exists.
    pub fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        get_or_create_in(&self.conn, name)
    }

    /// Rename a tag and edit its hero fields. The slug is re-derived and
    /// suffixed if another tag already uses it.
    pub fn update_tag(&self, id: &str, input: TagUpdate) -> Result<Tag> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(Error::validation("Name is required"));
        }
        let base = tag_slug(blank_to_none(&input.slug).unwrap_or(name));

        self.batch(|conn| {
            let mut candidate = base.clone();
            let mut suffix = 0u32;
            while conn
                .query_row(
                    "SELECT 1 FROM tags WHERE slug = ? AND id != ?",
                    [candidate.as_str(), id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some()
            {
                suffix += 1;
                candidate = format!("{}-{}", base, suffix);
            }

            let changed = conn.execute(
                r#"
                UPDATE tags SET name = ?, slug = ?, hero_title = ?, hero_subtitle = ?, hero_item_id = ?
                WHERE id = ?
                "#,
                params![
                    name,
                    candidate,
                    blank_to_none(&input.hero_title),
                    blank_to_none(&input.hero_subtitle),
                    blank_to_none(&input.hero_item_id),
                    id,
                ],
            )?;
            if changed == 0 {
                return Err(Error::not_found("Tag not found"));
            }
            let tag = conn.query_row(
                &format!("SELECT {} FROM tags t WHERE t.id = ?", TAG_COLUMNS),
                [id],
                row_to_tag,
            )?;
            Ok(tag)
        })
    }

    pub fn tags_for_entity(&self, entity_type: EntityType, entity_id: &str) -> Result<Vec<Tag>> {
        tags_for(&self.conn, entity_type, entity_id)
    }

    /// Tags for many entities at once. Every requested id has an entry.
    pub fn tags_for_entities(
        &self,
        entity_type: EntityType,
        entity_ids: &[String],
    ) -> Result<HashMap<String, Vec<Tag>>> {
        let mut map: HashMap<String, Vec<Tag>> =
            entity_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
        if entity_ids.is_empty() {
            return Ok(map);
        }

        let placeholders = vec!["?"; entity_ids.len()].join(",");
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT tr.entity_id, {}
            FROM tag_refs tr
            JOIN tags t ON t.id = tr.tag_id
            WHERE tr.entity_type = ? AND tr.entity_id IN ({})
            ORDER BY t.name ASC
            "#,
            TAG_COLUMNS, placeholders
        ))?;
        let bindings =
            std::iter::once(entity_type.as_str()).chain(entity_ids.iter().map(String::as_str));
        let rows = stmt
            .query_map(params_from_iter(bindings), |row| {
                let entity_id: String = row.get(0)?;
                let tag = Tag {
                    id: row.get(1)?,
                    name: row.get(2)?,
                    slug: row.get(3)?,
                    kind: row.get(4)?,
                    hero_title: row.get(5)?,
                    hero_subtitle: row.get(6)?,
                    hero_item_id: row.get(7)?,
                };
                Ok((entity_id, tag))
            })?
            .filter_map(|r| r.ok());
        for (entity_id, tag) in rows {
            map.entry(entity_id).or_default().push(tag);
        }
        Ok(map)
    }

    /// Replace the entity's whole tag set.
    pub fn set_tags_for_entity<S: AsRef<str>>(
        &self,
        owner_user_id: &str,
        target: Owned<'_>,
        names: &[S],
    ) -> Result<Vec<Tag>> {
        let names = normalize_names(names);
        let (entity_type, entity_id) = target.tag_target();

        self.batch(|conn| {
            require_owned(conn, target, owner_user_id)?;
            let tags = names
                .iter()
                .map(|name| get_or_create_in(conn, name))
                .collect::<Result<Vec<_>>>()?;

            conn.execute(
                "DELETE FROM tag_refs WHERE entity_type = ? AND entity_id = ?",
                [entity_type.as_str(), entity_id],
            )?;
            for tag in &tags {
                insert_ref(conn, &tag.id, entity_type, entity_id)?;
            }
            publish_entity(conn, target)?;
            Ok(tags)
        })
    }

    /// Attach any tags the entity does not already carry. Returns the full
    /// resulting set.
    pub fn add_tags_to_entity<S: AsRef<str>>(
        &self,
        owner_user_id: &str,
        target: Owned<'_>,
        names: &[S],
    ) -> Result<Vec<Tag>> {
        let names = normalize_names(names);
        let (entity_type, entity_id) = target.tag_target();

        self.batch(|conn| {
            require_owned(conn, target, owner_user_id)?;
            let existing: HashSet<String> = tags_for(conn, entity_type, entity_id)?
                .into_iter()
                .map(|t| t.slug)
                .collect();

            let mut added = 0;
            for name in names.iter().filter(|n| !existing.contains(&tag_slug(n))) {
                let tag = get_or_create_in(conn, name)?;
                added += insert_ref(conn, &tag.id, entity_type, entity_id)?;
            }
            if added > 0 {
                publish_entity(conn, target)?;
            }
            tags_for(conn, entity_type, entity_id)
        })
    }

    pub fn remove_tag_from_entity(
        &self,
        owner_user_id: &str,
        target: Owned<'_>,
        tag_id: &str,
    ) -> Result<()> {
        let (entity_type, entity_id) = target.tag_target();
        self.batch(|conn| {
            require_owned(conn, target, owner_user_id)?;
            let removed = conn.execute(
                "DELETE FROM tag_refs WHERE entity_type = ? AND entity_id = ? AND tag_id = ?",
                [entity_type.as_str(), entity_id, tag_id],
            )?;
            if removed > 0 {
                publish_entity(conn, target)?;
            }
            Ok(())
        })
    }
}
