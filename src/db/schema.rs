pub const SCHEMA: &str = r#"
-- Albums: owner-scoped collections, published when is_public = 1
CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    owner_user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    order_id TEXT,
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    model TEXT,
    lat REAL,
    lng REAL,
    cover_item_id TEXT,
    public_version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    UNIQUE (owner_user_id, slug)
);

CREATE INDEX IF NOT EXISTS idx_albums_owner ON albums(owner_user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_albums_public ON albums(is_public);

-- Items: photos; image_id is a backend-qualified reference
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    owner_user_id TEXT NOT NULL,
    type TEXT NOT NULL,
    image_id TEXT,
    title TEXT,
    description TEXT,
    meta TEXT,              -- JSON: exif, crop focal points, passthrough keys
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_user_id);

-- Album membership and ordering
CREATE TABLE IF NOT EXISTS album_items (
    album_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (album_id, item_id)
);

CREATE INDEX IF NOT EXISTS idx_album_items_item ON album_items(item_id);

CREATE TABLE IF NOT EXISTS album_members (
    user_id TEXT NOT NULL,
    album_id TEXT NOT NULL,
    role TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, album_id)
);

-- Shared tag vocabulary
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    kind TEXT,
    hero_title TEXT,
    hero_subtitle TEXT,
    hero_item_id TEXT,
    created_at TEXT NOT NULL
);

-- Polymorphic tag join: entity_type is 'album' or 'item'
CREATE TABLE IF NOT EXISTS tag_refs (
    tag_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tag_id, entity_type, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_tag_refs_entity ON tag_refs(entity_type, entity_id);

-- Append-only event log for downstream replication
CREATE TABLE IF NOT EXISTS outbox_events (
    id TEXT PRIMARY KEY,
    aggregate_type TEXT NOT NULL,
    aggregate_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    processed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox_events(processed_at, created_at, id);
CREATE INDEX IF NOT EXISTS idx_outbox_aggregate ON outbox_events(aggregate_id);

-- Cloudflare Images copy jobs
CREATE TABLE IF NOT EXISTS cf_images_jobs (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    image_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    available_at TEXT NOT NULL,
    last_error TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cf_images_jobs_due ON cf_images_jobs(status, available_at);
"#;

/// Column additions for databases created before the column existed.
/// Each statement fails harmlessly once applied.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE items ADD COLUMN version INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE tags ADD COLUMN hero_title TEXT",
    "ALTER TABLE tags ADD COLUMN hero_subtitle TEXT",
    "ALTER TABLE tags ADD COLUMN hero_item_id TEXT",
];
