use std::time::Duration;

use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS lists (
    list_id BLOB PRIMARY KEY CHECK (length(list_id) = 16),
    owner_id BLOB NOT NULL CHECK (length(owner_id) = 16),
    recipe_id BLOB CHECK (recipe_id IS NULL OR length(recipe_id) = 16),
    status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'completed')),
    title TEXT NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0),
    created_at BLOB NOT NULL CHECK (length(created_at) = 12),
    updated_at BLOB NOT NULL CHECK (length(updated_at) = 12)
);
CREATE INDEX IF NOT EXISTS idx_lists_owner ON lists (owner_id, created_at);

CREATE TABLE IF NOT EXISTS items (
    item_id BLOB PRIMARY KEY CHECK (length(item_id) = 16),
    list_id BLOB NOT NULL REFERENCES lists (list_id) ON DELETE CASCADE,
    ingredient_id BLOB NOT NULL CHECK (length(ingredient_id) = 16),
    quantity REAL NOT NULL CHECK (quantity > 0),
    unit TEXT NOT NULL,
    checked INTEGER NOT NULL DEFAULT 0 CHECK (checked IN (0, 1)),
    checked_at BLOB CHECK (checked_at IS NULL OR length(checked_at) = 12),
    version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0),
    position INTEGER NOT NULL,
    created_at BLOB NOT NULL CHECK (length(created_at) = 12),
    updated_at BLOB NOT NULL CHECK (length(updated_at) = 12),
    UNIQUE (list_id, ingredient_id)
);
CREATE INDEX IF NOT EXISTS idx_items_list ON items (list_id, position);
";
