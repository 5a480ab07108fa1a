use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS bases (
    base_id BLOB PRIMARY KEY CHECK (length(base_id) = 16),
    owner_id BLOB NOT NULL CHECK (length(owner_id) = 16),
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bases_owner ON bases (owner_id);

-- next_*_position are high-water marks so positions are never reused.
CREATE TABLE IF NOT EXISTS grid_tables (
    table_id BLOB PRIMARY KEY CHECK (length(table_id) = 16),
    base_id BLOB NOT NULL REFERENCES bases (base_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    next_column_position INTEGER NOT NULL DEFAULT 0,
    next_row_position INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tables_base ON grid_tables (base_id, created_at);

CREATE TABLE IF NOT EXISTS grid_columns (
    column_id BLOB PRIMARY KEY CHECK (length(column_id) = 16),
    table_id BLOB NOT NULL REFERENCES grid_tables (table_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    column_type TEXT NOT NULL CHECK (column_type IN ('TEXT', 'NUMBER')),
    position INTEGER NOT NULL,
    UNIQUE (table_id, position)
);

CREATE TABLE IF NOT EXISTS grid_rows (
    row_id BLOB PRIMARY KEY CHECK (length(row_id) = 16),
    table_id BLOB NOT NULL REFERENCES grid_tables (table_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    UNIQUE (table_id, position)
);

CREATE TABLE IF NOT EXISTS grid_cells (
    cell_id BLOB PRIMARY KEY CHECK (length(cell_id) = 16),
    row_id BLOB NOT NULL REFERENCES grid_rows (row_id) ON DELETE CASCADE,
    column_id BLOB NOT NULL REFERENCES grid_columns (column_id) ON DELETE CASCADE,
    value TEXT,
    UNIQUE (row_id, column_id)
);
CREATE INDEX IF NOT EXISTS idx_cells_column ON grid_cells (column_id);
";
