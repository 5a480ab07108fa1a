use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use gridbase_core::{
    cell_value::validate_cell_value,
    clock::physical_now,
    ids::*,
    model::{Base, Cell, CellUpdate, Column, ColumnType, Row, RowPage, Table, TableDetail},
};

use crate::error::StorageError;
use crate::traits::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Storage, TableSkeleton};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Number of cells stored for a (row, column) pair. Used to check the
    /// one-cell-per-intersection invariant.
    pub fn cell_count(&self, row_id: RowId, column_id: ColumnId) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM grid_cells WHERE row_id = ?1 AND column_id = ?2",
            params![row_id.as_bytes().as_slice(), column_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_column(&self, caller: OwnerId, column_id: ColumnId) -> Result<Column, StorageError> {
        authorize_column(&self.conn, caller, column_id)?;
        load_column(&self.conn, column_id)
    }
}

// ============================================================================
// Ownership checks
// ============================================================================

fn check_owner(owner_bytes: Vec<u8>, caller: OwnerId, what: &str) -> Result<(), StorageError> {
    let owner = OwnerId::from_bytes(to_array::<16>(owner_bytes, "owner_id")?);
    if owner != caller {
        return Err(StorageError::Forbidden(what.to_string()));
    }
    Ok(())
}

fn authorize_base(
    conn: &Connection,
    caller: OwnerId,
    base_id: BaseId,
) -> Result<Base, StorageError> {
    let found: Option<(Vec<u8>, String)> = conn
        .query_row(
            "SELECT owner_id, name FROM bases WHERE base_id = ?1",
            params![base_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (owner_bytes, name) =
        found.ok_or_else(|| StorageError::NotFound(format!("base {base_id}")))?;
    check_owner(owner_bytes, caller, &format!("base {base_id}"))?;
    Ok(Base {
        base_id,
        owner_id: caller,
        name,
    })
}

fn authorize_table(
    conn: &Connection,
    caller: OwnerId,
    table_id: TableId,
) -> Result<(), StorageError> {
    let owner: Option<Vec<u8>> = conn
        .query_row(
            "SELECT b.owner_id FROM grid_tables t JOIN bases b ON b.base_id = t.base_id
             WHERE t.table_id = ?1",
            params![table_id.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    let owner = owner.ok_or_else(|| StorageError::NotFound(format!("table {table_id}")))?;
    check_owner(owner, caller, &format!("table {table_id}"))
}

/// Returns the table the row belongs to.
fn authorize_row(
    conn: &Connection,
    caller: OwnerId,
    row_id: RowId,
) -> Result<TableId, StorageError> {
    let found: Option<(Vec<u8>, Vec<u8>)> = conn
        .query_row(
            "SELECT r.table_id, b.owner_id FROM grid_rows r
             JOIN grid_tables t ON t.table_id = r.table_id
             JOIN bases b ON b.base_id = t.base_id
             WHERE r.row_id = ?1",
            params![row_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (table_bytes, owner) =
        found.ok_or_else(|| StorageError::NotFound(format!("row {row_id}")))?;
    check_owner(owner, caller, &format!("row {row_id}"))?;
    Ok(TableId::from_bytes(to_array::<16>(table_bytes, "table_id")?))
}

/// Returns the column's table and type.
fn authorize_column(
    conn: &Connection,
    caller: OwnerId,
    column_id: ColumnId,
) -> Result<(TableId, ColumnType), StorageError> {
    let found: Option<(Vec<u8>, String, Vec<u8>)> = conn
        .query_row(
            "SELECT c.table_id, c.column_type, b.owner_id FROM grid_columns c
             JOIN grid_tables t ON t.table_id = c.table_id
             JOIN bases b ON b.base_id = t.base_id
             WHERE c.column_id = ?1",
            params![column_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (table_bytes, column_type, owner) =
        found.ok_or_else(|| StorageError::NotFound(format!("column {column_id}")))?;
    check_owner(owner, caller, &format!("column {column_id}"))?;
    Ok((
        TableId::from_bytes(to_array::<16>(table_bytes, "table_id")?),
        ColumnType::parse(&column_type)?,
    ))
}

// ============================================================================
// Readers
// ============================================================================

fn load_table(conn: &Connection, table_id: TableId) -> Result<Table, StorageError> {
    let found: Option<(Vec<u8>, String, i64)> = conn
        .query_row(
            "SELECT base_id, name, created_at FROM grid_tables WHERE table_id = ?1",
            params![table_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (base_bytes, name, created_at) =
        found.ok_or_else(|| StorageError::NotFound(format!("table {table_id}")))?;
    Ok(Table {
        table_id,
        base_id: BaseId::from_bytes(to_array::<16>(base_bytes, "base_id")?),
        name,
        created_at: created_at as u64,
    })
}

fn load_columns(conn: &Connection, table_id: TableId) -> Result<Vec<Column>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT column_id, name, column_type, position FROM grid_columns
         WHERE table_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![table_id.as_bytes().as_slice()], |row| {
        let id_bytes: Vec<u8> = row.get(0)?;
        let name: String = row.get(1)?;
        let column_type: String = row.get(2)?;
        let position: i64 = row.get(3)?;
        Ok((id_bytes, name, column_type, position))
    })?;

    let mut result = Vec::new();
    for row in rows {
        let (id_bytes, name, column_type, position) = row?;
        result.push(Column {
            column_id: ColumnId::from_bytes(to_array::<16>(id_bytes, "column_id")?),
            table_id,
            name,
            column_type: ColumnType::parse(&column_type)?,
            position,
        });
    }
    Ok(result)
}

fn load_column(conn: &Connection, column_id: ColumnId) -> Result<Column, StorageError> {
    let found: Option<(Vec<u8>, String, String, i64)> = conn
        .query_row(
            "SELECT table_id, name, column_type, position FROM grid_columns WHERE column_id = ?1",
            params![column_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;
    let (table_bytes, name, column_type, position) =
        found.ok_or_else(|| StorageError::NotFound(format!("column {column_id}")))?;
    Ok(Column {
        column_id,
        table_id: TableId::from_bytes(to_array::<16>(table_bytes, "table_id")?),
        name,
        column_type: ColumnType::parse(&column_type)?,
        position,
    })
}

/// Cells of a row, in column order.
fn load_cells(conn: &Connection, row_id: RowId) -> Result<Vec<Cell>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT c.cell_id, c.column_id, c.value FROM grid_cells c
         JOIN grid_columns col ON col.column_id = c.column_id
         WHERE c.row_id = ?1 ORDER BY col.position",
    )?;
    let rows = stmt.query_map(params![row_id.as_bytes().as_slice()], |row| {
        let cell_bytes: Vec<u8> = row.get(0)?;
        let column_bytes: Vec<u8> = row.get(1)?;
        let value: Option<String> = row.get(2)?;
        Ok((cell_bytes, column_bytes, value))
    })?;

    let mut result = Vec::new();
    for row in rows {
        let (cell_bytes, column_bytes, value) = row?;
        result.push(Cell {
            cell_id: CellId::from_bytes(to_array::<16>(cell_bytes, "cell_id")?),
            row_id,
            column_id: ColumnId::from_bytes(to_array::<16>(column_bytes, "column_id")?),
            value,
        });
    }
    Ok(result)
}

fn load_row(conn: &Connection, row_id: RowId) -> Result<Row, StorageError> {
    let found: Option<(Vec<u8>, i64)> = conn
        .query_row(
            "SELECT table_id, position FROM grid_rows WHERE row_id = ?1",
            params![row_id.as_bytes().as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (table_bytes, position) =
        found.ok_or_else(|| StorageError::NotFound(format!("row {row_id}")))?;
    Ok(Row {
        row_id,
        table_id: TableId::from_bytes(to_array::<16>(table_bytes, "table_id")?),
        position,
        cells: load_cells(conn, row_id)?,
    })
}

/// Rows with `position > after`, ordered by position. `limit = None` reads
/// to the end.
fn load_rows(
    conn: &Connection,
    table_id: TableId,
    after: Option<i64>,
    limit: Option<u32>,
) -> Result<Vec<Row>, StorageError> {
    let heads: Vec<(Vec<u8>, i64)> = {
        let mut stmt = conn.prepare_cached(
            "SELECT row_id, position FROM grid_rows
             WHERE table_id = ?1 AND position > ?2 ORDER BY position LIMIT ?3",
        )?;
        let heads = stmt
            .query_map(
                params![
                    table_id.as_bytes().as_slice(),
                    after.unwrap_or(i64::MIN),
                    limit.map(i64::from).unwrap_or(-1),
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        heads
    };

    let mut result = Vec::with_capacity(heads.len());
    for (row_bytes, position) in heads {
        let row_id = RowId::from_bytes(to_array::<16>(row_bytes, "row_id")?);
        result.push(Row {
            row_id,
            table_id,
            position,
            cells: load_cells(conn, row_id)?,
        });
    }
    Ok(result)
}

fn load_table_detail(conn: &Connection, table_id: TableId) -> Result<TableDetail, StorageError> {
    Ok(TableDetail {
        table: load_table(conn, table_id)?,
        columns: load_columns(conn, table_id)?,
        rows: load_rows(conn, table_id, None, None)?,
    })
}

// ============================================================================
// Writers
// ============================================================================

#[derive(Clone, Copy)]
enum PositionCounter {
    Column,
    Row,
}

impl PositionCounter {
    fn field(self) -> &'static str {
        match self {
            Self::Column => "next_column_position",
            Self::Row => "next_row_position",
        }
    }
}

/// Take the next position from the table's high-water mark.
fn claim_position(
    conn: &Connection,
    table_id: TableId,
    counter: PositionCounter,
) -> Result<i64, StorageError> {
    let field = counter.field();
    let position: i64 = conn.query_row(
        &format!("SELECT {field} FROM grid_tables WHERE table_id = ?1"),
        params![table_id.as_bytes().as_slice()],
        |row| row.get(0),
    )?;
    conn.execute(
        &format!("UPDATE grid_tables SET {field} = {field} + 1 WHERE table_id = ?1"),
        params![table_id.as_bytes().as_slice()],
    )?;
    Ok(position)
}

fn insert_empty_cell(
    conn: &Connection,
    row_id: RowId,
    column_id: ColumnId,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO grid_cells (cell_id, row_id, column_id, value) VALUES (?1, ?2, ?3, NULL)",
        params![
            CellId::new().as_bytes().as_slice(),
            row_id.as_bytes().as_slice(),
            column_id.as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

/// Append a column and backfill an empty cell for every existing row.
fn insert_column(
    conn: &Connection,
    table_id: TableId,
    name: &str,
    column_type: ColumnType,
) -> Result<Column, StorageError> {
    let column_id = ColumnId::new();
    let position = claim_position(conn, table_id, PositionCounter::Column)?;
    conn.execute(
        "INSERT INTO grid_columns (column_id, table_id, name, column_type, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            column_id.as_bytes().as_slice(),
            table_id.as_bytes().as_slice(),
            name,
            column_type.as_str(),
            position,
        ],
    )?;

    let row_ids: Vec<Vec<u8>> = {
        let mut stmt = conn.prepare_cached("SELECT row_id FROM grid_rows WHERE table_id = ?1")?;
        let ids = stmt
            .query_map(params![table_id.as_bytes().as_slice()], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };
    for row_bytes in row_ids {
        let row_id = RowId::from_bytes(to_array::<16>(row_bytes, "row_id")?);
        insert_empty_cell(conn, row_id, column_id)?;
    }

    Ok(Column {
        column_id,
        table_id,
        name: name.to_string(),
        column_type,
        position,
    })
}

/// Append a row and backfill an empty cell for every existing column.
fn insert_row(conn: &Connection, table_id: TableId) -> Result<RowId, StorageError> {
    let row_id = RowId::new();
    let position = claim_position(conn, table_id, PositionCounter::Row)?;
    conn.execute(
        "INSERT INTO grid_rows (row_id, table_id, position) VALUES (?1, ?2, ?3)",
        params![row_id.as_bytes().as_slice(), table_id.as_bytes().as_slice(), position],
    )?;
    for column in load_columns(conn, table_id)? {
        insert_empty_cell(conn, row_id, column.column_id)?;
    }
    Ok(row_id)
}

/// Authorise and validate one cell write without touching the data.
fn check_cell_write(
    conn: &Connection,
    caller: OwnerId,
    update: &CellUpdate,
) -> Result<(), StorageError> {
    let row_table = authorize_row(conn, caller, update.row_id)?;
    let (column_table, column_type) = authorize_column(conn, caller, update.column_id)?;
    if row_table != column_table {
        return Err(StorageError::InvalidInput(format!(
            "column {} does not belong to the table of row {}",
            update.column_id, update.row_id
        )));
    }
    validate_cell_value(column_type, &update.value).map_err(|source| StorageError::Validation {
        column_id: update.column_id,
        source,
    })
}

/// Create-or-update keyed by the unique (row, column) pair.
fn store_cell(conn: &Connection, update: &CellUpdate) -> Result<Cell, StorageError> {
    conn.execute(
        "INSERT INTO grid_cells (cell_id, row_id, column_id, value) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (row_id, column_id) DO UPDATE SET value = excluded.value",
        params![
            CellId::new().as_bytes().as_slice(),
            update.row_id.as_bytes().as_slice(),
            update.column_id.as_bytes().as_slice(),
            update.value,
        ],
    )?;
    let (cell_bytes, value): (Vec<u8>, Option<String>) = conn.query_row(
        "SELECT cell_id, value FROM grid_cells WHERE row_id = ?1 AND column_id = ?2",
        params![
            update.row_id.as_bytes().as_slice(),
            update.column_id.as_bytes().as_slice(),
        ],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(Cell {
        cell_id: CellId::from_bytes(to_array::<16>(cell_bytes, "cell_id")?),
        row_id: update.row_id,
        column_id: update.column_id,
        value,
    })
}

impl Storage for SqliteStorage {
    fn create_base(&mut self, owner: OwnerId, name: &str) -> Result<Base, StorageError> {
        let base_id = BaseId::new();
        self.conn.execute(
            "INSERT INTO bases (base_id, owner_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                base_id.as_bytes().as_slice(),
                owner.as_bytes().as_slice(),
                name,
                physical_now()? as i64,
            ],
        )?;
        debug!(target: "gridbase.storage", base = %base_id, "base created");
        Ok(Base {
            base_id,
            owner_id: owner,
            name: name.to_string(),
        })
    }

    fn get_base(&self, caller: OwnerId, base_id: BaseId) -> Result<Base, StorageError> {
        authorize_base(&self.conn, caller, base_id)
    }

    fn create_table(
        &mut self,
        caller: OwnerId,
        base_id: BaseId,
        name: &str,
        skeleton: TableSkeleton,
    ) -> Result<TableDetail, StorageError> {
        let tx = self.conn.transaction()?;
        authorize_base(&tx, caller, base_id)?;

        let table_id = TableId::new();
        tx.execute(
            "INSERT INTO grid_tables (table_id, base_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                table_id.as_bytes().as_slice(),
                base_id.as_bytes().as_slice(),
                name,
                physical_now()? as i64,
            ],
        )?;

        if skeleton == TableSkeleton::Default {
            for (column_name, column_type) in TableSkeleton::DEFAULT_COLUMNS {
                insert_column(&tx, table_id, column_name, column_type)?;
            }
            for _ in 0..TableSkeleton::DEFAULT_ROWS {
                insert_row(&tx, table_id)?;
            }
        }

        let detail = load_table_detail(&tx, table_id)?;
        tx.commit()?;
        debug!(target: "gridbase.storage", table = %table_id, ?skeleton, "table created");
        Ok(detail)
    }

    fn list_tables(&self, caller: OwnerId, base_id: BaseId) -> Result<Vec<Table>, StorageError> {
        authorize_base(&self.conn, caller, base_id)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT table_id, name, created_at FROM grid_tables
             WHERE base_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt.query_map(params![base_id.as_bytes().as_slice()], |row| {
            let id_bytes: Vec<u8> = row.get(0)?;
            let name: String = row.get(1)?;
            let created_at: i64 = row.get(2)?;
            Ok((id_bytes, name, created_at))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id_bytes, name, created_at) = row?;
            result.push(Table {
                table_id: TableId::from_bytes(to_array::<16>(id_bytes, "table_id")?),
                base_id,
                name,
                created_at: created_at as u64,
            });
        }
        Ok(result)
    }

    fn delete_table(&mut self, caller: OwnerId, table_id: TableId) -> Result<(), StorageError> {
        authorize_table(&self.conn, caller, table_id)?;
        self.conn.execute(
            "DELETE FROM grid_tables WHERE table_id = ?1",
            params![table_id.as_bytes().as_slice()],
        )?;
        debug!(target: "gridbase.storage", table = %table_id, "table deleted");
        Ok(())
    }

    fn get_table(&self, caller: OwnerId, table_id: TableId) -> Result<TableDetail, StorageError> {
        authorize_table(&self.conn, caller, table_id)?;
        load_table_detail(&self.conn, table_id)
    }

    fn list_columns(
        &self,
        caller: OwnerId,
        table_id: TableId,
    ) -> Result<Vec<Column>, StorageError> {
        authorize_table(&self.conn, caller, table_id)?;
        load_columns(&self.conn, table_id)
    }

    fn create_column(
        &mut self,
        caller: OwnerId,
        table_id: TableId,
        name: &str,
        column_type: Option<ColumnType>,
    ) -> Result<Column, StorageError> {
        let tx = self.conn.transaction()?;
        authorize_table(&tx, caller, table_id)?;
        let column = insert_column(&tx, table_id, name, column_type.unwrap_or_default())?;
        tx.commit()?;
        debug!(
            target: "gridbase.storage",
            column = %column.column_id,
            position = column.position,
            "column created"
        );
        Ok(column)
    }

    fn delete_column(&mut self, caller: OwnerId, column_id: ColumnId) -> Result<(), StorageError> {
        authorize_column(&self.conn, caller, column_id)?;
        // Cells go with the column through ON DELETE CASCADE.
        self.conn.execute(
            "DELETE FROM grid_columns WHERE column_id = ?1",
            params![column_id.as_bytes().as_slice()],
        )?;
        debug!(target: "gridbase.storage", column = %column_id, "column deleted");
        Ok(())
    }

    fn list_rows_page(
        &self,
        caller: OwnerId,
        table_id: TableId,
        cursor: Option<RowId>,
        limit: Option<u32>,
    ) -> Result<RowPage, StorageError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(StorageError::InvalidInput(format!(
                "page limit {limit} outside 1..={MAX_PAGE_SIZE}"
            )));
        }
        authorize_table(&self.conn, caller, table_id)?;

        let after = match cursor {
            None => None,
            Some(cursor) => {
                let position: Option<i64> = self
                    .conn
                    .query_row(
                        "SELECT position FROM grid_rows WHERE row_id = ?1 AND table_id = ?2",
                        params![cursor.as_bytes().as_slice(), table_id.as_bytes().as_slice()],
                        |row| row.get(0),
                    )
                    .optional()?;
                Some(position.ok_or_else(|| {
                    StorageError::NotFound(format!("cursor row {cursor}"))
                })?)
            }
        };

        // One extra row tells us whether another page exists.
        let mut items = load_rows(&self.conn, table_id, after, Some(limit + 1))?;
        let next_cursor = if items.len() > limit as usize {
            items.truncate(limit as usize);
            items.last().map(|row| row.row_id)
        } else {
            None
        };
        Ok(RowPage { items, next_cursor })
    }

    fn list_rows(&self, caller: OwnerId, table_id: TableId) -> Result<Vec<Row>, StorageError> {
        authorize_table(&self.conn, caller, table_id)?;
        load_rows(&self.conn, table_id, None, None)
    }

    fn create_row(&mut self, caller: OwnerId, table_id: TableId) -> Result<Row, StorageError> {
        let tx = self.conn.transaction()?;
        authorize_table(&tx, caller, table_id)?;
        let row_id = insert_row(&tx, table_id)?;
        let row = load_row(&tx, row_id)?;
        tx.commit()?;
        debug!(target: "gridbase.storage", row = %row_id, position = row.position, "row created");
        Ok(row)
    }

    fn delete_row(&mut self, caller: OwnerId, row_id: RowId) -> Result<(), StorageError> {
        authorize_row(&self.conn, caller, row_id)?;
        self.conn.execute(
            "DELETE FROM grid_rows WHERE row_id = ?1",
            params![row_id.as_bytes().as_slice()],
        )?;
        debug!(target: "gridbase.storage", row = %row_id, "row deleted");
        Ok(())
    }

    fn upsert_cell(
        &mut self,
        caller: OwnerId,
        row_id: RowId,
        column_id: ColumnId,
        value: &str,
    ) -> Result<Cell, StorageError> {
        let update = CellUpdate {
            row_id,
            column_id,
            value: value.to_string(),
        };
        let tx = self.conn.transaction()?;
        check_cell_write(&tx, caller, &update)?;
        let cell = store_cell(&tx, &update)?;
        tx.commit()?;
        debug!(target: "gridbase.storage", row = %row_id, column = %column_id, "cell upserted");
        Ok(cell)
    }

    fn batch_upsert_cells(
        &mut self,
        caller: OwnerId,
        updates: &[CellUpdate],
    ) -> Result<Vec<Cell>, StorageError> {
        let tx = self.conn.transaction()?;
        for update in updates {
            check_cell_write(&tx, caller, update)?;
        }
        let mut cells = Vec::with_capacity(updates.len());
        for update in updates {
            cells.push(store_cell(&tx, update)?);
        }
        tx.commit()?;
        debug!(target: "gridbase.storage", count = cells.len(), "cells upserted");
        Ok(cells)
    }
}
