use std::collections::{HashMap, HashSet};

use gridbase_core::{Cell, CellId, ColumnId, Row, RowId};

use crate::ledger::WriteToken;

/// State of one row captured before an optimistic mutation.
#[derive(Debug, Clone)]
pub struct RowSnapshot {
    pub row_id: RowId,
    /// None = row was not cached.
    pub previous: Option<Row>,
    pub was_deleting: bool,
}

/// Confirmed server rows as last read, with optimistic edits applied in place.
#[derive(Debug, Clone, Default)]
pub struct RowCache {
    rows: HashMap<RowId, Row>,
    deleting: HashSet<RowId>,
    /// Newest local write applied to each row.
    stamps: HashMap<RowId, WriteToken>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge rows from a read. Rows with a delete in flight are skipped.
    /// Returns how many rows were new to the cache.
    pub fn ingest(&mut self, rows: Vec<Row>) -> usize {
        self.ingest_read(rows, None)
    }

    /// Merge rows from a read issued at `fence`. A row written locally at
    /// or after the fence keeps its cached state: the read may predate
    /// that write.
    pub fn ingest_read(&mut self, rows: Vec<Row>, fence: Option<WriteToken>) -> usize {
        let mut added = 0;
        for row in rows {
            if self.deleting.contains(&row.row_id) {
                continue;
            }
            let newer_local = fence.is_some_and(|fence| {
                self.stamps.get(&row.row_id).is_some_and(|stamp| *stamp >= fence)
            });
            if newer_local && self.rows.contains_key(&row.row_id) {
                continue;
            }
            if self.rows.insert(row.row_id, row).is_none() {
                added += 1;
            }
        }
        added
    }

    pub fn insert(&mut self, row: Row) {
        self.deleting.remove(&row.row_id);
        self.rows.insert(row.row_id, row);
    }

    pub fn get(&self, row_id: RowId) -> Option<&Row> {
        self.rows.get(&row_id)
    }

    pub fn contains(&self, row_id: RowId) -> bool {
        self.rows.contains_key(&row_id)
    }

    pub fn snapshot(&self, row_id: RowId) -> RowSnapshot {
        RowSnapshot {
            row_id,
            previous: self.rows.get(&row_id).cloned(),
            was_deleting: self.deleting.contains(&row_id),
        }
    }

    pub fn restore(&mut self, snapshot: RowSnapshot) {
        let RowSnapshot {
            row_id,
            previous,
            was_deleting,
        } = snapshot;
        match previous {
            Some(row) => {
                self.rows.insert(row_id, row);
            }
            None => {
                self.rows.remove(&row_id);
            }
        }
        if was_deleting {
            self.deleting.insert(row_id);
        } else {
            self.deleting.remove(&row_id);
        }
    }

    /// Overwrite one cell's value. Adds the cell if the row lacks it.
    /// Returns false if the row is not cached.
    pub fn set_cell_value(&mut self, row_id: RowId, column_id: ColumnId, value: &str) -> bool {
        let Some(row) = self.rows.get_mut(&row_id) else {
            return false;
        };
        match row.cells.iter_mut().find(|c| c.column_id == column_id) {
            Some(cell) => cell.value = Some(value.to_string()),
            None => row.cells.push(Cell {
                cell_id: CellId::new(),
                row_id,
                column_id,
                value: Some(value.to_string()),
            }),
        }
        true
    }

    /// Record that the local write `token` touched `row_id`.
    pub fn stamp(&mut self, row_id: RowId, token: WriteToken) {
        let stamp = self.stamps.entry(row_id).or_insert(token);
        *stamp = (*stamp).max(token);
    }

    /// True if a local write newer than `token` has touched the row.
    pub fn written_after(&self, row_id: RowId, token: WriteToken) -> bool {
        self.stamps.get(&row_id).is_some_and(|stamp| *stamp > token)
    }

    /// Write a server-confirmed cell back into its row.
    pub fn apply_cell(&mut self, cell: Cell) -> bool {
        let Some(row) = self.rows.get_mut(&cell.row_id) else {
            return false;
        };
        match row.cells.iter_mut().find(|c| c.column_id == cell.column_id) {
            Some(existing) => *existing = cell,
            None => row.cells.push(cell),
        }
        true
    }

    /// Put back a single cell as it was in `snapshot`, leaving the rest of
    /// the row untouched.
    pub fn restore_cell(&mut self, snapshot: &RowSnapshot, column_id: ColumnId) -> bool {
        let Some(row) = self.rows.get_mut(&snapshot.row_id) else {
            return false;
        };
        let before = snapshot
            .previous
            .as_ref()
            .and_then(|prev| prev.cell(column_id))
            .cloned();
        row.cells.retain(|c| c.column_id != column_id);
        if let Some(cell) = before {
            row.cells.push(cell);
        }
        true
    }

    /// Remove a row and block reads from bringing it back unless a snapshot
    /// taken earlier is restored.
    pub fn remove_for_delete(&mut self, row_id: RowId) -> Option<Row> {
        self.deleting.insert(row_id);
        self.stamps.remove(&row_id);
        self.rows.remove(&row_id)
    }

    pub fn is_deleting(&self, row_id: RowId) -> bool {
        self.deleting.contains(&row_id)
    }

    pub fn remove_column(&mut self, column_id: ColumnId) {
        for row in self.rows.values_mut() {
            row.cells.retain(|c| c.column_id != column_id);
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
