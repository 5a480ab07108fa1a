use serde::Serialize;

use gridbase_core::{Column, ColumnId, Row, RowId, RowKey, TempRowId};

use crate::cache::RowCache;
use crate::ledger::PendingLedger;
use crate::registry::{SpeculativeRegistry, SpeculativeRow};

/// Positions at or above this value belong to rows the server has not
/// placed yet. They sort after every persisted row.
pub const SPECULATIVE_POSITION_FLOOR: i64 = i64::MAX / 2;

/// Where a rendered cell value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellSource {
    Speculative,
    Pending,
    Server,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewCell {
    pub column_id: ColumnId,
    pub value: String,
    pub source: CellSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    /// Rendering identity. Stays the temp id for a confirmed row until the
    /// temp row is retired.
    pub key: RowKey,
    pub real_id: Option<RowId>,
    pub position: i64,
    pub cells: Vec<ViewCell>,
}

impl ViewRow {
    pub fn cell(&self, column_id: ColumnId) -> Option<&ViewCell> {
        self.cells.iter().find(|c| c.column_id == column_id)
    }

    pub fn value(&self, column_id: ColumnId) -> Option<&str> {
        self.cell(column_id).map(|c| c.value.as_str())
    }

    pub fn is_speculative(&self) -> bool {
        self.key.is_temp()
    }
}

pub struct MaterializeInput<'a> {
    pub columns: &'a [Column],
    pub cache: &'a RowCache,
    pub ledger: &'a PendingLedger,
    pub registry: &'a SpeculativeRegistry,
    pub search: Option<&'a str>,
}

/// Single precedence rule for every rendered cell:
/// speculative value, then pending write, then server value, then empty.
pub fn resolve_cell(
    speculative: Option<&str>,
    pending: Option<&str>,
    server: Option<&str>,
) -> (String, CellSource) {
    if let Some(v) = speculative {
        return (v.to_string(), CellSource::Speculative);
    }
    if let Some(v) = pending {
        return (v.to_string(), CellSource::Pending);
    }
    if let Some(v) = server {
        return (v.to_string(), CellSource::Server);
    }
    (String::new(), CellSource::Empty)
}

/// Build the rows the grid renders. One entry per logical row, sorted by
/// position, with the most recent locally known value in every cell.
pub fn materialize(input: MaterializeInput<'_>) -> Vec<ViewRow> {
    let MaterializeInput {
        columns,
        cache,
        ledger,
        registry,
        search,
    } = input;

    let mut out: Vec<ViewRow> = cache
        .rows()
        .filter(|row| !registry.owns_real(row.row_id))
        .map(|row| confirmed_row(row, columns, ledger))
        .collect();

    out.extend(
        registry
            .iter()
            .map(|(temp_id, temp_row)| {
                speculative_row(temp_id, temp_row, columns, cache, registry)
            }),
    );

    out.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.key.cmp(&b.key)));

    match search.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => {
            let needle = query.to_lowercase();
            out.into_iter()
                .filter(|row| {
                    row.cells
                        .iter()
                        .any(|c| c.value.to_lowercase().contains(&needle))
                })
                .collect()
        }
        None => out,
    }
}

fn confirmed_row(row: &Row, columns: &[Column], ledger: &PendingLedger) -> ViewRow {
    let cells = columns
        .iter()
        .map(|column| {
            let (value, source) = resolve_cell(
                None,
                ledger.value(row.row_id, column.column_id),
                row.cell_value(column.column_id),
            );
            ViewCell {
                column_id: column.column_id,
                value,
                source,
            }
        })
        .collect();
    ViewRow {
        key: RowKey::Real(row.row_id),
        real_id: Some(row.row_id),
        position: row.position,
        cells,
    }
}

fn speculative_row(
    temp_id: &TempRowId,
    temp_row: &SpeculativeRow,
    columns: &[Column],
    cache: &RowCache,
    registry: &SpeculativeRegistry,
) -> ViewRow {
    let real_id = registry.resolve_write_target(temp_id);
    let position = real_id
        .and_then(|id| cache.get(id))
        .map(|row| row.position)
        .unwrap_or_else(|| speculative_position(temp_row.ordinal));

    // Server values are ignored here: the temp map is authoritative for
    // every cell until the row is retired.
    let cells = columns
        .iter()
        .map(|column| {
            let (value, source) = resolve_cell(temp_row.value(column.column_id), None, None);
            ViewCell {
                column_id: column.column_id,
                value,
                source,
            }
        })
        .collect();

    ViewRow {
        key: RowKey::Temp(temp_id.clone()),
        real_id,
        position,
        cells,
    }
}

fn speculative_position(ordinal: u64) -> i64 {
    let offset = i64::try_from(ordinal).unwrap_or(i64::MAX - SPECULATIVE_POSITION_FLOOR);
    SPECULATIVE_POSITION_FLOOR.saturating_add(offset)
}
