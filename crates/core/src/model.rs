use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColumnType {
    #[default]
    Text,
    Number,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Number => "NUMBER",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "TEXT" => Ok(Self::Text),
            "NUMBER" => Ok(Self::Number),
            _ => Err(CoreError::InvalidData(format!("unknown column type: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    pub base_id: BaseId,
    pub owner_id: OwnerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub table_id: TableId,
    pub base_id: BaseId,
    pub name: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub column_id: ColumnId,
    pub table_id: TableId,
    pub name: String,
    pub column_type: ColumnType,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: CellId,
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub table_id: TableId,
    pub position: i64,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, column_id: ColumnId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column_id == column_id)
    }

    pub fn cell_value(&self, column_id: ColumnId) -> Option<&str> {
        self.cell(column_id).and_then(|c| c.value.as_deref())
    }
}

/// A table together with its full column and row contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDetail {
    pub table: Table,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

/// One page of rows. `next_cursor` is the id of the last returned row and is
/// only present when at least one further row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowPage {
    pub items: Vec<Row>,
    pub next_cursor: Option<RowId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub value: String,
}
