use gridbase_core::{
    ids::*,
    model::{Base, Cell, CellUpdate, Column, ColumnType, Row, RowPage, Table, TableDetail},
};

use crate::error::StorageError;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// What `create_table` provisions alongside the table itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableSkeleton {
    /// Name:TEXT, Age:NUMBER, Email:TEXT and three rows of empty cells.
    #[default]
    Default,
    Empty,
}

impl TableSkeleton {
    pub const DEFAULT_COLUMNS: [(&'static str, ColumnType); 3] = [
        ("Name", ColumnType::Text),
        ("Age", ColumnType::Number),
        ("Email", ColumnType::Text),
    ];
    pub const DEFAULT_ROWS: usize = 3;
}

/// Server-side grid persistence. Every call is made on behalf of `caller`,
/// who must own the base that transitively contains the target.
pub trait Storage {
    fn create_base(&mut self, owner: OwnerId, name: &str) -> Result<Base, StorageError>;

    fn get_base(&self, caller: OwnerId, base_id: BaseId) -> Result<Base, StorageError>;

    fn create_table(
        &mut self,
        caller: OwnerId,
        base_id: BaseId,
        name: &str,
        skeleton: TableSkeleton,
    ) -> Result<TableDetail, StorageError>;

    /// Ordered by creation time, oldest first.
    fn list_tables(&self, caller: OwnerId, base_id: BaseId) -> Result<Vec<Table>, StorageError>;

    fn delete_table(&mut self, caller: OwnerId, table_id: TableId) -> Result<(), StorageError>;

    fn get_table(&self, caller: OwnerId, table_id: TableId) -> Result<TableDetail, StorageError>;

    /// Ordered by position.
    fn list_columns(&self, caller: OwnerId, table_id: TableId)
    -> Result<Vec<Column>, StorageError>;

    fn create_column(
        &mut self,
        caller: OwnerId,
        table_id: TableId,
        name: &str,
        column_type: Option<ColumnType>,
    ) -> Result<Column, StorageError>;

    fn delete_column(&mut self, caller: OwnerId, column_id: ColumnId) -> Result<(), StorageError>;

    /// `cursor` is the id of the last row of the previous page; `limit`
    /// defaults to [`DEFAULT_PAGE_SIZE`] and must lie in `1..=MAX_PAGE_SIZE`.
    fn list_rows_page(
        &self,
        caller: OwnerId,
        table_id: TableId,
        cursor: Option<RowId>,
        limit: Option<u32>,
    ) -> Result<RowPage, StorageError>;

    fn list_rows(&self, caller: OwnerId, table_id: TableId) -> Result<Vec<Row>, StorageError>;

    fn create_row(&mut self, caller: OwnerId, table_id: TableId) -> Result<Row, StorageError>;

    fn delete_row(&mut self, caller: OwnerId, row_id: RowId) -> Result<(), StorageError>;

    fn upsert_cell(
        &mut self,
        caller: OwnerId,
        row_id: RowId,
        column_id: ColumnId,
        value: &str,
    ) -> Result<Cell, StorageError>;

    /// All updates are authorised and validated before any is written.
    fn batch_upsert_cells(
        &mut self,
        caller: OwnerId,
        updates: &[CellUpdate],
    ) -> Result<Vec<Cell>, StorageError>;
}
