use async_trait::async_trait;
use thiserror::Error;

use gridbase_core::{
    ids::*,
    model::{Cell, CellUpdate, Column, ColumnType, Row, RowPage, TableDetail},
};

/// Outcome of a failed request. Every procedure fails distinguishably.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The server rejected a cell value it could not validate.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Forbidden,
    NotFound,
    InvalidInput,
    Validation,
    Network,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Forbidden(_) => TransportErrorKind::Forbidden,
            Self::NotFound(_) => TransportErrorKind::NotFound,
            Self::InvalidInput(_) => TransportErrorKind::InvalidInput,
            Self::Validation(_) => TransportErrorKind::Validation,
            Self::Network(_) => TransportErrorKind::Network,
        }
    }
}

/// Request/response procedures the table view consumes. Implementations
/// carry the caller's session; ownership failures surface as `Forbidden`.
#[async_trait]
pub trait GridTransport: Send + Sync {
    async fn get_table(&self, table_id: TableId) -> Result<TableDetail, TransportError>;

    async fn list_columns(&self, table_id: TableId) -> Result<Vec<Column>, TransportError>;

    async fn list_rows_page(
        &self,
        table_id: TableId,
        cursor: Option<RowId>,
        limit: u32,
    ) -> Result<RowPage, TransportError>;

    async fn list_rows(&self, table_id: TableId) -> Result<Vec<Row>, TransportError>;

    async fn create_row(&self, table_id: TableId) -> Result<Row, TransportError>;

    async fn delete_row(&self, row_id: RowId) -> Result<(), TransportError>;

    async fn upsert_cell(
        &self,
        row_id: RowId,
        column_id: ColumnId,
        value: String,
    ) -> Result<Cell, TransportError>;

    async fn batch_upsert_cells(&self, updates: Vec<CellUpdate>)
    -> Result<Vec<Cell>, TransportError>;

    async fn create_column(
        &self,
        table_id: TableId,
        name: String,
        column_type: Option<ColumnType>,
    ) -> Result<Column, TransportError>;

    async fn delete_column(&self, column_id: ColumnId) -> Result<(), TransportError>;
}
