use gridbase_core::{ColumnId, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid value for column {column_id}: {source}")]
    Validation {
        column_id: ColumnId,
        #[source]
        source: CoreError,
    },

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}
