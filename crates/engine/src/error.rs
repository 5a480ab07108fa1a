use gridbase_core::{ColumnId, CoreError, RowKey};
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected locally; the value never reached the network.
    #[error("invalid value for {row}/{column_id}: {source}")]
    Validation {
        row: RowKey,
        column_id: ColumnId,
        #[source]
        source: CoreError,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("row not found: {0}")]
    RowNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column is still being created: {0}")]
    ColumnPending(ColumnId),
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
            || matches!(self, Self::Transport(TransportError::Validation(_)))
    }
}
