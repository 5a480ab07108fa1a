use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use gridbase_core::{
    Cell, CellUpdate, Column, ColumnId, ColumnType, OwnerId, Row, RowId, RowPage, TableDetail,
    TableId,
};
use gridbase_engine::{GridTransport, TransportError, TransportErrorKind};
use gridbase_storage::{SqliteStorage, Storage, StorageError};

use crate::gate::ResponseGate;

/// In-process transport that answers from a shared [`SqliteStorage`] on
/// behalf of one owner.
#[derive(Clone)]
pub struct LocalTransport {
    owner: OwnerId,
    storage: Arc<Mutex<SqliteStorage>>,
    gate: Option<Arc<ResponseGate>>,
    failures: Arc<Mutex<VecDeque<TransportErrorKind>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl LocalTransport {
    pub fn new(owner: OwnerId, storage: Arc<Mutex<SqliteStorage>>) -> Self {
        Self {
            owner,
            storage,
            gate: None,
            failures: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_gate(mut self, gate: Arc<ResponseGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Make the next call fail with `kind` without reaching storage.
    /// Queued failures are consumed one per call.
    pub fn fail_next(&self, kind: TransportErrorKind) {
        self.failures.lock().push_back(kind);
    }

    /// Procedure names in the order they were called.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, procedure: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == procedure).count()
    }

    async fn call<T: Send>(
        &self,
        procedure: &'static str,
        op: impl FnOnce(&mut SqliteStorage, OwnerId) -> Result<T, StorageError> + Send,
    ) -> Result<T, TransportError> {
        self.calls.lock().push(procedure);
        let injected = self.failures.lock().pop_front();

        let result = match injected {
            Some(kind) => Err(injected_error(kind, procedure)),
            None => {
                let mut storage = self.storage.lock();
                op(&mut *storage, self.owner).map_err(to_transport_error)
            }
        };
        debug!(target: "gridbase.harness", procedure, ok = result.is_ok(), "served");

        if let Some(gate) = &self.gate {
            gate.pass(procedure).await;
        }
        result
    }
}

fn injected_error(kind: TransportErrorKind, procedure: &str) -> TransportError {
    let msg = format!("injected failure in {procedure}");
    match kind {
        TransportErrorKind::Forbidden => TransportError::Forbidden(msg),
        TransportErrorKind::NotFound => TransportError::NotFound(msg),
        TransportErrorKind::InvalidInput => TransportError::InvalidInput(msg),
        TransportErrorKind::Validation => TransportError::Validation(msg),
        TransportErrorKind::Network => TransportError::Network(msg),
    }
}

pub fn to_transport_error(err: StorageError) -> TransportError {
    match err {
        StorageError::NotFound(msg) => TransportError::NotFound(msg),
        StorageError::Forbidden(msg) => TransportError::Forbidden(msg),
        StorageError::InvalidInput(msg) => TransportError::InvalidInput(msg),
        e @ StorageError::Validation { .. } => TransportError::Validation(e.to_string()),
        StorageError::Core(e) => TransportError::InvalidInput(e.to_string()),
        e @ (StorageError::Sqlite(_) | StorageError::Serialization(_)) => {
            TransportError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl GridTransport for LocalTransport {
    async fn get_table(&self, table_id: TableId) -> Result<TableDetail, TransportError> {
        self.call("get_table", |s, owner| s.get_table(owner, table_id))
            .await
    }

    async fn list_columns(&self, table_id: TableId) -> Result<Vec<Column>, TransportError> {
        self.call("list_columns", |s, owner| s.list_columns(owner, table_id))
            .await
    }

    async fn list_rows_page(
        &self,
        table_id: TableId,
        cursor: Option<RowId>,
        limit: u32,
    ) -> Result<RowPage, TransportError> {
        self.call("list_rows_page", |s, owner| {
            s.list_rows_page(owner, table_id, cursor, Some(limit))
        })
        .await
    }

    async fn list_rows(&self, table_id: TableId) -> Result<Vec<Row>, TransportError> {
        self.call("list_rows", |s, owner| s.list_rows(owner, table_id))
            .await
    }

    async fn create_row(&self, table_id: TableId) -> Result<Row, TransportError> {
        self.call("create_row", |s, owner| s.create_row(owner, table_id))
            .await
    }

    async fn delete_row(&self, row_id: RowId) -> Result<(), TransportError> {
        self.call("delete_row", |s, owner| s.delete_row(owner, row_id))
            .await
    }

    async fn upsert_cell(
        &self,
        row_id: RowId,
        column_id: ColumnId,
        value: String,
    ) -> Result<Cell, TransportError> {
        self.call("upsert_cell", |s, owner| {
            s.upsert_cell(owner, row_id, column_id, &value)
        })
        .await
    }

    async fn batch_upsert_cells(
        &self,
        updates: Vec<CellUpdate>,
    ) -> Result<Vec<Cell>, TransportError> {
        self.call("batch_upsert_cells", |s, owner| {
            s.batch_upsert_cells(owner, &updates)
        })
        .await
    }

    async fn create_column(
        &self,
        table_id: TableId,
        name: String,
        column_type: Option<ColumnType>,
    ) -> Result<Column, TransportError> {
        self.call("create_column", |s, owner| {
            s.create_column(owner, table_id, &name, column_type)
        })
        .await
    }

    async fn delete_column(&self, column_id: ColumnId) -> Result<(), TransportError> {
        self.call("delete_column", |s, owner| s.delete_column(owner, column_id))
            .await
    }
}
