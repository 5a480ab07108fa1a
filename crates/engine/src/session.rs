use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gridbase_core::{
    Cell, Clock, Column, ColumnId, ColumnType, CellUpdate, RowId, RowKey, TableId, TempRowId,
    validate_cell_value,
};

use crate::cache::RowSnapshot;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::WriteToken;
use crate::materialize::ViewRow;
use crate::reaper::ReapReport;
use crate::registry::TempCell;
use crate::store::{
    Action, BeginColumn, BeginPage, BeginRow, ClearIssue, ClearPending, CompletePage,
    ConfirmColumn, ConfirmRow, ConfirmTempValue, DeleteRow, FailPage, GridStore, IngestRows,
    LoadAll, ReadFence, Reap, RecordIssue, RecordPending, RejectTempValue, RemoveColumn,
    RemovedRow, RestoreRow, RestoreTempValue, RevertPending, RollbackColumn, SendTempValue,
    SetColumns, SetTempValue,
};
use crate::transport::GridTransport;

/// Outcome of a single accepted cell edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellWrite {
    /// Held on the temp row until its creation confirms.
    Deferred,
    Confirmed(Cell),
}

/// One cell of a batch save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub row: RowKey,
    pub column_id: ColumnId,
    pub value: String,
}

impl CellEdit {
    pub fn new(row: impl Into<RowKey>, column_id: ColumnId, value: impl Into<String>) -> Self {
        Self {
            row: row.into(),
            column_id,
            value: value.into(),
        }
    }
}

/// How to undo one optimistically applied edit.
#[derive(Debug)]
enum Applied {
    Deferred,
    Temp {
        temp_id: TempRowId,
        column_id: ColumnId,
        target: RowId,
        token: WriteToken,
        previous: Option<TempCell>,
    },
    Real {
        row_id: RowId,
        column_id: ColumnId,
        token: WriteToken,
        snapshot: RowSnapshot,
    },
}

/// The table view's handle on a grid. Every mutation applies locally
/// first, then awaits the server and reconciles by write token.
///
/// Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct TableSession {
    table_id: TableId,
    transport: Arc<dyn GridTransport>,
    store: Arc<Mutex<GridStore>>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl std::fmt::Debug for TableSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSession")
            .field("table_id", &self.table_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TableSession {
    /// Load the column set and the first page. A table that is missing or
    /// not owned by the caller fails here.
    pub async fn open(
        transport: Arc<dyn GridTransport>,
        table_id: TableId,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let config = config.normalized();
        let columns = transport.list_columns(table_id).await?;
        let session = Self {
            table_id,
            transport,
            store: Arc::new(Mutex::new(GridStore::new(table_id))),
            clock,
            config,
        };
        session.dispatch(SetColumns { columns });
        session.load_next_page().await?;
        info!(
            target: "gridbase.engine",
            %table_id,
            rows = session.len(),
            "table session opened"
        );
        Ok(session)
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run an action against the shared store. The lock is released before
    /// this returns, so no guard ever lives across an await.
    pub fn dispatch<A: Action>(&self, action: A) -> A::Output {
        self.store.lock().dispatch(action)
    }

    /// Read-only access to the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&GridStore) -> R) -> R {
        let store = self.store.lock();
        f(&store)
    }

    pub fn columns(&self) -> Vec<Column> {
        self.with_store(|s| s.columns().to_vec())
    }

    pub fn view(&self, search: Option<&str>) -> Vec<ViewRow> {
        self.with_store(|s| s.view(search))
    }

    /// Row for a virtualized list slot.
    pub fn row_at(&self, index: usize, search: Option<&str>) -> Option<ViewRow> {
        self.view(search).into_iter().nth(index)
    }

    pub fn len(&self) -> usize {
        self.with_store(GridStore::loaded_len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_issue(&self, row: &RowKey, column_id: ColumnId) -> Option<String> {
        self.with_store(|s| {
            let key = s.canonical_key(row);
            s.cell_issue(&key, column_id).map(str::to_string)
        })
    }

    pub fn clear_cell_issue(&self, row: &RowKey, column_id: ColumnId) -> bool {
        let row = self.with_store(|s| s.canonical_key(row));
        self.dispatch(ClearIssue { row, column_id })
    }

    /// Add a temp row and persist it in the background.
    pub fn create_row(&self) -> (TempRowId, JoinHandle<Result<RowId, EngineError>>) {
        let temp_id = self.begin_row();
        let session = self.clone();
        let pending = temp_id.clone();
        let handle = tokio::spawn(async move { session.persist_row(&pending).await });
        (temp_id, handle)
    }

    /// Add a temp row without contacting the server.
    pub fn begin_row(&self) -> TempRowId {
        let temp_id = self.dispatch(BeginRow {
            now_ms: self.clock.now_ms(),
        });
        debug!(target: "gridbase.engine", %temp_id, "row started");
        temp_id
    }

    /// Create the server row for `temp_id`, then flush whatever was typed
    /// into it in the meantime. On failure the temp row stays so no input
    /// is lost.
    pub async fn persist_row(&self, temp_id: &TempRowId) -> Result<RowId, EngineError> {
        let row = match self.transport.create_row(self.table_id).await {
            Ok(row) => row,
            Err(e) => {
                warn!(target: "gridbase.engine", %temp_id, error = %e, "row creation failed");
                return Err(e.into());
            }
        };
        let real_id = row.row_id;

        if !self.dispatch(ConfirmRow {
            temp_id: temp_id.clone(),
            row,
        }) {
            // Deleted while the create was in flight: remove the orphan.
            debug!(target: "gridbase.engine", %temp_id, %real_id, "temp row gone, deleting orphan");
            if let Err(e) = self.transport.delete_row(real_id).await {
                warn!(target: "gridbase.engine", %real_id, error = %e, "orphan delete failed");
            }
            return Err(EngineError::RowNotFound(temp_id.to_string()));
        }
        debug!(target: "gridbase.engine", %temp_id, %real_id, "row confirmed");

        self.flush_temp_values(temp_id, real_id).await;
        Ok(real_id)
    }

    async fn flush_temp_values(&self, temp_id: &TempRowId, real_id: RowId) {
        let mut values = self.with_store(|s| s.registry().values(temp_id));
        values.sort_by_key(|(column_id, _)| *column_id);

        for (column_id, TempCell { value, token, .. }) in values {
            // Skipped when a newer edit replaced it; that edit is sent on its own.
            if !self.dispatch(SendTempValue {
                temp_id: temp_id.clone(),
                column_id,
                token,
            }) {
                continue;
            }
            match self.transport.upsert_cell(real_id, column_id, value).await {
                Ok(cell) => {
                    self.dispatch(ConfirmTempValue {
                        temp_id: temp_id.clone(),
                        token,
                        cell,
                    });
                }
                Err(e) => {
                    warn!(
                        target: "gridbase.engine",
                        %temp_id,
                        %column_id,
                        error = %e,
                        "flush of typed value failed"
                    );
                    self.dispatch(RejectTempValue {
                        temp_id: temp_id.clone(),
                        column_id,
                        token,
                    });
                    self.dispatch(RecordIssue {
                        row: RowKey::Temp(temp_id.clone()),
                        column_id,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Set one cell. Applied locally before the request is sent; a failure
    /// rolls back this cell only, and only if no newer edit replaced it.
    pub async fn update_cell(
        &self,
        row: &RowKey,
        column_id: ColumnId,
        value: impl Into<String>,
    ) -> Result<CellWrite, EngineError> {
        let value = value.into();
        let row = self.with_store(|s| s.canonical_key(row));
        self.validate_edit(&row, column_id, &value)?;

        let applied = self.apply_edit(&row, column_id, value.clone())?;
        let target = match &applied {
            Applied::Deferred => {
                debug!(target: "gridbase.engine", %row, %column_id, "edit held until row confirms");
                return Ok(CellWrite::Deferred);
            }
            Applied::Temp { target, .. } => *target,
            Applied::Real { row_id, .. } => *row_id,
        };

        match self.transport.upsert_cell(target, column_id, value).await {
            Ok(cell) => {
                self.confirm_edit(applied, Some(cell.clone()));
                Ok(CellWrite::Confirmed(cell))
            }
            Err(e) => {
                warn!(target: "gridbase.engine", %row, %column_id, error = %e, "cell write failed");
                self.rollback_edit(applied);
                self.dispatch(RecordIssue {
                    row,
                    column_id,
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Save several cells in one request. Every edit is validated before any
    /// is applied; a failed request rolls them all back.
    pub async fn save_cells(&self, edits: Vec<CellEdit>) -> Result<Vec<Cell>, EngineError> {
        let edits: Vec<CellEdit> = self.with_store(|s| {
            edits
                .into_iter()
                .map(|e| CellEdit {
                    row: s.canonical_key(&e.row),
                    ..e
                })
                .collect()
        });
        for edit in &edits {
            self.validate_edit(&edit.row, edit.column_id, &edit.value)?;
        }

        let mut applied = Vec::with_capacity(edits.len());
        let mut updates = Vec::new();
        for edit in &edits {
            let step = match self.apply_edit(&edit.row, edit.column_id, edit.value.clone()) {
                Ok(step) => step,
                Err(e) => {
                    for (_, step) in applied {
                        self.rollback_edit(step);
                    }
                    return Err(e);
                }
            };
            let target = match &step {
                Applied::Deferred => None,
                Applied::Temp { target, .. } => Some(*target),
                Applied::Real { row_id, .. } => Some(*row_id),
            };
            if let Some(row_id) = target {
                updates.push(CellUpdate {
                    row_id,
                    column_id: edit.column_id,
                    value: edit.value.clone(),
                });
            }
            applied.push((edit.row.clone(), step));
        }

        if updates.is_empty() {
            return Ok(Vec::new());
        }

        match self.transport.batch_upsert_cells(updates).await {
            Ok(cells) => {
                for (_, step) in applied {
                    let confirmed = match &step {
                        Applied::Deferred => continue,
                        Applied::Temp { target, column_id, .. } => {
                            find_cell(&cells, *target, *column_id)
                        }
                        Applied::Real { row_id, column_id, .. } => {
                            find_cell(&cells, *row_id, *column_id)
                        }
                    };
                    self.confirm_edit(step, confirmed);
                }
                debug!(target: "gridbase.engine", saved = cells.len(), "batch saved");
                Ok(cells)
            }
            Err(e) => {
                warn!(target: "gridbase.engine", error = %e, "batch save failed");
                for (row, step) in applied {
                    let column_id = match &step {
                        Applied::Deferred => continue,
                        Applied::Temp { column_id, .. } | Applied::Real { column_id, .. } => {
                            *column_id
                        }
                    };
                    self.rollback_edit(step);
                    self.dispatch(RecordIssue {
                        row,
                        column_id,
                        message: e.to_string(),
                    });
                }
                Err(e.into())
            }
        }
    }

    /// Remove a row from the view at once, then from the server. A failed
    /// delete of a persisted row puts it back; a temp row the server never
    /// saw is gone for good.
    pub async fn delete_row(&self, row: &RowKey) -> Result<(), EngineError> {
        let removed = self.dispatch(DeleteRow {
            row: row.clone(),
            now_ms: self.clock.now_ms(),
        });
        let Some(RemovedRow { target, snapshot }) = removed else {
            return Err(EngineError::RowNotFound(row.to_string()));
        };
        let Some(real_id) = target else {
            debug!(target: "gridbase.engine", %row, "temp row discarded");
            return Ok(());
        };

        match self.transport.delete_row(real_id).await {
            Ok(()) => {
                debug!(target: "gridbase.engine", %real_id, "row deleted");
                Ok(())
            }
            Err(e) => {
                warn!(target: "gridbase.engine", %real_id, error = %e, "row delete failed");
                if let Some(snapshot) = snapshot {
                    self.dispatch(RestoreRow { snapshot });
                }
                Err(e.into())
            }
        }
    }

    /// Show the new column immediately, then swap in the server's record.
    pub async fn create_column(
        &self,
        name: impl Into<String>,
        column_type: Option<ColumnType>,
    ) -> Result<Column, EngineError> {
        let name = name.into();
        let draft = self.dispatch(BeginColumn {
            name: name.clone(),
            column_type: column_type.unwrap_or_default(),
        });
        let placeholder_id = draft.placeholder.column_id;

        match self
            .transport
            .create_column(self.table_id, name, column_type)
            .await
        {
            Ok(column) => {
                self.dispatch(ConfirmColumn {
                    placeholder_id,
                    column: column.clone(),
                });
                debug!(target: "gridbase.engine", column_id = %column.column_id, "column created");
                Ok(column)
            }
            Err(e) => {
                warn!(target: "gridbase.engine", error = %e, "column create failed");
                self.dispatch(RollbackColumn { draft });
                Err(e.into())
            }
        }
    }

    pub async fn delete_column(&self, column_id: ColumnId) -> Result<(), EngineError> {
        let known = self.with_store(|s| {
            if s.is_placeholder(column_id) {
                Err(EngineError::ColumnPending(column_id))
            } else if s.column(column_id).is_none() {
                Err(EngineError::ColumnNotFound(column_id.to_string()))
            } else {
                Ok(())
            }
        });
        known?;
        self.transport.delete_column(column_id).await?;
        self.dispatch(RemoveColumn { column_id });
        debug!(target: "gridbase.engine", %column_id, "column deleted");
        Ok(())
    }

    /// Fetch the next page. Returns the number of rows new to the view, or
    /// zero if a fetch is already running or every page is loaded.
    pub async fn load_next_page(&self) -> Result<usize, EngineError> {
        let Some(request) = self.dispatch(BeginPage) else {
            return Ok(0);
        };
        let fence = self.dispatch(ReadFence);
        let page = self
            .transport
            .list_rows_page(self.table_id, request.cursor(), self.config.page_size)
            .await;
        match page {
            Ok(page) => {
                let added = self
                    .dispatch(CompletePage {
                        request,
                        page,
                        fence,
                    })
                    .unwrap_or(0);
                debug!(target: "gridbase.engine", ?request, added, "page loaded");
                Ok(added)
            }
            Err(e) => {
                warn!(target: "gridbase.engine", ?request, error = %e, "page load failed");
                self.dispatch(FailPage { request });
                Err(e.into())
            }
        }
    }

    /// Virtualization hook: fetch more rows once the last visible slot is
    /// within the prefetch threshold of the end. True if a page was loaded.
    pub async fn ensure_loaded(&self, last_visible_index: usize) -> Result<bool, EngineError> {
        let (loaded, done) = self.with_store(|s| {
            let pages = s.pages();
            (s.loaded_len(), pages.is_exhausted() || pages.is_loading())
        });
        if done || last_visible_index + self.config.prefetch_threshold < loaded {
            return Ok(false);
        }
        self.load_next_page().await.map(|_| true)
    }

    /// Re-read the first page. Cells with a write in flight, and rows
    /// written since the read was issued, keep their local state.
    pub async fn refresh(&self) -> Result<usize, EngineError> {
        let fence = self.dispatch(ReadFence);
        let page = self
            .transport
            .list_rows_page(self.table_id, None, self.config.page_size)
            .await?;
        Ok(self.dispatch(IngestRows {
            rows: page.items,
            fence: Some(fence),
        }))
    }

    /// Load every row in one request.
    pub async fn load_all(&self) -> Result<usize, EngineError> {
        let fence = self.dispatch(ReadFence);
        let rows = self.transport.list_rows(self.table_id).await?;
        Ok(self.dispatch(LoadAll { rows, fence }))
    }

    /// Re-read the whole table, columns included, in one request. Picks up
    /// columns added elsewhere; local edits are kept as in [`Self::refresh`].
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let fence = self.dispatch(ReadFence);
        let detail = self.transport.get_table(self.table_id).await?;
        self.dispatch(SetColumns {
            columns: detail.columns,
        });
        let added = self.dispatch(LoadAll {
            rows: detail.rows,
            fence,
        });
        debug!(target: "gridbase.engine", table_id = %self.table_id, added, "table reloaded");
        Ok(added)
    }

    pub fn reap_now(&self) -> ReapReport {
        self.dispatch(Reap {
            now_ms: self.clock.now_ms(),
            config: self.config.reap_config(),
        })
    }

    fn validate_edit(
        &self,
        row: &RowKey,
        column_id: ColumnId,
        value: &str,
    ) -> Result<(), EngineError> {
        let column_type = self.with_store(|s| {
            if s.is_placeholder(column_id) {
                return Err(EngineError::ColumnPending(column_id));
            }
            s.column(column_id)
                .map(|c| c.column_type)
                .ok_or_else(|| EngineError::ColumnNotFound(column_id.to_string()))
        })?;

        if let Err(source) = validate_cell_value(column_type, value) {
            debug!(target: "gridbase.engine", %row, %column_id, "rejected invalid value");
            self.dispatch(RecordIssue {
                row: row.clone(),
                column_id,
                message: source.to_string(),
            });
            return Err(EngineError::Validation {
                row: row.clone(),
                column_id,
                source,
            });
        }
        self.dispatch(ClearIssue {
            row: row.clone(),
            column_id,
        });
        Ok(())
    }

    fn apply_edit(
        &self,
        row: &RowKey,
        column_id: ColumnId,
        value: String,
    ) -> Result<Applied, EngineError> {
        let now_ms = self.clock.now_ms();
        match row {
            RowKey::Temp(temp_id) => {
                let write = self
                    .dispatch(SetTempValue {
                        temp_id: temp_id.clone(),
                        column_id,
                        value,
                        now_ms,
                    })
                    .ok_or_else(|| EngineError::RowNotFound(row.to_string()))?;
                Ok(match write.target {
                    None => Applied::Deferred,
                    Some(target) => Applied::Temp {
                        temp_id: temp_id.clone(),
                        column_id,
                        target,
                        token: write.token,
                        previous: write.previous,
                    },
                })
            }
            RowKey::Real(row_id) => {
                let write = self
                    .dispatch(RecordPending {
                        row_id: *row_id,
                        column_id,
                        value,
                        now_ms,
                    })
                    .ok_or_else(|| EngineError::RowNotFound(row.to_string()))?;
                Ok(Applied::Real {
                    row_id: *row_id,
                    column_id,
                    token: write.token,
                    snapshot: write.snapshot,
                })
            }
        }
    }

    fn confirm_edit(&self, applied: Applied, cell: Option<Cell>) {
        match applied {
            Applied::Deferred => {}
            Applied::Temp { temp_id, token, .. } => {
                if let Some(cell) = cell {
                    self.dispatch(ConfirmTempValue {
                        temp_id,
                        token,
                        cell,
                    });
                }
            }
            Applied::Real {
                row_id,
                column_id,
                token,
                ..
            } => {
                self.dispatch(ClearPending {
                    row_id,
                    column_id,
                    token,
                    confirmed: cell,
                });
            }
        }
    }

    fn rollback_edit(&self, applied: Applied) {
        match applied {
            Applied::Deferred => {}
            Applied::Temp {
                temp_id,
                column_id,
                token,
                previous,
                ..
            } => {
                self.dispatch(RestoreTempValue {
                    temp_id,
                    column_id,
                    previous,
                    token,
                });
            }
            Applied::Real {
                row_id,
                column_id,
                token,
                snapshot,
            } => {
                self.dispatch(RevertPending {
                    row_id,
                    column_id,
                    token,
                    snapshot,
                });
            }
        }
    }
}

fn find_cell(cells: &[Cell], row_id: RowId, column_id: ColumnId) -> Option<Cell> {
    cells
        .iter()
        .find(|c| c.row_id == row_id && c.column_id == column_id)
        .cloned()
}
