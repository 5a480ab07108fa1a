use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::trace;

use gridbase_core::{
    Cell, Column, ColumnId, ColumnType, Row, RowId, RowKey, RowPage, TableId, TempRowId,
};

use crate::cache::{RowCache, RowSnapshot};
use crate::config::ReapConfig;
use crate::ledger::{PendingLedger, WriteToken};
use crate::materialize::{MaterializeInput, ViewRow, materialize};
use crate::pagination::{PageCursor, PageRequest};
use crate::reaper::{ReapReport, reap};
use crate::registry::{SpeculativeRegistry, TempCell};

/// A state transition of [`GridStore`]. Every change to the store goes
/// through [`GridStore::dispatch`], so any interleaving of async completions
/// can be replayed as a plain sequence of actions.
pub trait Action: fmt::Debug {
    type Output;
    const NAME: &'static str;

    fn apply(self, store: &mut GridStore) -> Self::Output;
}

/// Client-side state of one open table.
#[derive(Debug)]
pub struct GridStore {
    table_id: TableId,
    columns: Vec<Column>,
    placeholder_columns: HashSet<ColumnId>,
    registry: SpeculativeRegistry,
    ledger: PendingLedger,
    cache: RowCache,
    pages: PageCursor,
    cell_issues: HashMap<(RowKey, ColumnId), String>,
    last_local_change_ms: u64,
    next_token: u64,
}

impl GridStore {
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            columns: Vec::new(),
            placeholder_columns: HashSet::new(),
            registry: SpeculativeRegistry::new(),
            ledger: PendingLedger::new(),
            cache: RowCache::new(),
            pages: PageCursor::new(),
            cell_issues: HashMap::new(),
            last_local_change_ms: 0,
            next_token: 1,
        }
    }

    pub fn dispatch<A: Action>(&mut self, action: A) -> A::Output {
        trace!(target: "gridbase.engine", action = A::NAME, ?action, "dispatch");
        action.apply(self)
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, column_id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.column_id == column_id)
    }

    pub fn is_placeholder(&self, column_id: ColumnId) -> bool {
        self.placeholder_columns.contains(&column_id)
    }

    pub fn registry(&self) -> &SpeculativeRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &PendingLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &RowCache {
        &self.cache
    }

    pub fn pages(&self) -> &PageCursor {
        &self.pages
    }

    pub fn last_local_change_ms(&self) -> u64 {
        self.last_local_change_ms
    }

    pub fn cell_issue(&self, row: &RowKey, column_id: ColumnId) -> Option<&str> {
        self.cell_issues
            .get(&(row.clone(), column_id))
            .map(String::as_str)
    }

    /// The row key the grid renders for `row`. A real id owned by a live
    /// temp row resolves to that temp row.
    pub fn canonical_key(&self, row: &RowKey) -> RowKey {
        match row {
            RowKey::Real(real_id) if self.registry.owns_real(*real_id) => self
                .registry
                .temp_for_real(*real_id)
                .map(|temp| RowKey::Temp(temp.clone()))
                .unwrap_or_else(|| row.clone()),
            _ => row.clone(),
        }
    }

    /// Number of logical rows currently loaded, ignoring search.
    pub fn loaded_len(&self) -> usize {
        let hidden = self
            .cache
            .rows()
            .filter(|r| self.registry.owns_real(r.row_id))
            .count();
        self.cache.len() - hidden + self.registry.len()
    }

    pub fn view(&self, search: Option<&str>) -> Vec<ViewRow> {
        materialize(MaterializeInput {
            columns: &self.columns,
            cache: &self.cache,
            ledger: &self.ledger,
            registry: &self.registry,
            search,
        })
    }

    fn issue_token(&mut self) -> WriteToken {
        let token = WriteToken::from_raw(self.next_token);
        self.next_token += 1;
        token
    }

    fn touch(&mut self, now_ms: u64) {
        self.last_local_change_ms = self.last_local_change_ms.max(now_ms);
    }
}

#[derive(Debug)]
pub struct BeginRow {
    pub now_ms: u64,
}

impl Action for BeginRow {
    type Output = TempRowId;
    const NAME: &'static str = "BEGIN_ROW";

    fn apply(self, store: &mut GridStore) -> TempRowId {
        store.touch(self.now_ms);
        store.registry.begin_row(self.now_ms)
    }
}

/// Result of an optimistic write into a temp row.
#[derive(Debug, Clone)]
pub struct TempWrite {
    pub token: WriteToken,
    pub previous: Option<TempCell>,
    /// Server row to send the write to; None until the row is confirmed.
    pub target: Option<RowId>,
}

#[derive(Debug)]
pub struct SetTempValue {
    pub temp_id: TempRowId,
    pub column_id: ColumnId,
    pub value: String,
    pub now_ms: u64,
}

impl Action for SetTempValue {
    type Output = Option<TempWrite>;
    const NAME: &'static str = "SET_TEMP_VALUE";

    fn apply(self, store: &mut GridStore) -> Option<TempWrite> {
        if !store.registry.contains(&self.temp_id) {
            return None;
        }
        let token = store.issue_token();
        store.touch(self.now_ms);
        let previous = store
            .registry
            .set_value(&self.temp_id, self.column_id, self.value, token)?;
        Some(TempWrite {
            token,
            previous,
            target: store.registry.resolve_write_target(&self.temp_id),
        })
    }
}

/// Roll back a failed temp-row write unless a newer write replaced it.
#[derive(Debug)]
pub struct RestoreTempValue {
    pub temp_id: TempRowId,
    pub column_id: ColumnId,
    pub previous: Option<TempCell>,
    pub token: WriteToken,
}

impl Action for RestoreTempValue {
    type Output = bool;
    const NAME: &'static str = "RESTORE_TEMP_VALUE";

    fn apply(self, store: &mut GridStore) -> bool {
        store
            .registry
            .restore_value(&self.temp_id, self.column_id, self.previous, self.token)
    }
}

/// Claim a value typed into a temp row before it was confirmed, so the
/// flush sends it exactly once.
#[derive(Debug)]
pub struct SendTempValue {
    pub temp_id: TempRowId,
    pub column_id: ColumnId,
    pub token: WriteToken,
}

impl Action for SendTempValue {
    /// False when a newer edit replaced the value or it is already sent.
    type Output = bool;
    const NAME: &'static str = "SEND_TEMP_VALUE";

    fn apply(self, store: &mut GridStore) -> bool {
        store
            .registry
            .begin_send(&self.temp_id, self.column_id, self.token)
    }
}

/// A write sent for a mapped temp row succeeded. The server's cell goes into
/// the cache so the row renders correctly once the temp row is retired.
#[derive(Debug)]
pub struct ConfirmTempValue {
    pub temp_id: TempRowId,
    pub token: WriteToken,
    pub cell: Cell,
}

impl Action for ConfirmTempValue {
    /// True if the cell was written into the cache.
    type Output = bool;
    const NAME: &'static str = "CONFIRM_TEMP_VALUE";

    fn apply(self, store: &mut GridStore) -> bool {
        let (row_id, column_id) = (self.cell.row_id, self.cell.column_id);
        let current = store.registry.acknowledge(&self.temp_id, column_id, self.token);
        if !current {
            // Superseded while the temp row lives: its newer value is on the way.
            if store.registry.contains(&self.temp_id) {
                return false;
            }
            // The temp row is gone; the cache is the only place left to
            // record what the server stored, unless something newer is there.
            let newer = store.cache.written_after(row_id, self.token)
                || store.ledger.get(row_id, column_id).is_some()
                || store.column(column_id).is_none();
            if newer {
                return false;
            }
        }
        store.cache.stamp(row_id, self.token);
        store.cache.apply_cell(self.cell)
    }
}

/// The server refused a flushed temp value. The value stays on the temp row,
/// which keeps the row from being retired.
#[derive(Debug)]
pub struct RejectTempValue {
    pub temp_id: TempRowId,
    pub column_id: ColumnId,
    pub token: WriteToken,
}

impl Action for RejectTempValue {
    type Output = bool;
    const NAME: &'static str = "REJECT_TEMP_VALUE";

    fn apply(self, store: &mut GridStore) -> bool {
        store
            .registry
            .reject(&self.temp_id, self.column_id, self.token)
    }
}

#[derive(Debug)]
pub struct ConfirmRow {
    pub temp_id: TempRowId,
    pub row: Row,
}

impl Action for ConfirmRow {
    /// False when the temp row was deleted while its creation was in flight.
    type Output = bool;
    const NAME: &'static str = "CONFIRM_ROW";

    fn apply(self, store: &mut GridStore) -> bool {
        if !store.registry.confirm(&self.temp_id, self.row.row_id) {
            return false;
        }
        store.cache.insert(self.row);
        true
    }
}

/// Result of an optimistic write into a confirmed row.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub token: WriteToken,
    pub snapshot: RowSnapshot,
}

#[derive(Debug)]
pub struct RecordPending {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub value: String,
    pub now_ms: u64,
}

impl Action for RecordPending {
    /// None when the row is not loaded.
    type Output = Option<PendingWrite>;
    const NAME: &'static str = "RECORD_PENDING";

    fn apply(self, store: &mut GridStore) -> Option<PendingWrite> {
        if !store.cache.contains(self.row_id) {
            return None;
        }
        let snapshot = store.cache.snapshot(self.row_id);
        let token = store.issue_token();
        store.touch(self.now_ms);
        store
            .cache
            .set_cell_value(self.row_id, self.column_id, &self.value);
        store.cache.stamp(self.row_id, token);
        store
            .ledger
            .record(self.row_id, self.column_id, self.value, token, self.now_ms);
        Some(PendingWrite { token, snapshot })
    }
}

/// The write identified by `token` succeeded.
#[derive(Debug)]
pub struct ClearPending {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub token: WriteToken,
    pub confirmed: Option<Cell>,
}

impl Action for ClearPending {
    type Output = bool;
    const NAME: &'static str = "CLEAR_PENDING";

    fn apply(self, store: &mut GridStore) -> bool {
        if !store.ledger.is_current(self.row_id, self.column_id, self.token) {
            return false;
        }
        if let Some(cell) = self.confirmed {
            store.cache.apply_cell(cell);
        }
        store.ledger.clear(self.row_id, self.column_id, self.token)
    }
}

/// The write identified by `token` failed. Restores the cell from the
/// snapshot taken before it was applied.
#[derive(Debug)]
pub struct RevertPending {
    pub row_id: RowId,
    pub column_id: ColumnId,
    pub token: WriteToken,
    pub snapshot: RowSnapshot,
}

impl Action for RevertPending {
    type Output = bool;
    const NAME: &'static str = "REVERT_PENDING";

    fn apply(self, store: &mut GridStore) -> bool {
        if !store.ledger.is_current(self.row_id, self.column_id, self.token) {
            return false;
        }
        store.cache.restore_cell(&self.snapshot, self.column_id);
        store.ledger.revert(self.row_id, self.column_id, self.token)
    }
}

#[derive(Debug, Clone)]
pub struct RemovedRow {
    /// Server row the delete must be sent to; None for a temp row the server
    /// never saw.
    pub target: Option<RowId>,
    pub snapshot: Option<RowSnapshot>,
}

#[derive(Debug)]
pub struct DeleteRow {
    pub row: RowKey,
    pub now_ms: u64,
}

impl Action for DeleteRow {
    /// None when nothing by that key is loaded.
    type Output = Option<RemovedRow>;
    const NAME: &'static str = "DELETE_ROW";

    fn apply(self, store: &mut GridStore) -> Option<RemovedRow> {
        let target = match &self.row {
            RowKey::Temp(temp_id) => {
                if !store.registry.contains(temp_id) {
                    return None;
                }
                store.registry.delete(temp_id)
            }
            RowKey::Real(real_id) => {
                let owned = store.registry.delete_by_real(*real_id).is_some();
                if !owned && !store.cache.contains(*real_id) {
                    return None;
                }
                Some(*real_id)
            }
        };
        store.touch(self.now_ms);
        store.cell_issues.retain(|(key, _), _| key != &self.row);

        let snapshot = target.map(|real_id| {
            let snapshot = store.cache.snapshot(real_id);
            store.cache.remove_for_delete(real_id);
            store.ledger.drop_row(real_id);
            store.cell_issues.retain(|(key, _), _| key.as_real() != Some(real_id));
            snapshot
        });
        Some(RemovedRow { target, snapshot })
    }
}

/// Put a row back after its delete failed.
#[derive(Debug)]
pub struct RestoreRow {
    pub snapshot: RowSnapshot,
}

impl Action for RestoreRow {
    type Output = ();
    const NAME: &'static str = "RESTORE_ROW";

    fn apply(self, store: &mut GridStore) {
        store.cache.restore(self.snapshot);
    }
}

/// Mark the start of a read. Rows written locally from here on are not
/// overwritten when the read lands.
#[derive(Debug)]
pub struct ReadFence;

impl Action for ReadFence {
    type Output = WriteToken;
    const NAME: &'static str = "READ_FENCE";

    fn apply(self, store: &mut GridStore) -> WriteToken {
        WriteToken::from_raw(store.next_token)
    }
}

#[derive(Debug)]
pub struct IngestRows {
    pub rows: Vec<Row>,
    pub fence: Option<WriteToken>,
}

impl Action for IngestRows {
    type Output = usize;
    const NAME: &'static str = "INGEST_ROWS";

    fn apply(self, store: &mut GridStore) -> usize {
        store.cache.ingest_read(self.rows, self.fence)
    }
}

#[derive(Debug)]
pub struct BeginPage;

impl Action for BeginPage {
    type Output = Option<PageRequest>;
    const NAME: &'static str = "BEGIN_PAGE";

    fn apply(self, store: &mut GridStore) -> Option<PageRequest> {
        store.pages.begin()
    }
}

#[derive(Debug)]
pub struct CompletePage {
    pub request: PageRequest,
    pub page: RowPage,
    pub fence: WriteToken,
}

impl Action for CompletePage {
    /// Rows new to the cache, or None if the cursor did not issue `request`.
    type Output = Option<usize>;
    const NAME: &'static str = "COMPLETE_PAGE";

    fn apply(self, store: &mut GridStore) -> Option<usize> {
        let RowPage { items, next_cursor } = self.page;
        if !store.pages.complete(self.request, next_cursor) {
            return None;
        }
        Some(store.cache.ingest_read(items, Some(self.fence)))
    }
}

#[derive(Debug)]
pub struct FailPage {
    pub request: PageRequest,
}

impl Action for FailPage {
    type Output = ();
    const NAME: &'static str = "FAIL_PAGE";

    fn apply(self, store: &mut GridStore) {
        store.pages.fail(self.request);
    }
}

/// Every row was read in one request; no further pages are needed.
#[derive(Debug)]
pub struct LoadAll {
    pub rows: Vec<Row>,
    pub fence: WriteToken,
}

impl Action for LoadAll {
    type Output = usize;
    const NAME: &'static str = "LOAD_ALL";

    fn apply(self, store: &mut GridStore) -> usize {
        store.pages.mark_exhausted();
        store.cache.ingest_read(self.rows, Some(self.fence))
    }
}

#[derive(Debug)]
pub struct SetColumns {
    pub columns: Vec<Column>,
}

impl Action for SetColumns {
    type Output = ();
    const NAME: &'static str = "SET_COLUMNS";

    fn apply(self, store: &mut GridStore) {
        let mut columns = self.columns;
        // Columns still being created are not on the server yet.
        let placeholders = &store.placeholder_columns;
        columns.extend(
            store
                .columns
                .drain(..)
                .filter(|c| placeholders.contains(&c.column_id)),
        );
        columns.sort_by_key(|c| c.position);
        store.columns = columns;
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDraft {
    pub placeholder: Column,
    pub previous: Vec<Column>,
}

/// Show a column before the server has created it.
#[derive(Debug)]
pub struct BeginColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl Action for BeginColumn {
    type Output = ColumnDraft;
    const NAME: &'static str = "BEGIN_COLUMN";

    fn apply(self, store: &mut GridStore) -> ColumnDraft {
        let previous = store.columns.clone();
        let position = store
            .columns
            .iter()
            .map(|c| c.position + 1)
            .max()
            .unwrap_or(0);
        let placeholder = Column {
            column_id: ColumnId::new(),
            table_id: store.table_id,
            name: self.name,
            column_type: self.column_type,
            position,
        };
        store.placeholder_columns.insert(placeholder.column_id);
        store.columns.push(placeholder.clone());
        ColumnDraft {
            placeholder,
            previous,
        }
    }
}

/// Swap a placeholder for the column the server created.
#[derive(Debug)]
pub struct ConfirmColumn {
    pub placeholder_id: ColumnId,
    pub column: Column,
}

impl Action for ConfirmColumn {
    type Output = bool;
    const NAME: &'static str = "CONFIRM_COLUMN";

    fn apply(self, store: &mut GridStore) -> bool {
        if !store.placeholder_columns.remove(&self.placeholder_id) {
            return false;
        }
        match store
            .columns
            .iter_mut()
            .find(|c| c.column_id == self.placeholder_id)
        {
            Some(slot) => *slot = self.column,
            None => store.columns.push(self.column),
        }
        store.columns.sort_by_key(|c| c.position);
        true
    }
}

/// Column creation failed: go back to the column set seen before it began.
/// Columns confirmed in the meantime are kept.
#[derive(Debug)]
pub struct RollbackColumn {
    pub draft: ColumnDraft,
}

impl Action for RollbackColumn {
    type Output = ();
    const NAME: &'static str = "ROLLBACK_COLUMN";

    fn apply(self, store: &mut GridStore) {
        let placeholder_id = self.draft.placeholder.column_id;
        store.placeholder_columns.remove(&placeholder_id);
        let known: HashSet<ColumnId> = self.draft.previous.iter().map(|c| c.column_id).collect();
        let mut restored = self.draft.previous;
        restored.extend(
            store
                .columns
                .drain(..)
                .filter(|c| c.column_id != placeholder_id && !known.contains(&c.column_id)),
        );
        restored.sort_by_key(|c| c.position);
        store.columns = restored;
    }
}

/// Purge a deleted column from every local store.
#[derive(Debug)]
pub struct RemoveColumn {
    pub column_id: ColumnId,
}

impl Action for RemoveColumn {
    type Output = ();
    const NAME: &'static str = "REMOVE_COLUMN";

    fn apply(self, store: &mut GridStore) {
        let column_id = self.column_id;
        store.columns.retain(|c| c.column_id != column_id);
        store.placeholder_columns.remove(&column_id);
        store.cache.remove_column(column_id);
        store.ledger.drop_column(column_id);
        store.registry.remove_column(column_id);
        store.cell_issues.retain(|(_, col), _| *col != column_id);
    }
}

#[derive(Debug)]
pub struct Reap {
    pub now_ms: u64,
    pub config: ReapConfig,
}

impl Action for Reap {
    type Output = ReapReport;
    const NAME: &'static str = "REAP";

    fn apply(self, store: &mut GridStore) -> ReapReport {
        let registry = std::mem::take(&mut store.registry);
        let ledger = std::mem::take(&mut store.ledger);
        let (registry, ledger, report) = reap(
            registry,
            ledger,
            store.last_local_change_ms,
            self.now_ms,
            &self.config,
        );
        store.registry = registry;
        store.ledger = ledger;
        for temp_id in &report.retired {
            let key = RowKey::Temp(temp_id.clone());
            store.cell_issues.retain(|(row, _), _| row != &key);
        }
        report
    }
}

#[derive(Debug)]
pub struct RecordIssue {
    pub row: RowKey,
    pub column_id: ColumnId,
    pub message: String,
}

impl Action for RecordIssue {
    type Output = ();
    const NAME: &'static str = "RECORD_ISSUE";

    fn apply(self, store: &mut GridStore) {
        store
            .cell_issues
            .insert((self.row, self.column_id), self.message);
    }
}

#[derive(Debug)]
pub struct ClearIssue {
    pub row: RowKey,
    pub column_id: ColumnId,
}

impl Action for ClearIssue {
    type Output = bool;
    const NAME: &'static str = "CLEAR_ISSUE";

    fn apply(self, store: &mut GridStore) -> bool {
        store
            .cell_issues
            .remove(&(self.row, self.column_id))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use gridbase_core::CellId;

    use super::*;

    fn column(table_id: TableId, position: i64) -> Column {
        Column {
            column_id: ColumnId::new(),
            table_id,
            name: format!("c{position}"),
            column_type: ColumnType::Text,
            position,
        }
    }

    fn store_with_row(value: &str) -> (GridStore, RowId, ColumnId) {
        let table_id = TableId::new();
        let mut store = GridStore::new(table_id);
        let col = column(table_id, 0);
        let column_id = col.column_id;
        store.dispatch(SetColumns { columns: vec![col] });
        let row_id = RowId::new();
        store.dispatch(IngestRows {
            rows: vec![Row {
                row_id,
                table_id,
                position: 0,
                cells: vec![cell(row_id, column_id, value)],
            }],
            fence: None,
        });
        (store, row_id, column_id)
    }

    fn cell(row_id: RowId, column_id: ColumnId, value: &str) -> Cell {
        Cell {
            cell_id: CellId::new(),
            row_id,
            column_id,
            value: Some(value.to_string()),
        }
    }

    fn rendered(store: &GridStore, column_id: ColumnId) -> Vec<String> {
        store
            .view(None)
            .iter()
            .map(|r| r.value(column_id).unwrap_or_default().to_string())
            .collect()
    }

    fn stale_row(row_id: RowId, table_id: TableId, column_id: ColumnId, value: &str) -> Row {
        Row {
            row_id,
            table_id,
            position: 0,
            cells: vec![cell(row_id, column_id, value)],
        }
    }

    #[test]
    fn double_edit_with_late_first_completion() {
        let (mut store, row, col) = store_with_row("old");
        let first = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "foo".into(),
                now_ms: 1,
            })
            .unwrap();
        let second = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "bar".into(),
                now_ms: 2,
            })
            .unwrap();

        assert!(store.dispatch(ClearPending {
            row_id: row,
            column_id: col,
            token: second.token,
            confirmed: Some(cell(row, col, "bar")),
        }));
        assert!(!store.dispatch(ClearPending {
            row_id: row,
            column_id: col,
            token: first.token,
            confirmed: Some(cell(row, col, "foo")),
        }));
        assert_eq!(rendered(&store, col), vec!["bar"]);
    }

    #[test]
    fn stale_read_during_flight_is_masked() {
        let (mut store, row, col) = store_with_row("old");
        let table_id = store.table_id();
        let first = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "foo".into(),
                now_ms: 1,
            })
            .unwrap();
        let second = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "bar".into(),
                now_ms: 2,
            })
            .unwrap();

        // First write confirms, then a refetch returns what the server had then.
        store.dispatch(ClearPending {
            row_id: row,
            column_id: col,
            token: first.token,
            confirmed: Some(cell(row, col, "foo")),
        });
        store.dispatch(IngestRows {
            rows: vec![stale_row(row, table_id, col, "foo")],
            fence: None,
        });
        assert_eq!(rendered(&store, col), vec!["bar"]);

        store.dispatch(ClearPending {
            row_id: row,
            column_id: col,
            token: second.token,
            confirmed: Some(cell(row, col, "bar")),
        });
        assert_eq!(rendered(&store, col), vec!["bar"]);
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn read_issued_before_a_confirmed_write_is_fenced() {
        let (mut store, row, col) = store_with_row("old");
        let table_id = store.table_id();
        let fence = store.dispatch(ReadFence);
        let write = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "new".into(),
                now_ms: 1,
            })
            .unwrap();
        store.dispatch(ClearPending {
            row_id: row,
            column_id: col,
            token: write.token,
            confirmed: Some(cell(row, col, "new")),
        });
        assert!(store.ledger().is_empty());

        store.dispatch(IngestRows {
            rows: vec![stale_row(row, table_id, col, "old")],
            fence: Some(fence),
        });
        assert_eq!(rendered(&store, col), vec!["new"]);

        // A read issued after the write is trusted.
        let fence = store.dispatch(ReadFence);
        store.dispatch(IngestRows {
            rows: vec![stale_row(row, table_id, col, "server")],
            fence: Some(fence),
        });
        assert_eq!(rendered(&store, col), vec!["server"]);
    }

    #[test]
    fn failed_write_rolls_back_only_when_current() {
        let (mut store, row, col) = store_with_row("old");
        let first = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "foo".into(),
                now_ms: 1,
            })
            .unwrap();
        let second = store
            .dispatch(RecordPending {
                row_id: row,
                column_id: col,
                value: "bar".into(),
                now_ms: 2,
            })
            .unwrap();

        assert!(!store.dispatch(RevertPending {
            row_id: row,
            column_id: col,
            token: first.token,
            snapshot: first.snapshot,
        }));
        assert_eq!(rendered(&store, col), vec!["bar"]);

        assert!(store.dispatch(RevertPending {
            row_id: row,
            column_id: col,
            token: second.token,
            snapshot: second.snapshot,
        }));
        assert_eq!(rendered(&store, col), vec!["foo"]);
    }

    #[test]
    fn temp_row_lifecycle_through_reap() {
        let (mut store, _, col) = store_with_row("x");
        let table_id = store.table_id();
        let temp = store.dispatch(BeginRow { now_ms: 10 });
        let write = store
            .dispatch(SetTempValue {
                temp_id: temp.clone(),
                column_id: col,
                value: "typed".into(),
                now_ms: 11,
            })
            .unwrap();
        assert!(write.target.is_none());

        let real_id = RowId::new();
        assert!(store.dispatch(ConfirmRow {
            temp_id: temp.clone(),
            row: Row {
                row_id: real_id,
                table_id,
                position: 1,
                cells: vec![cell(real_id, col, "")],
            },
        }));
        assert!(store.dispatch(SendTempValue {
            temp_id: temp.clone(),
            column_id: col,
            token: write.token,
        }));

        // The flush is still out; an idle tick must not retire the row.
        let report = store.dispatch(Reap {
            now_ms: 10_000,
            config: ReapConfig::default(),
        });
        assert!(report.retired.is_empty());

        assert!(store.dispatch(ConfirmTempValue {
            temp_id: temp.clone(),
            token: write.token,
            cell: cell(real_id, col, "typed"),
        }));
        let view = store.view(None);
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].key, RowKey::Temp(temp.clone()));
        assert_eq!(view[1].position, 1);

        let report = store.dispatch(Reap {
            now_ms: 10_000,
            config: ReapConfig::default(),
        });
        assert_eq!(report.retired, vec![temp]);
        let view = store.view(None);
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].key, RowKey::Real(real_id));
        assert_eq!(view[1].value(col), Some("typed"));
    }

    #[test]
    fn late_answer_for_superseded_write_after_retire_is_ignored() {
        let (mut store, _, col) = store_with_row("x");
        let table_id = store.table_id();
        let temp = store.dispatch(BeginRow { now_ms: 0 });
        let real_id = RowId::new();
        store.dispatch(ConfirmRow {
            temp_id: temp.clone(),
            row: Row {
                row_id: real_id,
                table_id,
                position: 1,
                cells: vec![cell(real_id, col, "")],
            },
        });
        let set = |store: &mut GridStore, value: &str| {
            store
                .dispatch(SetTempValue {
                    temp_id: temp.clone(),
                    column_id: col,
                    value: value.into(),
                    now_ms: 1,
                })
                .unwrap()
        };
        let older = set(&mut store, "older");
        let newer = set(&mut store, "newer");
        assert!(newer.target.is_some());

        assert!(store.dispatch(ConfirmTempValue {
            temp_id: temp.clone(),
            token: newer.token,
            cell: cell(real_id, col, "newer"),
        }));
        let report = store.dispatch(Reap {
            now_ms: 10_000,
            config: ReapConfig::default(),
        });
        assert_eq!(report.retired, vec![temp.clone()]);

        assert!(!store.dispatch(ConfirmTempValue {
            temp_id: temp,
            token: older.token,
            cell: cell(real_id, col, "older"),
        }));
        assert_eq!(store.view(None)[1].value(col), Some("newer"));
    }

    #[test]
    fn confirm_after_temp_delete_is_refused() {
        let mut store = GridStore::new(TableId::new());
        let temp = store.dispatch(BeginRow { now_ms: 0 });
        let removed = store
            .dispatch(DeleteRow { row: RowKey::Temp(temp.clone()), now_ms: 1 })
            .unwrap();
        assert!(removed.target.is_none());
        let row_id = RowId::new();
        assert!(!store.dispatch(ConfirmRow {
            temp_id: temp,
            row: Row { row_id, table_id: store.table_id(), position: 0, cells: vec![] },
        }));
        assert!(store.view(None).is_empty());
    }

    #[test]
    fn delete_then_restore_real_row() {
        let (mut store, row, col) = store_with_row("keep");
        let table_id = store.table_id();
        store.dispatch(RecordPending {
            row_id: row,
            column_id: col,
            value: "edit".into(),
            now_ms: 1,
        });
        let removed = store.dispatch(DeleteRow { row: RowKey::Real(row), now_ms: 2 }).unwrap();
        assert_eq!(removed.target, Some(row));
        assert!(store.ledger().is_empty());

        // A page read landing mid-delete does not bring it back.
        store.dispatch(IngestRows {
            rows: vec![stale_row(row, table_id, col, "keep")],
            fence: None,
        });
        assert!(store.view(None).is_empty());

        store.dispatch(RestoreRow { snapshot: removed.snapshot.unwrap() });
        assert_eq!(rendered(&store, col), vec!["edit"]);
    }

    #[test]
    fn column_placeholder_confirm_and_rollback() {
        let (mut store, _, first_col) = store_with_row("x");
        let table_id = store.table_id();
        let draft = store.dispatch(BeginColumn {
            name: "Score".into(),
            column_type: ColumnType::Number,
        });
        assert_eq!(draft.placeholder.position, 1);
        assert!(store.is_placeholder(draft.placeholder.column_id));

        let real = column(table_id, 1);
        assert!(store.dispatch(ConfirmColumn {
            placeholder_id: draft.placeholder.column_id,
            column: real.clone(),
        }));
        assert_eq!(store.columns().len(), 2);
        assert_eq!(store.columns()[1].column_id, real.column_id);

        let failed = store.dispatch(BeginColumn {
            name: "Lost".into(),
            column_type: ColumnType::Text,
        });
        assert_eq!(failed.placeholder.position, 2);
        store.dispatch(RollbackColumn { draft: failed });
        let ids: Vec<_> = store.columns().iter().map(|c| c.column_id).collect();
        assert_eq!(ids, vec![first_col, real.column_id]);
    }

    #[test]
    fn remove_column_purges_every_store() {
        let (mut store, row, col) = store_with_row("x");
        let temp = store.dispatch(BeginRow { now_ms: 0 });
        store.dispatch(SetTempValue {
            temp_id: temp.clone(),
            column_id: col,
            value: "t".into(),
            now_ms: 0,
        });
        store.dispatch(RecordPending {
            row_id: row,
            column_id: col,
            value: "p".into(),
            now_ms: 0,
        });
        store.dispatch(RecordIssue {
            row: RowKey::Real(row),
            column_id: col,
            message: "bad".into(),
        });

        store.dispatch(RemoveColumn { column_id: col });
        assert!(store.columns().is_empty());
        assert!(store.ledger().is_empty());
        assert!(store.registry().get(&temp).unwrap().values.is_empty());
        assert!(store.cache().get(row).unwrap().cells.is_empty());
        assert!(store.cell_issue(&RowKey::Real(row), col).is_none());
    }

    #[test]
    fn canonical_key_prefers_owning_temp_row() {
        let (mut store, row, _) = store_with_row("x");
        let temp = store.dispatch(BeginRow { now_ms: 0 });
        let cached = store.cache().get(row).cloned().unwrap();
        store.dispatch(ConfirmRow { temp_id: temp.clone(), row: cached });
        assert_eq!(store.canonical_key(&RowKey::Real(row)), RowKey::Temp(temp));
        assert_eq!(store.loaded_len(), 1);
    }
}
