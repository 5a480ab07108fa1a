use std::collections::HashMap;

use gridbase_core::{ColumnId, RowId};
use serde::{Deserialize, Serialize};

/// Identity of one dispatched write. Issued in dispatch order, so a larger
/// token always belongs to a later edit of the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WriteToken(u64);

impl WriteToken {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub value: String,
    pub token: WriteToken,
    pub recorded_at_ms: u64,
}

/// In-flight writes against confirmed rows. An entry overrides whatever a
/// read returns for its cell until the write that created it resolves.
#[derive(Debug, Clone, Default)]
pub struct PendingLedger {
    pending: HashMap<RowId, HashMap<ColumnId, PendingChange>>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write about to be dispatched. Replaces any older pending
    /// value for the same cell and returns it.
    pub fn record(
        &mut self,
        row_id: RowId,
        column_id: ColumnId,
        value: String,
        token: WriteToken,
        now_ms: u64,
    ) -> Option<PendingChange> {
        self.pending.entry(row_id).or_default().insert(
            column_id,
            PendingChange {
                value,
                token,
                recorded_at_ms: now_ms,
            },
        )
    }

    pub fn get(&self, row_id: RowId, column_id: ColumnId) -> Option<&PendingChange> {
        self.pending.get(&row_id).and_then(|cells| cells.get(&column_id))
    }

    pub fn value(&self, row_id: RowId, column_id: ColumnId) -> Option<&str> {
        self.get(row_id, column_id).map(|c| c.value.as_str())
    }

    /// Whether `token` is still the newest pending write for the cell.
    pub fn is_current(&self, row_id: RowId, column_id: ColumnId, token: WriteToken) -> bool {
        self.get(row_id, column_id).is_some_and(|c| c.token == token)
    }

    /// Remove the entry on confirmation, but only if it still belongs to the
    /// write identified by `token`. A late completion of a superseded write
    /// leaves the newer entry alone.
    pub fn clear(&mut self, row_id: RowId, column_id: ColumnId, token: WriteToken) -> bool {
        self.remove_if(row_id, column_id, |c| c.token == token)
    }

    /// Remove the entry after a failed write, under the same token guard as
    /// [`clear`](Self::clear).
    pub fn revert(&mut self, row_id: RowId, column_id: ColumnId, token: WriteToken) -> bool {
        self.remove_if(row_id, column_id, |c| c.token == token)
    }

    pub fn drop_row(&mut self, row_id: RowId) -> usize {
        self.pending.remove(&row_id).map_or(0, |cells| cells.len())
    }

    pub fn drop_column(&mut self, column_id: ColumnId) -> usize {
        let mut dropped = 0;
        self.pending.retain(|_, cells| {
            if cells.remove(&column_id).is_some() {
                dropped += 1;
            }
            !cells.is_empty()
        });
        dropped
    }

    /// Drop every entry recorded before `cutoff_ms`.
    pub fn expire_older_than(&mut self, cutoff_ms: u64) -> usize {
        let mut dropped = 0;
        self.pending.retain(|_, cells| {
            cells.retain(|_, change| {
                let keep = change.recorded_at_ms >= cutoff_ms;
                if !keep {
                    dropped += 1;
                }
                keep
            });
            !cells.is_empty()
        });
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn remove_if(
        &mut self,
        row_id: RowId,
        column_id: ColumnId,
        pred: impl FnOnce(&PendingChange) -> bool,
    ) -> bool {
        let Some(cells) = self.pending.get_mut(&row_id) else {
            return false;
        };
        if !cells.get(&column_id).is_some_and(pred) {
            return false;
        }
        cells.remove(&column_id);
        if cells.is_empty() {
            self.pending.remove(&row_id);
        }
        true
    }
}
