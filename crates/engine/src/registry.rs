use std::collections::HashMap;

use gridbase_core::{ColumnId, RowId, TempRowId};

use crate::ledger::WriteToken;

/// How far a temp cell's current value has got towards the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Held until the row is confirmed and the flush picks it up.
    Unsent,
    Sending,
    Acknowledged,
    /// Rejected by the server; the value only exists locally.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempCell {
    pub value: String,
    pub token: WriteToken,
    pub delivery: Delivery,
}

#[derive(Debug, Clone)]
pub struct SpeculativeRow {
    /// Creation order within the session; drives the synthetic position.
    pub ordinal: u64,
    pub created_at_ms: u64,
    pub values: HashMap<ColumnId, TempCell>,
    /// Answers that arrived for writes already superseded, so a rollback
    /// to one of them restores its true delivery state.
    answered: HashMap<WriteToken, Delivery>,
}

impl SpeculativeRow {
    pub fn value(&self, column_id: ColumnId) -> Option<&str> {
        self.values.get(&column_id).map(|c| c.value.as_str())
    }

    /// True once the server holds every value typed into the row.
    pub fn is_settled(&self) -> bool {
        self.values
            .values()
            .all(|c| c.delivery == Delivery::Acknowledged)
    }

    /// Record the server's answer for `token`. Returns true if it was the
    /// write behind the current value.
    fn answer(&mut self, column_id: ColumnId, token: WriteToken, delivery: Delivery) -> bool {
        match self.values.get_mut(&column_id) {
            Some(cell) if cell.token == token => {
                cell.delivery = delivery;
                true
            }
            _ => {
                self.answered.insert(token, delivery);
                false
            }
        }
    }
}

/// Client-only rows and their association with server rows once confirmed.
///
/// A confirmed temp row keeps its entry: the temp id stays the rendering
/// identity until it is retired or deleted, so edits keyed by it keep
/// resolving.
#[derive(Debug, Clone, Default)]
pub struct SpeculativeRegistry {
    temp_rows: HashMap<TempRowId, SpeculativeRow>,
    temp_to_real: HashMap<TempRowId, RowId>,
    next_ordinal: u64,
}

impl SpeculativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_row(&mut self, now_ms: u64) -> TempRowId {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let temp_id = TempRowId::generate(now_ms, ordinal);
        self.temp_rows.insert(
            temp_id.clone(),
            SpeculativeRow {
                ordinal,
                created_at_ms: now_ms,
                values: HashMap::new(),
                answered: HashMap::new(),
            },
        );
        temp_id
    }

    /// Record `temp → real`. Returns false if the temp row was deleted while
    /// its creation was in flight.
    pub fn confirm(&mut self, temp_id: &TempRowId, real_id: RowId) -> bool {
        if !self.temp_rows.contains_key(temp_id) {
            return false;
        }
        self.temp_to_real.insert(temp_id.clone(), real_id);
        true
    }

    /// Upsert a value and return the one it replaced. On a confirmed row the
    /// caller sends the write at once, so it starts out `Sending`.
    pub fn set_value(
        &mut self,
        temp_id: &TempRowId,
        column_id: ColumnId,
        value: String,
        token: WriteToken,
    ) -> Option<Option<TempCell>> {
        let delivery = if self.temp_to_real.contains_key(temp_id) {
            Delivery::Sending
        } else {
            Delivery::Unsent
        };
        let row = self.temp_rows.get_mut(temp_id)?;
        let cell = TempCell {
            value,
            token,
            delivery,
        };
        Some(row.values.insert(column_id, cell))
    }

    /// Claim an unsent value for the flush. False if it was replaced or is
    /// already on its way.
    pub fn begin_send(
        &mut self,
        temp_id: &TempRowId,
        column_id: ColumnId,
        token: WriteToken,
    ) -> bool {
        let Some(cell) = self
            .temp_rows
            .get_mut(temp_id)
            .and_then(|row| row.values.get_mut(&column_id))
        else {
            return false;
        };
        if cell.token != token || cell.delivery != Delivery::Unsent {
            return false;
        }
        cell.delivery = Delivery::Sending;
        true
    }

    /// The server stored the write identified by `token`. True if it
    /// produced the cell's current value.
    pub fn acknowledge(
        &mut self,
        temp_id: &TempRowId,
        column_id: ColumnId,
        token: WriteToken,
    ) -> bool {
        self.temp_rows
            .get_mut(temp_id)
            .is_some_and(|row| row.answer(column_id, token, Delivery::Acknowledged))
    }

    /// The server refused a flushed value. It stays visible on the temp row.
    pub fn reject(&mut self, temp_id: &TempRowId, column_id: ColumnId, token: WriteToken) -> bool {
        self.temp_rows
            .get_mut(temp_id)
            .is_some_and(|row| row.answer(column_id, token, Delivery::Failed))
    }

    /// Undo the write identified by `token`, unless a later write replaced it.
    pub fn restore_value(
        &mut self,
        temp_id: &TempRowId,
        column_id: ColumnId,
        previous: Option<TempCell>,
        token: WriteToken,
    ) -> bool {
        let Some(row) = self.temp_rows.get_mut(temp_id) else {
            return false;
        };
        if row.values.get(&column_id).is_none_or(|c| c.token != token) {
            row.answered.insert(token, Delivery::Failed);
            return false;
        }
        match previous {
            Some(mut cell) => {
                if let Some(delivery) = row.answered.remove(&cell.token) {
                    cell.delivery = delivery;
                }
                row.values.insert(column_id, cell);
            }
            None => {
                row.values.remove(&column_id);
            }
        }
        true
    }

    /// The server row a write against `temp_id` should target, if confirmed.
    pub fn resolve_write_target(&self, temp_id: &TempRowId) -> Option<RowId> {
        self.temp_to_real.get(temp_id).copied()
    }

    pub fn temp_for_real(&self, real_id: RowId) -> Option<&TempRowId> {
        self.temp_to_real
            .iter()
            .find(|(_, real)| **real == real_id)
            .map(|(temp, _)| temp)
    }

    /// True while a live temp row owns `real_id`'s identity.
    pub fn owns_real(&self, real_id: RowId) -> bool {
        self.temp_for_real(real_id)
            .is_some_and(|temp| self.temp_rows.contains_key(temp))
    }

    pub fn get(&self, temp_id: &TempRowId) -> Option<&SpeculativeRow> {
        self.temp_rows.get(temp_id)
    }

    pub fn contains(&self, temp_id: &TempRowId) -> bool {
        self.temp_rows.contains_key(temp_id)
    }

    /// Current values of a temp row, detached from the registry.
    pub fn values(&self, temp_id: &TempRowId) -> Vec<(ColumnId, TempCell)> {
        self.temp_rows
            .get(temp_id)
            .map(|row| {
                row.values
                    .iter()
                    .map(|(column, cell)| (*column, cell.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a temp row and its mapping. Returns the real id it was mapped to.
    pub fn delete(&mut self, temp_id: &TempRowId) -> Option<RowId> {
        self.temp_rows.remove(temp_id);
        self.temp_to_real.remove(temp_id)
    }

    /// Remove whichever temp row is mapped to `real_id`.
    pub fn delete_by_real(&mut self, real_id: RowId) -> Option<TempRowId> {
        let temp_id = self.temp_for_real(real_id)?.clone();
        self.delete(&temp_id);
        Some(temp_id)
    }

    /// Hand a confirmed row's identity back to the server row. Refused
    /// while any of its values has not reached the server.
    pub fn retire(&mut self, temp_id: &TempRowId) -> bool {
        let settled = self.temp_rows.get(temp_id).is_some_and(SpeculativeRow::is_settled);
        if !settled || !self.temp_to_real.contains_key(temp_id) {
            return false;
        }
        self.delete(temp_id).is_some()
    }

    /// Confirmed temp rows whose values are all stored on the server.
    pub fn settled_temp_rows(&self) -> Vec<TempRowId> {
        self.temp_to_real
            .keys()
            .filter(|temp| self.temp_rows.get(*temp).is_some_and(SpeculativeRow::is_settled))
            .cloned()
            .collect()
    }

    pub fn remove_column(&mut self, column_id: ColumnId) {
        for row in self.temp_rows.values_mut() {
            row.values.remove(&column_id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TempRowId, &SpeculativeRow)> {
        self.temp_rows.iter()
    }

    pub fn len(&self) -> usize {
        self.temp_rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temp_rows.is_empty()
    }
}
