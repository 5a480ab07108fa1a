use gridbase_core::RowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    First,
    After(RowId),
}

impl PageRequest {
    pub fn cursor(&self) -> Option<RowId> {
        match self {
            Self::First => None,
            Self::After(id) => Some(*id),
        }
    }
}

/// Forward-only cursor over a table's rows. At most one fetch is in flight,
/// and a boundary is never requested twice.
#[derive(Debug, Clone, Default)]
pub struct PageCursor {
    next: Option<RowId>,
    started: bool,
    exhausted: bool,
    in_flight: Option<PageRequest>,
}

impl PageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next page to fetch. None while a fetch is running or once
    /// every row has been read.
    pub fn begin(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() || self.exhausted {
            return None;
        }
        let request = match (self.started, self.next) {
            (false, _) => PageRequest::First,
            (true, Some(id)) => PageRequest::After(id),
            (true, None) => return None,
        };
        self.in_flight = Some(request);
        Some(request)
    }

    /// Advance past a finished fetch. A completion for a request this cursor
    /// did not issue is ignored.
    pub fn complete(&mut self, request: PageRequest, next_cursor: Option<RowId>) -> bool {
        if self.in_flight != Some(request) {
            return false;
        }
        self.in_flight = None;
        self.started = true;
        self.next = next_cursor;
        self.exhausted = next_cursor.is_none();
        true
    }

    /// Release a failed fetch so the same boundary can be retried.
    pub fn fail(&mut self, request: PageRequest) {
        if self.in_flight == Some(request) {
            self.in_flight = None;
        }
    }

    /// Every row is already loaded by other means.
    pub fn mark_exhausted(&mut self) {
        self.started = true;
        self.exhausted = true;
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
