pub mod cache;
pub mod config;
pub mod error;
pub mod ledger;
pub mod materialize;
pub mod pagination;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod store;
pub mod transport;

pub use cache::{RowCache, RowSnapshot};
pub use config::{EngineConfig, ReapConfig};
pub use error::EngineError;
pub use ledger::{PendingChange, PendingLedger, WriteToken};
pub use materialize::{
    CellSource, MaterializeInput, SPECULATIVE_POSITION_FLOOR, ViewCell, ViewRow, materialize,
    resolve_cell,
};
pub use pagination::{PageCursor, PageRequest};
pub use reaper::{ReapReport, ReaperHandle, reap, spawn_reaper};
pub use registry::{Delivery, SpeculativeRegistry, SpeculativeRow, TempCell};
pub use session::{CellEdit, CellWrite, TableSession};
pub use store::{Action, GridStore};
pub use transport::{GridTransport, TransportError, TransportErrorKind};
