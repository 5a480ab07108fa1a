pub mod cell_value;
pub mod clock;
pub mod error;
pub mod ids;
pub mod model;

pub use cell_value::validate_cell_value;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use ids::*;
pub use model::*;
