use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("not a number: {value:?}")]
    InvalidNumber { value: String },

    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
