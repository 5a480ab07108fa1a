use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;
use crate::model::ColumnType;

/// Optional `-`, digits with at most one `.`, optional exponent.
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
        .expect("decimal grammar compiles")
});

/// Check that `value` may be stored in a column of `column_type`.
pub fn validate_cell_value(column_type: ColumnType, value: &str) -> Result<(), CoreError> {
    match column_type {
        ColumnType::Text => Ok(()),
        ColumnType::Number => validate_number(value),
    }
}

/// The trimmed value must be empty or a finite decimal.
pub fn validate_number(value: &str) -> Result<(), CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let invalid = || CoreError::InvalidNumber {
        value: value.to_string(),
    };
    if !DECIMAL.is_match(trimmed) {
        return Err(invalid());
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(()),
        _ => Err(invalid()),
    }
}
