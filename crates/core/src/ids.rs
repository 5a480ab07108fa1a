use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Reserved prefix that marks a client-generated row id.
pub const TEMP_ROW_PREFIX: &str = "temp-";

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn parse_str(s: &str) -> Result<Self, CoreError> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| CoreError::InvalidId(format!("{}: {e}", stringify!($name))))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.0.to_string()[..8])
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(OwnerId);
uuid_id!(BaseId);
uuid_id!(TableId);
uuid_id!(ColumnId);
uuid_id!(RowId);
uuid_id!(CellId);

/// Identifier of a row that exists only on the client.
///
/// Formatted as `temp-<created_ms>-<sequence>`; the prefix can never collide
/// with the hyphenated uuid form used by server ids.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TempRowId(String);

impl TempRowId {
    pub fn generate(created_ms: u64, sequence: u64) -> Self {
        Self(format!("{TEMP_ROW_PREFIX}{created_ms}-{sequence}"))
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.strip_prefix(TEMP_ROW_PREFIX) {
            Some(rest) if !rest.is_empty() => Ok(Self(s.to_string())),
            _ => Err(CoreError::InvalidId(format!("not a temporary row id: {s}"))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TempRowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TempRowId({})", self.0)
    }
}

impl fmt::Display for TempRowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The rendering identity of a row: either a speculative row or a
/// server-confirmed one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RowKey {
    Temp(TempRowId),
    Real(RowId),
}

impl RowKey {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.starts_with(TEMP_ROW_PREFIX) {
            TempRowId::parse(s).map(Self::Temp)
        } else {
            RowId::parse_str(s).map(Self::Real)
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_temp(&self) -> Option<&TempRowId> {
        match self {
            Self::Temp(id) => Some(id),
            Self::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<RowId> {
        match self {
            Self::Real(id) => Some(*id),
            Self::Temp(_) => None,
        }
    }
}

impl From<RowId> for RowKey {
    fn from(id: RowId) -> Self {
        Self::Real(id)
    }
}

impl From<TempRowId> for RowKey {
    fn from(id: TempRowId) -> Self {
        Self::Temp(id)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temp(id) => write!(f, "{id}"),
            Self::Real(id) => write!(f, "{id}"),
        }
    }
}
