//! Request models shared across services
//!
//! Re-exports domain models from the shared crate and adds backend-specific types

use serde::Deserialize;

pub use shared::models::*;

/// A loosely typed numeric field: a JSON number or any string.
///
/// Field clients send plant numbers and months either way; strings are kept
/// raw so invalid values can be logged and ignored instead of rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawParam {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RawParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawParam::Number(n) => write!(f, "{}", n),
            RawParam::Text(s) => f.write_str(s),
        }
    }
}
