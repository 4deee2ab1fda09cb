//! Farm boundary models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How long a boundary mapping link stays usable
pub const MAPPING_TOKEN_TTL_HOURS: i64 = 24;

/// Minimum positions in a closed linear ring
pub const MIN_RING_POSITIONS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    #[error("No boundary coordinates received.")]
    Missing,

    #[error("Invalid boundary data format received.")]
    Malformed,

    #[error("Invalid GeoJSON Polygon structure received.")]
    InvalidPolygon,
}

/// Validity of a mapping token at a point in time
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MappingTokenState {
    Valid,
    Expired,
}

impl MappingTokenState {
    pub fn at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < expires_at {
            MappingTokenState::Valid
        } else {
            MappingTokenState::Expired
        }
    }
}

/// Expiry for a token issued at `issued_at`
pub fn mapping_token_expiry(issued_at: DateTime<Utc>) -> DateTime<Utc> {
    issued_at + Duration::hours(MAPPING_TOKEN_TTL_HOURS)
}

/// Check a GeoJSON value is a Polygon whose outer ring has enough positions.
///
/// Only the structure is checked; positions are not tested for closure or
/// self-intersection.
pub fn validate_polygon(value: &Value) -> Result<(), BoundaryError> {
    let object = value.as_object().ok_or(BoundaryError::InvalidPolygon)?;
    if object.get("type").and_then(Value::as_str) != Some("Polygon") {
        return Err(BoundaryError::InvalidPolygon);
    }
    let rings = object
        .get("coordinates")
        .and_then(Value::as_array)
        .ok_or(BoundaryError::InvalidPolygon)?;
    let outer = rings
        .first()
        .and_then(Value::as_array)
        .ok_or(BoundaryError::InvalidPolygon)?;
    if outer.len() < MIN_RING_POSITIONS {
        return Err(BoundaryError::InvalidPolygon);
    }
    Ok(())
}

/// Parse and validate a boundary submitted as a JSON string
pub fn parse_polygon(raw: &str) -> Result<Value, BoundaryError> {
    if raw.trim().is_empty() {
        return Err(BoundaryError::Missing);
    }
    let value: Value = serde_json::from_str(raw).map_err(|_| BoundaryError::Malformed)?;
    validate_polygon(&value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square() -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [131.01, -12.46], [131.02, -12.46], [131.02, -12.47],
                [131.01, -12.47], [131.01, -12.46]
            ]]
        })
    }

    #[test]
    fn test_valid_polygon() {
        assert!(validate_polygon(&square()).is_ok());
    }

    #[test]
    fn test_wrong_type_rejected() {
        let point = json!({"type": "Point", "coordinates": [131.0, -12.4]});
        assert_eq!(validate_polygon(&point), Err(BoundaryError::InvalidPolygon));
        assert_eq!(validate_polygon(&json!([1, 2])), Err(BoundaryError::InvalidPolygon));
    }

    #[test]
    fn test_empty_or_short_ring_rejected() {
        let empty = json!({"type": "Polygon", "coordinates": []});
        assert_eq!(validate_polygon(&empty), Err(BoundaryError::InvalidPolygon));
        let short = json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [0, 0]]]});
        assert_eq!(validate_polygon(&short), Err(BoundaryError::InvalidPolygon));
    }

    #[test]
    fn test_parse_polygon() {
        assert_eq!(parse_polygon(""), Err(BoundaryError::Missing));
        assert_eq!(parse_polygon("{not json"), Err(BoundaryError::Malformed));
        assert!(parse_polygon(&square().to_string()).is_ok());
    }

    #[test]
    fn test_token_state() {
        let issued = Utc::now();
        let expires = mapping_token_expiry(issued);
        assert_eq!(MappingTokenState::at(expires, issued), MappingTokenState::Valid);
        assert_eq!(MappingTokenState::at(expires, expires), MappingTokenState::Expired);
        assert_eq!(
            MappingTokenState::at(expires, issued + Duration::hours(25)),
            MappingTokenState::Expired
        );
    }
}
