//! Control API versions.

use crate::error::{ProtocolError, ProtocolResult};
use serde_json::Value;

/// A control API version number.
pub type ApiVersion = u32;

/// Oldest API version this build understands.
pub const MIN_API_VERSION: ApiVersion = 4;

/// Newest API version this build understands.
pub const MAX_API_VERSION: ApiVersion = 9;

/// Version used when none is requested and none is negotiated.
pub const DEFAULT_API_VERSION: ApiVersion = 9;

/// Parses the body of the version listing (`GET /`).
///
/// The remote answers with a JSON array of integers. Entries that are not
/// non-negative integers are skipped, so the result may be empty even when
/// the body is valid JSON.
pub fn parse_versions(body: &[u8]) -> ProtocolResult<Vec<ApiVersion>> {
    let value: Value = serde_json::from_slice(body)?;
    let entries = value
        .as_array()
        .ok_or_else(|| ProtocolError::invalid_payload("expected an array of versions"))?;

    Ok(entries
        .iter()
        .filter_map(Value::as_u64)
        .filter_map(|v| ApiVersion::try_from(v).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_list() {
        assert_eq!(parse_versions(b"[4, 5, 6, 7]").unwrap(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn skips_non_integers() {
        assert!(parse_versions(br#"[""]"#).unwrap().is_empty());
        assert_eq!(parse_versions(br#"[4, "x", 9]"#).unwrap(), vec![4, 9]);
    }

    #[test]
    fn rejects_empty_body() {
        assert!(parse_versions(b"").is_err());
    }

    #[test]
    fn rejects_non_array() {
        let err = parse_versions(b"{}").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn build_range_is_consistent() {
        assert!(MIN_API_VERSION <= DEFAULT_API_VERSION);
        assert!(DEFAULT_API_VERSION <= MAX_API_VERSION);
    }
}
