//! Opaque pagination cursors.
//!
//! A cursor names the last record of the previous page by ID and physical
//! row, and carries a fingerprint of the query it was issued for. Replaying
//! it against a different filter set is rejected.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tabula_core::{FilterSet, ValidationError};

const CURSOR_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "v")]
    pub version: u8,
    #[serde(rename = "id")]
    pub after_id: String,
    #[serde(rename = "row")]
    pub after_row: usize,
    #[serde(rename = "q")]
    pub fingerprint: String,
}

impl Cursor {
    pub fn new(after_id: impl Into<String>, after_row: usize, fingerprint: impl Into<String>) -> Self {
        Self {
            version: CURSOR_VERSION,
            after_id: after_id.into(),
            after_row,
            fingerprint: fingerprint.into(),
        }
    }

    /// URL-safe token form.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidValue {
            field: "cursor".to_string(),
            reason: reason.to_string(),
        };
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| invalid("not a cursor token"))?;
        let cursor: Cursor =
            serde_json::from_slice(&bytes).map_err(|_| invalid("malformed cursor"))?;
        if cursor.version != CURSOR_VERSION {
            return Err(invalid("unsupported cursor version"));
        }
        Ok(cursor)
    }
}

/// Stable digest of the parts of a list query that select records.
pub fn query_fingerprint(filters: &FilterSet, include_deleted: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&filters.clauses).unwrap_or_default());
    hasher.update([u8::from(include_deleted)]);
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_core::FilterExpr;

    #[test]
    fn test_encode_decode() {
        let cursor = Cursor::new("r42", 7, "abc");
        let token = cursor.encode();
        assert!(!token.contains('='));
        assert_eq!(Cursor::decode(&token).unwrap(), cursor);
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            Cursor::decode("!!not base64!!"),
            Err(ValidationError::InvalidValue { ref field, .. }) if field == "cursor"
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(Cursor::decode(&not_json).is_err());
    }

    #[test]
    fn test_fingerprint_depends_on_query() {
        let none = FilterSet::default();
        let active = FilterSet::new(vec![FilterExpr::eq("status", json!("active"))]);
        assert_ne!(query_fingerprint(&none, false), query_fingerprint(&active, false));
        assert_ne!(query_fingerprint(&none, false), query_fingerprint(&none, true));
        assert_eq!(query_fingerprint(&active, false), query_fingerprint(&active.clone(), false));
        assert_eq!(query_fingerprint(&none, false).len(), 16);
    }
}
