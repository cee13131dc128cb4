//! Tabula Core - Record Store Types
//!
//! Pure data types shared by every Tabula crate: cell values, records,
//! column schemas, filter clauses, the permission taxonomy, clocks,
//! engine configuration and the error taxonomy. No storage access lives here.

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod permission;
pub mod record;
pub mod schema;
pub mod value;

pub use clock::{next_stamp, Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, TableDefinition, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use error::{
    AccessError, ConfigError, StorageError, TabulaError, TabulaResult, ValidationError,
};
pub use filter::{FilterExpr, FilterOperator, FilterSet, IgnoredClause};
pub use permission::{require_permission, Permissions, Role, RoleTable};
pub use record::Record;
pub use schema::{columns, is_reserved, ColumnDef, ColumnKind, Schema, SchemaDescriptor};
pub use value::{format_timestamp, parse_timestamp, CellValue};

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Record identifier. Opaque to callers; engine-assigned IDs are UUIDv7 text.
pub type RecordId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new record ID (UUIDv7, timestamp-sortable).
pub fn new_record_id() -> RecordId {
    Uuid::now_v7().to_string()
}

/// Longest accepted table name.
pub const MAX_TABLE_NAME_LEN: usize = 100;

/// Validate and normalize a table name.
pub fn validate_table_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    let reject = |reason: &str| ValidationError::InvalidTableName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "table".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_TABLE_NAME_LEN {
        return Err(reject("too long"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(reject("contains control characters"));
    }
    Ok(trimmed.to_string())
}
