//! Error types for Tabula operations

use thiserror::Error;

/// Backing store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Sheet not found: {name}")]
    SheetNotFound { name: String },

    #[error("Sheet already exists: {name}")]
    SheetExists { name: String },

    #[error("Row {row} out of range for sheet {sheet}")]
    RowOutOfRange { sheet: String, row: usize },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Backend failure: {reason}")]
    Backend { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid table name '{name}': {reason}")]
    InvalidTableName { name: String, reason: String },

    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    #[error("Cursor does not match this query")]
    CursorMismatch,
}

/// Permission gate errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Unauthorized: no role for the presented API key")]
    Unauthorized,

    #[error("Forbidden: role '{role}' lacks '{permission}' permission")]
    Forbidden { role: String, permission: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown role '{role}' referenced by API key")]
    UnknownRole { role: String },
}

/// Master error type for all Tabula errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TabulaError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Access(#[from] AccessError),

    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Record {id} not found in {table}")]
    RecordNotFound { table: String, id: String },

    #[error("Conflict on {table}/{id}: expected UpdatedAt {expected}, current {actual}")]
    Conflict {
        table: String,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Table {table} is busy: lock not acquired within {timeout_ms}ms")]
    Busy { table: String, timeout_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TabulaError {
    pub fn record_not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        TabulaError::RecordNotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        TabulaError::TableNotFound {
            table: table.into(),
        }
    }

    /// True for errors a caller may retry with fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TabulaError::Conflict { .. } | TabulaError::Busy { .. })
    }
}

/// Result type alias for Tabula operations.
pub type TabulaResult<T> = Result<T, TabulaError>;

// =============================================================================
// TESTS
// =============================================================================
