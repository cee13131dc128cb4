//! Engine configuration types

use crate::schema::{ColumnDef, AUDIT_COLUMNS, BASE_COLUMNS};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default page size for list operations.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Maximum page size for list operations.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Default bound on table lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Provisioning template for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    /// User columns in header order
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Columns a create must supply
    #[serde(default)]
    pub required: Vec<String>,
    /// Carry `CreatedBy` / `UpdatedBy` / `Metadata`
    #[serde(default)]
    pub audit: bool,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            required: Vec::new(),
            audit: false,
        }
    }

    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_required(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn with_audit(mut self) -> Self {
        self.audit = true;
        self
    }

    /// Header row written when the table is provisioned.
    pub fn initial_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        if self.audit {
            headers.extend(AUDIT_COLUMNS.iter().map(|c| c.to_string()));
        }
        for column in &self.columns {
            if !headers.contains(&column.name) {
                headers.push(column.name.clone());
            }
        }
        headers
    }
}

/// Engine-wide settings. Loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub lock_timeout_ms: u64,
    /// Suffix of the retention table that receives archived rows
    pub archive_suffix: String,
    /// Separator between table name and timestamp in backup names
    pub backup_infix: String,
    pub tables: Vec<TableDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            archive_suffix: "_Archive".to_string(),
            backup_infix: "_Backup_".to_string(),
            tables: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Provisioning template for `name`, if one is configured.
    pub fn definition(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn archive_name(&self, table: &str) -> String {
        format!("{}{}", table, self.archive_suffix)
    }

    /// Source table of a name shaped like an archive (`<table>_Archive`) or
    /// backup (`<table>_Backup_<YYYYMMDDTHHMMSSmmm>[_N]`) destination.
    ///
    /// Shape alone does not make a sheet a destination: callers still check
    /// that the returned table exists.
    pub fn retention_source<'a>(&self, name: &'a str) -> Option<&'a str> {
        if let Some(base) = name.strip_suffix(self.archive_suffix.as_str()) {
            if !base.is_empty() {
                return Some(base);
            }
        }
        let (base, stamp) = name.rsplit_once(self.backup_infix.as_str())?;
        (!base.is_empty() && is_backup_stamp(stamp)).then_some(base)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(invalid("default_page_size", self.default_page_size, "must be positive"));
        }
        if self.max_page_size < self.default_page_size {
            return Err(invalid(
                "max_page_size",
                self.max_page_size,
                "must be at least default_page_size",
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(invalid("lock_timeout_ms", self.lock_timeout_ms, "must be positive"));
        }
        if self.archive_suffix.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "archive_suffix".to_string(),
            });
        }
        if self.backup_infix.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "backup_infix".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if table.name.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "tables.name".to_string(),
                });
            }
            if !seen.insert(table.name.as_str()) {
                return Err(invalid("tables.name", &table.name, "defined more than once"));
            }
            for field in &table.required {
                if !table.columns.iter().any(|c| &c.name == field) {
                    return Err(invalid(
                        "tables.required",
                        field,
                        "required column is not declared in columns",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// `YYYYMMDDTHHMMSSmmm`, optionally followed by `_N`.
fn is_backup_stamp(stamp: &str) -> bool {
    let (stamp, attempt) = match stamp.split_once('_') {
        Some((stamp, attempt)) => (stamp, Some(attempt)),
        None => (stamp, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    let shape_ok = match stamp.split_once('T') {
        Some((date, time)) => {
            date.len() == 8 && time.len() == 9 && all_digits(date) && all_digits(time)
        }
        None => false,
    };
    shape_ok && attempt.map_or(true, all_digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ColumnKind;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_page_sizes() {
        let config = EngineConfig {
            default_page_size: 100,
            max_page_size: 10,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "max_page_size"
        ));
    }

    #[test]
    fn test_rejects_undeclared_required_column() {
        let config = EngineConfig {
            tables: vec![TableDefinition::new("Widgets").with_required("name")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_definitions() {
        let config = EngineConfig {
            tables: vec![TableDefinition::new("A"), TableDefinition::new("A")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_headers_with_audit() {
        let def = TableDefinition::new("Notes")
            .with_column(ColumnDef::new("body", ColumnKind::Text))
            .with_audit();
        let headers = def.initial_headers();
        assert_eq!(headers[0], "ID");
        assert!(headers.contains(&"UpdatedBy".to_string()));
        assert_eq!(headers.last().map(String::as_str), Some("body"));
    }

    #[test]
    fn test_retention_source_matches_exact_shapes() {
        let config = EngineConfig::default();
        assert_eq!(config.retention_source("Widgets_Archive"), Some("Widgets"));
        assert_eq!(
            config.retention_source("Widgets_Backup_20240101T000000000"),
            Some("Widgets")
        );
        assert_eq!(
            config.retention_source("Widgets_Backup_20240101T000000000_3"),
            Some("Widgets")
        );
        assert_eq!(
            config.retention_source("Ops_Backup_Log_Backup_20240101T000000000"),
            Some("Ops_Backup_Log")
        );
        assert_eq!(config.retention_source("Widgets"), None);
        assert_eq!(config.retention_source("_Archive"), None);
        assert_eq!(config.retention_source("Ops_Backup_Log"), None);
        assert_eq!(config.retention_source("Ops_Backup_2024"), None);
        assert_eq!(config.retention_source("Ops_Backup_20240101T000000000_x"), None);
        assert_eq!(config.archive_name("Widgets"), "Widgets_Archive");
    }

    #[test]
    fn test_deserializes_from_toml_shape() -> Result<(), serde_json::Error> {
        let config: EngineConfig = serde_json::from_value(serde_json::json!({
            "lock_timeout_ms": 250,
            "tables": [{
                "name": "Widgets",
                "columns": [{"name": "name", "kind": "text"}],
                "required": ["name"]
            }]
        }))?;
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
        assert!(config.validate().is_ok());
        Ok(())
    }
}
