//! Column schema descriptors.
//!
//! The header row of a sheet is the source of truth for a table's columns.
//! A [`Schema`] is the typed view of that header: ordered columns with type
//! tags, plus the set of columns a create must supply.

use crate::CellValue;
use serde::{Deserialize, Serialize};

/// Reserved column names with engine-enforced semantics.
pub mod columns {
    pub const ID: &str = "ID";
    pub const CREATED_AT: &str = "CreatedAt";
    pub const UPDATED_AT: &str = "UpdatedAt";
    pub const IS_DELETED: &str = "IsDeleted";
    pub const DELETED_AT: &str = "DeletedAt";
    pub const IDEMPOTENCY_KEY: &str = "IdempotencyKey";
    pub const CREATED_BY: &str = "CreatedBy";
    pub const UPDATED_BY: &str = "UpdatedBy";
    pub const METADATA: &str = "Metadata";
}

/// Columns every table carries.
pub const BASE_COLUMNS: [&str; 5] = [
    columns::ID,
    columns::CREATED_AT,
    columns::UPDATED_AT,
    columns::IS_DELETED,
    columns::DELETED_AT,
];

/// Audit columns, written only when the schema has them.
pub const AUDIT_COLUMNS: [&str; 3] = [columns::CREATED_BY, columns::UPDATED_BY, columns::METADATA];

/// True if `name` is engine-managed and must not be written by callers.
pub fn is_reserved(name: &str) -> bool {
    BASE_COLUMNS.contains(&name)
        || AUDIT_COLUMNS.contains(&name)
        || name == columns::IDEMPOTENCY_KEY
}

/// Type tag for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Number,
    Bool,
    Timestamp,
    /// Loosely typed; cells are kept as written
    #[default]
    Any,
}

impl ColumnKind {
    /// Type tag of a reserved column, `Any` for everything else.
    pub fn for_reserved(name: &str) -> ColumnKind {
        match name {
            columns::CREATED_AT | columns::UPDATED_AT | columns::DELETED_AT => ColumnKind::Timestamp,
            columns::IS_DELETED => ColumnKind::Bool,
            n if is_reserved(n) => ColumnKind::Text,
            _ => ColumnKind::Any,
        }
    }

    /// Coerce a cell toward this kind. Cells that do not convert are kept as-is.
    pub fn coerce(&self, cell: CellValue) -> CellValue {
        if cell.is_blank() {
            return CellValue::Empty;
        }
        match self {
            ColumnKind::Any => cell,
            ColumnKind::Text => match cell {
                CellValue::Text(_) => cell,
                other => CellValue::Text(other.to_string()),
            },
            ColumnKind::Number => cell.as_number().map(CellValue::Number).unwrap_or(cell),
            ColumnKind::Bool => cell.as_bool().map(CellValue::Bool).unwrap_or(cell),
            ColumnKind::Timestamp => cell.as_timestamp().map(CellValue::Timestamp).unwrap_or(cell),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Column whose kind is inferred from its name.
    pub fn inferred(name: impl Into<String>) -> Self {
        let name = name.into();
        let kind = ColumnKind::for_reserved(&name);
        Self { name, kind }
    }
}

/// Ordered column list with type tags and required-column policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Schema {
    /// Schema holding only the base reserved columns.
    pub fn base() -> Self {
        Self {
            columns: BASE_COLUMNS.iter().map(|c| ColumnDef::inferred(*c)).collect(),
            required: Vec::new(),
        }
    }

    /// Build a schema from a header row.
    ///
    /// Kinds come from `declared` when a column is listed there, otherwise
    /// from the reserved-name table.
    pub fn from_headers(headers: &[String], declared: &[ColumnDef], required: &[String]) -> Self {
        let columns = headers
            .iter()
            .map(|h| match declared.iter().find(|d| &d.name == h) {
                Some(def) => def.clone(),
                None => ColumnDef::inferred(h.clone()),
            })
            .collect();
        Self {
            columns,
            required: required.to_vec(),
        }
    }

    /// Column names in header order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Zero-based position of a column.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Kind of a column, `Any` when the column is unknown.
    pub fn kind_of(&self, name: &str) -> ColumnKind {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.kind)
            .unwrap_or(ColumnKind::Any)
    }

    /// Append columns that are not yet present. Returns true if the schema grew.
    pub fn widen<I, S>(&mut self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut grew = false;
        for name in names {
            let name = name.as_ref();
            if name.is_empty() || self.contains(name) {
                continue;
            }
            self.columns.push(ColumnDef::inferred(name));
            grew = true;
        }
        grew
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Schema descriptor returned by the `schema` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub table: String,
    /// Header changes seen by this process, starting at 1. Not stored in the
    /// sheet, so a restart reports 1 again over the same columns.
    pub version: u64,
    pub columns: Vec<ColumnDef>,
    pub required: Vec<String>,
}
