//! Records: typed reserved fields plus a side-map of user columns.

use crate::schema::{columns, Schema};
use crate::value::format_timestamp;
use crate::{CellValue, RecordId, Timestamp};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// One logical row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub id: RecordId,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub is_deleted: bool,
    pub deleted_at: Option<Timestamp>,
    pub idempotency_key: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// User columns, including any the schema does not declare
    pub fields: BTreeMap<String, CellValue>,
}

impl Record {
    /// Map a grid row onto a record using the header schema.
    ///
    /// Returns `None` for rows where every cell is blank.
    pub fn from_row(schema: &Schema, row: &[CellValue]) -> Option<Record> {
        if row.iter().all(CellValue::is_blank) {
            return None;
        }

        let mut record = Record::default();
        for (idx, column) in schema.columns.iter().enumerate() {
            let cell = row.get(idx).cloned().unwrap_or_default();
            let cell = column.kind.coerce(cell);
            match column.name.as_str() {
                columns::ID => record.id = cell.to_string().trim().to_string(),
                columns::CREATED_AT => record.created_at = cell.as_timestamp(),
                columns::UPDATED_AT => record.updated_at = cell.as_timestamp(),
                columns::IS_DELETED => record.is_deleted = cell.as_bool().unwrap_or(false),
                columns::DELETED_AT => record.deleted_at = cell.as_timestamp(),
                columns::IDEMPOTENCY_KEY => record.idempotency_key = non_blank(&cell),
                columns::CREATED_BY => record.created_by = non_blank(&cell),
                columns::UPDATED_BY => record.updated_by = non_blank(&cell),
                columns::METADATA => {
                    record.metadata = non_blank(&cell).map(|raw| {
                        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
                    })
                }
                name => {
                    if !cell.is_blank() {
                        record.fields.insert(name.to_string(), cell);
                    }
                }
            }
        }
        Some(record)
    }

    /// Lay this record out as a grid row in header order.
    ///
    /// Fields the schema has no column for are dropped; callers widen the
    /// schema first.
    pub fn to_row(&self, schema: &Schema) -> Vec<CellValue> {
        schema
            .columns
            .iter()
            .map(|column| match column.name.as_str() {
                columns::ID => CellValue::Text(self.id.clone()),
                columns::CREATED_AT => opt_ts(self.created_at),
                columns::UPDATED_AT => opt_ts(self.updated_at),
                columns::IS_DELETED => CellValue::Bool(self.is_deleted),
                columns::DELETED_AT => opt_ts(self.deleted_at),
                columns::IDEMPOTENCY_KEY => opt_text(&self.idempotency_key),
                columns::CREATED_BY => opt_text(&self.created_by),
                columns::UPDATED_BY => opt_text(&self.updated_by),
                columns::METADATA => self
                    .metadata
                    .as_ref()
                    .map(|m| CellValue::Text(m.to_string()))
                    .unwrap_or_default(),
                name => self
                    .fields
                    .get(name)
                    .cloned()
                    .map(|cell| column.kind.coerce(cell))
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Value of any field, reserved or user, as a cell.
    pub fn get(&self, field: &str) -> CellValue {
        match field {
            columns::ID => CellValue::Text(self.id.clone()),
            columns::CREATED_AT => opt_ts(self.created_at),
            columns::UPDATED_AT => opt_ts(self.updated_at),
            columns::IS_DELETED => CellValue::Bool(self.is_deleted),
            columns::DELETED_AT => opt_ts(self.deleted_at),
            columns::IDEMPOTENCY_KEY => opt_text(&self.idempotency_key),
            columns::CREATED_BY => opt_text(&self.created_by),
            columns::UPDATED_BY => opt_text(&self.updated_by),
            columns::METADATA => self
                .metadata
                .as_ref()
                .map(|m| CellValue::Text(m.to_string()))
                .unwrap_or_default(),
            name => self.fields.get(name).cloned().unwrap_or_default(),
        }
    }

    pub fn is_live(&self) -> bool {
        !self.is_deleted
    }

    /// Render as a flat JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert(columns::ID.into(), self.id.clone().into());
        map.insert(columns::CREATED_AT.into(), json_ts(self.created_at));
        map.insert(columns::UPDATED_AT.into(), json_ts(self.updated_at));
        map.insert(columns::IS_DELETED.into(), self.is_deleted.into());
        map.insert(columns::DELETED_AT.into(), json_ts(self.deleted_at));
        if let Some(key) = &self.idempotency_key {
            map.insert(columns::IDEMPOTENCY_KEY.into(), key.clone().into());
        }
        if let Some(actor) = &self.created_by {
            map.insert(columns::CREATED_BY.into(), actor.clone().into());
        }
        if let Some(actor) = &self.updated_by {
            map.insert(columns::UPDATED_BY.into(), actor.clone().into());
        }
        if let Some(metadata) = &self.metadata {
            map.insert(columns::METADATA.into(), metadata.clone());
        }
        for (name, cell) in &self.fields {
            map.insert(name.clone(), cell.to_json());
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn non_blank(cell: &CellValue) -> Option<String> {
    if cell.is_blank() {
        None
    } else {
        Some(cell.to_string())
    }
}

fn opt_ts(ts: Option<Timestamp>) -> CellValue {
    ts.map(CellValue::Timestamp).unwrap_or_default()
}

fn opt_text(value: &Option<String>) -> CellValue {
    value.clone().map(CellValue::Text).unwrap_or_default()
}

fn json_ts(ts: Option<Timestamp>) -> serde_json::Value {
    ts.map(|t| serde_json::Value::String(format_timestamp(t)))
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;
    use chrono::{TimeZone, Utc};

    fn schema_with(extra: &[&str]) -> Schema {
        let mut schema = Schema::base();
        schema.widen(extra.iter().copied());
        schema
    }

    #[test]
    fn test_row_roundtrip_preserves_fields() {
        let schema = schema_with(&["name", "score"]);
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut record = Record {
            id: "abc".into(),
            created_at: Some(ts),
            updated_at: Some(ts),
            ..Default::default()
        };
        record.fields.insert("name".into(), CellValue::text("A"));
        record.fields.insert("score".into(), CellValue::Number(3.0));

        let row = record.to_row(&schema);
        assert_eq!(row.len(), schema.len());
        assert_eq!(Record::from_row(&schema, &row), Some(record));
    }

    #[test]
    fn test_blank_row_is_skipped() {
        let schema = schema_with(&["name"]);
        let row = vec![CellValue::Empty, CellValue::text(" ")];
        assert!(Record::from_row(&schema, &row).is_none());
    }

    #[test]
    fn test_text_cells_are_typed_by_schema() {
        let mut schema = schema_with(&["qty"]);
        schema.columns.push(ColumnDef::new("price", crate::ColumnKind::Number));
        let row = vec![
            CellValue::text("r1"),
            CellValue::text("2024-01-01T00:00:00Z"),
            CellValue::text("2024-01-02T00:00:00Z"),
            CellValue::text("TRUE"),
            CellValue::Empty,
            CellValue::text("5"),
            CellValue::text("9.5"),
        ];
        let record = Record::from_row(&schema, &row).unwrap();
        assert!(record.is_deleted);
        assert!(record.updated_at > record.created_at);
        assert_eq!(record.get("qty"), CellValue::text("5"));
        assert_eq!(record.get("price"), CellValue::Number(9.5));
    }

    #[test]
    fn test_to_json_is_flat() {
        let mut record = Record {
            id: "r1".into(),
            metadata: Some(serde_json::json!({"source": "import"})),
            ..Default::default()
        };
        record.fields.insert("name".into(), CellValue::text("B"));
        let json = record.to_json();
        assert_eq!(json["ID"], "r1");
        assert_eq!(json["name"], "B");
        assert_eq!(json["IsDeleted"], false);
        assert_eq!(json["Metadata"]["source"], "import");
        assert!(json.get("IdempotencyKey").is_none());
    }
}
