//! Tabula Test Utilities
//!
//! Shared test infrastructure for the Tabula workspace:
//! - Fixtures: in-memory catalogs on a pinned clock, table definitions
//! - Proptest generators for cell values, field maps and filter clauses
//! - Assertions on engine error variants

pub use tabula_storage::{BackingStore, Catalog, FieldMap, InMemorySheetStore};

pub use tabula_core::{
    CellValue, ColumnDef, ColumnKind, EngineConfig, ManualClock, Record, TableDefinition,
    TabulaError, TabulaResult, Timestamp,
};

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built catalogs and definitions for common scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    /// Catalog plus handles to the store and clock behind it.
    pub struct TestCatalog {
        pub store: Arc<InMemorySheetStore>,
        pub clock: Arc<ManualClock>,
        pub catalog: Arc<Catalog>,
    }

    /// 2024-03-01T12:00:00Z, the start of every pinned clock.
    pub fn start_time() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn fixed_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(start_time()))
    }

    /// `Widgets` with a required text `name`, a numeric `qty` and audit columns.
    pub fn widgets_definition() -> TableDefinition {
        TableDefinition::new("Widgets")
            .with_column(ColumnDef::new("name", ColumnKind::Text))
            .with_column(ColumnDef::new("qty", ColumnKind::Number))
            .with_required("name")
            .with_audit()
    }

    /// Engine config with a short lock timeout so contention tests finish fast.
    pub fn test_config() -> EngineConfig {
        EngineConfig {
            lock_timeout_ms: 200,
            ..EngineConfig::default()
        }
    }

    pub fn catalog_with(config: EngineConfig) -> TestCatalog {
        let store = Arc::new(InMemorySheetStore::new());
        let clock = fixed_clock();
        let catalog = Catalog::with_clock(store.clone(), config, clock.clone())
            .unwrap_or_else(|e| panic!("test config rejected: {}", e));
        TestCatalog {
            store,
            clock,
            catalog: Arc::new(catalog),
        }
    }

    /// Empty catalog on a pinned clock, default config.
    pub fn memory_catalog() -> TestCatalog {
        catalog_with(test_config())
    }

    /// Catalog that knows the `Widgets` definition.
    pub fn widgets_catalog() -> TestCatalog {
        let mut config = test_config();
        config.tables.push(widgets_definition());
        catalog_with(config)
    }

    /// Field map from a JSON object literal.
    pub fn fields(value: serde_json::Value) -> FieldMap {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected a JSON object, got {}", other),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tabula inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// Field names that never collide with reserved columns.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}".prop_map(|s| format!("f_{}", s))
    }

    /// Generate a Timestamp between 2020 and 2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// JSON scalar a caller might send as a field value.
    pub fn arb_json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-10_000i64..10_000).prop_map(|n| json!(n)),
            "[A-Za-z0-9 ]{1,16}".prop_map(Value::String),
        ]
    }

    pub fn arb_cell_value() -> impl Strategy<Value = CellValue> {
        prop_oneof![
            Just(CellValue::Empty),
            "[A-Za-z0-9 ]{1,16}".prop_map(CellValue::Text),
            (-10_000i64..10_000).prop_map(|n| CellValue::Number(n as f64)),
            any::<bool>().prop_map(CellValue::Bool),
            arb_timestamp().prop_map(CellValue::Timestamp),
        ]
    }

    pub fn arb_field_map() -> impl Strategy<Value = FieldMap> {
        prop::collection::btree_map(arb_field_name(), arb_json_scalar(), 0..6)
            .prop_map(|entries| entries.into_iter().collect())
    }

    /// Operator token as a caller would spell it.
    pub fn arb_operator_token() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "=", "eq", "!=", "ne", ">", "gt", ">=", "gte", "<", "lt", "<=", "lte", "contains",
            "startsWith", "endsWith",
        ])
    }

    /// Well-formed filter clause as JSON.
    pub fn arb_filter_clause() -> impl Strategy<Value = Value> {
        (arb_field_name(), arb_operator_token(), arb_json_scalar()).prop_map(
            |(field, operator, value)| json!({ "field": field, "operator": operator, "value": value }),
        )
    }

    /// Valid table name: non-empty, short, no control characters.
    pub fn arb_table_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Za-z0-9]{0,19}"
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on Tabula results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(TabulaError::RecordNotFound { .. }) | Err(TabulaError::TableNotFound { .. }) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(TabulaError::Conflict { .. }) => {}
            other => panic!("Expected Conflict, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(TabulaError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_busy<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(TabulaError::Busy { .. }) => {}
            other => panic!("Expected Busy, got: {:?}", other),
        }
    }

    /// Equal modulo engine-assigned fields.
    #[track_caller]
    pub fn assert_same_user_fields(left: &Record, right: &Record) {
        assert_eq!(left.fields, right.fields, "user fields differ");
        assert_eq!(left.is_deleted, right.is_deleted, "deletion state differs");
    }
}
