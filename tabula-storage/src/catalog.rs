//! Catalog: table registry, provisioning policy and maintenance.

use crate::lock::TableLockManager;
use crate::table::{HousekeepingSummary, Table};
use crate::BackingStore;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tabula_core::schema::BASE_COLUMNS;
use tabula_core::{
    validate_table_name, Clock, EngineConfig, StorageError, SystemClock, TabulaError,
    TabulaResult,
};
use tracing::{info, warn};

/// Maintenance result for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMaintenance {
    pub table: String,
    pub ok: bool,
    #[serde(flatten)]
    pub summary: HousekeepingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a catalog-wide maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub tables: Vec<TableMaintenance>,
    pub failed: usize,
    /// Idle lock entries dropped from the registry
    pub locks_pruned: usize,
}

/// Registry of tables over one backing store.
///
/// Read paths resolve only tables whose sheet exists. `provision` is the
/// single place that creates sheets; the dispatcher calls it for `create`
/// only, after authorization.
pub struct Catalog {
    store: Arc<dyn BackingStore>,
    locks: Arc<TableLockManager>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("registered", &self.tables.read().len())
            .field("config", &self.config)
            .finish()
    }
}

impl Catalog {
    pub fn new(store: Arc<dyn BackingStore>, config: EngineConfig) -> TabulaResult<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn BackingStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> TabulaResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            locks: Arc::new(TableLockManager::new(config.lock_timeout())),
            clock,
            config: Arc::new(config),
            tables: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn locks(&self) -> &TableLockManager {
        &self.locks
    }

    /// Sorted names of configured tables and existing sheets. Archive and
    /// backup destinations are left out.
    pub fn list_tables(&self) -> TabulaResult<Vec<String>> {
        let mut names: BTreeSet<String> = self.table_sheets()?.into_iter().collect();
        names.extend(self.config.tables.iter().map(|t| t.name.clone()));
        Ok(names.into_iter().collect())
    }

    /// Existing sheets minus the archive and backup destinations of other
    /// tables. A sheet only named like a destination stays a table when its
    /// source table is unknown.
    fn table_sheets(&self) -> TabulaResult<Vec<String>> {
        let sheets = self.store.sheet_names()?;
        let known: HashSet<&str> = sheets
            .iter()
            .map(String::as_str)
            .chain(self.config.tables.iter().map(|t| t.name.as_str()))
            .collect();
        Ok(sheets
            .iter()
            .filter(|name| {
                !self
                    .config
                    .retention_source(name)
                    .is_some_and(|source| known.contains(source))
            })
            .cloned()
            .collect())
    }

    /// Resolve an existing table.
    pub fn get_table(&self, name: &str) -> TabulaResult<Arc<Table>> {
        self.find_table(name)?
            .ok_or_else(|| TabulaError::table_not_found(name.trim()))
    }

    /// Resolve a table if its sheet exists.
    pub fn find_table(&self, name: &str) -> TabulaResult<Option<Arc<Table>>> {
        let name = validate_table_name(name)?;
        if let Some(table) = self.tables.read().get(&name) {
            return Ok(Some(Arc::clone(table)));
        }
        if !self.store.has_sheet(&name)? {
            return Ok(None);
        }
        Ok(Some(self.register(name)))
    }

    /// Resolve a table, creating its sheet first when it does not exist.
    ///
    /// The new sheet gets the configured definition's header, or only the
    /// reserved base columns.
    pub fn provision(&self, name: &str) -> TabulaResult<Arc<Table>> {
        if let Some(table) = self.find_table(name)? {
            return Ok(table);
        }
        let name = validate_table_name(name)?;
        let _guard = self.locks.acquire(&name)?;
        if !self.store.has_sheet(&name)? {
            let headers = match self.config.definition(&name) {
                Some(def) => def.initial_headers(),
                None => BASE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            };
            match self.store.create_sheet(&name, &headers) {
                Ok(()) => info!(table = %name, "table provisioned"),
                // Created by a concurrent writer between the check and the call.
                Err(StorageError::SheetExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.register(name))
    }

    fn register(&self, name: String) -> Arc<Table> {
        let mut tables = self.tables.write();
        let table = tables.entry(name).or_insert_with_key(|name| {
            Arc::new(Table::new(
                name.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.locks),
                Arc::clone(&self.clock),
                Arc::clone(&self.config),
            ))
        });
        Arc::clone(table)
    }

    /// Housekeeping over every existing table, then lock registry cleanup.
    ///
    /// A failing table is recorded in the report and does not stop the run.
    pub fn run_maintenance(&self) -> TabulaResult<MaintenanceReport> {
        let names = self.table_sheets()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.get_table(&name).and_then(|table| table.housekeeping());
            tables.push(match outcome {
                Ok(summary) => TableMaintenance {
                    table: name,
                    ok: true,
                    summary,
                    error: None,
                },
                Err(e) => {
                    warn!(table = %name, error = %e, "maintenance failed");
                    TableMaintenance {
                        table: name,
                        ok: false,
                        summary: HousekeepingSummary::default(),
                        error: Some(e.to_string()),
                    }
                }
            });
        }

        let failed = tables.iter().filter(|t| !t.ok).count();
        let locks_pruned = self.locks.prune_idle();
        info!(tables = tables.len(), failed, locks_pruned, "maintenance finished");
        Ok(MaintenanceReport {
            tables,
            failed,
            locks_pruned,
        })
    }
}
