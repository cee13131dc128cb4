//! Tabula Storage - Backing Store Trait, Table Engine and Catalog
//!
//! Defines the grid abstraction every table lives on, an in-memory
//! implementation used by tests and local runs, and the engine that maps
//! records onto rows.

pub mod catalog;
pub mod cursor;
pub mod lock;
pub mod table;

pub use catalog::{Catalog, MaintenanceReport, TableMaintenance};
pub use cursor::{query_fingerprint, Cursor};
pub use lock::{TableGuard, TableLockManager};
pub use table::{
    ArchiveSummary, BackupSummary, CreateOptions, CreateOutcome, FieldMap, GetOptions,
    HousekeepingSummary, ListPage, ListQuery, MutationContext, Table, UpdateOptions,
};

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tabula_core::{CellValue, StorageError};

/// Result type for backing store calls.
pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// BACKING STORE TRAIT
// ============================================================================

/// A collection of named grids.
///
/// Row 1 of every sheet is the header row; rows and columns are 1-based the
/// way spreadsheet ranges are. Implementations must be safe to share across
/// threads. The engine serializes writers per sheet, so implementations only
/// need to keep individual calls atomic.
pub trait BackingStore: Send + Sync {
    /// Names of all sheets, in creation order.
    fn sheet_names(&self) -> StorageResult<Vec<String>>;

    fn has_sheet(&self, name: &str) -> StorageResult<bool>;

    /// Create a sheet whose first row is `headers`.
    fn create_sheet(&self, name: &str, headers: &[String]) -> StorageResult<()>;

    /// Every row of the sheet, header first.
    fn read_all(&self, name: &str) -> StorageResult<Vec<Vec<CellValue>>>;

    fn append_row(&self, name: &str, row: Vec<CellValue>) -> StorageResult<()>;

    /// Overwrite cells of `row` starting at column `col`, growing the row
    /// when `values` runs past its end.
    fn update_range(
        &self,
        name: &str,
        row: usize,
        col: usize,
        values: Vec<CellValue>,
    ) -> StorageResult<()>;

    /// Remove a data row. Later rows shift up by one.
    fn delete_row(&self, name: &str, row: usize) -> StorageResult<()>;
}

// ============================================================================
// IN-MEMORY SHEET STORE
// ============================================================================

#[derive(Debug, Default)]
struct Sheets {
    order: Vec<String>,
    grids: BTreeMap<String, Vec<Vec<CellValue>>>,
}

/// In-memory backing store.
#[derive(Debug, Default)]
pub struct InMemorySheetStore {
    sheets: RwLock<Sheets>,
    faulty: RwLock<HashSet<String>>,
}

impl InMemorySheetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a sheet with raw rows (header first), replacing any existing one.
    pub fn seed_sheet(&self, name: &str, rows: Vec<Vec<CellValue>>) {
        let mut sheets = self.sheets.write();
        if !sheets.grids.contains_key(name) {
            sheets.order.push(name.to_string());
        }
        sheets.grids.insert(name.to_string(), rows);
    }

    /// Make every call touching `name` fail with a backend error.
    pub fn set_faulty(&self, name: &str, faulty: bool) {
        let mut set = self.faulty.write();
        if faulty {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    /// Number of data rows (header excluded).
    pub fn data_row_count(&self, name: &str) -> usize {
        self.sheets
            .read()
            .grids
            .get(name)
            .map(|rows| rows.len().saturating_sub(1))
            .unwrap_or(0)
    }

    fn check_fault(&self, name: &str) -> StorageResult<()> {
        if self.faulty.read().contains(name) {
            return Err(StorageError::Backend {
                reason: format!("injected fault on {}", name),
            });
        }
        Ok(())
    }
}

fn sheet_missing(name: &str) -> StorageError {
    StorageError::SheetNotFound {
        name: name.to_string(),
    }
}

fn row_out_of_range(name: &str, row: usize) -> StorageError {
    StorageError::RowOutOfRange {
        sheet: name.to_string(),
        row,
    }
}

impl BackingStore for InMemorySheetStore {
    fn sheet_names(&self) -> StorageResult<Vec<String>> {
        Ok(self.sheets.read().order.clone())
    }

    fn has_sheet(&self, name: &str) -> StorageResult<bool> {
        Ok(self.sheets.read().grids.contains_key(name))
    }

    fn create_sheet(&self, name: &str, headers: &[String]) -> StorageResult<()> {
        self.check_fault(name)?;
        let mut sheets = self.sheets.write();
        if sheets.grids.contains_key(name) {
            return Err(StorageError::SheetExists {
                name: name.to_string(),
            });
        }
        let header: Vec<CellValue> = headers.iter().map(|h| CellValue::text(h.as_str())).collect();
        sheets.order.push(name.to_string());
        sheets.grids.insert(name.to_string(), vec![header]);
        Ok(())
    }

    fn read_all(&self, name: &str) -> StorageResult<Vec<Vec<CellValue>>> {
        self.check_fault(name)?;
        self.sheets
            .read()
            .grids
            .get(name)
            .cloned()
            .ok_or_else(|| sheet_missing(name))
    }

    fn append_row(&self, name: &str, row: Vec<CellValue>) -> StorageResult<()> {
        self.check_fault(name)?;
        let mut sheets = self.sheets.write();
        let grid = sheets.grids.get_mut(name).ok_or_else(|| sheet_missing(name))?;
        grid.push(row);
        Ok(())
    }

    fn update_range(
        &self,
        name: &str,
        row: usize,
        col: usize,
        values: Vec<CellValue>,
    ) -> StorageResult<()> {
        self.check_fault(name)?;
        let mut sheets = self.sheets.write();
        let grid = sheets.grids.get_mut(name).ok_or_else(|| sheet_missing(name))?;
        if row == 0 || col == 0 || row > grid.len() {
            return Err(row_out_of_range(name, row));
        }
        let target = &mut grid[row - 1];
        let end = col - 1 + values.len();
        if target.len() < end {
            target.resize(end, CellValue::Empty);
        }
        for (offset, value) in values.into_iter().enumerate() {
            target[col - 1 + offset] = value;
        }
        Ok(())
    }

    fn delete_row(&self, name: &str, row: usize) -> StorageResult<()> {
        self.check_fault(name)?;
        let mut sheets = self.sheets.write();
        let grid = sheets.grids.get_mut(name).ok_or_else(|| sheet_missing(name))?;
        // Row 1 is the header and cannot be deleted.
        if row < 2 || row > grid.len() {
            return Err(row_out_of_range(name, row));
        }
        grid.remove(row - 1);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        vec!["ID".to_string(), "name".to_string()]
    }

    #[test]
    fn test_create_and_read_sheet() {
        let store = InMemorySheetStore::new();
        store.create_sheet("Widgets", &headers()).unwrap();
        store
            .append_row("Widgets", vec![CellValue::text("r1"), CellValue::text("bolt")])
            .unwrap();

        let rows = store.read_all("Widgets").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], CellValue::text("ID"));
        assert_eq!(store.data_row_count("Widgets"), 1);
        assert_eq!(store.sheet_names().unwrap(), vec!["Widgets".to_string()]);
    }

    #[test]
    fn test_create_sheet_twice_fails() {
        let store = InMemorySheetStore::new();
        store.create_sheet("Widgets", &headers()).unwrap();
        assert!(matches!(
            store.create_sheet("Widgets", &headers()),
            Err(StorageError::SheetExists { .. })
        ));
    }

    #[test]
    fn test_missing_sheet_errors() {
        let store = InMemorySheetStore::new();
        assert!(matches!(
            store.read_all("Nope"),
            Err(StorageError::SheetNotFound { .. })
        ));
        assert!(!store.has_sheet("Nope").unwrap());
    }

    #[test]
    fn test_update_range_grows_row() {
        let store = InMemorySheetStore::new();
        store.create_sheet("T", &headers()).unwrap();
        store.append_row("T", vec![CellValue::text("r1")]).unwrap();
        store
            .update_range("T", 2, 2, vec![CellValue::text("a"), CellValue::Number(3.0)])
            .unwrap();

        let rows = store.read_all("T").unwrap();
        assert_eq!(
            rows[1],
            vec![CellValue::text("r1"), CellValue::text("a"), CellValue::Number(3.0)]
        );
        assert!(store.update_range("T", 9, 1, vec![]).is_err());
    }

    #[test]
    fn test_delete_row_protects_header() {
        let store = InMemorySheetStore::new();
        store.create_sheet("T", &headers()).unwrap();
        store.append_row("T", vec![CellValue::text("r1")]).unwrap();
        store.append_row("T", vec![CellValue::text("r2")]).unwrap();

        assert!(store.delete_row("T", 1).is_err());
        store.delete_row("T", 2).unwrap();
        let rows = store.read_all("T").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], CellValue::text("r2"));
    }

    #[test]
    fn test_injected_fault() {
        let store = InMemorySheetStore::new();
        store.create_sheet("T", &headers()).unwrap();
        store.set_faulty("T", true);
        assert!(matches!(store.read_all("T"), Err(StorageError::Backend { .. })));
        store.set_faulty("T", false);
        assert!(store.read_all("T").is_ok());
    }
}
