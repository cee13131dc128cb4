//! Table engine: records on top of a sheet.
//!
//! Every read maps the full sheet through its header row. Every mutation is
//! a read-modify-write of that sheet performed while holding the table lock,
//! so writers inside one process never interleave. Writers in other
//! processes are not excluded; `expected_updated_at` turns the resulting
//! lost updates into `Conflict` errors.

use crate::cursor::{query_fingerprint, Cursor};
use crate::lock::TableLockManager;
use crate::BackingStore;
use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tabula_core::schema::{columns, BASE_COLUMNS};
use tabula_core::{
    format_timestamp, is_reserved, new_record_id, next_stamp, CellValue, Clock, EngineConfig,
    FilterSet, Record, Schema, SchemaDescriptor, TableDefinition, TabulaError, TabulaResult,
    Timestamp, ValidationError,
};
use tracing::{debug, info, warn};

/// Caller-supplied field values, keyed by column name.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// OPTIONS AND RESULTS
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub include_deleted: bool,
}

/// Parameters of a `list` call.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: FilterSet,
    pub limit: Option<usize>,
    /// Ignored when `cursor` is set
    pub offset: Option<usize>,
    pub cursor: Option<String>,
    pub include_deleted: bool,
}

/// One page of a `list` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub records: Vec<Record>,
    pub has_more: bool,
    /// Size of the full matching set
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Who is mutating, and what they want recorded about it.
#[derive(Debug, Clone, Default)]
pub struct MutationContext {
    pub actor: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub context: MutationContext,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub context: MutationContext,
    /// Optimistic concurrency token
    pub expected_updated_at: Option<Timestamp>,
    pub allow_deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOutcome {
    pub record: Record,
    /// False when an idempotency key matched an existing record
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub table: String,
    pub archive_table: String,
    pub moved: usize,
    pub cutoff: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub table: String,
    pub destination: String,
    pub rows: usize,
}

/// Outcome of one table's housekeeping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HousekeepingSummary {
    pub header_changes: usize,
    pub ids_assigned: usize,
    pub duplicate_ids: Vec<String>,
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

#[derive(Debug, Clone)]
struct StoredRow {
    /// 1-based sheet row
    row: usize,
    record: Record,
}

#[derive(Debug, Clone)]
struct Snapshot {
    schema: Schema,
    header_present: bool,
    rows: Vec<StoredRow>,
}

impl Snapshot {
    fn position(&self, id: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.record.id == id)
    }
}

fn header_names(cells: &[CellValue]) -> Vec<String> {
    let mut names: Vec<String> = cells.iter().map(|c| c.to_string().trim().to_string()).collect();
    while names.last().is_some_and(|n| n.is_empty()) {
        names.pop();
    }
    names
}

fn schema_for(headers: &[String], definition: Option<&TableDefinition>) -> Schema {
    match definition {
        Some(def) => Schema::from_headers(headers, &def.columns, &def.required),
        None => Schema::from_headers(headers, &[], &[]),
    }
}

fn read_snapshot(
    store: &dyn BackingStore,
    sheet: &str,
    definition: Option<&TableDefinition>,
) -> TabulaResult<Snapshot> {
    let grid = store.read_all(sheet)?;
    let (headers, header_present) = match grid.first() {
        Some(cells) => (header_names(cells), true),
        None => (Vec::new(), false),
    };
    let schema = schema_for(&headers, definition);
    let rows = grid
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, cells)| {
            Record::from_row(&schema, cells).map(|record| StoredRow {
                row: idx + 1,
                record,
            })
        })
        .collect();
    Ok(Snapshot {
        schema,
        header_present,
        rows,
    })
}

/// Add missing columns to a sheet's header. Returns true if it grew.
fn widen_sheet<I, S>(
    store: &dyn BackingStore,
    sheet: &str,
    definition: Option<&TableDefinition>,
    snapshot: &mut Snapshot,
    names: I,
) -> TabulaResult<bool>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut headers = snapshot.schema.clone();
    if !headers.widen(names) {
        return Ok(false);
    }
    let header_names = headers.names();
    let cells: Vec<CellValue> = header_names.iter().map(|h| CellValue::text(h.as_str())).collect();
    if snapshot.header_present {
        store.update_range(sheet, 1, 1, cells)?;
    } else {
        store.append_row(sheet, cells)?;
        snapshot.header_present = true;
    }
    snapshot.schema = schema_for(&header_names, definition);
    Ok(true)
}

/// User fields of a payload. Reserved names and blank keys are dropped.
fn user_cells(input: &FieldMap) -> impl Iterator<Item = (String, CellValue)> + '_ {
    input.iter().filter_map(|(key, value)| {
        let key = key.trim();
        if key.is_empty() || is_reserved(key) {
            None
        } else {
            Some((key.to_string(), CellValue::from_json(value)))
        }
    })
}

fn require_id(id: &str) -> TabulaResult<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "id".to_string(),
        }
        .into());
    }
    Ok(id)
}

fn stamp_text(ts: Option<Timestamp>) -> String {
    ts.map(format_timestamp).unwrap_or_else(|| "none".to_string())
}

#[derive(Debug)]
struct SchemaState {
    headers: Option<Vec<String>>,
    version: u64,
}

// ============================================================================
// TABLE
// ============================================================================

/// A named table backed by one sheet.
pub struct Table {
    name: String,
    store: Arc<dyn BackingStore>,
    locks: Arc<TableLockManager>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    schema_state: Mutex<SchemaState>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("version", &self.schema_state.lock().version)
            .finish()
    }
}

impl Table {
    pub(crate) fn new(
        name: String,
        store: Arc<dyn BackingStore>,
        locks: Arc<TableLockManager>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            name,
            store,
            locks,
            clock,
            config,
            schema_state: Mutex::new(SchemaState {
                headers: None,
                version: 1,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn definition(&self) -> Option<&TableDefinition> {
        self.config.definition(&self.name)
    }

    /// Bump the schema version whenever the header row differs from the
    /// last one this instance saw.
    fn observe_headers(&self, headers: Vec<String>) -> u64 {
        let mut state = self.schema_state.lock();
        match &state.headers {
            Some(seen) if *seen == headers => {}
            Some(_) => {
                state.version += 1;
                state.headers = Some(headers);
            }
            None => state.headers = Some(headers),
        }
        state.version
    }

    fn load(&self) -> TabulaResult<Snapshot> {
        let snapshot = read_snapshot(self.store.as_ref(), &self.name, self.definition())?;
        self.observe_headers(snapshot.schema.names());
        Ok(snapshot)
    }

    fn widen(&self, snapshot: &mut Snapshot, names: Vec<String>) -> TabulaResult<()> {
        if widen_sheet(self.store.as_ref(), &self.name, self.definition(), snapshot, names)? {
            let version = self.observe_headers(snapshot.schema.names());
            info!(table = %self.name, version, "schema widened");
        }
        Ok(())
    }

    fn write_record(&self, snapshot: &Snapshot, row: usize, record: &Record) -> TabulaResult<()> {
        self.store
            .update_range(&self.name, row, 1, record.to_row(&snapshot.schema))?;
        Ok(())
    }

    fn not_found(&self, id: &str) -> TabulaError {
        TabulaError::record_not_found(&self.name, id)
    }

    fn apply_audit(schema: &Schema, record: &mut Record, context: &MutationContext, creating: bool) {
        if let Some(actor) = &context.actor {
            if creating && schema.contains(columns::CREATED_BY) {
                record.created_by = Some(actor.clone());
            }
            if schema.contains(columns::UPDATED_BY) {
                record.updated_by = Some(actor.clone());
            }
        }
        if let Some(metadata) = &context.metadata {
            if schema.contains(columns::METADATA) && !metadata.is_null() {
                record.metadata = Some(metadata.clone());
            }
        }
    }

    fn coerce_fields(schema: &Schema, record: &mut Record) {
        let fields = std::mem::take(&mut record.fields);
        record.fields = fields
            .into_iter()
            .map(|(name, cell)| {
                let cell = schema.kind_of(&name).coerce(cell);
                (name, cell)
            })
            .collect();
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Fetch one record by ID.
    pub fn get(&self, id: &str, options: GetOptions) -> TabulaResult<Record> {
        let id = require_id(id)?;
        let snapshot = self.load()?;
        debug!(table = %self.name, id, "get");
        snapshot
            .rows
            .into_iter()
            .map(|r| r.record)
            .find(|r| r.id == id)
            .filter(|r| options.include_deleted || r.is_live())
            .ok_or_else(|| self.not_found(id))
    }

    /// Filtered, paginated listing in physical row order.
    pub fn list(&self, query: &ListQuery) -> TabulaResult<ListPage> {
        let snapshot = self.load()?;
        let matching: Vec<&StoredRow> = snapshot
            .rows
            .iter()
            .filter(|r| query.include_deleted || r.record.is_live())
            .filter(|r| query.filters.matches(&r.record))
            .collect();
        let total = matching.len();
        let limit = query
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size);
        let fingerprint = query_fingerprint(&query.filters, query.include_deleted);

        let start = match query.cursor.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                if cursor.fingerprint != fingerprint {
                    return Err(ValidationError::CursorMismatch.into());
                }
                match matching.iter().position(|r| r.record.id == cursor.after_id) {
                    Some(pos) => pos + 1,
                    // The cursor record is gone and later rows moved up one.
                    None => matching
                        .iter()
                        .position(|r| r.row >= cursor.after_row)
                        .unwrap_or(total),
                }
            }
            None => query.offset.unwrap_or(0).min(total),
        };
        let end = start.saturating_add(limit).min(total);
        let page = &matching[start..end];
        let has_more = end < total;
        let next_cursor = if has_more {
            page.last()
                .map(|last| Cursor::new(last.record.id.clone(), last.row, fingerprint).encode())
        } else {
            None
        };

        debug!(table = %self.name, total, returned = page.len(), has_more, "list");
        Ok(ListPage {
            records: page.iter().map(|r| r.record.clone()).collect(),
            has_more,
            total,
            next_cursor,
        })
    }

    /// Column layout and version. The version only orders header changes
    /// within this catalog's lifetime.
    pub fn schema(&self) -> TabulaResult<SchemaDescriptor> {
        let snapshot = self.load()?;
        let version = self.schema_state.lock().version;
        Ok(SchemaDescriptor {
            table: self.name.clone(),
            version,
            columns: snapshot.schema.columns,
            required: snapshot.schema.required,
        })
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Insert a record, or return the one already stored under the same
    /// idempotency key.
    pub fn create(&self, input: &FieldMap, options: CreateOptions) -> TabulaResult<CreateOutcome> {
        let _guard = self.locks.acquire(&self.name)?;
        let mut snapshot = self.load()?;

        let key = options
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        if let Some(key) = &key {
            let existing = snapshot
                .rows
                .iter()
                .find(|r| r.record.idempotency_key.as_deref() == Some(key.as_str()));
            if let Some(existing) = existing {
                info!(table = %self.name, id = %existing.record.id, "idempotent create replayed");
                return Ok(CreateOutcome {
                    record: existing.record.clone(),
                    created: false,
                });
            }
        }

        let fields: BTreeMap<String, CellValue> =
            user_cells(input).filter(|(_, cell)| !cell.is_blank()).collect();
        for required in &snapshot.schema.required {
            if !fields.contains_key(required) {
                return Err(ValidationError::RequiredFieldMissing {
                    field: required.clone(),
                }
                .into());
            }
        }

        let mut wanted: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        if key.is_some() {
            wanted.push(columns::IDEMPOTENCY_KEY.to_string());
        }
        wanted.extend(fields.keys().cloned());
        self.widen(&mut snapshot, wanted)?;

        let mut id = new_record_id();
        while snapshot.position(&id).is_some() {
            id = new_record_id();
        }
        let now = next_stamp(self.clock.now(), None);
        let mut record = Record {
            id,
            created_at: Some(now),
            updated_at: Some(now),
            idempotency_key: key,
            fields,
            ..Record::default()
        };
        Self::apply_audit(&snapshot.schema, &mut record, &options.context, true);
        Self::coerce_fields(&snapshot.schema, &mut record);

        self.store
            .append_row(&self.name, record.to_row(&snapshot.schema))?;
        info!(table = %self.name, id = %record.id, "record created");
        Ok(CreateOutcome {
            record,
            created: true,
        })
    }

    /// Merge `patch` into a record. Fields absent from the patch are kept;
    /// fields set to null or blank are cleared.
    pub fn update(&self, id: &str, patch: &FieldMap, options: UpdateOptions) -> TabulaResult<Record> {
        let id = require_id(id)?;
        let _guard = self.locks.acquire(&self.name)?;
        let mut snapshot = self.load()?;

        let idx = snapshot.position(id).ok_or_else(|| self.not_found(id))?;
        let current = snapshot.rows[idx].record.clone();
        if current.is_deleted && !options.allow_deleted {
            return Err(self.not_found(id));
        }
        if let Some(expected) = options.expected_updated_at {
            if current.updated_at != Some(expected) {
                warn!(
                    table = %self.name,
                    id,
                    expected = %expected.to_rfc3339_opts(SecondsFormat::Micros, true),
                    "stale update rejected"
                );
                return Err(TabulaError::Conflict {
                    table: self.name.clone(),
                    id: id.to_string(),
                    expected: format_timestamp(expected),
                    actual: stamp_text(current.updated_at),
                });
            }
        }

        let mut next = current.clone();
        let mut added = Vec::new();
        for (name, cell) in user_cells(patch) {
            if cell.is_blank() {
                if snapshot.schema.required.contains(&name) {
                    return Err(ValidationError::RequiredFieldMissing { field: name }.into());
                }
                next.fields.remove(&name);
            } else {
                added.push(name.clone());
                next.fields.insert(name, cell);
            }
        }
        self.widen(&mut snapshot, added)?;

        next.updated_at = Some(next_stamp(self.clock.now(), current.updated_at));
        Self::apply_audit(&snapshot.schema, &mut next, &options.context, false);
        Self::coerce_fields(&snapshot.schema, &mut next);

        self.write_record(&snapshot, snapshot.rows[idx].row, &next)?;
        info!(table = %self.name, id, "record updated");
        Ok(next)
    }

    /// Mark a live record deleted.
    pub fn soft_delete(&self, id: &str, context: MutationContext) -> TabulaResult<Record> {
        let id = require_id(id)?;
        let _guard = self.locks.acquire(&self.name)?;
        let snapshot = self.load()?;

        let idx = snapshot.position(id).ok_or_else(|| self.not_found(id))?;
        let current = &snapshot.rows[idx].record;
        if current.is_deleted {
            return Err(self.not_found(id));
        }

        let mut next = current.clone();
        let stamp = next_stamp(self.clock.now(), current.updated_at);
        next.is_deleted = true;
        next.deleted_at = Some(stamp);
        next.updated_at = Some(stamp);
        Self::apply_audit(&snapshot.schema, &mut next, &context, false);

        self.write_record(&snapshot, snapshot.rows[idx].row, &next)?;
        info!(table = %self.name, id, "record soft-deleted");
        Ok(next)
    }

    /// Clear the deletion marker of a soft-deleted record.
    pub fn restore(&self, id: &str, context: MutationContext) -> TabulaResult<Record> {
        let id = require_id(id)?;
        let _guard = self.locks.acquire(&self.name)?;
        let snapshot = self.load()?;

        let idx = snapshot.position(id).ok_or_else(|| self.not_found(id))?;
        let current = &snapshot.rows[idx].record;
        if !current.is_deleted {
            return Err(self.not_found(id));
        }

        let mut next = current.clone();
        next.is_deleted = false;
        next.deleted_at = None;
        next.updated_at = Some(next_stamp(self.clock.now(), current.updated_at));
        Self::apply_audit(&snapshot.schema, &mut next, &context, false);

        self.write_record(&snapshot, snapshot.rows[idx].row, &next)?;
        info!(table = %self.name, id, "record restored");
        Ok(next)
    }

    /// Physically remove a record, live or soft-deleted. Returns the removed
    /// record stamped with the deletion time.
    pub fn hard_delete(&self, id: &str, context: MutationContext) -> TabulaResult<Record> {
        let id = require_id(id)?;
        let _guard = self.locks.acquire(&self.name)?;
        let snapshot = self.load()?;

        let idx = snapshot.position(id).ok_or_else(|| self.not_found(id))?;
        let stored = &snapshot.rows[idx];
        self.store.delete_row(&self.name, stored.row)?;

        let mut removed = stored.record.clone();
        removed.updated_at = Some(next_stamp(self.clock.now(), removed.updated_at));
        Self::apply_audit(&snapshot.schema, &mut removed, &context, false);
        info!(table = %self.name, id, "record hard-deleted");
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------------

    /// Move records last updated strictly before `cutoff` into the archive
    /// table. Records without `UpdatedAt` fall back to `CreatedAt`; records
    /// with neither stay put.
    pub fn archive_older_than(&self, cutoff: Timestamp) -> TabulaResult<ArchiveSummary> {
        let archive = self.config.archive_name(&self.name);
        let _guard = self.locks.acquire_many(&[self.name.as_str(), archive.as_str()])?;
        let snapshot = self.load()?;

        let aged: Vec<&StoredRow> = snapshot
            .rows
            .iter()
            .filter(|r| {
                r.record
                    .updated_at
                    .or(r.record.created_at)
                    .is_some_and(|ts| ts < cutoff)
            })
            .collect();

        let summary = |moved| ArchiveSummary {
            table: self.name.clone(),
            archive_table: archive.clone(),
            moved,
            cutoff: format_timestamp(cutoff),
        };
        if aged.is_empty() {
            debug!(table = %self.name, "nothing to archive");
            return Ok(summary(0));
        }

        if !self.store.has_sheet(&archive)? {
            self.store.create_sheet(&archive, &snapshot.schema.names())?;
        }
        let mut archived = read_snapshot(self.store.as_ref(), &archive, None)?;
        widen_sheet(
            self.store.as_ref(),
            &archive,
            None,
            &mut archived,
            snapshot.schema.names(),
        )?;
        // Only real ids dedupe; rows without one are always copied.
        let already: HashSet<&str> = archived
            .rows
            .iter()
            .map(|r| r.record.id.as_str())
            .filter(|id| !id.is_empty())
            .collect();

        for stored in &aged {
            let id = stored.record.id.as_str();
            if id.is_empty() || !already.contains(id) {
                self.store
                    .append_row(&archive, stored.record.to_row(&archived.schema))?;
            }
        }
        // Bottom-up so earlier row numbers stay valid.
        for stored in aged.iter().rev() {
            self.store.delete_row(&self.name, stored.row)?;
        }

        info!(table = %self.name, archive = %archive, moved = aged.len(), "records archived");
        Ok(summary(aged.len()))
    }

    /// Copy every row, header and soft-deleted rows included, to a new
    /// timestamped sheet.
    pub fn backup(&self) -> TabulaResult<BackupSummary> {
        let _guard = self.locks.acquire(&self.name)?;
        let grid = self.store.read_all(&self.name)?;

        let base = format!(
            "{}{}{}",
            self.name,
            self.config.backup_infix,
            self.clock.now().format("%Y%m%dT%H%M%S%3f")
        );
        let mut destination = base.clone();
        let mut attempt = 2;
        while self.store.has_sheet(&destination)? {
            destination = format!("{}_{}", base, attempt);
            attempt += 1;
        }

        let headers = grid.first().map(|h| header_names(h)).unwrap_or_default();
        self.store.create_sheet(&destination, &headers)?;
        let mut rows = 0;
        for row in grid.into_iter().skip(1) {
            self.store.append_row(&destination, row)?;
            rows += 1;
        }

        info!(table = %self.name, destination = %destination, rows, "table backed up");
        Ok(BackupSummary {
            table: self.name.clone(),
            destination,
            rows,
        })
    }

    /// Normalize the header row, give ID-less rows an ID, and report IDs
    /// that appear more than once.
    pub fn housekeeping(&self) -> TabulaResult<HousekeepingSummary> {
        let _guard = self.locks.acquire(&self.name)?;
        let grid = self.store.read_all(&self.name)?;

        let raw: Vec<String> = grid
            .first()
            .map(|h| h.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default();
        let normalized = normalize_headers(&raw);
        let header_changes = normalized
            .iter()
            .enumerate()
            .filter(|(idx, name)| raw.get(*idx) != Some(*name))
            .count();
        if header_changes > 0 {
            let cells: Vec<CellValue> = normalized.iter().map(|h| CellValue::text(h.as_str())).collect();
            if grid.is_empty() {
                self.store.append_row(&self.name, cells)?;
            } else {
                self.store.update_range(&self.name, 1, 1, cells)?;
            }
            info!(table = %self.name, header_changes, "header normalized");
        }

        let schema = schema_for(&normalized, self.definition());
        let id_col = schema.position(columns::ID).map(|p| p + 1).unwrap_or(1);
        let mut summary = HousekeepingSummary {
            header_changes,
            ..Default::default()
        };
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (idx, cells) in grid.iter().enumerate().skip(1) {
            let Some(record) = Record::from_row(&schema, cells) else {
                continue;
            };
            if record.id.is_empty() {
                let id = new_record_id();
                self.store
                    .update_range(&self.name, idx + 1, id_col, vec![CellValue::Text(id)])?;
                summary.ids_assigned += 1;
            } else {
                *seen.entry(record.id).or_default() += 1;
            }
        }
        summary.duplicate_ids = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id)
            .collect();
        summary.duplicate_ids.sort();
        if !summary.duplicate_ids.is_empty() {
            warn!(table = %self.name, duplicates = ?summary.duplicate_ids, "duplicate record IDs");
        }

        self.observe_headers(normalized);
        Ok(summary)
    }
}

/// Trim header names, name blank ones `Column<N>`, suffix repeated names,
/// and append any missing base column.
fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut trimmed: Vec<String> = raw.iter().map(|h| h.trim().to_string()).collect();
    while trimmed.last().is_some_and(|h| h.is_empty()) {
        trimmed.pop();
    }

    let mut out: Vec<String> = Vec::with_capacity(trimmed.len() + BASE_COLUMNS.len());
    for (idx, name) in trimmed.into_iter().enumerate() {
        let name = if name.is_empty() {
            format!("Column{}", idx + 1)
        } else {
            name
        };
        let mut candidate = name.clone();
        let mut n = 2;
        while out.contains(&candidate) {
            candidate = format!("{}_{}", name, n);
            n += 1;
        }
        out.push(candidate);
    }
    for base in BASE_COLUMNS {
        if !out.iter().any(|h| h == base) {
            out.push(base.to_string());
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
