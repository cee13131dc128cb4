//! API Dispatcher
//!
//! Turns a read request (query parameters) or a write request (JSON body)
//! into catalog and table calls. Every request goes through the same steps:
//! decode, resolve the role, resolve the table, authorize, execute, then
//! wrap the outcome in an [`Envelope`].

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tabula_core::{
    parse_timestamp, require_permission, AccessError, FilterSet, Permissions, Role, Timestamp,
    ValidationError,
};
use tabula_storage::{
    Catalog, CreateOptions, FieldMap, GetOptions, ListQuery, MutationContext, Table,
    UpdateOptions,
};
use tracing::{debug, info, warn};

use crate::auth::AuthConfig;
use crate::error::{ApiError, ApiResult};

// ============================================================================
// REQUESTS
// ============================================================================

/// Read request, taken from query parameters. Every value arrives as text.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub api_key: Option<String>,
    /// `tables` or `schema`; omitted means get (with `id`) or list
    pub action: Option<String>,
    pub table: Option<String>,
    pub id: Option<String>,
    /// JSON-encoded array of filter clauses
    pub filter: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub cursor: Option<String>,
    /// `"true"` or `"1"`
    pub include_deleted: Option<String>,
}

impl std::fmt::Debug for ReadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadRequest")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("action", &self.action)
            .field("table", &self.table)
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("cursor", &self.cursor)
            .field("include_deleted", &self.include_deleted)
            .finish()
    }
}

/// Write request, taken from a JSON body.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub api_key: Option<String>,
    pub action: Option<String>,
    pub table: Option<String>,
    pub actor: Option<String>,
    pub metadata: Option<Value>,
    /// Field values for create, or the patch for update
    pub record: Option<Value>,
    pub id: Option<String>,
    /// RFC 3339
    pub expected_updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub allow_deleted: bool,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub hard: bool,
    /// RFC 3339 or `YYYY-MM-DD`
    pub cutoff: Option<String>,
    pub idempotency_key: Option<String>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRequest")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("action", &self.action)
            .field("table", &self.table)
            .field("actor", &self.actor)
            .field("id", &self.id)
            .field("expected_updated_at", &self.expected_updated_at)
            .field("allow_deleted", &self.allow_deleted)
            .field("hard", &self.hard)
            .field("cutoff", &self.cutoff)
            .field("idempotency_key", &self.idempotency_key)
            .finish_non_exhaustive()
    }
}

/// `true`/`"true"`/`"1"`/`1` are true; anything else, including null, is false.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => parse_flag(&s),
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

/// Boolean-as-string: only `true` (any case) and `1` are true.
pub fn parse_flag(raw: &str) -> bool {
    let raw = raw.trim();
    raw == "1" || raw.eq_ignore_ascii_case("true")
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Every operation the dispatcher routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Tables,
    Schema,
    Get,
    List,
    Create,
    Update,
    Delete,
    Restore,
    Archive,
    Backup,
    Maintenance,
}

impl Action {
    pub const ALL: [Action; 11] = [
        Action::Tables,
        Action::Schema,
        Action::Get,
        Action::List,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Restore,
        Action::Archive,
        Action::Backup,
        Action::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Tables => "tables",
            Action::Schema => "schema",
            Action::Get => "get",
            Action::List => "list",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Restore => "restore",
            Action::Archive => "archive",
            Action::Backup => "backup",
            Action::Maintenance => "maintenance",
        }
    }

    /// Permission the gate checks before executing.
    pub fn permission(&self) -> Permissions {
        match self {
            Action::Tables | Action::Schema | Action::Get | Action::List => Permissions::READ,
            Action::Create | Action::Update => Permissions::WRITE,
            Action::Delete | Action::Restore => Permissions::DELETE,
            Action::Archive | Action::Backup | Action::Maintenance => Permissions::MANAGE,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !self.permission().contains(Permissions::READ)
    }

    /// Read-side action. Without an explicit action, `id` selects get and
    /// its absence selects list.
    fn for_read(action: Option<&str>, has_id: bool) -> Result<Action, ValidationError> {
        match action.map(str::trim).filter(|a| !a.is_empty()) {
            None if has_id => Ok(Action::Get),
            None => Ok(Action::List),
            Some(a) => match a.to_ascii_lowercase().as_str() {
                "tables" => Ok(Action::Tables),
                "schema" => Ok(Action::Schema),
                "get" => Ok(Action::Get),
                "list" => Ok(Action::List),
                _ => Err(ValidationError::UnknownAction {
                    action: a.to_string(),
                }),
            },
        }
    }

    fn for_write(action: Option<&str>) -> Result<Action, ValidationError> {
        let a = required_text(action, "action")?;
        match a.to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "restore" => Ok(Action::Restore),
            "archive" => Ok(Action::Archive),
            "backup" => Ok(Action::Backup),
            "maintenance" => Ok(Action::Maintenance),
            _ => Err(ValidationError::UnknownAction { action: a }),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DECODED COMMANDS
// ============================================================================

/// A fully decoded request, ready for the gate.
#[derive(Debug, Clone)]
enum Command {
    Tables,
    Schema {
        table: String,
    },
    Get {
        table: String,
        id: String,
        options: GetOptions,
    },
    List {
        table: String,
        query: ListQuery,
    },
    Create {
        table: String,
        fields: FieldMap,
        options: CreateOptions,
    },
    Update {
        table: String,
        id: String,
        patch: FieldMap,
        options: UpdateOptions,
    },
    Delete {
        table: String,
        id: String,
        hard: bool,
        context: MutationContext,
    },
    Restore {
        table: String,
        id: String,
        context: MutationContext,
    },
    Archive {
        table: String,
        cutoff: Timestamp,
    },
    Backup {
        table: String,
    },
    Maintenance,
}

impl Command {
    fn action(&self) -> Action {
        match self {
            Command::Tables => Action::Tables,
            Command::Schema { .. } => Action::Schema,
            Command::Get { .. } => Action::Get,
            Command::List { .. } => Action::List,
            Command::Create { .. } => Action::Create,
            Command::Update { .. } => Action::Update,
            Command::Delete { .. } => Action::Delete,
            Command::Restore { .. } => Action::Restore,
            Command::Archive { .. } => Action::Archive,
            Command::Backup { .. } => Action::Backup,
            Command::Maintenance => Action::Maintenance,
        }
    }

    fn table(&self) -> Option<&str> {
        match self {
            Command::Tables | Command::Maintenance => None,
            Command::Schema { table }
            | Command::Get { table, .. }
            | Command::List { table, .. }
            | Command::Create { table, .. }
            | Command::Update { table, .. }
            | Command::Delete { table, .. }
            | Command::Restore { table, .. }
            | Command::Archive { table, .. }
            | Command::Backup { table } => Some(table),
        }
    }

    fn decode_read(req: &ReadRequest) -> Result<Command, ValidationError> {
        let action = Action::for_read(req.action.as_deref(), non_blank(req.id.as_deref()).is_some())?;
        let include_deleted = req.include_deleted.as_deref().is_some_and(parse_flag);
        match action {
            Action::Tables => Ok(Command::Tables),
            Action::Schema => Ok(Command::Schema {
                table: required_text(req.table.as_deref(), "table")?,
            }),
            Action::Get => Ok(Command::Get {
                table: required_text(req.table.as_deref(), "table")?,
                id: required_text(req.id.as_deref(), "id")?,
                options: GetOptions { include_deleted },
            }),
            _ => {
                let filters = match non_blank(req.filter.as_deref()) {
                    Some(raw) => FilterSet::parse(raw)?,
                    None => FilterSet::default(),
                };
                Ok(Command::List {
                    table: required_text(req.table.as_deref(), "table")?,
                    query: ListQuery {
                        filters,
                        limit: parse_count(req.limit.as_deref(), "limit")?,
                        offset: parse_count(req.offset.as_deref(), "offset")?,
                        cursor: non_blank(req.cursor.as_deref()).map(str::to_string),
                        include_deleted,
                    },
                })
            }
        }
    }

    fn decode_write(req: &WriteRequest) -> Result<Command, ValidationError> {
        let action = Action::for_write(req.action.as_deref())?;
        if action == Action::Maintenance {
            return Ok(Command::Maintenance);
        }
        let table = required_text(req.table.as_deref(), "table")?;
        let context = MutationContext {
            actor: non_blank(req.actor.as_deref()).map(str::to_string),
            metadata: req.metadata.clone().filter(|m| !m.is_null()),
        };
        match action {
            Action::Create => Ok(Command::Create {
                table,
                fields: record_fields(req.record.as_ref())?,
                options: CreateOptions {
                    context,
                    idempotency_key: non_blank(req.idempotency_key.as_deref())
                        .map(str::to_string),
                },
            }),
            Action::Update => {
                let id = required_text(req.id.as_deref(), "id")?;
                let expected_updated_at = match non_blank(req.expected_updated_at.as_deref()) {
                    Some(raw) => Some(parse_instant(raw, "expectedUpdatedAt")?),
                    None => None,
                };
                Ok(Command::Update {
                    table,
                    id,
                    patch: record_fields(req.record.as_ref())?,
                    options: UpdateOptions {
                        context,
                        expected_updated_at,
                        allow_deleted: req.allow_deleted,
                    },
                })
            }
            Action::Delete => Ok(Command::Delete {
                table,
                id: required_text(req.id.as_deref(), "id")?,
                hard: req.hard,
                context,
            }),
            Action::Restore => Ok(Command::Restore {
                table,
                id: required_text(req.id.as_deref(), "id")?,
                context,
            }),
            Action::Archive => {
                let raw = required_text(req.cutoff.as_deref(), "cutoff")?;
                Ok(Command::Archive {
                    table,
                    cutoff: parse_instant(&raw, "cutoff")?,
                })
            }
            Action::Backup => Ok(Command::Backup { table }),
            // Read-side and table-less actions never come out of `for_write`.
            other => Err(ValidationError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required_text(value: Option<&str>, field: &str) -> Result<String, ValidationError> {
    non_blank(value)
        .map(str::to_string)
        .ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        })
}

fn parse_count(value: Option<&str>, field: &str) -> Result<Option<usize>, ValidationError> {
    match non_blank(value) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("expected a non-negative integer, got '{}'", raw),
            }),
    }
}

fn parse_instant(raw: &str, field: &str) -> Result<Timestamp, ValidationError> {
    parse_timestamp(raw).ok_or_else(|| ValidationError::InvalidValue {
        field: field.to_string(),
        reason: format!("expected RFC 3339 or YYYY-MM-DD, got '{}'", raw),
    })
}

fn record_fields(record: Option<&Value>) -> Result<FieldMap, ValidationError> {
    match record {
        None | Some(Value::Null) => Err(ValidationError::RequiredFieldMissing {
            field: "record".to_string(),
        }),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ValidationError::InvalidValue {
            field: "record".to_string(),
            reason: "expected a JSON object".to_string(),
        }),
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Uniform response: a success payload or an error body, plus its status.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: StatusCode,
    pub body: Value,
}

impl Envelope {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl From<ApiError> for Envelope {
    fn from(err: ApiError) -> Self {
        let status = err.status_code();
        let body = serde_json::to_value(&err)
            .unwrap_or_else(|_| json!({ "error": err.message, "code": err.code }));
        Self { status, body }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Resolved target of a command.
enum Target {
    None,
    Existing(Arc<Table>),
    /// Only `create` may name a table that does not exist yet.
    Missing(String),
}

/// Routes decoded requests through the permission gate to the catalog.
///
/// All methods are synchronous; the HTTP layer runs them on the blocking
/// pool.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    auth: Arc<AuthConfig>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>, auth: AuthConfig) -> Self {
        Self {
            catalog,
            auth: Arc::new(auth),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn handle_read(&self, req: &ReadRequest) -> Envelope {
        let decoded = Command::decode_read(req).map_err(ApiError::from);
        self.respond(decoded, req.api_key.as_deref())
    }

    pub fn handle_write(&self, req: &WriteRequest) -> Envelope {
        let decoded = Command::decode_write(req).map_err(ApiError::from);
        self.respond(decoded, req.api_key.as_deref())
    }

    /// Decode a raw JSON body first; malformed JSON is an invalid-input error.
    pub fn handle_write_body(&self, body: &[u8]) -> Envelope {
        match serde_json::from_slice::<WriteRequest>(body) {
            Ok(req) => self.handle_write(&req),
            Err(e) => {
                debug!(error = %e, "undecodable write body");
                ApiError::from(e).into()
            }
        }
    }

    fn respond(&self, decoded: ApiResult<Command>, api_key: Option<&str>) -> Envelope {
        let outcome = decoded.and_then(|command| self.dispatch(command, api_key));
        match outcome {
            Ok(envelope) => envelope,
            Err(err) => {
                if err.code.is_retryable() {
                    warn!(code = %err.code, message = %err.message, "request failed, retryable");
                } else {
                    debug!(code = %err.code, message = %err.message, "request failed");
                }
                err.into()
            }
        }
    }

    fn dispatch(&self, command: Command, api_key: Option<&str>) -> ApiResult<Envelope> {
        let action = command.action();
        let role = self
            .auth
            .resolve_role(api_key)
            .ok_or_else(|| ApiError::from(AccessError::Unauthorized))?;
        let target = self.resolve_target(&command)?;
        self.authorize(&role, action)?;

        if action.is_mutation() {
            info!(action = %action, table = ?command.table(), role = %role.name, "dispatching");
        } else {
            debug!(action = %action, table = ?command.table(), role = %role.name, "dispatching");
        }
        self.execute(command, target)
    }

    fn resolve_target(&self, command: &Command) -> ApiResult<Target> {
        let Some(name) = command.table() else {
            return Ok(Target::None);
        };
        if let Command::Create { .. } = command {
            return Ok(match self.catalog.find_table(name)? {
                Some(table) => Target::Existing(table),
                None => Target::Missing(name.to_string()),
            });
        }
        Ok(Target::Existing(self.catalog.get_table(name)?))
    }

    fn authorize(&self, role: &Role, action: Action) -> ApiResult<()> {
        require_permission(Some(role), action.permission()).map_err(|e| {
            debug!(role = %role.name, action = %action, "permission denied");
            ApiError::from(e)
        })
    }

    fn execute(&self, command: Command, target: Target) -> ApiResult<Envelope> {
        let table = match target {
            Target::Existing(table) => Some(table),
            // Provisioned here so an unauthorized create never creates a sheet.
            Target::Missing(name) => Some(self.catalog.provision(&name)?),
            Target::None => None,
        };
        let table = || {
            table
                .clone()
                .ok_or_else(|| ApiError::internal_error("command resolved without a table"))
        };

        let envelope = match command {
            Command::Tables => Envelope::ok(json!({ "tables": self.catalog.list_tables()? })),
            Command::Schema { .. } => Envelope::ok(serde_json::to_value(table()?.schema()?)?),
            Command::Get { id, options, .. } => Envelope::ok(table()?.get(&id, options)?.to_json()),
            Command::List { query, .. } => {
                let page = table()?.list(&query)?;
                let mut body = serde_json::to_value(&page)?;
                if !query.filters.ignored.is_empty() {
                    body["ignoredFilters"] = serde_json::to_value(&query.filters.ignored)?;
                }
                Envelope::ok(body)
            }
            Command::Create {
                fields, options, ..
            } => {
                let outcome = table()?.create(&fields, options)?;
                if outcome.created {
                    Envelope::created(outcome.record.to_json())
                } else {
                    Envelope::ok(outcome.record.to_json())
                }
            }
            Command::Update {
                id, patch, options, ..
            } => Envelope::ok(table()?.update(&id, &patch, options)?.to_json()),
            Command::Delete {
                id, hard, context, ..
            } => {
                if hard {
                    let removed = table()?.hard_delete(&id, context)?;
                    Envelope::ok(json!({ "id": removed.id, "deleted": true, "hard": true }))
                } else {
                    Envelope::ok(table()?.soft_delete(&id, context)?.to_json())
                }
            }
            Command::Restore { id, context, .. } => {
                Envelope::ok(table()?.restore(&id, context)?.to_json())
            }
            Command::Archive { cutoff, .. } => {
                Envelope::ok(serde_json::to_value(table()?.archive_older_than(cutoff)?)?)
            }
            Command::Backup { .. } => Envelope::ok(serde_json::to_value(table()?.backup()?)?),
            Command::Maintenance => {
                Envelope::ok(serde_json::to_value(self.catalog.run_maintenance()?)?)
            }
        };
        Ok(envelope)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::EngineConfig;
    use tabula_storage::{BackingStore, InMemorySheetStore};

    fn dispatcher() -> (Dispatcher, Arc<InMemorySheetStore>) {
        let store = Arc::new(InMemorySheetStore::new());
        let catalog = Catalog::new(store.clone(), EngineConfig::default()).unwrap();
        let mut auth = AuthConfig::new();
        auth.add_api_key("k-admin", "admin");
        auth.add_api_key("k-reader", "reader");
        auth.add_api_key("k-writer", "writer");
        (Dispatcher::new(Arc::new(catalog), auth), store)
    }

    fn write(body: Value) -> WriteRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_action_permissions() {
        assert_eq!(Action::List.permission(), Permissions::READ);
        assert_eq!(Action::Tables.permission(), Permissions::READ);
        assert_eq!(Action::Update.permission(), Permissions::WRITE);
        assert_eq!(Action::Restore.permission(), Permissions::DELETE);
        assert_eq!(Action::Maintenance.permission(), Permissions::MANAGE);
        assert!(Action::Create.is_mutation());
        assert!(!Action::Get.is_mutation());
    }

    #[test]
    fn test_read_action_selection() {
        assert_eq!(Action::for_read(None, true).unwrap(), Action::Get);
        assert_eq!(Action::for_read(Some(""), false).unwrap(), Action::List);
        assert_eq!(Action::for_read(Some("Schema"), false).unwrap(), Action::Schema);
        assert!(matches!(
            Action::for_read(Some("create"), false),
            Err(ValidationError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_lenient_flags() {
        let req = write(json!({"hard": "1", "allowDeleted": "TRUE"}));
        assert!(req.hard);
        assert!(req.allow_deleted);
        let req = write(json!({"hard": "yes", "allowDeleted": null}));
        assert!(!req.hard);
        assert!(!req.allow_deleted);
    }

    #[test]
    fn test_decode_errors_precede_auth() {
        let (dispatcher, _) = dispatcher();
        let env = dispatcher.handle_write(&write(json!({"action": "update", "table": "T"})));
        assert_eq!(env.status, StatusCode::BAD_REQUEST);
        assert_eq!(env.body["code"], "MISSING_FIELD");
    }

    #[test]
    fn test_unknown_key_is_unauthorized() {
        let (dispatcher, store) = dispatcher();
        let env = dispatcher.handle_write(&write(json!({
            "apiKey": "nope", "action": "create", "table": "Widgets", "record": {"name": "A"}
        })));
        assert_eq!(env.status, StatusCode::BAD_REQUEST);
        assert_eq!(env.body["code"], "UNAUTHORIZED");
        assert!(!store.has_sheet("Widgets").unwrap());
    }

    #[test]
    fn test_forbidden_create_does_not_provision() {
        let (dispatcher, store) = dispatcher();
        let env = dispatcher.handle_write(&write(json!({
            "apiKey": "k-reader", "action": "create", "table": "Widgets", "record": {"name": "A"}
        })));
        assert_eq!(env.body["code"], "FORBIDDEN");
        assert!(!store.has_sheet("Widgets").unwrap());
    }

    #[test]
    fn test_create_then_replay() {
        let (dispatcher, store) = dispatcher();
        let body = json!({
            "apiKey": "k-writer", "action": "create", "table": "Widgets",
            "record": {"name": "A"}, "idempotencyKey": "idem-1"
        });
        let first = dispatcher.handle_write(&write(body.clone()));
        assert_eq!(first.status, StatusCode::CREATED);
        let replay = dispatcher.handle_write(&write(body));
        assert_eq!(replay.status, StatusCode::OK);
        assert_eq!(first.body["ID"], replay.body["ID"]);
        assert_eq!(store.data_row_count("Widgets"), 1);
    }

    #[test]
    fn test_read_missing_table_is_not_found() {
        let (dispatcher, store) = dispatcher();
        let env = dispatcher.handle_read(&ReadRequest {
            api_key: Some("k-reader".into()),
            table: Some("Ghost".into()),
            ..Default::default()
        });
        assert_eq!(env.status, StatusCode::NOT_FOUND);
        assert_eq!(env.body["code"], "TABLE_NOT_FOUND");
        assert!(!store.has_sheet("Ghost").unwrap());
    }

    #[test]
    fn test_list_reports_ignored_filters() {
        let (dispatcher, _) = dispatcher();
        dispatcher.handle_write(&write(json!({
            "apiKey": "k-admin", "action": "create", "table": "T", "record": {"n": 1}
        })));
        let env = dispatcher.handle_read(&ReadRequest {
            api_key: Some("k-reader".into()),
            table: Some("T".into()),
            filter: Some(r#"[{"field":"n","operator":"~","value":1},{"field":"n","operator":"=","value":1}]"#.into()),
            ..Default::default()
        });
        assert_eq!(env.status, StatusCode::OK);
        assert_eq!(env.body["total"], 1);
        assert_eq!(env.body["ignoredFilters"][0]["index"], 0);
    }

    #[test]
    fn test_non_array_filter_rejected() {
        let (dispatcher, _) = dispatcher();
        dispatcher.handle_write(&write(json!({
            "apiKey": "k-admin", "action": "create", "table": "T", "record": {"n": 1}
        })));
        let env = dispatcher.handle_read(&ReadRequest {
            api_key: Some("k-reader".into()),
            table: Some("T".into()),
            filter: Some(r#"{"field":"n"}"#.into()),
            ..Default::default()
        });
        assert_eq!(env.status, StatusCode::BAD_REQUEST);
        assert_eq!(env.body["code"], "VALIDATION_FAILED");
    }

    #[test]
    fn test_bad_json_body() {
        let (dispatcher, _) = dispatcher();
        let env = dispatcher.handle_write_body(b"{not json");
        assert_eq!(env.status, StatusCode::BAD_REQUEST);
        assert_eq!(env.body["code"], "INVALID_INPUT");
    }

    #[test]
    fn test_hard_delete_payload() {
        let (dispatcher, store) = dispatcher();
        let created = dispatcher.handle_write(&write(json!({
            "apiKey": "k-admin", "action": "create", "table": "T", "record": {"n": 1}
        })));
        let id = created.body["ID"].as_str().unwrap().to_string();
        let env = dispatcher.handle_write(&write(json!({
            "apiKey": "k-admin", "action": "delete", "table": "T", "id": id, "hard": true
        })));
        assert_eq!(env.status, StatusCode::OK);
        assert_eq!(env.body["hard"], true);
        assert_eq!(store.data_row_count("T"), 0);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let req = write(json!({"apiKey": "super-secret", "action": "backup"}));
        assert!(!format!("{:?}", req).contains("super-secret"));
    }
}
