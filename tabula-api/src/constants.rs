//! Constants for Tabula API

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Path of the optional TOML configuration file
pub const ENV_CONFIG_PATH: &str = "TABULA_CONFIG";

pub const ENV_BIND: &str = "TABULA_API_BIND";

pub const ENV_PORT: &str = "PORT";

pub const ENV_LOCK_TIMEOUT_MS: &str = "TABULA_LOCK_TIMEOUT_MS";

pub const ENV_DEFAULT_PAGE_SIZE: &str = "TABULA_DEFAULT_PAGE_SIZE";

/// `key:role,key2:role2`
pub const ENV_API_KEYS: &str = "TABULA_API_KEYS";

/// `role=read+write;role2=read`
pub const ENV_ROLES: &str = "TABULA_ROLES";

/// `json` (default) or `pretty`
pub const ENV_LOG_FORMAT: &str = "TABULA_LOG_FORMAT";

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "tabula_api=debug,tower_http=info,info";
