//! Server Configuration
//!
//! Configuration comes from an optional TOML file named by `TABULA_CONFIG`,
//! then environment overrides. It is loaded once at startup.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 3000
//!
//! [engine]
//! lock_timeout_ms = 5000
//!
//! [[engine.tables]]
//! name = "Widgets"
//! columns = [{ name = "name", kind = "text" }]
//! required = ["name"]
//!
//! [access.roles]
//! auditor = ["read"]
//!
//! [access.keys]
//! "k-123" = "admin"
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;

use serde::Deserialize;
use tabula_core::{ConfigError, EngineConfig, RoleTable};

use crate::auth::{parse_api_keys, parse_roles, AuthConfig};
use crate::constants::{
    DEFAULT_BIND_HOST, DEFAULT_PORT, ENV_API_KEYS, ENV_BIND, ENV_CONFIG_PATH,
    ENV_DEFAULT_PAGE_SIZE, ENV_LOCK_TIMEOUT_MS, ENV_PORT, ENV_ROLES,
};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ServerSection {
    bind: String,
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AccessSection {
    /// Merged over the built-in roles
    roles: Option<RoleTable>,
    keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: ServerSection,
    engine: EngineConfig,
    access: AccessSection,
}

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub engine: EngineConfig,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            engine: EngineConfig::default(),
            auth: AuthConfig::new(),
        }
    }
}

impl ServerConfig {
    /// Load from `TABULA_CONFIG` (if set) and the process environment.
    pub fn load() -> ApiResult<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) => {
                let raw = std::fs::read_to_string(&path).map_err(|e| {
                    ApiError::internal_error(format!("Failed to read {}: {}", path, e))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            field: ENV_CONFIG_PATH.to_string(),
            value: "<file>".to_string(),
            reason: e.to_string(),
        })?;

        let mut auth = AuthConfig::new();
        if let Some(roles) = file.access.roles {
            auth.merge_roles(roles);
        }
        for (key, role) in file.access.keys {
            auth.add_api_key(key, role);
        }
        Ok(Self {
            host: file.server.bind,
            port: file.server.port,
            engine: file.engine,
            auth,
        })
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BIND).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: ENV_PORT.to_string(),
                value: port.clone(),
                reason: "expected a port number".to_string(),
            })?;
        }
        if let Some(ms) = lookup(ENV_LOCK_TIMEOUT_MS).and_then(|s| s.trim().parse().ok()) {
            self.engine.lock_timeout_ms = ms;
        }
        if let Some(size) = lookup(ENV_DEFAULT_PAGE_SIZE).and_then(|s| s.trim().parse().ok()) {
            self.engine.default_page_size = size;
        }
        if let Some(raw) = lookup(ENV_ROLES) {
            self.auth.merge_roles(parse_roles(&raw)?);
        }
        if let Some(raw) = lookup(ENV_API_KEYS) {
            for (key, role) in parse_api_keys(&raw)? {
                self.auth.add_api_key(key, role);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.auth.validate()
    }

    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tabula_core::Permissions;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.validate().is_ok());
        assert!(config.bind_addr().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            [server]
            port = 8080

            [engine]
            lock_timeout_ms = 250

            [[engine.tables]]
            name = "Widgets"
            columns = [{ name = "name", kind = "text" }]
            required = ["name"]

            [access.roles]
            auditor = ["read"]

            [access.keys]
            "k-1" = "auditor"
            "k-2" = "admin"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.engine.lock_timeout_ms, 250);
        assert_eq!(config.engine.tables[0].required, vec!["name".to_string()]);
        assert_eq!(config.auth.resolve_role(Some("k-1")).unwrap().name, "auditor");
        // Built-ins survive the merge.
        assert!(config
            .auth
            .resolve_role(Some("k-2"))
            .unwrap()
            .allows(Permissions::MANAGE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            ServerConfig::from_toml_str("[server\nport = 1"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("TABULA_API_BIND", "127.0.0.1"),
                ("PORT", "9000"),
                ("TABULA_LOCK_TIMEOUT_MS", "100"),
                ("TABULA_ROLES", "ops=read+manage"),
                ("TABULA_API_KEYS", "k-ops:ops,k-r:reader"),
            ]))
            .unwrap();

        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:9000");
        assert_eq!(config.engine.lock_timeout_ms, 100);
        assert!(config
            .auth
            .resolve_role(Some("k-ops"))
            .unwrap()
            .allows(Permissions::MANAGE));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_for_unknown_role_fails_validation() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[("TABULA_API_KEYS", "k:nobody")]))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("PORT", "http")])).is_err());
    }
}
