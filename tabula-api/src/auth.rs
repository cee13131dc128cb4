//! Permission gate: API key → role resolution.
//!
//! The key table and role table are built once at startup and never change
//! while the process runs. Key material is never logged.

use std::collections::HashMap;

use tabula_core::{ConfigError, Permissions, Role, RoleTable};

/// Process-wide key→role mapping plus the role definitions it refers to.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// API key → role name
    api_keys: HashMap<String, String>,
    roles: RoleTable,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format!("[{} keys]", self.api_keys.len()))
            .field("roles", &self.roles)
            .finish()
    }
}

impl AuthConfig {
    /// Built-in roles, no keys.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: RoleTable) -> Self {
        Self {
            api_keys: HashMap::new(),
            roles,
        }
    }

    /// Bind a key to a role name. Later bindings of the same key win.
    pub fn add_api_key(&mut self, key: impl Into<String>, role: impl Into<String>) {
        self.api_keys.insert(key.into(), role.into());
    }

    /// Define or replace a role.
    pub fn add_role(&mut self, name: impl Into<String>, permissions: Permissions) {
        self.roles.insert(name, permissions);
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    pub fn merge_roles(&mut self, roles: RoleTable) {
        self.roles.merge(roles);
    }

    pub fn key_count(&self) -> usize {
        self.api_keys.len()
    }

    /// Role for a presented key. Unknown, blank and absent keys resolve to
    /// no role.
    pub fn resolve_role(&self, api_key: Option<&str>) -> Option<Role> {
        let key = api_key.map(str::trim).filter(|k| !k.is_empty())?;
        let role_name = self.api_keys.get(key)?;
        self.roles.role(role_name)
    }

    /// Every key must point at a defined role.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in self.api_keys.values() {
            if !self.roles.contains(role) {
                return Err(ConfigError::UnknownRole { role: role.clone() });
            }
        }
        Ok(())
    }
}

/// Parse `key:role,key2:role2`.
pub fn parse_api_keys(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (key, role) = entry.split_once(':').ok_or_else(|| ConfigError::InvalidValue {
                field: "TABULA_API_KEYS".to_string(),
                // Never echo key material.
                value: "<redacted>".to_string(),
                reason: "expected key:role".to_string(),
            })?;
            let (key, role) = (key.trim(), role.trim());
            if key.is_empty() || role.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "TABULA_API_KEYS".to_string(),
                    value: "<redacted>".to_string(),
                    reason: "key and role must be non-empty".to_string(),
                });
            }
            Ok((key.to_string(), role.to_string()))
        })
        .collect()
}

/// Parse `role=read+write;role2=read`.
pub fn parse_roles(raw: &str) -> Result<RoleTable, ConfigError> {
    let mut roles = RoleTable::empty();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "TABULA_ROLES".to_string(),
            value: entry.to_string(),
            reason: reason.to_string(),
        };
        let (name, perms) = entry
            .split_once('=')
            .ok_or_else(|| invalid("expected role=permissions"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("role name is empty"));
        }
        let permissions =
            Permissions::parse_list(perms).ok_or_else(|| invalid("unknown permission"))?;
        roles.insert(name, permissions);
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::{require_permission, AccessError};

    fn config() -> AuthConfig {
        let mut config = AuthConfig::new();
        config.add_api_key("k-admin", "admin");
        config.add_api_key("k-reader", "reader");
        config.add_api_key("k-ghost", "ghost");
        config
    }

    #[test]
    fn test_resolve_role() {
        let config = config();
        assert_eq!(config.resolve_role(Some("k-admin")).unwrap().name, "admin");
        assert_eq!(config.resolve_role(Some(" k-reader ")).unwrap().name, "reader");
        assert!(config.resolve_role(Some("nope")).is_none());
        assert!(config.resolve_role(Some("")).is_none());
        assert!(config.resolve_role(None).is_none());
        // Key bound to an undefined role resolves to nothing.
        assert!(config.resolve_role(Some("k-ghost")).is_none());
    }

    #[test]
    fn test_resolved_role_feeds_permission_check() {
        let config = config();
        let reader = config.resolve_role(Some("k-reader"));
        assert!(require_permission(reader.as_ref(), Permissions::READ).is_ok());
        assert!(matches!(
            require_permission(reader.as_ref(), Permissions::WRITE),
            Err(AccessError::Forbidden { .. })
        ));
        assert_eq!(
            require_permission(config.resolve_role(None).as_ref(), Permissions::READ),
            Err(AccessError::Unauthorized)
        );
    }

    #[test]
    fn test_validate_rejects_unknown_role() {
        assert!(matches!(
            config().validate(),
            Err(ConfigError::UnknownRole { ref role }) if role == "ghost"
        ));
    }

    #[test]
    fn test_parse_api_keys() {
        let keys = parse_api_keys("a:admin, b:reader ,").unwrap();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), "admin".to_string()),
                ("b".to_string(), "reader".to_string())
            ]
        );
        let err = parse_api_keys("secret-without-role").unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn test_parse_roles() {
        let roles = parse_roles("auditor=read; ops=read+manage").unwrap();
        assert_eq!(
            roles.role("ops").unwrap().permissions,
            Permissions::READ | Permissions::MANAGE
        );
        assert!(parse_roles("x=fly").is_err());
        assert!(parse_roles("=read").is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("k-admin"));
        assert!(rendered.contains("[3 keys]"));
    }
}
