//! Permission taxonomy and role checks.
//!
//! The taxonomy is fixed: `read`, `write`, `delete`, `manage`. A role is a
//! named subset of it; an API key resolves to at most one role.

use crate::AccessError;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

bitflags! {
    /// Set of permissions granted to a role.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        /// get, list, schema, tables
        const READ = 0b0001;
        /// create, update
        const WRITE = 0b0010;
        /// soft delete, hard delete, restore
        const DELETE = 0b0100;
        /// archive, backup, maintenance
        const MANAGE = 0b1000;
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::empty()
    }
}

impl Permissions {
    /// Parse a single permission name. `all` and `*` expand to every permission.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "read" => Some(Permissions::READ),
            "write" => Some(Permissions::WRITE),
            "delete" => Some(Permissions::DELETE),
            "manage" => Some(Permissions::MANAGE),
            "all" | "*" => Some(Permissions::all()),
            _ => None,
        }
    }

    /// Parse a `read+write` or `read,write` list.
    pub fn parse_list(list: &str) -> Option<Self> {
        list.split(['+', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_fold(Permissions::empty(), |acc, name| {
                Self::parse_name(name).map(|p| acc | p)
            })
    }

    /// Lowercase names of the contained permissions, in taxonomy order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (flag, name) in [
            (Permissions::READ, "read"),
            (Permissions::WRITE, "write"),
            (Permissions::DELETE, "delete"),
            (Permissions::MANAGE, "manage"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        names
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("+"))
    }
}

// Serialized as a list of names so configuration files stay readable.
impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names.iter().try_fold(Permissions::empty(), |acc, name| {
            Permissions::parse_name(name)
                .map(|p| acc | p)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown permission: {}", name)))
        })
    }
}

/// A named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub permissions: Permissions,
}

impl Role {
    pub fn new(name: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            name: name.into(),
            permissions,
        }
    }

    pub fn allows(&self, needed: Permissions) -> bool {
        self.permissions.contains(needed)
    }
}

/// Role name → permission set. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleTable(BTreeMap<String, Permissions>);

impl Default for RoleTable {
    /// The built-in roles: `admin`, `editor`, `writer`, `reader`.
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert("admin".to_string(), Permissions::all());
        roles.insert(
            "editor".to_string(),
            Permissions::READ | Permissions::WRITE | Permissions::DELETE,
        );
        roles.insert("writer".to_string(), Permissions::READ | Permissions::WRITE);
        roles.insert("reader".to_string(), Permissions::READ);
        Self(roles)
    }
}

impl RoleTable {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Define or replace a role.
    pub fn insert(&mut self, name: impl Into<String>, permissions: Permissions) {
        self.0.insert(name.into(), permissions);
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        self.0.get(name).map(|p| Role::new(name, *p))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Merge another table over this one; entries in `other` win.
    pub fn merge(&mut self, other: RoleTable) {
        self.0.extend(other.0);
    }
}

/// Gate check: Unauthorized without a role, Forbidden when the role lacks
/// the permission.
pub fn require_permission(role: Option<&Role>, needed: Permissions) -> Result<(), AccessError> {
    let role = role.ok_or(AccessError::Unauthorized)?;
    if role.allows(needed) {
        Ok(())
    } else {
        Err(AccessError::Forbidden {
            role: role.name.clone(),
            permission: needed.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles() {
        let roles = RoleTable::default();
        let reader = roles.role("reader").unwrap();
        assert!(reader.allows(Permissions::READ));
        assert!(!reader.allows(Permissions::WRITE));
        assert!(roles.role("admin").unwrap().allows(Permissions::MANAGE));
        assert!(!roles.role("editor").unwrap().allows(Permissions::MANAGE));
        assert!(roles.role("nobody").is_none());
    }

    #[test]
    fn test_require_permission_outcomes() {
        let reader = Role::new("reader", Permissions::READ);
        assert!(require_permission(Some(&reader), Permissions::READ).is_ok());
        assert_eq!(
            require_permission(None, Permissions::READ),
            Err(AccessError::Unauthorized)
        );
        assert!(matches!(
            require_permission(Some(&reader), Permissions::DELETE),
            Err(AccessError::Forbidden { ref permission, .. }) if permission == "delete"
        ));
    }

    #[test]
    fn test_parse_name_is_case_insensitive() {
        assert_eq!(Permissions::parse_name(" Manage "), Some(Permissions::MANAGE));
        assert_eq!(Permissions::parse_name("*"), Some(Permissions::all()));
        assert_eq!(Permissions::parse_name("fly"), None);
        // The flag-name lookup from bitflags stays exact.
        assert_eq!(Permissions::from_name("READ"), Some(Permissions::READ));
        assert_eq!(Permissions::from_name("read"), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            Permissions::parse_list("read+write"),
            Some(Permissions::READ | Permissions::WRITE)
        );
        assert_eq!(Permissions::parse_list("all"), Some(Permissions::all()));
        assert_eq!(Permissions::parse_list("read,fly"), None);
    }

    #[test]
    fn test_serde_uses_names() -> Result<(), serde_json::Error> {
        let perms = Permissions::READ | Permissions::MANAGE;
        let json = serde_json::to_string(&perms)?;
        assert_eq!(json, r#"["read","manage"]"#);
        let back: Permissions = serde_json::from_str(&json)?;
        assert_eq!(back, perms);
        assert!(serde_json::from_str::<Permissions>(r#"["root"]"#).is_err());
        Ok(())
    }
}
