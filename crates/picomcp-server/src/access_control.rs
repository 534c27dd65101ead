//! Role-based access control for tools.
//!
//! API keys map to roles; tools carry allow-sets of roles. Unmapped callers
//! fall back to the default role. An empty allow-set addresses a tool to no
//! one; removing a role scrubs it from every key mapping and allow-set.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// RBAC state: roles, key mappings, and per-tool allow-sets.
#[derive(Debug, Default)]
pub struct AccessControl {
    enabled: bool,
    default_role: String,
    roles: BTreeSet<String>,
    key_to_role: BTreeMap<String, String>,
    tool_roles: BTreeMap<String, BTreeSet<String>>,
}

impl AccessControl {
    /// Create a disabled controller with the `guest` default role.
    pub fn new() -> Self {
        Self {
            enabled: false,
            default_role: "guest".to_string(),
            roles: BTreeSet::new(),
            key_to_role: BTreeMap::new(),
            tool_roles: BTreeMap::new(),
        }
    }

    /// Define a role.
    pub fn add_role(&mut self, role: &str) {
        self.roles.insert(role.to_string());
    }

    /// Remove a role and every association: key mappings to it and its
    /// membership in every tool allow-set.
    pub fn remove_role(&mut self, role: &str) {
        self.roles.remove(role);
        self.key_to_role.retain(|_, r| r != role);
        for allowed in self.tool_roles.values_mut() {
            allowed.remove(role);
        }
    }

    /// True when the role is defined.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// All defined roles.
    pub fn roles(&self) -> Vec<String> {
        self.roles.iter().cloned().collect()
    }

    /// Map an API key to a role; the role is auto-defined if new. A key
    /// holds exactly one role.
    pub fn map_key_to_role(&mut self, api_key: &str, role: &str) {
        self.key_to_role
            .insert(api_key.to_string(), role.to_string());
        self.roles.insert(role.to_string());
    }

    /// Remove a key mapping.
    pub fn unmap_key(&mut self, api_key: &str) {
        self.key_to_role.remove(api_key);
    }

    /// The role mapped to a key, or empty when unmapped.
    pub fn role_for_key(&self, api_key: &str) -> String {
        self.key_to_role.get(api_key).cloned().unwrap_or_default()
    }

    /// Restrict a tool to the listed roles. An empty list addresses the
    /// tool to no one.
    pub fn restrict_tool(&mut self, tool: &str, allowed_roles: &[&str]) {
        let set: BTreeSet<String> = allowed_roles.iter().map(|r| r.to_string()).collect();
        self.tool_roles.insert(tool.to_string(), set);
    }

    /// Lift restrictions from a tool (any role may call it again).
    pub fn unrestrict_tool(&mut self, tool: &str) {
        self.tool_roles.remove(tool);
    }

    /// True when the tool carries a restriction entry.
    pub fn is_tool_restricted(&self, tool: &str) -> bool {
        self.tool_roles.contains_key(tool)
    }

    /// The allow-set for a tool; empty for unrestricted tools.
    pub fn tool_allowed_roles(&self, tool: &str) -> Vec<String> {
        self.tool_roles
            .get(tool)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Set the role used by unauthenticated or unmapped callers. An empty
    /// string means "no role".
    pub fn set_default_role(&mut self, role: &str) {
        self.default_role = role.to_string();
        if !role.is_empty() {
            self.roles.insert(role.to_string());
        }
    }

    /// The default role.
    pub fn default_role(&self) -> &str {
        &self.default_role
    }

    /// Resolve the caller role for an optional API key.
    pub fn resolve_role(&self, api_key: Option<&str>) -> String {
        if let Some(key) = api_key {
            if !key.is_empty() {
                if let Some(role) = self.key_to_role.get(key) {
                    return role.clone();
                }
            }
        }
        self.default_role.clone()
    }

    /// The access decision: disabled → allow; unrestricted tool → allow;
    /// otherwise the caller's role must be in the allow-set (an empty
    /// caller role never matches).
    pub fn can_access(&self, tool: &str, api_key: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(allowed) = self.tool_roles.get(tool) else {
            return true;
        };
        let role = self.resolve_role(api_key);
        if role.is_empty() {
            return false;
        }
        allowed.contains(&role)
    }

    /// Enable RBAC checking.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable RBAC checking; `can_access` always allows.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether RBAC checking is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Tools from `all_tools` that are unrestricted or explicitly allow
    /// `role`.
    pub fn tools_for_role(&self, role: &str, all_tools: &[String]) -> Vec<String> {
        all_tools
            .iter()
            .filter(|tool| match self.tool_roles.get(*tool) {
                None => true,
                Some(allowed) => allowed.contains(role),
            })
            .cloned()
            .collect()
    }

    /// Serialize the RBAC configuration.
    pub fn to_json(&self) -> Value {
        let restrictions: serde_json::Map<String, Value> = self
            .tool_roles
            .iter()
            .map(|(tool, roles)| {
                (
                    tool.clone(),
                    Value::Array(roles.iter().map(|r| Value::String(r.clone())).collect()),
                )
            })
            .collect();
        serde_json::json!({
            "enabled": self.enabled,
            "defaultRole": self.default_role,
            "roles": self.roles.iter().cloned().collect::<Vec<_>>(),
            "toolRestrictions": restrictions,
            "keyMappings": self.key_to_role.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rbac() -> AccessControl {
        let mut ac = AccessControl::new();
        ac.enable();
        ac.add_role("admin");
        ac.add_role("viewer");
        ac.map_key_to_role("secret-admin-key", "admin");
        ac.map_key_to_role("read-only-key", "viewer");
        ac
    }

    #[test]
    fn disabled_allows_everything() {
        let mut ac = AccessControl::new();
        ac.restrict_tool("gpio_write", &["admin"]);
        assert!(ac.can_access("gpio_write", None));
    }

    #[test]
    fn unrestricted_tool_allows_any_role() {
        let ac = rbac();
        assert!(ac.can_access("i2c_scan", None));
        assert!(ac.can_access("i2c_scan", Some("read-only-key")));
    }

    #[test]
    fn restricted_tool_gates_by_role() {
        let mut ac = rbac();
        ac.restrict_tool("gpio_write", &["admin"]);
        assert!(ac.can_access("gpio_write", Some("secret-admin-key")));
        assert!(!ac.can_access("gpio_write", Some("read-only-key")));
        // Unmapped key falls back to the default role (guest).
        assert!(!ac.can_access("gpio_write", Some("unknown-key")));
        assert!(!ac.can_access("gpio_write", None));
    }

    #[test]
    fn empty_allow_set_addresses_no_one() {
        let mut ac = rbac();
        ac.restrict_tool("reboot", &[]);
        assert!(!ac.can_access("reboot", Some("secret-admin-key")));
        assert!(!ac.can_access("reboot", None));
    }

    #[test]
    fn empty_default_role_means_no_role() {
        let mut ac = rbac();
        ac.set_default_role("");
        ac.restrict_tool("gpio_read", &["viewer"]);
        assert!(!ac.can_access("gpio_read", None));
        assert!(ac.can_access("gpio_read", Some("read-only-key")));
    }

    #[test]
    fn mapping_auto_defines_role() {
        let mut ac = AccessControl::new();
        ac.map_key_to_role("k", "operator");
        assert!(ac.has_role("operator"));
        assert_eq!(ac.role_for_key("k"), "operator");
        ac.unmap_key("k");
        assert_eq!(ac.role_for_key("k"), "");
    }

    #[test]
    fn remove_role_is_transitively_consistent() {
        let mut ac = rbac();
        ac.restrict_tool("gpio_write", &["admin", "viewer"]);
        ac.restrict_tool("gpio_read", &["viewer"]);
        ac.remove_role("viewer");

        assert!(!ac.has_role("viewer"));
        assert_eq!(ac.role_for_key("read-only-key"), "");
        assert!(!ac.tool_allowed_roles("gpio_write").contains(&"viewer".to_string()));
        assert!(ac.tool_allowed_roles("gpio_read").is_empty());
        // gpio_read retains its (now empty) restriction entry: no one may call it.
        assert!(!ac.can_access("gpio_read", Some("secret-admin-key")));
    }

    #[test]
    fn unrestrict_tool_reopens_access() {
        let mut ac = rbac();
        ac.restrict_tool("gpio_write", &["admin"]);
        ac.unrestrict_tool("gpio_write");
        assert!(ac.can_access("gpio_write", Some("read-only-key")));
        assert!(!ac.is_tool_restricted("gpio_write"));
    }

    #[test]
    fn tools_for_role_listing() {
        let mut ac = rbac();
        ac.restrict_tool("gpio_write", &["admin"]);
        let all = vec!["gpio_write".to_string(), "gpio_read".to_string()];
        assert_eq!(ac.tools_for_role("viewer", &all), vec!["gpio_read".to_string()]);
        assert_eq!(ac.tools_for_role("admin", &all).len(), 2);
    }

    #[test]
    fn json_snapshot() {
        let mut ac = rbac();
        ac.restrict_tool("gpio_write", &["admin"]);
        let json = ac.to_json();
        assert_eq!(json["enabled"], true);
        assert_eq!(json["defaultRole"], "guest");
        assert_eq!(json["keyMappings"], 2);
        assert_eq!(json["toolRestrictions"]["gpio_write"][0], "admin");
    }
}
