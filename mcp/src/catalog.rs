//! Aggregated tool catalog (part of component C) and the disambiguation algorithm.
//!
//! Unlike the upstream-focused inventory this module is adapted from, public
//! names here are renamed on collision rather than merely indexed by both
//! names — the catalog holds exactly one entry per public name.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::config::Tool;

/// One tool as advertised to downstream consumers, after disambiguation.
#[derive(Debug, Clone)]
pub struct ToolCatalogEntry {
    pub public_name: String,
    pub original_name: String,
    pub service_name: String,
    pub description: Option<String>,
    pub input_schema: std::sync::Arc<serde_json::Map<String, serde_json::Value>>,
}

impl ToolCatalogEntry {
    pub fn to_tool(&self) -> Tool {
        Tool::new(
            self.public_name.clone(),
            self.description.clone().map(Into::into),
            (*self.input_schema).clone(),
        )
    }
}

/// `publicName → ToolCatalogEntry`, insertion order preserved for deterministic
/// enumeration (§3).
#[derive(Debug, Default)]
pub struct ToolCatalog {
    entries: IndexMap<String, ToolCatalogEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, public_name: &str) -> Option<&ToolCatalogEntry> {
        self.entries.get(public_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolCatalogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry that belongs to `service_name`.
    pub fn remove_service(&mut self, service_name: &str) {
        self.entries.retain(|_, e| e.service_name != service_name);
    }

    /// Rebuild the whole catalog from the current tool lists of every service,
    /// applying the disambiguation algorithm (§4.C) fresh. Deterministic given
    /// the same `(service order, per-service tool order)` input.
    pub fn rebuild(&mut self, services: &IndexMap<String, Vec<Tool>>) {
        self.entries = disambiguate(services);
    }
}

/// Pure function: for each tool `t` of service `s`, if no other service has a
/// tool named `t.name`, `publicName = t.name`; otherwise
/// `publicName = s.name + "__" + t.name`.
pub fn disambiguate(services: &IndexMap<String, Vec<Tool>>) -> IndexMap<String, ToolCatalogEntry> {
    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for tools in services.values() {
        for t in tools {
            *name_counts.entry(t.name.as_ref()).or_insert(0) += 1;
        }
    }

    let mut out = IndexMap::new();
    for (service_name, tools) in services {
        for t in tools {
            let collides = name_counts.get(t.name.as_ref()).copied().unwrap_or(0) > 1;
            let public_name = if collides {
                format!("{service_name}__{}", t.name)
            } else {
                t.name.to_string()
            };
            out.insert(
                public_name.clone(),
                ToolCatalogEntry {
                    public_name,
                    original_name: t.name.to_string(),
                    service_name: service_name.clone(),
                    description: t.description.clone().map(|d| d.to_string()),
                    input_schema: t.input_schema.clone(),
                },
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Tool {
        Tool::new(name.to_string(), None, serde_json::Map::new())
    }

    #[test]
    fn unique_names_pass_through() {
        let mut services = IndexMap::new();
        services.insert("calculator".to_string(), vec![tool("evaluate")]);
        services.insert("datetime".to_string(), vec![tool("now")]);

        let catalog = disambiguate(&services);
        let names: Vec<&str> = catalog.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["evaluate", "now"]);
    }

    #[test]
    fn colliding_names_get_service_prefix() {
        let mut services = IndexMap::new();
        services.insert("calculator".to_string(), vec![tool("evaluate")]);
        services.insert("datetime".to_string(), vec![tool("now")]);
        services.insert("advanced_calc".to_string(), vec![tool("evaluate")]);

        let catalog = disambiguate(&services);
        let names: Vec<&str> = catalog.keys().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["calculator__evaluate", "now", "advanced_calc__evaluate"]
        );
    }

    #[test]
    fn disambiguation_is_deterministic() {
        let mut services = IndexMap::new();
        services.insert("a".to_string(), vec![tool("x")]);
        services.insert("b".to_string(), vec![tool("x")]);

        let first = disambiguate(&services);
        let second = disambiguate(&services);
        let first_keys: Vec<_> = first.keys().collect();
        let second_keys: Vec<_> = second.keys().collect();
        assert_eq!(first_keys, second_keys);
    }

    #[test]
    fn remove_service_drops_only_its_entries() {
        let mut catalog = ToolCatalog::new();
        let mut services = IndexMap::new();
        services.insert("a".to_string(), vec![tool("x")]);
        services.insert("b".to_string(), vec![tool("y")]);
        catalog.rebuild(&services);
        assert_eq!(catalog.len(), 2);

        catalog.remove_service("a");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("y").is_some());
    }
}
