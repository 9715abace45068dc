//! Tool-Sync (component G): one-shot, additive-only projection of enabled
//! upstream tools into the custom-tool list, serialized per service.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{CustomMcpToolConfig, CustomToolHandler, Tool, ToolSyncEntry};

/// `serviceName → toolName → enable`, taken straight from the config document.
pub type ToolsConfig = HashMap<String, HashMap<String, ToolSyncEntry>>;

/// Registry of user-visible custom tools, keyed by public name. Entries are
/// never removed or rewritten by sync — only appended.
#[derive(Default)]
pub struct CustomToolRegistry {
    entries: parking_lot::RwLock<indexmap::IndexMap<String, CustomMcpToolConfig>>,
    locks: dashmap::DashMap<String, Arc<Mutex<()>>>,
}

impl CustomToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, public_name: &str) -> Option<CustomMcpToolConfig> {
        self.entries.read().get(public_name).cloned()
    }

    pub fn insert_manual(&self, public_name: String, config: CustomMcpToolConfig) {
        self.entries.write().insert(public_name, config);
    }

    pub fn iter_entries(&self) -> Vec<(String, CustomMcpToolConfig)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn lock_for(&self, service_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Project `tools`, filtered by `tools_config[service_name]`, into the
    /// custom-tool list as `mcp { serviceName, toolName }` handlers. A second
    /// concurrent call for the same service waits for the first rather than
    /// racing it; neither ever removes an existing entry.
    pub async fn sync_after_connection(
        &self,
        service_name: &str,
        tools: &[Tool],
        tools_config: &ToolsConfig,
    ) {
        let Some(enabled) = tools_config.get(service_name) else {
            return;
        };

        let lock = self.lock_for(service_name);
        let _guard = lock.lock().await;

        for tool in tools {
            let entry = enabled.get(tool.name.as_ref());
            if !entry.map(|e| e.enable).unwrap_or(false) {
                continue;
            }
            let public_name = format!("{service_name}__{}", tool.name);
            let mut entries = self.entries.write();
            if entries.contains_key(&public_name) {
                debug!(service = service_name, tool = %tool.name, "custom tool already present, skipping");
                continue;
            }
            entries.insert(
                public_name,
                CustomMcpToolConfig {
                    handler: CustomToolHandler::Mcp {
                        service_name: service_name.to_string(),
                        tool_name: tool.name.to_string(),
                    },
                    description: tool.description.clone().map(|d| d.to_string()),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Tool {
        Tool::new(name.to_string(), None, serde_json::Map::new())
    }

    fn tools_config(service: &str, enabled: &[&str]) -> ToolsConfig {
        let mut per_tool = HashMap::new();
        for name in enabled {
            per_tool.insert(name.to_string(), ToolSyncEntry { enable: true });
        }
        let mut cfg = HashMap::new();
        cfg.insert(service.to_string(), per_tool);
        cfg
    }

    #[tokio::test]
    async fn syncs_only_enabled_tools() {
        let registry = CustomToolRegistry::new();
        let cfg = tools_config("S", &["a", "c"]);
        let tools = vec![tool("a"), tool("b"), tool("c")];

        registry.sync_after_connection("S", &tools, &cfg).await;

        assert!(registry.get("S__a").is_some());
        assert!(registry.get("S__b").is_none());
        assert!(registry.get("S__c").is_some());
    }

    #[tokio::test]
    async fn reconnect_does_not_duplicate_entries() {
        let registry = CustomToolRegistry::new();
        let cfg = tools_config("S", &["a"]);
        let tools = vec![tool("a")];

        registry.sync_after_connection("S", &tools, &cfg).await;
        registry.sync_after_connection("S", &tools, &cfg).await;

        assert_eq!(registry.iter_entries().len(), 1);
    }

    #[tokio::test]
    async fn preexisting_manual_entry_is_not_overwritten() {
        let registry = CustomToolRegistry::new();
        registry.insert_manual(
            "S__b".to_string(),
            CustomMcpToolConfig {
                handler: CustomToolHandler::Proxy {
                    platform: "coze".to_string(),
                    config: serde_json::Value::Null,
                },
                description: Some("manually configured".to_string()),
            },
        );
        let cfg = tools_config("S", &["b"]);
        let tools = vec![tool("b")];

        registry.sync_after_connection("S", &tools, &cfg).await;

        let entry = registry.get("S__b").unwrap();
        assert!(matches!(entry.handler, CustomToolHandler::Proxy { .. }));
    }

    #[tokio::test]
    async fn no_toolsconfig_for_service_is_a_no_op() {
        let registry = CustomToolRegistry::new();
        let cfg = ToolsConfig::new();
        let tools = vec![tool("a")];

        registry.sync_after_connection("S", &tools, &cfg).await;

        assert!(registry.iter_entries().is_empty());
    }
}
