//! Service Manager (component C): owns every upstream `Service`, the derived
//! tool catalog, and routes `tools/call` by public name.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rmcp::model::CallToolResult;
use tracing::info;

use crate::{
    catalog::ToolCatalog,
    config::{CustomToolHandler, McpProxyConfig, McpServerConfig, Tool},
    error::{RelayError, RelayResult},
    events::{Event, EventBus},
    service::Service,
    toolsync::{CustomToolRegistry, ToolsConfig},
};

pub struct ServiceManager {
    services: RwLock<IndexMap<String, Arc<Service>>>,
    catalog: RwLock<ToolCatalog>,
    custom_tools: Arc<CustomToolRegistry>,
    tools_config: ToolsConfig,
    global_proxy: Option<McpProxyConfig>,
    events: Arc<EventBus>,
}

impl ServiceManager {
    pub fn new(tools_config: ToolsConfig, global_proxy: Option<McpProxyConfig>, events: Arc<EventBus>) -> Self {
        Self {
            services: RwLock::new(IndexMap::new()),
            catalog: RwLock::new(ToolCatalog::new()),
            custom_tools: Arc::new(CustomToolRegistry::new()),
            tools_config,
            global_proxy,
            events,
        }
    }

    pub fn custom_tools(&self) -> Arc<CustomToolRegistry> {
        Arc::clone(&self.custom_tools)
    }

    /// Register a service config. Idempotent by name: re-registering the same
    /// name is rejected with `SERVER_ALREADY_EXISTS`.
    pub fn add_service_config(&self, config: McpServerConfig) -> RelayResult<()> {
        let mut services = self.services.write();
        if services.contains_key(&config.name) {
            return Err(RelayError::ServerAlreadyExists(config.name));
        }
        let name = config.name.clone();
        let service = Arc::new(Service::new(config, self.global_proxy.clone()));
        services.insert(name.clone(), service);
        self.events.publish(Event::ServerAdded { name });
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.services.read().get(name).cloned()
    }

    /// Snapshot of every registered service, insertion order preserved.
    pub fn all_services(&self) -> Vec<Arc<Service>> {
        self.services.read().values().cloned().collect()
    }

    fn rebuild_catalog(&self) {
        let services = self.services.read();
        let mut tool_lists: IndexMap<String, Vec<Tool>> = IndexMap::new();
        for (name, service) in services.iter() {
            tool_lists.insert(name.clone(), service.get_tools());
        }
        drop(services);
        self.catalog.write().rebuild(&tool_lists);
    }

    /// Connect the named service, rebuild the catalog for it, then run
    /// tool-sync. Errors from tool-sync never propagate (§4.G).
    pub async fn start_service(&self, name: &str) -> RelayResult<()> {
        let service = self
            .service(name)
            .ok_or_else(|| RelayError::ServerNotFound(name.to_string()))?;

        service.connect().await?;
        self.rebuild_catalog();

        let tools = service.get_tools();
        self.custom_tools
            .sync_after_connection(name, &tools, &self.tools_config)
            .await;

        self.events.publish(Event::ToolsUpdated {
            service: name.to_string(),
        });
        self.events.publish(Event::StatusChanged {
            service: name.to_string(),
            connected: true,
        });
        info!(service = name, "started");
        Ok(())
    }

    pub async fn stop_service(&self, name: &str) -> RelayResult<()> {
        let service = self
            .service(name)
            .ok_or_else(|| RelayError::ServerNotFound(name.to_string()))?;
        service.disconnect().await;
        self.rebuild_catalog();
        self.events.publish(Event::StatusChanged {
            service: name.to_string(),
            connected: false,
        });
        Ok(())
    }

    pub fn remove_service(&self, name: &str) -> RelayResult<()> {
        let mut services = self.services.write();
        if services.shift_remove(name).is_none() {
            return Err(RelayError::ServerNotFound(name.to_string()));
        }
        drop(services);
        self.rebuild_catalog();
        self.events.publish(Event::ServerRemoved {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Custom tools first (custom wins on name clash), deduplicated by
    /// public name, per the resolved ordering open question.
    pub fn get_all_tools(&self) -> Vec<Tool> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for (public_name, cfg) in self.custom_tools.iter_entries() {
            if seen.insert(public_name.clone()) {
                out.push(Tool::new(public_name, cfg.description.map(Into::into), serde_json::Map::new()));
            }
        }
        for entry in self.catalog.read().iter() {
            if seen.insert(entry.public_name.clone()) {
                out.push(entry.to_tool());
            }
        }
        out
    }

    pub async fn call_tool(
        &self,
        public_name: &str,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> RelayResult<CallToolResult> {
        if let Some(custom) = self.custom_tools.get(public_name) {
            return match custom.handler {
                CustomToolHandler::Mcp { service_name, tool_name } => {
                    self.call_tool_on_service(&service_name, &tool_name, args).await
                }
                CustomToolHandler::Proxy { platform, .. } => Err(RelayError::InternalError(format!(
                    "proxy handler for platform '{platform}' has no collaborator configured"
                ))),
            };
        }

        let (service_name, original_name) = {
            let catalog = self.catalog.read();
            let entry = catalog
                .get(public_name)
                .ok_or_else(|| RelayError::ToolNotFound(public_name.to_string()))?;
            (entry.service_name.clone(), entry.original_name.clone())
        };
        self.call_tool_on_service(&service_name, &original_name, args).await
    }

    async fn call_tool_on_service(
        &self,
        service_name: &str,
        original_name: &str,
        args: serde_json::Map<String, serde_json::Value>,
    ) -> RelayResult<CallToolResult> {
        let service = self
            .service(service_name)
            .ok_or_else(|| RelayError::ServerNotFound(service_name.to_string()))?;
        if !service.is_connected() {
            return Err(RelayError::ServiceNotConnected(service_name.to_string()));
        }
        service.call_tool(original_name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpTransport;
    use std::collections::HashMap;

    fn stdio_config(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.to_string(),
            transport: McpTransport::Stdio {
                command: "true".to_string(),
                args: vec![],
                envs: HashMap::new(),
            },
            required: false,
            proxy: None,
        }
    }

    fn manager() -> ServiceManager {
        ServiceManager::new(ToolsConfig::new(), None, Arc::new(EventBus::new()))
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mgr = manager();
        mgr.add_service_config(stdio_config("calculator")).unwrap();
        let err = mgr.add_service_config(stdio_config("calculator")).unwrap_err();
        assert!(matches!(err, RelayError::ServerAlreadyExists(_)));
    }

    #[tokio::test]
    async fn call_tool_on_unknown_public_name_is_not_found() {
        let mgr = manager();
        let result = mgr.call_tool("nope", serde_json::Map::new()).await;
        assert!(matches!(result, Err(RelayError::ToolNotFound(_))));
    }

    #[test]
    fn remove_unknown_service_is_not_found() {
        let mgr = manager();
        let err = mgr.remove_service("nope").unwrap_err();
        assert!(matches!(err, RelayError::ServerNotFound(_)));
    }
}
