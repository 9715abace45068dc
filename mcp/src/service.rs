//! Upstream service (component B): wraps one upstream MCP server connection.

use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::{
    config::{McpProxyConfig, McpServerConfig, Tool},
    error::{RelayError, RelayResult},
    reconnect::BackoffPolicy,
    transport::{self, McpClient},
};

const CONNECT_STEP_TIMEOUT: Duration = Duration::from_secs(10);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// One upstream MCP server: its config, its live client handle (if any), and
/// its last-known tool list.
pub struct Service {
    pub config: McpServerConfig,
    client: RwLock<Option<Arc<McpClient>>>,
    tools: RwLock<Vec<Tool>>,
    connected: std::sync::atomic::AtomicBool,
    global_proxy: Option<McpProxyConfig>,
}

impl Service {
    pub fn new(config: McpServerConfig, global_proxy: Option<McpProxyConfig>) -> Self {
        Self {
            config,
            client: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            connected: std::sync::atomic::AtomicBool::new(false),
            global_proxy,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn get_tools(&self) -> Vec<Tool> {
        self.tools.read().clone()
    }

    /// Connect, handshake, and list tools. Any step exceeding
    /// `CONNECT_STEP_TIMEOUT` fails with `CONNECTION_FAILED`.
    pub async fn connect(&self) -> RelayResult<()> {
        let client = timeout(
            CONNECT_STEP_TIMEOUT,
            transport::connect(&self.config, self.global_proxy.as_ref()),
        )
        .await
        .map_err(|_| RelayError::ConnectionFailed(format!("{}: connect timed out", self.name())))??;

        let tools = timeout(CONNECT_STEP_TIMEOUT, list_tools(&client))
            .await
            .map_err(|_| RelayError::ConnectionFailed(format!("{}: tools/list timed out", self.name())))??;

        *self.tools.write() = tools;
        *self.client.write() = Some(Arc::new(client));
        self.connected
            .store(true, std::sync::atomic::Ordering::Release);
        info!(service = self.name(), "connected");
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.connected
            .store(false, std::sync::atomic::Ordering::Release);
        self.tools.write().clear();
        let old = self.client.write().take();
        drop(old);
        info!(service = self.name(), "disconnected");
    }

    pub async fn reconnect(&self) -> RelayResult<()> {
        self.disconnect().await;
        self.connect().await
    }

    /// Reconnect through the shared backoff policy; used by the health
    /// checker and by start-up retry for remote transports.
    pub async fn reconnect_with_backoff(&self, policy: &BackoffPolicy) -> RelayResult<()> {
        policy
            .reconnect(self.name(), || async { self.connect().await })
            .await
    }

    pub async fn call_tool(
        &self,
        original_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> RelayResult<CallToolResult> {
        if !self.is_connected() {
            return Err(RelayError::ServiceNotConnected(self.name().to_string()));
        }
        let client = {
            let guard = self.client.read();
            guard.clone().ok_or_else(|| RelayError::ServiceNotConnected(self.name().to_string()))?
        };

        let params = CallToolRequestParam {
            name: original_name.to_string().into(),
            arguments: Some(arguments),
        };

        match timeout(CALL_TIMEOUT, client.call_tool(params)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!(service = self.name(), tool = original_name, error = %e, "upstream call failed");
                Err(RelayError::ConnectionLost(e.to_string()))
            }
            Err(_) => Err(RelayError::Timeout(format!(
                "{}::{original_name} call timed out",
                self.name()
            ))),
        }
    }
}

async fn list_tools(client: &McpClient) -> RelayResult<Vec<Tool>> {
    let result = client
        .peer()
        .list_all_tools()
        .await
        .map_err(|e| RelayError::ConnectionFailed(format!("tools/list: {e}")))?;
    Ok(result
        .into_iter()
        .map(|t| {
            Tool::new(
                t.name.to_string(),
                t.description.map(|d| d.to_string()),
                (*t.input_schema).clone(),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpTransport;
    use std::collections::HashMap;

    fn config(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.to_string(),
            transport: McpTransport::Stdio {
                command: "does-not-exist-binary".to_string(),
                args: vec![],
                envs: HashMap::new(),
            },
            required: false,
            proxy: None,
        }
    }

    #[test]
    fn starts_disconnected_with_no_tools() {
        let svc = Service::new(config("calculator"), None);
        assert!(!svc.is_connected());
        assert!(svc.get_tools().is_empty());
    }

    #[tokio::test]
    async fn call_tool_fails_fast_when_not_connected() {
        let svc = Service::new(config("calculator"), None);
        let result = svc.call_tool("evaluate", serde_json::Map::new()).await;
        assert!(matches!(result, Err(RelayError::ServiceNotConnected(_))));
    }

    #[tokio::test]
    async fn connect_surfaces_connection_failed_for_bad_command() {
        let svc = Service::new(config("calculator"), None);
        let result = svc.connect().await;
        assert!(result.is_err());
        assert!(!svc.is_connected());
    }
}
