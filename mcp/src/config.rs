//! Configuration document (component I): the typed shape of the YAML file the
//! binary loads at startup, plus the `ServiceConfig` tagged variant from the
//! data model (§3).

use std::{borrow::Cow, collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, RelayResult};

/// A single MCP tool descriptor, matching the upstream `rmcp` model closely
/// enough to convert in both directions without loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: Cow<'static, str>,
    pub description: Option<Cow<'static, str>>,
    pub input_schema: Arc<serde_json::Map<String, serde_json::Value>>,
}

impl Tool {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        description: impl Into<Option<Cow<'static, str>>>,
        input_schema: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: Arc::new(input_schema),
        }
    }
}

/// Transport configuration for one upstream MCP server (§3 `ServiceConfig`).
#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        envs: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
    Streamable {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },
}

impl std::fmt::Debug for McpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McpTransport::Stdio { command, args, envs } => f
                .debug_struct("Stdio")
                .field("command", command)
                .field("args", args)
                .field("envs", &format!("{} vars", envs.len()))
                .finish(),
            McpTransport::Sse { url, token, headers } => f
                .debug_struct("Sse")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "****"))
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
            McpTransport::Streamable { url, token, headers } => f
                .debug_struct("Streamable")
                .field("url", url)
                .field("token", &token.as_ref().map(|_| "****"))
                .field("headers", &format!("{} headers", headers.len()))
                .finish(),
        }
    }
}

/// HTTP proxy configuration for a single server's outbound connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
    pub no_proxy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl McpProxyConfig {
    pub fn from_env() -> Option<Self> {
        let http = std::env::var("MCP_HTTP_PROXY")
            .ok()
            .or_else(|| std::env::var("HTTP_PROXY").ok());
        let https = std::env::var("MCP_HTTPS_PROXY")
            .ok()
            .or_else(|| std::env::var("HTTPS_PROXY").ok());
        let no_proxy = std::env::var("MCP_NO_PROXY")
            .ok()
            .or_else(|| std::env::var("NO_PROXY").ok());
        if http.is_some() || https.is_some() {
            Some(Self {
                http,
                https,
                no_proxy,
                username: None,
                password: None,
            })
        } else {
            None
        }
    }
}

/// One entry under `mcpServers` in the config document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(flatten)]
    pub transport: McpTransport,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<McpProxyConfig>,
}

/// Whether a tool is projected into the custom-tool list for its service (§4.G).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
pub struct ToolSyncEntry {
    #[serde(default)]
    pub enable: bool,
}

/// Handler variant for a `CustomMCPTool` (§3).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CustomToolHandler {
    Mcp { #[serde(rename = "serviceName")] service_name: String, #[serde(rename = "toolName")] tool_name: String },
    Proxy { platform: String, config: serde_json::Value },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomMcpToolConfig {
    pub handler: CustomToolHandler,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ToolCallLogConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

fn default_log_capacity() -> usize {
    500
}

/// The full config document (§3 / §6 persisted state).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RelayConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: Vec<McpServerConfig>,

    #[serde(default, rename = "toolsConfig")]
    pub tools_config: HashMap<String, HashMap<String, ToolSyncEntry>>,

    #[serde(default, rename = "customMCPTools")]
    pub custom_mcp_tools: HashMap<String, CustomMcpToolConfig>,

    #[serde(default, rename = "mcpEndpoints")]
    pub mcp_endpoints: Vec<String>,

    #[serde(default, rename = "webUIPort")]
    pub web_ui_port: Option<u16>,

    #[serde(default, rename = "toolCallLogConfig")]
    pub tool_call_log_config: ToolCallLogConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<McpProxyConfig>,
}

impl RelayConfig {
    pub async fn from_file(path: impl AsRef<std::path::Path>) -> RelayResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    #[must_use]
    pub fn with_env_proxy(mut self) -> Self {
        if self.proxy.is_none() {
            self.proxy = McpProxyConfig::from_env();
        }
        self
    }
}

/// Resolve proxy configuration for a server: server-specific beats global.
pub fn resolve_proxy_config<'a>(
    server_config: &'a McpServerConfig,
    global_proxy: Option<&'a McpProxyConfig>,
) -> Option<&'a McpProxyConfig> {
    if server_config.proxy.is_some() {
        server_config.proxy.as_ref()
    } else {
        global_proxy
    }
}

/// Reject schemes we cannot dial; called before handing a URL to a transport.
pub fn validate_remote_url(url: &str) -> RelayResult<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| RelayError::InvalidConfig(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(parsed),
        other => Err(RelayError::InvalidConfig(format!(
            "unsupported URL scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_capacity_is_500() {
        assert_eq!(ToolCallLogConfig::default().capacity, 0);
        // explicit default via serde only applies through deserialization:
        let cfg: ToolCallLogConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.capacity, 500);
    }

    #[test]
    fn proxy_priority_prefers_server_over_global() {
        let server = McpServerConfig {
            name: "s".into(),
            transport: McpTransport::Sse {
                url: "http://x".into(),
                token: None,
                headers: HashMap::new(),
            },
            required: false,
            proxy: Some(McpProxyConfig {
                http: Some("http://server-proxy".into()),
                https: None,
                no_proxy: None,
                username: None,
                password: None,
            }),
        };
        let global = McpProxyConfig {
            http: Some("http://global-proxy".into()),
            https: None,
            no_proxy: None,
            username: None,
            password: None,
        };
        let resolved = resolve_proxy_config(&server, Some(&global)).unwrap();
        assert_eq!(resolved.http.as_deref(), Some("http://server-proxy"));
    }

    #[test]
    fn proxy_priority_falls_back_to_global() {
        let server = McpServerConfig {
            name: "s".into(),
            transport: McpTransport::Stdio {
                command: "echo".into(),
                args: vec![],
                envs: HashMap::new(),
            },
            required: false,
            proxy: None,
        };
        let global = McpProxyConfig {
            http: Some("http://global-proxy".into()),
            https: None,
            no_proxy: None,
            username: None,
            password: None,
        };
        let resolved = resolve_proxy_config(&server, Some(&global)).unwrap();
        assert_eq!(resolved.http.as_deref(), Some("http://global-proxy"));
    }

    #[test]
    fn rejects_unsupported_url_scheme() {
        assert!(validate_remote_url("ftp://host/path").is_err());
        assert!(validate_remote_url("wss://host/path").is_ok());
    }

    #[tokio::test]
    async fn parses_minimal_yaml_document() {
        let yaml = r#"
mcpServers:
  - name: calculator
    protocol: stdio
    command: calc-server
mcpEndpoints:
  - "ws://broker.example/x"
"#;
        let cfg: RelayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.mcp_servers.len(), 1);
        assert_eq!(cfg.mcp_servers[0].name, "calculator");
        assert_eq!(cfg.mcp_endpoints, vec!["ws://broker.example/x".to_string()]);
        assert_eq!(cfg.tool_call_log_config.capacity, 500);
    }
}
