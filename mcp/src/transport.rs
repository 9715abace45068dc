//! Transport adapters (component A): one connector per upstream protocol, plus
//! the outbound WebSocket adapter used exclusively by the endpoint manager.
//!
//! Stdio/SSE/Streamable-HTTP-client ride on `rmcp`'s own transport types.
//! Streamable-HTTP-server (serving downstream consumers) is hand-rolled in the
//! binary crate's axum router, not here. The WebSocket adapter dials *out* to
//! a downstream broker URL as a client — it never accepts inbound sockets.

use std::time::Duration;

use rmcp::{
    service::RunningService,
    transport::{
        sse_client::SseClientConfig, streamable_http_client::StreamableHttpClientTransportConfig,
        ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceExt,
};
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue};
use tracing::{info, warn};

use crate::{
    config::{resolve_proxy_config, McpProxyConfig, McpServerConfig, McpTransport},
    error::{RelayError, RelayResult},
};

pub type McpClient = RunningService<RoleClient, ()>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dial an upstream MCP server per its configured transport. Stdio connects
/// immediately; SSE and Streamable are retried with backoff by the caller
/// (the service lifecycle owns reconnect policy, not the adapter).
pub async fn connect(
    config: &McpServerConfig,
    global_proxy: Option<&McpProxyConfig>,
) -> RelayResult<McpClient> {
    match &config.transport {
        McpTransport::Stdio { command, args, envs } => connect_stdio(command, args, envs).await,
        McpTransport::Sse { url, token, headers } => {
            let proxy = resolve_proxy_config(config, global_proxy);
            connect_sse(url, token.as_deref(), headers, proxy).await
        }
        McpTransport::Streamable { url, token, headers } => {
            let proxy = resolve_proxy_config(config, global_proxy);
            connect_streamable(url, token.as_deref(), headers, proxy).await
        }
    }
}

async fn connect_stdio(
    command: &str,
    args: &[String],
    envs: &std::collections::HashMap<String, String>,
) -> RelayResult<McpClient> {
    let transport = TokioChildProcess::new(tokio::process::Command::new(command).configure(|cmd| {
        cmd.args(args)
            .envs(envs.iter())
            .stderr(std::process::Stdio::inherit());
    }))
    .map_err(|e| RelayError::ConnectionFailed(format!("spawn stdio transport: {e}")))?;

    let client = ()
        .serve(transport)
        .await
        .map_err(|e| RelayError::ConnectionFailed(format!("initialize stdio client: {e}")))?;
    info!(%command, "connected stdio upstream");
    Ok(client)
}

fn build_http_client(
    token: Option<&str>,
    headers: &std::collections::HashMap<String, String>,
    proxy: Option<&McpProxyConfig>,
) -> RelayResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    let mut header_map = reqwest::header::HeaderMap::new();
    if let Some(tok) = token {
        header_map.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {tok}")
                .parse()
                .map_err(|e| RelayError::InvalidConfig(format!("auth token: {e}")))?,
        );
    }
    for (k, v) in headers {
        let name = reqwest::header::HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| RelayError::InvalidConfig(format!("header name {k}: {e}")))?;
        let value = v
            .parse()
            .map_err(|e| RelayError::InvalidConfig(format!("header value for {k}: {e}")))?;
        header_map.insert(name, value);
    }
    builder = builder.default_headers(header_map);
    if let Some(proxy_cfg) = proxy {
        builder = apply_proxy_to_builder(builder, proxy_cfg)?;
    }
    builder
        .build()
        .map_err(|e| RelayError::ConnectionFailed(format!("build HTTP client: {e}")))
}

/// Apply HTTP/HTTPS proxy settings (with `no_proxy` exclusions and optional
/// basic auth) to a client builder, without building the client.
fn apply_proxy_to_builder(
    mut builder: reqwest::ClientBuilder,
    proxy_cfg: &McpProxyConfig,
) -> RelayResult<reqwest::ClientBuilder> {
    if let Some(http_proxy) = &proxy_cfg.http {
        let mut proxy = reqwest::Proxy::http(http_proxy)
            .map_err(|e| RelayError::InvalidConfig(format!("invalid HTTP proxy: {e}")))?;
        if let Some(no_proxy) = &proxy_cfg.no_proxy {
            proxy = proxy.no_proxy(reqwest::NoProxy::from_string(no_proxy));
        }
        if let (Some(username), Some(password)) = (&proxy_cfg.username, &proxy_cfg.password) {
            proxy = proxy.basic_auth(username, password);
        }
        builder = builder.proxy(proxy);
    }

    if let Some(https_proxy) = &proxy_cfg.https {
        let mut proxy = reqwest::Proxy::https(https_proxy)
            .map_err(|e| RelayError::InvalidConfig(format!("invalid HTTPS proxy: {e}")))?;
        if let Some(no_proxy) = &proxy_cfg.no_proxy {
            proxy = proxy.no_proxy(reqwest::NoProxy::from_string(no_proxy));
        }
        if let (Some(username), Some(password)) = (&proxy_cfg.username, &proxy_cfg.password) {
            proxy = proxy.basic_auth(username, password);
        }
        builder = builder.proxy(proxy);
    }

    Ok(builder)
}

async fn connect_sse(
    url: &str,
    token: Option<&str>,
    headers: &std::collections::HashMap<String, String>,
    proxy: Option<&McpProxyConfig>,
) -> RelayResult<McpClient> {
    let client = build_http_client(token, headers, proxy)?;
    let cfg = SseClientConfig {
        sse_endpoint: url.to_string().into(),
        ..Default::default()
    };
    let transport = SseClientTransport::start_with_client(client, cfg)
        .await
        .map_err(|e| RelayError::ConnectionFailed(format!("create SSE transport: {e}")))?;
    let client = ()
        .serve(transport)
        .await
        .map_err(|e| RelayError::ConnectionFailed(format!("initialize SSE client: {e}")))?;
    info!(%url, "connected SSE upstream");
    Ok(client)
}

async fn connect_streamable(
    url: &str,
    token: Option<&str>,
    headers: &std::collections::HashMap<String, String>,
    proxy: Option<&McpProxyConfig>,
) -> RelayResult<McpClient> {
    if proxy.is_some() {
        warn!(%url, "proxy configured but unsupported for streamable-http transport");
    }
    if !headers.is_empty() {
        warn!(%url, "extra headers configured but unsupported for streamable-http transport");
    }
    let transport = if let Some(tok) = token {
        let mut cfg = StreamableHttpClientTransportConfig::with_uri(url);
        cfg.auth_header = Some(tok.to_string());
        StreamableHttpClientTransport::from_config(cfg)
    } else {
        StreamableHttpClientTransport::from_uri(url)
    };
    let client = ()
        .serve(transport)
        .await
        .map_err(|e| RelayError::ConnectionFailed(format!("initialize streamable client: {e}")))?;
    info!(%url, "connected streamable-http upstream");
    Ok(client)
}

/// An open outbound socket to a downstream endpoint, split into independent
/// halves so the endpoint manager can read and write concurrently.
pub struct WebSocketConnection {
    pub sink: futures::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        tokio_tungstenite::tungstenite::Message,
    >,
    pub stream: futures::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
}

/// Dial a downstream endpoint URL as a WebSocket client, optionally
/// presenting a bearer token during the HTTP upgrade.
pub async fn connect_websocket(url: &str, token: Option<&str>) -> RelayResult<WebSocketConnection> {
    use futures::StreamExt;

    let mut request = url
        .into_client_request()
        .map_err(RelayError::WebSocket)?;
    if let Some(tok) = token {
        let value = HeaderValue::from_str(&format!("Bearer {tok}"))
            .map_err(|e| RelayError::InvalidEndpoint(format!("bearer header: {e}")))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(RelayError::WebSocket)?;
    info!(%url, "connected downstream endpoint websocket");
    let (sink, stream) = ws_stream.split();
    Ok(WebSocketConnection { sink, stream })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_http_client_rejects_invalid_header_name() {
        let mut headers = std::collections::HashMap::new();
        headers.insert("bad header".to_string(), "v".to_string());
        let result = build_http_client(None, &headers, None);
        assert!(result.is_err());
    }

    #[test]
    fn build_http_client_accepts_bearer_token() {
        let headers = std::collections::HashMap::new();
        let result = build_http_client(Some("secret"), &headers, None);
        assert!(result.is_ok());
    }

    #[test]
    fn build_http_client_applies_configured_proxy() {
        let headers = std::collections::HashMap::new();
        let proxy = McpProxyConfig {
            http: Some("http://proxy.example.com:8080".to_string()),
            https: None,
            no_proxy: Some("localhost,127.0.0.1".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
        };
        let result = build_http_client(None, &headers, Some(&proxy));
        assert!(result.is_ok());
    }

    #[test]
    fn build_http_client_rejects_invalid_proxy_url() {
        let headers = std::collections::HashMap::new();
        let proxy = McpProxyConfig {
            http: Some("://invalid".to_string()),
            https: None,
            no_proxy: None,
            username: None,
            password: None,
        };
        let result = build_http_client(None, &headers, Some(&proxy));
        assert!(result.is_err());
    }
}
