//! REST admin surface (§4.L, §6): service and endpoint management.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use relay_mcp::{McpServerConfig, RelayError};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AddServerRequest {
    Single { name: String, config: McpServerConfig },
    Batch { #[serde(rename = "mcpServers")] mcp_servers: HashMap<String, McpServerConfig> },
}

#[derive(Debug, Serialize)]
struct BatchResult {
    added_count: usize,
    failed_count: usize,
    results: Vec<ItemResult>,
}

#[derive(Debug, Serialize)]
struct ItemResult {
    name: String,
    ok: bool,
    error: Option<String>,
}

pub async fn add_servers(State(state): State<AppState>, Json(body): Json<AddServerRequest>) -> Response {
    let entries: Vec<(String, McpServerConfig)> = match body {
        AddServerRequest::Single { name, config } => vec![(name, config)],
        AddServerRequest::Batch { mcp_servers } => mcp_servers.into_iter().collect(),
    };

    let mut results = Vec::with_capacity(entries.len());
    let mut added = 0usize;
    let mut first_failure_status: Option<u16> = None;
    for (name, mut config) in entries {
        config.name = name.clone();
        let outcome = match state.manager.add_service_config(config) {
            Ok(()) => state.manager.start_service(&name).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => {
                added += 1;
                results.push(ItemResult { name, ok: true, error: None });
            }
            Err(e) => {
                first_failure_status.get_or_insert(e.http_status());
                results.push(ItemResult { name, ok: false, error: Some(e.to_string()) });
            }
        }
    }

    let failed = results.len() - added;
    if added == 0 && !results.is_empty() {
        let status = first_failure_status
            .and_then(|code| axum::http::StatusCode::from_u16(code).ok())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        return (
            status,
            Json(BatchResult { added_count: added, failed_count: failed, results }),
        )
            .into_response();
    }
    (
        axum::http::StatusCode::CREATED,
        Json(BatchResult { added_count: added, failed_count: failed, results }),
    )
        .into_response()
}

pub async fn remove_server(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.manager.remove_service(&name) {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn list_servers(State(state): State<AppState>) -> Response {
    let names: Vec<String> = state
        .manager
        .all_services()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    Json(json!({ "servers": names })).into_response()
}

pub async fn server_status(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.manager.service(&name) {
        Some(service) => Json(json!({
            "name": name,
            "connected": service.is_connected(),
            "toolCount": service.get_tools().len(),
        }))
        .into_response(),
        None => error_response(&RelayError::ServerNotFound(name)),
    }
}

#[derive(Debug, Deserialize)]
pub struct EndpointBody {
    pub endpoint: String,
    #[serde(default)]
    pub token: Option<String>,
}

pub async fn add_endpoint(State(state): State<AppState>, Json(body): Json<EndpointBody>) -> Response {
    match state.endpoints.add_endpoint(body.endpoint, body.token) {
        Ok(()) => axum::http::StatusCode::CREATED.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn remove_endpoint(State(state): State<AppState>, Json(body): Json<EndpointBody>) -> Response {
    match state.endpoints.remove_endpoint(&body.endpoint) {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn connect_endpoint(State(state): State<AppState>, Json(body): Json<EndpointBody>) -> Response {
    match state.endpoints.trigger_reconnect(&body.endpoint) {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn disconnect_endpoint(State(state): State<AppState>, Json(body): Json<EndpointBody>) -> Response {
    match state.endpoints.disconnect_endpoint(&body.endpoint) {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn reconnect_endpoint(State(state): State<AppState>, Json(body): Json<EndpointBody>) -> Response {
    match state.endpoints.trigger_reconnect(&body.endpoint) {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(e) => error_response(&e),
    }
}

pub async fn endpoint_status(State(state): State<AppState>) -> Response {
    Json(json!({ "endpoints": state.endpoints.get_connection_status() })).into_response()
}

fn error_response(e: &RelayError) -> Response {
    let status = axum::http::StatusCode::from_u16(e.http_status()).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "code": e.code(), "message": e.to_string() }))).into_response()
}
