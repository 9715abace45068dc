//! Message Handler (component D): a stateless JSON-RPC 2.0 dispatcher over
//! the aggregated tool catalog.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    cache::{Fingerprint, LookupResult, TaskCache, TaskRecord, TaskStatus},
    log_ring::{ToolCallLogRecord, ToolCallRingLog},
    manager::ServiceManager,
    metrics::PerformanceMonitor,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const PENDING_TEXT: &str = "任务处理中";
const DEFAULT_TASK_TTL: std::time::Duration = std::time::Duration::from_secs(300);

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Option<Value>, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data }),
        }
    }
}

pub struct MessageHandler {
    manager: Arc<ServiceManager>,
    cache: Arc<TaskCache>,
    log: Arc<ToolCallRingLog>,
    metrics: Arc<PerformanceMonitor>,
    server_name: String,
    server_version: String,
}

impl MessageHandler {
    pub fn new(
        manager: Arc<ServiceManager>,
        cache: Arc<TaskCache>,
        log: Arc<ToolCallRingLog>,
        metrics: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            manager,
            cache,
            log,
            metrics,
            server_name: "mcp-relay".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Dispatch one inbound message. Returns `None` for notifications, which
    /// have no response under JSON-RPC semantics.
    pub async fn handle_message(&self, raw: &Value) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(_) => {
                return Some(JsonRpcResponse::err(None, -32700, "parse error", None));
            }
        };

        if request.method.starts_with("notifications/") {
            return None;
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => match self.handle_tools_call(&request.params).await {
                Ok(v) => v,
                Err(e) => return Some(JsonRpcResponse::err(id, e.code, e.message, e.data)),
            },
            "ping" => json!({}),
            _ => {
                return Some(JsonRpcResponse::err(
                    id,
                    -32601,
                    format!("method not found: {}", request.method),
                    None,
                ));
            }
        };

        Some(JsonRpcResponse::ok(id, response))
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": self.server_name, "version": self.server_version },
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .manager
            .get_all_tools()
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": *t.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(JsonRpcError {
                code: -32602,
                message: "missing required parameter: name".to_string(),
                data: None,
            });
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let args_map = arguments
            .as_object()
            .cloned()
            .unwrap_or_default();

        let fingerprint = Fingerprint::new(name, &arguments);
        match self.cache.lookup(fingerprint) {
            LookupResult::Hit(record) => {
                debug!(tool = name, "cache hit, task consumed");
                return Ok(json!({
                    "isError": false,
                    "content": record.result.unwrap_or(json!([])),
                }));
            }
            LookupResult::FailedOnce(record) => {
                return Ok(json!({
                    "isError": true,
                    "content": [{"type": "text", "text": record.error.unwrap_or_default()}],
                }));
            }
            LookupResult::Pending => {
                return Ok(json!({
                    "isError": false,
                    "content": [{"type": "text", "text": PENDING_TEXT}],
                }));
            }
            LookupResult::Miss => {}
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        self.cache.put(
            fingerprint,
            TaskRecord::new_pending(task_id.clone(), name.to_string(), arguments.clone(), DEFAULT_TASK_TTL),
        );

        let start = std::time::Instant::now();
        self.metrics.record_call_start();
        let result = self.manager.call_tool(name, args_map).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(call_result) => {
                let content = serde_json::to_value(&call_result.content).unwrap_or(json!([]));
                self.metrics.record_call_end(name, true, duration_ms);
                self.cache.transition(&task_id, TaskStatus::Completed, Some(content.clone()), None);
                self.cache.mark_consumed(&task_id);
                self.log.push(ToolCallLogRecord {
                    tool_name: name.to_string(),
                    original_tool_name: None,
                    server_name: None,
                    arguments,
                    success: true,
                    result: Some(content.clone()),
                    error: None,
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
                Ok(json!({ "isError": call_result.is_error.unwrap_or(false), "content": content }))
            }
            Err(e) => {
                self.metrics.record_call_end(name, false, duration_ms);
                self.cache.transition(&task_id, TaskStatus::Failed, None, Some(e.to_string()));
                self.cache.mark_consumed(&task_id);
                self.log.push(ToolCallLogRecord {
                    tool_name: name.to_string(),
                    original_tool_name: None,
                    server_name: None,
                    arguments,
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                    duration_ms,
                    timestamp: chrono::Utc::now(),
                });
                Ok(json!({
                    "isError": true,
                    "content": [{"type": "text", "text": e.to_string()}],
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::EventBus, toolsync::ToolsConfig};

    fn handler() -> MessageHandler {
        let manager = Arc::new(ServiceManager::new(ToolsConfig::new(), None, Arc::new(EventBus::new())));
        MessageHandler::new(manager, Arc::new(TaskCache::new()), Arc::new(ToolCallRingLog::new(100)), Arc::new(PerformanceMonitor::new()))
    }

    #[tokio::test]
    async fn initialize_returns_protocol_version() {
        let h = handler();
        let req = json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}});
        let resp = h.handle_message(&req).await.unwrap();
        assert_eq!(resp.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let h = handler();
        let req = json!({"jsonrpc":"2.0","method":"notifications/initialized","params":{}});
        assert!(h.handle_message(&req).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let h = handler();
        let req = json!({"jsonrpc":"2.0","id":1,"method":"bogus","params":{}});
        let resp = h.handle_message(&req).await.unwrap();
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_call_missing_name_is_invalid_params() {
        let h = handler();
        let req = json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{}});
        let resp = h.handle_message(&req).await.unwrap();
        assert_eq!(resp.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn tools_call_on_unregistered_tool_reports_isError() {
        let h = handler();
        let req = json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"nope","arguments":{}}});
        let resp = h.handle_message(&req).await.unwrap();
        assert_eq!(resp.result.unwrap()["isError"], true);
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let h = handler();
        let req = json!({"jsonrpc":"2.0","id":1,"method":"ping","params":{}});
        let resp = h.handle_message(&req).await.unwrap();
        assert_eq!(resp.result.unwrap(), json!({}));
    }
}
