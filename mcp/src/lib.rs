//! Core logic for an aggregating MCP proxy: upstream service lifecycle, tool
//! catalog disambiguation, the JSON-RPC message handler, a deferred-task
//! cache, tool-sync, and the downstream endpoint reconnect manager.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod handler;
pub mod health;
pub mod log_ring;
pub mod manager;
pub mod metrics;
pub mod reconnect;
pub mod service;
pub mod toolsync;
pub mod transport;

pub use cache::{Fingerprint, TaskCache, TaskRecord, TaskStatus};
pub use catalog::{ToolCatalog, ToolCatalogEntry};
pub use config::{
    CustomMcpToolConfig, CustomToolHandler, McpProxyConfig, McpServerConfig, McpTransport,
    RelayConfig, Tool, ToolCallLogConfig, ToolSyncEntry,
};
pub use endpoint::{EndpointManager, EndpointState};
pub use error::{RelayError, RelayResult};
pub use events::{Event, EventBus};
pub use handler::MessageHandler;
pub use health::{HealthCheckConfig, HealthChecker};
pub use log_ring::{ToolCallLogRecord, ToolCallRingLog};
pub use manager::ServiceManager;
pub use metrics::PerformanceMonitor;
pub use service::Service;
pub use toolsync::{CustomToolRegistry, ToolsConfig};
