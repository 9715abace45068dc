//! Shared application state handed to every axum route.

use std::sync::Arc;

use relay_mcp::{EndpointManager, HealthChecker, MessageHandler, PerformanceMonitor, ServiceManager, TaskCache};

use crate::streamable::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ServiceManager>,
    pub endpoints: Arc<EndpointManager>,
    pub handler: Arc<MessageHandler>,
    pub cache: Arc<TaskCache>,
    pub metrics: Arc<PerformanceMonitor>,
    pub health: Arc<HealthChecker>,
    pub sessions: Arc<SessionRegistry>,
}
