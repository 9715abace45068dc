//! HealthChecker (component H, health half): periodic sweep over services,
//! auto-reconnecting the ones that look unhealthy.

use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::{manager::ServiceManager, metrics::PerformanceMonitor, reconnect::BackoffPolicy};

#[derive(Debug, Clone, Copy)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub max_error_rate: f64,
    pub max_response_time: Duration,
    pub auto_recover: bool,
    pub retry_attempts: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_error_rate: 0.1,
            max_response_time: Duration::from_secs(2),
            auto_recover: true,
            retry_attempts: 3,
        }
    }
}

pub struct HealthChecker {
    manager: Arc<ServiceManager>,
    metrics: Arc<PerformanceMonitor>,
    config: HealthCheckConfig,
}

impl HealthChecker {
    pub fn new(manager: Arc<ServiceManager>, metrics: Arc<PerformanceMonitor>, config: HealthCheckConfig) -> Self {
        Self { manager, metrics, config }
    }

    /// Unhealthy iff: not connected, or its latency stats exceed the
    /// configured error-rate/response-time thresholds, or it reports no
    /// tools at all.
    fn is_unhealthy(&self, service: &crate::service::Service) -> bool {
        if !service.is_connected() {
            return true;
        }
        if service.get_tools().is_empty() {
            return true;
        }
        let snapshot = self.metrics.snapshot();
        let total = snapshot.successful_calls + snapshot.failed_calls;
        if total > 0 {
            let error_rate = snapshot.failed_calls as f64 / total as f64;
            if error_rate > self.config.max_error_rate {
                return true;
            }
        }
        for (_, latency) in self.metrics.all_tool_latencies() {
            if Duration::from_millis(latency.avg_ms) > self.config.max_response_time {
                return true;
            }
        }
        false
    }

    /// Run one sweep; returns the names of services that were unhealthy.
    pub async fn run_once(&self) -> Vec<String> {
        let mut unhealthy = Vec::new();
        for service in self.manager.all_services() {
            if !self.is_unhealthy(&service) {
                continue;
            }
            unhealthy.push(service.name().to_string());
            warn!(service = service.name(), "service unhealthy");

            if self.config.auto_recover {
                let policy = BackoffPolicy {
                    max_retries: self.config.retry_attempts,
                    ..BackoffPolicy::default()
                };
                if let Err(e) = service.reconnect_with_backoff(&policy).await {
                    warn!(service = service.name(), error = %e, "auto-recovery failed");
                }
            }
        }
        unhealthy
    }

    /// Run sweeps on `self.config.interval` until `shutdown` resolves.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::EventBus, toolsync::ToolsConfig};

    fn harness() -> HealthChecker {
        let manager = Arc::new(ServiceManager::new(ToolsConfig::new(), None, Arc::new(EventBus::new())));
        let metrics = Arc::new(PerformanceMonitor::new());
        HealthChecker::new(manager, metrics, HealthCheckConfig::default())
    }

    #[tokio::test]
    async fn sweep_over_no_services_finds_nothing_unhealthy() {
        let checker = harness();
        let unhealthy = checker.run_once().await;
        assert!(unhealthy.is_empty());
    }
}
