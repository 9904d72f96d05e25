//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::database::error::DatabaseError;
use crate::database::order_repository::OrderStore;
use crate::payments::GatewayRegistry;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    orders: Arc<dyn OrderStore>,
    registry: GatewayRegistry,
}

impl HealthChecker {
    pub fn new(orders: Arc<dyn OrderStore>, registry: GatewayRegistry) -> Self {
        Self { orders, registry }
    }

    /// Storage is required; an empty gateway list only degrades.
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut storage_up = true;

        match timeout(Duration::from_secs(5), check_storage_health(self.orders.as_ref())).await {
            Ok(Ok(response_time)) => {
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::up(Some(response_time)),
                );
                info!("Storage health check: OK ({}ms)", response_time);
            }
            Ok(Err(e)) => {
                storage_up = false;
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::down(Some(e.to_string())),
                );
                error!("Storage health check failed: {}", e);
            }
            Err(_) => {
                storage_up = false;
                health_status.checks.insert(
                    "storage".to_string(),
                    ComponentHealth::down(Some("Timeout".to_string())),
                );
                error!("Storage health check timed out");
            }
        }

        let gateways = self.registry.list_available();
        let gateways_up = !gateways.is_empty();
        let listed = gateways
            .iter()
            .map(|g| g.as_str())
            .collect::<Vec<_>>()
            .join(",");
        if gateways_up {
            health_status.checks.insert(
                "gateways".to_string(),
                ComponentHealth {
                    status: ComponentState::Up,
                    response_time_ms: None,
                    details: Some(listed),
                },
            );
        } else {
            warn!("No payment gateway is enabled");
            health_status.checks.insert(
                "gateways".to_string(),
                ComponentHealth::warning(None, Some("no gateway enabled".to_string())),
            );
        }

        health_status.status = match (storage_up, gateways_up) {
            (true, true) => HealthState::Healthy,
            (true, false) => HealthState::Degraded,
            (false, _) => HealthState::Unhealthy,
        };

        health_status
    }
}

pub async fn check_storage_health(orders: &dyn OrderStore) -> Result<u128, DatabaseError> {
    let start = Instant::now();
    orders.ping().await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::order_repository::InMemoryOrderStore;

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));

        let warning_health = ComponentHealth::warning(Some(500), Some("Slow response".to_string()));
        assert!(matches!(warning_health.status, ComponentState::Warning));
        assert_eq!(warning_health.details, Some("Slow response".to_string()));
    }

    #[tokio::test]
    async fn no_gateways_is_degraded() {
        let checker = HealthChecker::new(Arc::new(InMemoryOrderStore::new()), GatewayRegistry::new());
        let status = checker.check_health().await;
        assert!(matches!(status.status, HealthState::Degraded));
        assert!(matches!(status.checks["storage"].status, ComponentState::Up));
        assert!(matches!(status.checks["gateways"].status, ComponentState::Warning));
    }
}
