use crate::config::GatewaysConfig;
use crate::payments::clock::Clock;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::GatewayAdapter;
use crate::payments::providers::{AirpayAdapter, PayuAdapter, SabpaisaAdapter};
use crate::payments::types::GatewayName;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// One adapter per enabled gateway, built once at startup.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<GatewayName, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GatewaysConfig, clock: Arc<dyn Clock>) -> PaymentResult<Self> {
        let mut registry = Self::new();
        for gateway in &config.enabled {
            let adapter: Arc<dyn GatewayAdapter> = match gateway {
                GatewayName::Payu => Arc::new(PayuAdapter::new(config.payu.clone())),
                GatewayName::Sabpaisa => Arc::new(SabpaisaAdapter::new(config.sabpaisa.clone())),
                GatewayName::Airpay => {
                    Arc::new(AirpayAdapter::new(config.airpay.clone(), clock.clone())?)
                }
            };
            registry.register(adapter);
        }
        info!(gateways = ?registry.list_available(), "payment gateways registered");
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn GatewayAdapter>) {
        self.adapters.insert(adapter.name(), adapter);
    }

    pub fn get(&self, gateway: GatewayName) -> PaymentResult<Arc<dyn GatewayAdapter>> {
        self.adapters
            .get(&gateway)
            .cloned()
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!("gateway {} is disabled", gateway),
                field: Some("gateway".to_string()),
            })
    }

    /// Case-insensitive lookup by name.
    pub fn resolve(&self, name: &str) -> PaymentResult<Arc<dyn GatewayAdapter>> {
        self.get(GatewayName::from_str(name)?)
    }

    pub fn list_available(&self) -> Vec<GatewayName> {
        let mut names: Vec<GatewayName> = self.adapters.keys().copied().collect();
        names.sort_by_key(|g| g.as_str());
        names
    }
}
