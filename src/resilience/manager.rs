//! # Circuit Breaker Manager
//!
//! Owns one circuit breaker per remote service endpoint, created lazily from
//! configuration. Provides centralized control and metrics aggregation.

use crate::config::CircuitBreakerSettings;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerMetrics, CircuitState, SystemCircuitBreakerMetrics,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Manager for the circuit breakers of every remote service endpoint
#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    /// Collection of circuit breakers by service name
    circuit_breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,

    config: CircuitBreakerSettings,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakerSettings) -> Self {
        info!(
            enabled = config.enabled,
            max_circuit_breakers = config.max_circuit_breakers,
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(RwLock::new(HashMap::new())),
            config: config.clone(),
        }
    }

    /// Whether calls should be gated by breakers at all
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get or create circuit breaker for a service
    pub fn get_circuit_breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.circuit_breakers.read();
            if let Some(breaker) = breakers.get(service) {
                return Arc::clone(breaker);
            }
        }

        let mut breakers = self.circuit_breakers.write();

        // Double-check: another caller may have created it between the locks
        if let Some(breaker) = breakers.get(service) {
            return Arc::clone(breaker);
        }

        if breakers.len() >= self.config.max_circuit_breakers {
            warn!(
                component = service,
                current_count = breakers.len(),
                max_allowed = self.config.max_circuit_breakers,
                "🚨 Maximum circuit breaker limit reached"
            );
        }

        let component_config = self
            .config
            .config_for_component(service)
            .to_resilience_config();

        let breaker = Arc::new(CircuitBreaker::new(service.to_string(), component_config));
        breakers.insert(service.to_string(), Arc::clone(&breaker));

        info!(
            component = service,
            total_circuit_breakers = breakers.len(),
            "Created new circuit breaker"
        );

        breaker
    }

    /// Get all circuit breaker names
    pub fn list_components(&self) -> Vec<String> {
        self.circuit_breakers.read().keys().cloned().collect()
    }

    pub fn get_component_metrics(&self, service: &str) -> Option<CircuitBreakerMetrics> {
        self.circuit_breakers
            .read()
            .get(service)
            .map(|breaker| breaker.metrics())
    }

    pub fn get_system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();

        for (name, breaker) in self.circuit_breakers.read().iter() {
            system_metrics.add_circuit_breaker(name.clone(), breaker.metrics());
        }

        system_metrics
    }

    /// Force open all circuit breakers (emergency stop)
    pub fn force_open_all(&self) {
        warn!("🚨 Forcing all circuit breakers open (emergency stop)");

        for breaker in self.circuit_breakers.read().values() {
            breaker.force_open();
        }
    }

    /// Force close all circuit breakers (emergency recovery)
    pub fn force_close_all(&self) {
        warn!("🚨 Forcing all circuit breakers closed (emergency recovery)");

        for breaker in self.circuit_breakers.read().values() {
            breaker.force_closed();
        }
    }

    pub fn remove_circuit_breaker(&self, service: &str) -> bool {
        let mut breakers = self.circuit_breakers.write();
        if breakers.remove(service).is_some() {
            info!(
                component = service,
                remaining_count = breakers.len(),
                "🗑️ Removed circuit breaker"
            );
            true
        } else {
            false
        }
    }

    /// Get count of circuit breakers by state
    pub fn get_state_summary(&self) -> HashMap<CircuitState, usize> {
        self.get_system_metrics().count_by_state()
    }

    /// Overall health based on circuit breaker states
    pub fn system_health_score(&self) -> f64 {
        self.get_system_metrics().health_score()
    }
}
