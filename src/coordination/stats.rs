//! Coordinator statistics snapshot.

use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time view of the coordinator's counters and tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Calls issued to any entry point
    pub total_calls: u64,
    /// Calls answered from the dedup cache
    pub dedup_hits: u64,
    /// Groups that started executing
    pub batch_executions: u64,
    pub throttled_rejections: u64,
    /// Executions stopped by an open circuit breaker
    pub circuit_rejections: u64,
    /// Groups still accumulating waiters
    pub pending_groups: usize,
    pub dedup_cache_size: usize,
    pub throttle_entries: usize,
    /// Breaker state by service name
    pub breakers: BTreeMap<String, BreakerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub phase: CircuitState,
    pub failure_count: u64,
    pub rejected_calls: u64,
}

impl From<&CircuitBreakerMetrics> for BreakerSnapshot {
    fn from(metrics: &CircuitBreakerMetrics) -> Self {
        Self {
            phase: metrics.current_state,
            failure_count: metrics.consecutive_failures,
            rejected_calls: metrics.rejected_calls,
        }
    }
}

impl CoordinatorStats {
    /// Fraction of calls answered from the dedup cache
    pub fn dedup_hit_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.dedup_hits as f64 / self.total_calls as f64
    }

    pub fn open_breakers(&self) -> Vec<&str> {
        self.breakers
            .iter()
            .filter(|(_, snapshot)| snapshot.phase == CircuitState::Open)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_breaker_phase() {
        let mut stats = CoordinatorStats {
            total_calls: 4,
            dedup_hits: 1,
            ..Default::default()
        };
        stats.breakers.insert(
            "backend".to_string(),
            BreakerSnapshot {
                phase: CircuitState::Open,
                failure_count: 5,
                rejected_calls: 2,
            },
        );

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_calls"], 4);
        assert_eq!(json["breakers"]["backend"]["phase"], "OPEN");
        assert_eq!(stats.dedup_hit_rate(), 0.25);
        assert_eq!(stats.open_breakers(), vec!["backend"]);
    }
}
