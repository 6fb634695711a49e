use dashmap::DashMap;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::core::{AppError, Currency, EventSink, OrchestrationEvent, Result};
use crate::modules::payments::models::PaymentMethod;

use super::health_monitor::HealthMonitor;
use super::performance::{PerformanceMetrics, PerformanceTracker};
use super::registry::GatewayRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    Weighted,
    PerformanceBased,
    Random,
}

impl std::fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::Weighted => "weighted",
            LoadBalancingStrategy::PerformanceBased => "performance_based",
            LoadBalancingStrategy::Random => "random",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(LoadBalancingStrategy::RoundRobin),
            "weighted" => Ok(LoadBalancingStrategy::Weighted),
            "performance_based" | "performance" => Ok(LoadBalancingStrategy::PerformanceBased),
            "random" => Ok(LoadBalancingStrategy::Random),
            _ => Err(format!("Unknown load balancing strategy: {}", s)),
        }
    }
}

/// What a payment needs from a gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionCriteria {
    pub payment_method: PaymentMethod,
    pub currency: Currency,
    pub amount: Decimal,
}

/// Index picked by a cumulative-weight draw, `draw` in `0..sum(weights)`
pub fn weighted_index(weights: &[u32], draw: u64) -> usize {
    let mut cumulative = 0u64;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += u64::from(*weight);
        if draw < cumulative {
            return index;
        }
    }
    weights.len().saturating_sub(1)
}

/// Index of the highest score; the first one wins ties
pub fn best_score_index(scores: &[f64]) -> usize {
    let mut best = 0;
    for (index, score) in scores.iter().enumerate().skip(1) {
        if *score > scores[best] {
            best = index;
        }
    }
    best
}

/// Picks one gateway among the enabled, available, matching ones
pub struct LoadBalancer {
    registry: Arc<GatewayRegistry>,
    health: Arc<HealthMonitor>,
    performance: Arc<PerformanceTracker>,

    /// Round-robin position per distinct candidate set
    cursors: DashMap<String, usize>,
    events: Arc<dyn EventSink>,
}

impl LoadBalancer {
    pub fn new(
        registry: Arc<GatewayRegistry>,
        health: Arc<HealthMonitor>,
        performance: Arc<PerformanceTracker>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            health,
            performance,
            cursors: DashMap::new(),
            events,
        }
    }

    /// Candidate names in priority order, skipping anything in `exclude`
    pub async fn available_gateways(
        &self,
        criteria: &SelectionCriteria,
        exclude: &HashSet<String>,
    ) -> Vec<String> {
        let mut candidates = Vec::new();

        for config in self.registry.enabled_configs() {
            if exclude.contains(&config.name) || !config.permits(criteria) {
                continue;
            }
            let adapter = match self.registry.get_gateway(&config.name) {
                Ok(adapter) => adapter,
                Err(e) => {
                    debug!(gateway = %config.name, error = %e, "Skipping gateway");
                    continue;
                }
            };
            let matches = adapter.is_active()
                && adapter.supports_method(criteria.payment_method)
                && adapter.supports_currency(criteria.currency)
                && adapter.is_amount_valid(criteria.amount, criteria.currency);
            if !matches {
                continue;
            }
            if self.health.is_available(&config.name).await {
                candidates.push(config.name);
            }
        }

        candidates
    }

    /// Metrics the adapter reports for itself, falling back to the calls
    /// observed in this process
    pub fn gateway_metrics(&self, gateway: &str) -> PerformanceMetrics {
        self.registry
            .get_gateway(gateway)
            .ok()
            .and_then(|adapter| adapter.performance_metrics())
            .unwrap_or_else(|| self.performance.metrics(gateway))
    }

    pub fn select_gateway(&self, candidates: &[String], strategy: LoadBalancingStrategy) -> Result<String> {
        if candidates.is_empty() {
            return Err(AppError::NoGatewayAvailable(
                "no enabled, available gateway matches the request".to_string(),
            ));
        }

        let index = match strategy {
            LoadBalancingStrategy::RoundRobin => {
                let mut cursor = self.cursors.entry(candidates.join(",")).or_insert(0);
                let index = *cursor % candidates.len();
                *cursor = (index + 1) % candidates.len();
                index
            }
            LoadBalancingStrategy::Weighted => {
                let weights: Vec<u32> = candidates
                    .iter()
                    .map(|name| self.registry.get_config(name).map_or(1, |c| c.weight.max(1)))
                    .collect();
                let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
                weighted_index(&weights, rand::thread_rng().gen_range(0..total))
            }
            LoadBalancingStrategy::PerformanceBased => {
                let scores: Vec<f64> = candidates
                    .iter()
                    .map(|name| self.gateway_metrics(name).score())
                    .collect();
                best_score_index(&scores)
            }
            LoadBalancingStrategy::Random => rand::thread_rng().gen_range(0..candidates.len()),
        };

        let selected = candidates[index].clone();
        self.events.emit(OrchestrationEvent::GatewaySelected {
            gateway: selected.clone(),
            strategy: strategy.to_string(),
            candidates: candidates.len(),
        });
        Ok(selected)
    }
}
