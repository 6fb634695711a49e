// Observability sink for orchestration events
//
// Components report what they did (gateway chosen, retry scheduled, circuit
// moved, failover triggered, payment transitioned). Sinks only observe; no
// control decision ever reads from them.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::modules::gateways::services::circuit_breaker::CircuitState;
use crate::modules::payments::models::PaymentStatus;

/// Structured event emitted by the orchestration layer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    GatewaySelected {
        gateway: String,
        strategy: String,
        candidates: usize,
    },
    RetryAttempt {
        operation: String,
        attempt: u32,
        max_attempts: u32,
        delay_ms: u64,
        error: String,
    },
    CircuitStateChanged {
        gateway: String,
        from: CircuitState,
        to: CircuitState,
        failure_count: u32,
    },
    Failover {
        payment_id: String,
        failed_gateway: String,
        attempted: Vec<String>,
    },
    PaymentTransition {
        payment_id: String,
        gateway: String,
        from: Option<PaymentStatus>,
        to: PaymentStatus,
    },
    HealthChecked {
        gateway: String,
        healthy: bool,
        response_time_ms: u64,
    },
}

/// Receiver of orchestration events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestrationEvent);
}

/// Default sink: forwards every event to `tracing`
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: OrchestrationEvent) {
        match &event {
            OrchestrationEvent::GatewaySelected {
                gateway,
                strategy,
                candidates,
            } => info!(gateway = %gateway, strategy = %strategy, candidates, "Gateway selected"),
            OrchestrationEvent::RetryAttempt {
                operation,
                attempt,
                max_attempts,
                delay_ms,
                error,
            } => warn!(
                operation = %operation,
                attempt,
                max_attempts,
                delay_ms,
                error = %error,
                "Retrying gateway operation"
            ),
            OrchestrationEvent::CircuitStateChanged {
                gateway,
                from,
                to,
                failure_count,
            } => warn!(
                gateway = %gateway,
                from = %from,
                to = %to,
                failure_count,
                "Circuit state changed"
            ),
            OrchestrationEvent::Failover {
                payment_id,
                failed_gateway,
                attempted,
            } => warn!(
                payment_id = %payment_id,
                failed_gateway = %failed_gateway,
                attempted = ?attempted,
                "Failing over to next gateway"
            ),
            OrchestrationEvent::PaymentTransition {
                payment_id,
                gateway,
                from,
                to,
            } => info!(
                payment_id = %payment_id,
                gateway = %gateway,
                from = ?from,
                to = %to,
                "Payment transitioned"
            ),
            OrchestrationEvent::HealthChecked {
                gateway,
                healthy,
                response_time_ms,
            } => debug!(gateway = %gateway, healthy, response_time_ms, "Gateway health checked"),
        }
    }
}

/// Sink that keeps every event in memory, for inspection and tests
#[derive(Debug, Default, Clone)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<OrchestrationEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<OrchestrationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: OrchestrationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Fans one event out to several sinks
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: OrchestrationEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
