use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitSettings;
use crate::core::{AppError, EventSink, OrchestrationEvent, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// What a caller may do right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitDecision {
    Allow,
    /// Allowed as the single half-open trial
    Probe,
    Reject(String),
}

#[derive(Debug, Clone)]
struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,

    /// Id of the half-open trial currently running
    trial: Option<u64>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            trial: None,
        }
    }

    fn cooled_down(&self, open_timeout: Duration, now: Instant) -> bool {
        self.last_failure
            .map_or(true, |at| now.saturating_duration_since(at) > open_timeout)
    }
}

/// Read-only view of one gateway's breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub gateway: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,

    /// Time since the last recorded failure
    pub since_last_failure_ms: Option<u64>,
}

type Entries = Arc<DashMap<String, BreakerEntry>>;

/// Admission for one call through a gateway's circuit
///
/// A permit that carries the half-open trial hands it back when dropped,
/// unless an outcome was recorded first. Dropping a caller mid-trial
/// therefore lets the next caller run a fresh trial.
#[must_use = "dropping the permit gives back a half-open trial"]
pub struct CircuitPermit {
    gateway: String,
    trial: Option<u64>,
    entries: Entries,
}

impl CircuitPermit {
    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Whether this call is the half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl std::fmt::Debug for CircuitPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitPermit")
            .field("gateway", &self.gateway)
            .field("trial", &self.trial)
            .finish()
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        let Some(trial) = self.trial.take() else {
            return;
        };
        if let Some(mut entry) = self.entries.get_mut(&self.gateway) {
            // a recorded outcome or a newer trial owns the slot now
            if entry.trial == Some(trial) {
                entry.trial = None;
                tracing::debug!(gateway = %self.gateway, trial, "Half-open trial returned unfinished");
            }
        }
    }
}

fn pre_call_decision(entry: &BreakerEntry, open_timeout: Duration, now: Instant) -> CircuitDecision {
    match entry.state {
        CircuitState::Closed => CircuitDecision::Allow,
        CircuitState::Open => {
            if entry.cooled_down(open_timeout, now) {
                CircuitDecision::Probe
            } else {
                CircuitDecision::Reject("circuit open".to_string())
            }
        }
        CircuitState::HalfOpen => {
            if entry.trial.is_some() {
                CircuitDecision::Reject("half-open trial in flight".to_string())
            } else {
                CircuitDecision::Probe
            }
        }
    }
}

fn apply_outcome(entry: &mut BreakerEntry, success: bool, threshold: u32, now: Instant) {
    entry.trial = None;

    if success {
        entry.state = CircuitState::Closed;
        entry.failure_count = 0;
        return;
    }

    entry.failure_count = entry.failure_count.saturating_add(1);
    entry.last_failure = Some(now);
    match entry.state {
        CircuitState::Closed if entry.failure_count >= threshold => entry.state = CircuitState::Open,
        CircuitState::Closed => {}
        CircuitState::HalfOpen | CircuitState::Open => entry.state = CircuitState::Open,
    }
}

/// Per-gateway closed / open / half-open state machine
///
/// Every read-modify-write happens under the gateway's own map shard lock,
/// so unrelated gateways never contend.
pub struct CircuitBreaker {
    entries: Entries,
    next_trial: AtomicU64,
    failure_threshold: u32,
    open_timeout: Duration,
    events: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    pub fn new(settings: &CircuitSettings, events: Arc<dyn EventSink>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_trial: AtomicU64::new(1),
            failure_threshold: settings.failure_threshold.max(1),
            open_timeout: settings.open_timeout(),
            events,
        }
    }

    /// Gate a call. Claims the half-open trial when one is due.
    ///
    /// Hold the permit until the outcome is recorded.
    pub fn try_acquire(&self, gateway: &str) -> Result<CircuitPermit> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(gateway.to_string())
            .or_insert_with(BreakerEntry::new);

        match pre_call_decision(&entry, self.open_timeout, now) {
            CircuitDecision::Allow => Ok(self.permit(gateway, None)),
            CircuitDecision::Probe => {
                let trial = self.next_trial.fetch_add(1, Ordering::Relaxed);
                let from = entry.state;
                entry.state = CircuitState::HalfOpen;
                entry.trial = Some(trial);
                let failure_count = entry.failure_count;
                drop(entry);

                if from != CircuitState::HalfOpen {
                    self.changed(gateway, from, CircuitState::HalfOpen, failure_count);
                }
                tracing::debug!(gateway = %gateway, trial, "Circuit admitting half-open trial");
                Ok(self.permit(gateway, Some(trial)))
            }
            CircuitDecision::Reject(reason) => Err(AppError::unavailable(gateway, reason)),
        }
    }

    /// Whether a call would currently be admitted, without claiming anything
    pub fn is_available(&self, gateway: &str) -> bool {
        match self.entries.get(gateway) {
            Some(entry) => !matches!(
                pre_call_decision(&entry, self.open_timeout, Instant::now()),
                CircuitDecision::Reject(_)
            ),
            None => true,
        }
    }

    pub fn record_success(&self, gateway: &str) {
        self.record(gateway, true);
    }

    pub fn record_failure(&self, gateway: &str) {
        self.record(gateway, false);
    }

    fn permit(&self, gateway: &str, trial: Option<u64>) -> CircuitPermit {
        CircuitPermit {
            gateway: gateway.to_string(),
            trial,
            entries: self.entries.clone(),
        }
    }

    fn record(&self, gateway: &str, success: bool) {
        let mut entry = self
            .entries
            .entry(gateway.to_string())
            .or_insert_with(BreakerEntry::new);

        let from = entry.state;
        apply_outcome(&mut entry, success, self.failure_threshold, Instant::now());
        let to = entry.state;
        let failure_count = entry.failure_count;
        drop(entry);

        if !success {
            tracing::debug!(gateway = %gateway, failure_count, "Circuit recorded failure");
        }
        if from != to {
            self.changed(gateway, from, to, failure_count);
        }
    }

    pub fn state(&self, gateway: &str) -> CircuitState {
        self.entries
            .get(gateway)
            .map_or(CircuitState::Closed, |e| e.state)
    }

    pub fn failure_count(&self, gateway: &str) -> u32 {
        self.entries.get(gateway).map_or(0, |e| e.failure_count)
    }

    pub fn snapshot(&self, gateway: &str) -> CircuitSnapshot {
        let now = Instant::now();
        let entry = self
            .entries
            .get(gateway)
            .map(|e| e.clone())
            .unwrap_or_else(BreakerEntry::new);

        CircuitSnapshot {
            gateway: gateway.to_string(),
            state: entry.state,
            failure_count: entry.failure_count,
            failure_threshold: self.failure_threshold,
            since_last_failure_ms: entry
                .last_failure
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
        }
    }

    /// Close the circuit and clear its counters
    pub fn reset(&self, gateway: &str) {
        let from = self.state(gateway);
        self.entries.insert(gateway.to_string(), BreakerEntry::new());
        if from != CircuitState::Closed {
            self.changed(gateway, from, CircuitState::Closed, 0);
        }
        tracing::info!(gateway = %gateway, "Circuit reset by operator");
    }

    /// Open the circuit now; it cools down like any other open circuit
    pub fn force_open(&self, gateway: &str) {
        let mut entry = self
            .entries
            .entry(gateway.to_string())
            .or_insert_with(BreakerEntry::new);
        let from = entry.state;
        entry.state = CircuitState::Open;
        entry.last_failure = Some(Instant::now());
        entry.trial = None;
        let failure_count = entry.failure_count;
        drop(entry);

        if from != CircuitState::Open {
            self.changed(gateway, from, CircuitState::Open, failure_count);
        }
        tracing::warn!(gateway = %gateway, "Circuit forced open by operator");
    }

    pub fn remove(&self, gateway: &str) {
        self.entries.remove(gateway);
    }

    fn changed(&self, gateway: &str, from: CircuitState, to: CircuitState, failure_count: u32) {
        self.events.emit(OrchestrationEvent::CircuitStateChanged {
            gateway: gateway.to_string(),
            from,
            to,
            failure_count,
        });
    }
}
