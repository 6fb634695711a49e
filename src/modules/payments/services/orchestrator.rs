use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{Config, GatewayDefaults, GatewaySettings, OrchestratorSettings};
use crate::core::{AppError, ErrorKind, EventSink, OrchestrationEvent, Result, TracingEventSink};
use crate::modules::gateways::models::{GatewayConfig, GatewayKind};
use crate::modules::gateways::services::{
    with_deadline, CircuitBreaker, CircuitPermit, CircuitSnapshot, GatewayFactory, GatewayPaymentRequest,
    GatewayRefundRequest, GatewayRegistry, HealthCache, HealthMonitor, LoadBalancer,
    PaymentGateway, PerformanceMetrics, PerformanceTracker, RetryExecutor, RetryPolicy,
    SelectionCriteria,
};
use crate::modules::payments::models::{
    Payment, PaymentFilters, PaymentRequest, PaymentStatistics, PaymentStatus, Refund,
};
use crate::modules::payments::repositories::{
    InMemoryPaymentRepository, NewPayment, PaymentRepository, StatusUpdate,
};

use super::payment_locks::PaymentLocks;
use super::validator::{BasicCardValidator, CardValidator};

/// Gateway admitted by its circuit for one operation
struct Lease {
    config: GatewayConfig,
    adapter: Arc<dyn PaymentGateway>,
    _permit: CircuitPermit,
}

/// Operator view of one gateway
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub name: String,
    pub kind: GatewayKind,

    /// Provider API version; `None` while the adapter is disabled
    pub api_version: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub weight: u32,
    pub circuit: CircuitSnapshot,

    /// Last cached probe result; `None` when nothing fresh is cached
    pub healthy: Option<bool>,
    pub metrics: PerformanceMetrics,
}

/// Facade over the payment lifecycle
///
/// Selects a gateway, gates the call on its circuit, wraps it in retry and a
/// deadline, persists every transition through the repository and fails
/// over to the next matching gateway once one is exhausted. Operations on
/// one payment id are serialized; everything else runs concurrently.
pub struct PaymentOrchestrator {
    settings: OrchestratorSettings,
    registry: Arc<GatewayRegistry>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthMonitor>,
    balancer: LoadBalancer,
    retry: RetryExecutor,
    performance: Arc<PerformanceTracker>,
    repository: Arc<dyn PaymentRepository>,
    validator: Arc<dyn CardValidator>,
    locks: PaymentLocks,
    events: Arc<dyn EventSink>,
}

impl PaymentOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// One-step sale with failover
    ///
    /// Each gateway tried gets its own payment record. A declined payment is
    /// returned as is; only exhausted transient failures move on to the next
    /// gateway, and every gateway is tried at most once.
    pub async fn process_payment(&self, request: PaymentRequest, preferred: Option<&str>) -> Result<Payment> {
        let criteria = self.validate_request(&request)?;

        let mut excluded: HashSet<String> = HashSet::new();
        let mut attempted: Vec<String> = Vec::new();
        let mut last_payment_id: Option<String> = None;
        let mut last_error: Option<AppError> = None;
        let mut preferred = preferred;

        for _ in 0..self.registry.len().max(1) {
            let gateway = match self.choose_gateway(&criteria, &excluded, preferred.take()).await {
                Ok(gateway) => gateway,
                Err(e) => {
                    if last_error.is_none() {
                        last_error = Some(e);
                    }
                    break;
                }
            };
            excluded.insert(gateway.clone());

            if let (Some(payment_id), Some(failed)) = (&last_payment_id, attempted.last()) {
                self.events.emit(OrchestrationEvent::Failover {
                    payment_id: payment_id.clone(),
                    failed_gateway: failed.clone(),
                    attempted: attempted.clone(),
                });
            }

            let lease = match self.acquire(&gateway) {
                Ok(lease) => lease,
                Err(e) if e.kind() == ErrorKind::Unavailable => {
                    warn!(gateway = %gateway, error = %e, "Selected gateway became unavailable");
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let payment = self.open_payment(&request, &criteria, &gateway).await?;
            attempted.push(gateway.clone());
            last_payment_id = Some(payment.id.clone());

            let gateway_request = GatewayPaymentRequest::new(&payment, &request);
            let outcome = self
                .invoke(lease, "process_payment", |adapter| {
                    let gateway_request = &gateway_request;
                    async move { adapter.process_payment(gateway_request).await }
                })
                .await;

            match outcome {
                Ok(response) => {
                    let update = StatusUpdate::to(response.status)
                        .expecting(payment.version)
                        .with_transaction(Some(response.transaction_id))
                        .with_authorization(response.authorization_id)
                        .with_response(response.raw);
                    let updated = self.repository.update_status(&payment.id, update).await?;
                    self.transitioned(&updated, Some(payment.status));
                    info!(
                        payment_id = %updated.id,
                        gateway = %gateway,
                        status = %updated.status,
                        "Payment processed"
                    );
                    return Ok(updated);
                }
                Err(e) => {
                    self.fail_payment(&payment, &e).await?;
                    if !e.is_retryable() || !self.settings.failover_enabled {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        let cause = last_error.unwrap_or_else(|| {
            AppError::NoGatewayAvailable("no enabled, available gateway matches the request".to_string())
        });
        match last_payment_id {
            Some(payment_id) => {
                warn!(payment_id = %payment_id, attempted = ?attempted, error = %cause, "Failover exhausted");
                Err(AppError::FailoverExhausted {
                    payment_id,
                    attempted,
                    cause: Box::new(cause),
                })
            }
            None => Err(cause),
        }
    }

    /// Place an authorization hold; no failover
    pub async fn authorize_payment(&self, request: PaymentRequest, preferred: Option<&str>) -> Result<Payment> {
        let criteria = self.validate_request(&request)?;
        let gateway = self.choose_gateway(&criteria, &HashSet::new(), preferred).await?;
        let lease = self.acquire(&gateway)?;

        let payment = self.open_payment(&request, &criteria, &gateway).await?;
        let gateway_request = GatewayPaymentRequest::new(&payment, &request);
        let outcome = self
            .invoke(lease, "authorize_payment", |adapter| {
                let gateway_request = &gateway_request;
                async move { adapter.authorize_payment(gateway_request).await }
            })
            .await;

        match outcome {
            Ok(response) => {
                let authorization_id = response
                    .authorization_id
                    .or_else(|| Some(response.transaction_id.clone()));
                let update = StatusUpdate::to(PaymentStatus::Authorized)
                    .expecting(payment.version)
                    .with_transaction(Some(response.transaction_id))
                    .with_authorization(authorization_id)
                    .with_response(response.raw);
                let updated = self.repository.update_status(&payment.id, update).await?;
                self.transitioned(&updated, Some(payment.status));
                info!(payment_id = %updated.id, gateway = %gateway, "Payment authorized");
                Ok(updated)
            }
            Err(e) => {
                self.fail_payment(&payment, &e).await?;
                Err(e)
            }
        }
    }

    /// Capture an authorized payment, in full unless `amount` is given
    pub async fn capture_payment(&self, payment_id: &str, amount: Option<Decimal>) -> Result<Payment> {
        let _guard = self.locks.lock(payment_id).await;
        let payment = self.get_payment(payment_id).await?;

        if payment.status != PaymentStatus::Authorized {
            return Err(AppError::state(format!(
                "Payment '{}' is {}; only authorized payments can be captured",
                payment.id, payment.status
            )));
        }
        let authorization_id = payment.authorization_id.clone().ok_or_else(|| {
            AppError::state(format!("Payment '{}' has no authorization id", payment.id))
        })?;

        let amount = amount.unwrap_or(payment.amount);
        if amount > payment.amount {
            return Err(AppError::validation(format!(
                "Capture amount {} exceeds authorized amount {}",
                amount, payment.amount
            )));
        }
        payment
            .currency
            .validate_amount(amount)
            .map_err(AppError::Validation)?;

        let lease = self.acquire(&payment.gateway)?;
        let response = self
            .invoke(lease, "capture_payment", |adapter| {
                let authorization_id = &authorization_id;
                async move { adapter.capture_payment(authorization_id, amount).await }
            })
            .await?;

        let updated = self
            .repository
            .mark_as_captured(&payment.id, amount, Some(response.raw))
            .await?;
        self.transitioned(&updated, Some(payment.status));
        info!(payment_id = %updated.id, amount = %amount, "Payment captured");
        Ok(updated)
    }

    /// Release an authorization hold
    pub async fn cancel_payment(&self, payment_id: &str, reason: &str) -> Result<Payment> {
        let _guard = self.locks.lock(payment_id).await;
        let payment = self.get_payment(payment_id).await?;

        if payment.status != PaymentStatus::Authorized {
            return Err(AppError::state(format!(
                "Payment '{}' is {}; only authorized payments can be cancelled",
                payment.id, payment.status
            )));
        }
        let authorization_id = payment.authorization_id.clone().ok_or_else(|| {
            AppError::state(format!("Payment '{}' has no authorization id", payment.id))
        })?;

        let lease = self.acquire(&payment.gateway)?;
        self.invoke(lease, "cancel_payment", |adapter| {
            let authorization_id = &authorization_id;
            async move { adapter.cancel_payment(authorization_id, reason).await }
        })
        .await?;

        let updated = self.repository.mark_as_cancelled(&payment.id, reason).await?;
        self.transitioned(&updated, Some(payment.status));
        info!(payment_id = %updated.id, reason = %reason, "Payment cancelled");
        Ok(updated)
    }

    /// Refund a settled payment, the whole remaining balance unless `amount`
    /// is given
    ///
    /// A request above the remaining balance is rejected before any gateway
    /// call and nothing is recorded.
    pub async fn refund_payment(&self, payment_id: &str, amount: Option<Decimal>, reason: &str) -> Result<Payment> {
        let _guard = self.locks.lock(payment_id).await;
        let payment = self.get_payment(payment_id).await?;

        if !payment.status.is_refundable() {
            return Err(AppError::state(format!(
                "Payment '{}' is {}; only captured or paid payments can be refunded",
                payment.id, payment.status
            )));
        }
        let refundable = payment.refundable_amount();
        if refundable <= Decimal::ZERO {
            return Err(AppError::state(format!(
                "Payment '{}' has nothing left to refund",
                payment.id
            )));
        }

        let amount = match amount {
            Some(requested) if requested <= Decimal::ZERO => {
                return Err(AppError::validation("Refund amount must be greater than zero"));
            }
            Some(requested) if requested > refundable => {
                return Err(AppError::state(format!(
                    "Refund of {} exceeds refundable balance {}",
                    requested, refundable
                )));
            }
            Some(requested) => requested,
            None => refundable,
        };
        payment
            .currency
            .validate_amount(amount)
            .map_err(AppError::Validation)?;

        let transaction_id = payment
            .transaction_id
            .clone()
            .or_else(|| payment.authorization_id.clone())
            .ok_or_else(|| {
                AppError::state(format!("Payment '{}' has no gateway reference", payment.id))
            })?;

        let refund_request = GatewayRefundRequest {
            transaction_id,
            amount,
            currency: payment.currency,
            reason: reason.to_string(),
            idempotency_key: format!("{}-refund-{}", payment.id, payment.refunds.len() + 1),
        };

        let lease = self.acquire(&payment.gateway)?;
        let response = self
            .invoke(lease, "refund_payment", |adapter| {
                let refund_request = &refund_request;
                async move { adapter.refund_payment(refund_request).await }
            })
            .await?;

        let mut updated = self
            .repository
            .add_refund(&payment.id, Refund::new(amount, reason, response.refund_id))
            .await?;
        info!(
            payment_id = %updated.id,
            amount = %amount,
            total_refunded = %updated.total_refunded(),
            "Refund recorded"
        );

        if updated.is_fully_refunded() {
            updated = self.repository.mark_as_refunded(&payment.id).await?;
            self.transitioned(&updated, Some(payment.status));
        }
        Ok(updated)
    }

    /// Ask the gateway directly and adopt its status when that is a legal
    /// move from ours
    ///
    /// Skips retry and the circuit breaker but keeps the deadline.
    pub async fn check_transaction_status(&self, payment_id: &str) -> Result<Payment> {
        let _guard = self.locks.lock(payment_id).await;
        let payment = self.get_payment(payment_id).await?;

        let reference = payment
            .transaction_id
            .clone()
            .or_else(|| payment.authorization_id.clone())
            .ok_or_else(|| {
                AppError::state(format!("Payment '{}' has no gateway reference", payment.id))
            })?;

        let config = self.registry.get_config(&payment.gateway)?;
        let adapter = self.registry.get_gateway(&payment.gateway)?;
        let response = with_deadline(
            &payment.gateway,
            config.timeout(),
            adapter.check_transaction_status(&reference),
        )
        .await?;

        if response.status == payment.status {
            return Ok(payment);
        }
        if !payment.status.can_transition_to(response.status) {
            warn!(
                payment_id = %payment.id,
                local = %payment.status,
                remote = %response.status,
                "Gateway status diverges but is not a legal transition; keeping local status"
            );
            return Ok(payment);
        }

        let update = StatusUpdate::to(response.status)
            .expecting(payment.version)
            .with_response(response.raw);
        let updated = self.repository.update_status(&payment.id, update).await?;
        self.transitioned(&updated, Some(payment.status));
        info!(
            payment_id = %updated.id,
            from = %payment.status,
            to = %updated.status,
            "Payment reconciled with gateway"
        );
        Ok(updated)
    }

    pub async fn get_payment(&self, payment_id: &str) -> Result<Payment> {
        self.repository
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment '{}' not found", payment_id)))
    }

    pub async fn statistics(&self, filters: &PaymentFilters) -> Result<PaymentStatistics> {
        self.repository.get_statistics(filters).await
    }

    pub async fn find_payments(&self, filters: &PaymentFilters) -> Result<Vec<Payment>> {
        self.repository.find_by_filters(filters).await
    }

    /// Every registered gateway in priority order
    pub fn gateway_status(&self) -> Vec<GatewayStatus> {
        self.registry
            .names()
            .into_iter()
            .filter_map(|name| {
                let config = self.registry.get_config(&name).ok()?;
                let api_version = self
                    .registry
                    .get_gateway(&name)
                    .ok()
                    .map(|adapter| adapter.api_version().to_string());
                Some(GatewayStatus {
                    circuit: self.breaker.snapshot(&name),
                    healthy: self.health.cached_health(&name),
                    metrics: self.balancer.gateway_metrics(&name),
                    name,
                    kind: config.kind,
                    api_version,
                    enabled: config.enabled,
                    priority: config.priority,
                    weight: config.weight,
                })
            })
            .collect()
    }

    pub fn registry(&self) -> &Arc<GatewayRegistry> {
        &self.registry
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn validate_request(&self, request: &PaymentRequest) -> Result<SelectionCriteria> {
        let method = request.validate()?;
        if method.is_card() {
            if let Some(card) = &request.card {
                self.validator.validate(card)?;
            }
        }
        request
            .currency
            .validate_amount(request.amount)
            .map_err(AppError::Validation)?;
        Ok(request.criteria(method))
    }

    /// Preferred gateway when it is a current candidate, otherwise the
    /// configured strategy
    async fn choose_gateway(
        &self,
        criteria: &SelectionCriteria,
        excluded: &HashSet<String>,
        preferred: Option<&str>,
    ) -> Result<String> {
        let candidates = self.balancer.available_gateways(criteria, excluded).await;

        if let Some(preferred) = preferred {
            if candidates.iter().any(|c| c == preferred) {
                self.events.emit(OrchestrationEvent::GatewaySelected {
                    gateway: preferred.to_string(),
                    strategy: "preferred".to_string(),
                    candidates: candidates.len(),
                });
                return Ok(preferred.to_string());
            }
            warn!(gateway = %preferred, "Preferred gateway unavailable; falling back to load balancer");
        }

        self.balancer
            .select_gateway(&candidates, self.settings.strategy)
            .map_err(|_| {
                AppError::NoGatewayAvailable(format!(
                    "no gateway for {} via {}",
                    criteria.currency.format_amount(criteria.amount),
                    criteria.payment_method
                ))
            })
    }

    fn acquire(&self, gateway: &str) -> Result<Lease> {
        let config = self.registry.get_config(gateway)?;
        let adapter = self.registry.get_gateway(gateway)?;
        let permit = self.breaker.try_acquire(gateway)?;
        Ok(Lease {
            config,
            adapter,
            _permit: permit,
        })
    }

    /// Run one gateway operation under retry and deadline, then report the
    /// outcome to the circuit breaker
    ///
    /// Consumes the lease, so its permit goes back with it.
    async fn invoke<T, F, Fut>(&self, lease: Lease, operation: &str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn PaymentGateway>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let gateway = lease.config.name.as_str();
        let timeout = lease.config.timeout();
        let policy = RetryPolicy::new(lease.config.max_retry_attempts, &self.settings.retry);
        let label = format!("{}.{}", gateway, operation);

        let result = self
            .retry
            .execute(&label, &policy, |_attempt| {
                let pending = call(lease.adapter.clone());
                async move {
                    let started = Instant::now();
                    let result = with_deadline(gateway, timeout, pending).await;
                    let responded = !matches!(&result, Err(e) if e.is_retryable());
                    self.performance.record(gateway, responded, started.elapsed());
                    result
                }
            })
            .await;

        match &result {
            Ok(_) => self.breaker.record_success(gateway),
            Err(e) if e.is_retryable() => self.breaker.record_failure(gateway),
            // a decline says nothing about the gateway's health
            Err(_) => {}
        }
        result
    }

    async fn open_payment(
        &self,
        request: &PaymentRequest,
        criteria: &SelectionCriteria,
        gateway: &str,
    ) -> Result<Payment> {
        let payment = self
            .repository
            .create(NewPayment::from_request(request, criteria.payment_method, gateway))
            .await?;
        self.transitioned(&payment, None);
        Ok(payment)
    }

    async fn fail_payment(&self, payment: &Payment, error: &AppError) -> Result<()> {
        warn!(
            payment_id = %payment.id,
            gateway = %payment.gateway,
            error = %error,
            "Payment failed on gateway"
        );
        let failed = self
            .repository
            .mark_as_failed(&payment.id, &error.to_string())
            .await?;
        self.transitioned(&failed, Some(payment.status));
        Ok(())
    }

    fn transitioned(&self, payment: &Payment, from: Option<PaymentStatus>) {
        self.events.emit(OrchestrationEvent::PaymentTransition {
            payment_id: payment.id.clone(),
            gateway: payment.gateway.clone(),
            from,
            to: payment.status,
        });
    }
}

/// Wires the orchestrator and its collaborators together
pub struct OrchestratorBuilder {
    settings: OrchestratorSettings,
    defaults: GatewayDefaults,
    factory: GatewayFactory,
    repository: Option<Arc<dyn PaymentRepository>>,
    validator: Option<Arc<dyn CardValidator>>,
    events: Option<Arc<dyn EventSink>>,
    gateways: Vec<GatewaySettings>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            settings: OrchestratorSettings::default(),
            defaults: GatewayDefaults::default(),
            factory: GatewayFactory::with_defaults(),
            repository: None,
            validator: None,
            events: None,
            gateways: Vec::new(),
        }
    }

    /// Start from a loaded `Config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            settings: config.orchestrator.clone(),
            defaults: config.gateway_defaults.clone(),
            gateways: config.gateways.clone(),
            ..Self::new()
        }
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn gateway_defaults(mut self, defaults: GatewayDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn factory(mut self, factory: GatewayFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn repository(mut self, repository: Arc<dyn PaymentRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn CardValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gateway(mut self, settings: GatewaySettings) -> Self {
        self.gateways.push(settings);
        self
    }

    /// Register every gateway and check each kind has an adapter
    pub fn build(self) -> Result<PaymentOrchestrator> {
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryPaymentRepository::new()) as Arc<dyn PaymentRepository>);
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(BasicCardValidator::new()) as Arc<dyn CardValidator>);

        let breaker = Arc::new(CircuitBreaker::new(&self.settings.circuit, events.clone()));
        let cache = Arc::new(HealthCache::new(&self.settings.health));
        let performance = Arc::new(PerformanceTracker::new());
        let registry = Arc::new(GatewayRegistry::new(
            self.factory,
            self.defaults,
            breaker.clone(),
            cache.clone(),
            performance.clone(),
        ));

        for settings in self.gateways {
            let name = settings.name.clone();
            registry.register_config(&name, settings)?;
        }
        registry.validate_kinds()?;

        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            breaker.clone(),
            cache,
            events.clone(),
        ));
        let balancer = LoadBalancer::new(
            registry.clone(),
            health.clone(),
            performance.clone(),
            events.clone(),
        );

        Ok(PaymentOrchestrator {
            settings: self.settings,
            registry,
            breaker,
            health,
            balancer,
            retry: RetryExecutor::new(events.clone()),
            performance,
            repository,
            validator,
            locks: PaymentLocks::new(),
            events,
        })
    }
}
