// Failover, circuit breaking and retry through the orchestrator

#[path = "../helpers/mod.rs"]
mod helpers;

use std::time::Duration;

use helpers::*;
use payment_orchestrator::config::GatewaySettings;
use payment_orchestrator::core::OrchestrationEvent;
use payment_orchestrator::gateways::{
    CircuitState, LoadBalancingStrategy, SandboxBehavior, SandboxGateway,
};
use payment_orchestrator::payments::{PaymentFilters, PaymentStatus};
use payment_orchestrator::AppError;
use rust_decimal_macros::dec;

fn failover_count(ctx: &TestContext) -> usize {
    ctx.events
        .events()
        .iter()
        .filter(|event| matches!(event, OrchestrationEvent::Failover { .. }))
        .count()
}

async fn payments_on(ctx: &TestContext, gateway: &str, status: PaymentStatus) -> usize {
    ctx.orchestrator
        .find_payments(&PaymentFilters {
            gateway: Some(gateway.to_string()),
            status: Some(status),
            ..Default::default()
        })
        .await
        .unwrap()
        .len()
}

#[tokio::test]
async fn test_failing_gateway_opens_and_is_skipped() {
    let pool = SandboxPool::new();
    let a = pool.add_with("a", SandboxBehavior::AlwaysFail);
    let b = pool.add("b");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![TestDataFactory::gateway("a"), TestDataFactory::gateway("b")],
        pool,
    );

    for _ in 0..7 {
        let payment = ctx
            .orchestrator
            .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
            .await
            .unwrap();
        assert_eq!(payment.gateway, "b");
        assert_eq!(payment.status, PaymentStatus::Paid);
    }

    assert_eq!(a.call_count(), 5);
    assert_eq!(b.call_count(), 7);
    assert_eq!(ctx.orchestrator.circuit_breaker().state("a"), CircuitState::Open);
    assert_eq!(failover_count(&ctx), 5);
    assert_eq!(payments_on(&ctx, "a", PaymentStatus::Failed).await, 5);
    assert_eq!(payments_on(&ctx, "b", PaymentStatus::Paid).await, 7);
}

#[tokio::test]
async fn test_all_circuits_open_means_no_gateway() {
    let ctx = TestContext::new(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        &["a", "b"],
    );
    ctx.orchestrator.circuit_breaker().force_open("a");
    ctx.orchestrator.circuit_breaker().force_open("b");

    let result = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), None)
        .await;

    assert!(matches!(result, Err(AppError::NoGatewayAvailable(_))));
    assert_eq!(ctx.gateways.get("a").call_count(), 0);
    assert_eq!(ctx.gateways.get("b").call_count(), 0);
    assert!(ctx.repository.is_empty());
}

#[tokio::test]
async fn test_exhausted_failover_lists_every_gateway() {
    let pool = SandboxPool::new();
    for name in ["a", "b", "c"] {
        pool.add_with(name, SandboxBehavior::AlwaysFail);
    }
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 10),
        vec![
            TestDataFactory::gateway("a"),
            TestDataFactory::gateway("b"),
            TestDataFactory::gateway("c"),
        ],
        pool,
    );

    let result = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), None)
        .await;

    match result {
        Err(AppError::FailoverExhausted {
            payment_id,
            attempted,
            cause,
        }) => {
            assert_eq!(attempted, vec!["a", "b", "c"]);
            assert!(cause.is_retryable());
            let last = ctx.orchestrator.get_payment(&payment_id).await.unwrap();
            assert_eq!(last.gateway, "c");
            assert_eq!(last.status, PaymentStatus::Failed);
        }
        other => panic!("expected exhausted failover, got {:?}", other),
    }

    for name in ["a", "b", "c"] {
        assert_eq!(ctx.gateways.get(name).call_count(), 1);
        assert_eq!(payments_on(&ctx, name, PaymentStatus::Failed).await, 1);
    }
    assert_eq!(failover_count(&ctx), 2);
}

#[tokio::test]
async fn test_failover_disabled_returns_first_error() {
    let pool = SandboxPool::new();
    pool.add_with("a", SandboxBehavior::AlwaysFail);
    let b = pool.add("b");
    let mut settings = TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5);
    settings.failover_enabled = false;
    let ctx = TestContext::build(
        settings,
        vec![TestDataFactory::gateway("a"), TestDataFactory::gateway("b")],
        pool,
    );

    let result = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await;

    assert!(matches!(
        result,
        Err(AppError::GatewayOperation { retryable: true, .. })
    ));
    assert_eq!(b.call_count(), 0);
    assert_eq!(failover_count(&ctx), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retries_on_same_gateway_before_failover() {
    let pool = SandboxPool::new();
    let a = pool.add_with("a", SandboxBehavior::FailTimes(2));
    let b = pool.add("b");
    let entries = vec![
        GatewaySettings {
            max_retry_attempts: Some(3),
            ..TestDataFactory::gateway("a")
        },
        TestDataFactory::gateway("b"),
    ];
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        entries,
        pool,
    );

    let payment = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await
        .unwrap();

    assert_eq!(payment.gateway, "a");
    assert_eq!(a.call_count(), 3);
    assert_eq!(b.call_count(), 0);
    assert_eq!(ctx.orchestrator.circuit_breaker().failure_count("a"), 0);

    let retries: Vec<u64> = ctx
        .events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            OrchestrationEvent::RetryAttempt { delay_ms, .. } => Some(delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![10, 20]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failure_and_fails_over() {
    let pool = SandboxPool::new();
    let a = pool.add_with("a", SandboxBehavior::Timeout);
    pool.add("b");
    let entries = vec![
        GatewaySettings {
            timeout_ms: Some(50),
            ..TestDataFactory::gateway("a")
        },
        TestDataFactory::gateway("b"),
    ];
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        entries,
        pool,
    );

    let payment = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await
        .unwrap();

    assert_eq!(payment.gateway, "b");
    assert_eq!(a.call_count(), 1);
    assert_eq!(ctx.orchestrator.circuit_breaker().failure_count("a"), 1);

    let failed = ctx
        .orchestrator
        .find_payments(&PaymentFilters {
            gateway: Some("a".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure_reason.as_deref().unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_recovers_through_half_open_trial() {
    let pool = SandboxPool::new();
    let a = pool.add_with("a", SandboxBehavior::AlwaysFail);
    pool.add("b");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 1),
        vec![TestDataFactory::gateway("a"), TestDataFactory::gateway("b")],
        pool,
    );

    let first = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await
        .unwrap();
    assert_eq!(first.gateway, "b");
    assert_eq!(ctx.orchestrator.circuit_breaker().state("a"), CircuitState::Open);

    a.set_behavior(SandboxBehavior::AlwaysSucceed);
    let blocked = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await
        .unwrap();
    assert_eq!(blocked.gateway, "b");

    tokio::time::advance(Duration::from_secs(61)).await;
    let recovered = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await
        .unwrap();
    assert_eq!(recovered.gateway, "a");
    assert_eq!(ctx.orchestrator.circuit_breaker().state("a"), CircuitState::Closed);
    assert_eq!(a.call_count(), 2);
}

#[tokio::test]
async fn test_disabled_preferred_gateway_falls_back() {
    let ctx = TestContext::new(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        &["a", "b"],
    );
    ctx.orchestrator.registry().disable("a").unwrap();

    let payment = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), Some("a"))
        .await
        .unwrap();
    assert_eq!(payment.gateway, "b");
    assert_eq!(ctx.gateways.get("a").call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_half_open_trial_does_not_strand_gateway() {
    let pool = SandboxPool::new();
    let a = pool.insert(SandboxGateway::new("a").with_latency(Duration::from_millis(500)));
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 1),
        vec![TestDataFactory::gateway("a")],
        pool,
    );
    let breaker = ctx.orchestrator.circuit_breaker();
    breaker.record_failure("a");
    tokio::time::advance(Duration::from_secs(61)).await;

    // the caller gives up while the trial call is still in flight
    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        ctx.orchestrator
            .process_payment(TestDataFactory::card_payment(dec!(10.00)), None),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(a.call_count(), 1);

    tokio::time::advance(Duration::from_secs(3_600)).await;
    assert_eq!(breaker.state("a"), CircuitState::HalfOpen);
    assert!(ctx.orchestrator.health_monitor().is_available("a").await);

    let payment = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(10.00)), None)
        .await
        .unwrap();
    assert_eq!(payment.gateway, "a");
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(breaker.state("a"), CircuitState::Closed);
    assert_eq!(a.call_count(), 2);
}
