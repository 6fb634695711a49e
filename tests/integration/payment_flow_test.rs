// Payment lifecycle through the orchestrator
//
// Sale, authorize/capture/cancel, reconciliation against the gateway and
// input validation, all against sandbox adapters.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::*;
use payment_orchestrator::config::GatewaySettings;
use payment_orchestrator::core::OrchestrationEvent;
use payment_orchestrator::gateways::{LoadBalancingStrategy, SandboxBehavior};
use payment_orchestrator::payments::repositories::{NewPayment, StatusUpdate};
use payment_orchestrator::payments::{
    Payment, PaymentFilters, PaymentMethod, PaymentRepository, PaymentRequest, PaymentStatus,
};
use payment_orchestrator::{AppError, Currency, ErrorKind};
use rust_decimal_macros::dec;

fn round_robin(names: &[&str]) -> TestContext {
    TestContext::new(TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5), names)
}

#[tokio::test]
async fn test_round_robin_alternates_gateways() {
    let ctx = round_robin(&["a", "b"]);

    let mut used = Vec::new();
    for _ in 0..4 {
        let payment = ctx
            .orchestrator
            .process_payment(TestDataFactory::card_payment(dec!(100.00)), None)
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert!(payment.transaction_id.is_some());
        used.push(payment.gateway);
    }

    assert_eq!(used, vec!["a", "b", "a", "b"]);
    assert_eq!(ctx.gateways.get("a").call_count(), 2);
    assert_eq!(ctx.gateways.get("b").call_count(), 2);
}

#[tokio::test]
async fn test_sale_records_transitions_and_response() {
    let ctx = round_robin(&["a"]);
    let payment = ctx
        .orchestrator
        .process_payment(
            TestDataFactory::card_payment(dec!(42.00)).with_customer("cus_1"),
            None,
        )
        .await
        .unwrap();

    let stored = ctx.orchestrator.get_payment(&payment.id).await.unwrap();
    assert_eq!(stored, payment);
    assert_eq!(stored.customer_id.as_deref(), Some("cus_1"));
    assert_eq!(stored.gateway_response.as_ref().unwrap()["status"], "succeeded");
    assert_eq!(stored.version, 2);

    let transitions: Vec<_> = ctx
        .events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            OrchestrationEvent::PaymentTransition { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (None, PaymentStatus::Processing),
            (Some(PaymentStatus::Processing), PaymentStatus::Paid),
        ]
    );
}

#[tokio::test]
async fn test_authorize_capture_refund() {
    let ctx = round_robin(&["a"]);

    let authorized = ctx
        .orchestrator
        .authorize_payment(TestDataFactory::card_payment(dec!(120.00)), None)
        .await
        .unwrap();
    assert_eq!(authorized.status, PaymentStatus::Authorized);
    assert!(authorized.authorization_id.is_some());

    let captured = ctx
        .orchestrator
        .capture_payment(&authorized.id, None)
        .await
        .unwrap();
    assert_eq!(captured.status, PaymentStatus::Captured);
    assert_eq!(captured.captured_amount, Some(dec!(120.00)));

    let refunded = ctx
        .orchestrator
        .refund_payment(&authorized.id, None, "returned")
        .await
        .unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_partial_capture_and_over_capture() {
    let ctx = round_robin(&["a"]);
    let authorized = ctx
        .orchestrator
        .authorize_payment(TestDataFactory::card_payment(dec!(60.00)), None)
        .await
        .unwrap();

    let over = ctx
        .orchestrator
        .capture_payment(&authorized.id, Some(dec!(60.01)))
        .await;
    assert!(matches!(over, Err(AppError::Validation(_))));

    let captured = ctx
        .orchestrator
        .capture_payment(&authorized.id, Some(dec!(45.00)))
        .await
        .unwrap();
    assert_eq!(captured.captured_amount, Some(dec!(45.00)));
    assert_eq!(captured.refundable_amount(), dec!(45.00));
}

#[tokio::test]
async fn test_capture_requires_authorized_status() {
    let ctx = round_robin(&["a"]);
    let request = TestDataFactory::card_payment(dec!(10.00));
    let processing = ctx
        .repository
        .create(NewPayment::from_request(&request, PaymentMethod::CreditCard, "a"))
        .await
        .unwrap();

    let result = ctx.orchestrator.capture_payment(&processing.id, None).await;
    assert!(matches!(result, Err(AppError::PaymentState(_))));
    assert_eq!(ctx.gateways.get("a").call_count(), 0);

    let stored = ctx.orchestrator.get_payment(&processing.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Processing);
}

#[tokio::test]
async fn test_cancel_authorized_payment() {
    let ctx = round_robin(&["a"]);
    let authorized = ctx
        .orchestrator
        .authorize_payment(TestDataFactory::card_payment(dec!(15.00)), None)
        .await
        .unwrap();

    let cancelled = ctx
        .orchestrator
        .cancel_payment(&authorized.id, "customer changed mind")
        .await
        .unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);
    assert_eq!(
        cancelled.cancellation_reason.as_deref(),
        Some("customer changed mind")
    );
    assert!(cancelled.failure_reason.is_none());

    let capture = ctx.orchestrator.capture_payment(&authorized.id, None).await;
    assert!(matches!(capture, Err(AppError::PaymentState(_))));
    let cancel_again = ctx.orchestrator.cancel_payment(&authorized.id, "twice").await;
    assert!(matches!(cancel_again, Err(AppError::PaymentState(_))));
}

#[tokio::test]
async fn test_cancel_rejected_after_sale() {
    let ctx = round_robin(&["a"]);
    let paid = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(15.00)), None)
        .await
        .unwrap();

    let result = ctx.orchestrator.cancel_payment(&paid.id, "too late").await;
    assert!(matches!(result, Err(AppError::PaymentState(_))));
}

#[tokio::test]
async fn test_reconcile_processing_payment() {
    let ctx = round_robin(&["a"]);
    let request = TestDataFactory::transfer_payment(dec!(75.00));
    let created = ctx
        .repository
        .create(NewPayment::from_request(&request, PaymentMethod::BankTransfer, "a"))
        .await
        .unwrap();
    ctx.repository
        .update_status(
            &created.id,
            StatusUpdate::to(PaymentStatus::Processing).with_transaction(Some("sbx_txn_pending".to_string())),
        )
        .await
        .unwrap();
    ctx.gateways
        .get("a")
        .set_transaction_status("sbx_txn_pending", PaymentStatus::Paid);

    let reconciled = ctx.orchestrator.check_transaction_status(&created.id).await.unwrap();
    assert_eq!(reconciled.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn test_reconcile_adopts_remote_capture() {
    let ctx = round_robin(&["a"]);
    let authorized = ctx
        .orchestrator
        .authorize_payment(TestDataFactory::card_payment(dec!(20.00)), None)
        .await
        .unwrap();
    let auth_id = authorized.authorization_id.clone().unwrap();
    ctx.gateways
        .get("a")
        .set_transaction_status(&auth_id, PaymentStatus::Captured);

    let reconciled = ctx
        .orchestrator
        .check_transaction_status(&authorized.id)
        .await
        .unwrap();
    assert_eq!(reconciled.status, PaymentStatus::Captured);
}

#[tokio::test]
async fn test_reconcile_keeps_local_status_on_illegal_divergence() {
    let ctx = round_robin(&["a"]);
    let paid = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(20.00)), None)
        .await
        .unwrap();
    ctx.gateways
        .get("a")
        .set_transaction_status(paid.transaction_id.as_deref().unwrap(), PaymentStatus::Authorized);

    let checked = ctx.orchestrator.check_transaction_status(&paid.id).await.unwrap();
    assert_eq!(checked.status, PaymentStatus::Paid);
    assert_eq!(checked.version, paid.version);
}

#[tokio::test]
async fn test_invalid_requests_never_reach_a_gateway() {
    let ctx = round_robin(&["a"]);

    let mut bad_card = TestDataFactory::card_payment(dec!(10.00));
    if let Some(card) = bad_card.card.as_mut() {
        card.number = "4111111111111112".to_string();
    }
    let mut no_method = TestDataFactory::transfer_payment(dec!(10.00));
    no_method.payment_method = None;

    let requests = vec![
        TestDataFactory::card_payment(dec!(0)),
        TestDataFactory::card_payment(dec!(-5.00)),
        TestDataFactory::card_payment(dec!(10.001)),
        PaymentRequest::new(dec!(10.00), Currency::USD, PaymentMethod::CreditCard),
        PaymentRequest::new(dec!(10.50), Currency::JPY, PaymentMethod::BankTransfer),
        bad_card,
        no_method,
    ];

    for request in requests {
        let result = ctx.orchestrator.process_payment(request, None).await;
        assert!(
            matches!(&result, Err(e) if e.kind() == ErrorKind::Validation),
            "expected validation error, got {:?}",
            result
        );
    }
    assert_eq!(ctx.gateways.get("a").call_count(), 0);
    assert!(ctx.repository.is_empty());
}

#[tokio::test]
async fn test_decline_fails_without_failover() {
    let pool = SandboxPool::new();
    pool.add_with("a", SandboxBehavior::Decline);
    pool.add("b");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![TestDataFactory::gateway("a"), TestDataFactory::gateway("b")],
        pool,
    );

    let result = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(10.00)), None)
        .await;
    assert!(matches!(
        result,
        Err(AppError::GatewayOperation { retryable: false, .. })
    ));
    assert_eq!(ctx.gateways.get("b").call_count(), 0);

    let failed = ctx
        .orchestrator
        .find_payments(&PaymentFilters {
            status: Some(PaymentStatus::Failed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure_reason.as_deref().unwrap().contains("card_declined"));

    // declines are not gateway faults
    assert_eq!(ctx.orchestrator.circuit_breaker().failure_count("a"), 0);
}

async fn payments_on(ctx: &TestContext, gateway: &str) -> Vec<Payment> {
    ctx.orchestrator
        .find_payments(&PaymentFilters {
            gateway: Some(gateway.to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_authorize_retries_but_never_fails_over() {
    let pool = SandboxPool::new();
    let a = pool.add_with("a", SandboxBehavior::AlwaysFail);
    let b = pool.add("b");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![
            GatewaySettings {
                max_retry_attempts: Some(2),
                ..TestDataFactory::gateway("a")
            },
            TestDataFactory::gateway("b"),
        ],
        pool,
    );

    let result = ctx
        .orchestrator
        .authorize_payment(TestDataFactory::card_payment(dec!(40.00)), Some("a"))
        .await;

    match result {
        Err(AppError::GatewayOperation {
            gateway, retryable, ..
        }) => {
            assert_eq!(gateway, "a");
            assert!(retryable);
        }
        other => panic!("expected the gateway error from a, got {:?}", other),
    }
    assert_eq!(a.call_count(), 2);
    assert_eq!(b.call_count(), 0);
    assert_eq!(ctx.orchestrator.circuit_breaker().failure_count("a"), 1);

    let on_a = payments_on(&ctx, "a").await;
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].status, PaymentStatus::Failed);
    assert!(on_a[0].authorization_id.is_none());
    assert!(payments_on(&ctx, "b").await.is_empty());
    assert_eq!(ctx.repository.len(), 1);

    let failovers = ctx
        .events
        .events()
        .into_iter()
        .filter(|event| matches!(event, OrchestrationEvent::Failover { .. }))
        .count();
    assert_eq!(failovers, 0);
}

#[tokio::test]
async fn test_authorize_decline_stays_on_gateway() {
    let pool = SandboxPool::new();
    let a = pool.add_with("a", SandboxBehavior::Decline);
    let b = pool.add("b");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![TestDataFactory::gateway("a"), TestDataFactory::gateway("b")],
        pool,
    );

    let result = ctx
        .orchestrator
        .authorize_payment(TestDataFactory::card_payment(dec!(40.00)), Some("a"))
        .await;

    assert!(matches!(
        result,
        Err(AppError::GatewayOperation { retryable: false, .. })
    ));
    assert_eq!(a.call_count(), 1);
    assert_eq!(b.call_count(), 0);
    assert_eq!(ctx.orchestrator.circuit_breaker().failure_count("a"), 0);

    let on_a = payments_on(&ctx, "a").await;
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].status, PaymentStatus::Failed);
    assert!(on_a[0].failure_reason.as_deref().unwrap().contains("card_declined"));
    assert!(payments_on(&ctx, "b").await.is_empty());
}

#[tokio::test]
async fn test_preferred_gateway_is_used_when_available() {
    let ctx = round_robin(&["a", "b"]);
    for _ in 0..3 {
        let payment = ctx
            .orchestrator
            .process_payment(TestDataFactory::card_payment(dec!(5.00)), Some("b"))
            .await
            .unwrap();
        assert_eq!(payment.gateway, "b");
    }
    assert_eq!(ctx.gateways.get("a").call_count(), 0);
}

#[tokio::test]
async fn test_unknown_payment_is_not_found() {
    let ctx = round_robin(&["a"]);
    assert!(matches!(
        ctx.orchestrator.get_payment("missing").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ctx.orchestrator.refund_payment("missing", None, "x").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_statistics_by_status_and_gateway() {
    let ctx = round_robin(&["a", "b"]);
    let mut ids = Vec::new();
    for _ in 0..4 {
        let payment = ctx
            .orchestrator
            .process_payment(TestDataFactory::card_payment(dec!(10.00)), None)
            .await
            .unwrap();
        ids.push(payment.id);
    }
    ctx.orchestrator.refund_payment(&ids[0], None, "refund").await.unwrap();

    let stats = ctx.orchestrator.statistics(&PaymentFilters::default()).await.unwrap();
    assert_eq!(stats.total_count, 4);
    assert_eq!(stats.by_gateway.get("a"), Some(&2));
    assert_eq!(stats.by_gateway.get("b"), Some(&2));
    assert_eq!(stats.by_status.get(&PaymentStatus::Paid), Some(&3));
    assert_eq!(stats.by_status.get(&PaymentStatus::Refunded), Some(&1));
    assert_eq!(stats.total_settled, dec!(40.00));
    assert_eq!(stats.total_refunded, dec!(10.00));
    assert!((stats.success_rate() - 1.0).abs() < f64::EPSILON);

    let on_a = ctx
        .orchestrator
        .find_payments(&PaymentFilters {
            gateway: Some("a".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(on_a.len(), 2);
}
