// Gateway registry and health monitoring

#[path = "../helpers/mod.rs"]
mod helpers;

use std::time::Duration;

use helpers::*;
use payment_orchestrator::config::GatewaySettings;
use payment_orchestrator::gateways::{CircuitState, GatewayKind, LoadBalancingStrategy};
use payment_orchestrator::{AppError, PaymentOrchestrator};
use rust_decimal_macros::dec;

fn context(names: &[&str]) -> TestContext {
    TestContext::new(TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5), names)
}

fn probed(name: &str) -> GatewaySettings {
    GatewaySettings {
        health_check_enabled: Some(true),
        ..TestDataFactory::gateway(name)
    }
}

#[tokio::test]
async fn test_runtime_registration_is_selectable() {
    let ctx = context(&["a"]);
    ctx.gateways.add("late");

    let config = ctx
        .orchestrator
        .registry()
        .register_config(
            "late",
            GatewaySettings {
                priority: Some(-1),
                ..TestDataFactory::gateway("ignored")
            },
        )
        .unwrap();
    assert_eq!(config.name, "late");
    assert_eq!(config.kind, GatewayKind::Sandbox);

    assert_eq!(ctx.orchestrator.registry().names(), vec!["late", "a"]);
    let payment = ctx
        .orchestrator
        .process_payment(TestDataFactory::card_payment(dec!(5.00)), Some("late"))
        .await
        .unwrap();
    assert_eq!(payment.gateway, "late");
}

#[test]
fn test_invalid_settings_are_rejected() {
    let ctx = context(&["a"]);
    let registry = ctx.orchestrator.registry();
    let base = TestDataFactory::gateway("x");

    let cases = vec![
        GatewaySettings {
            credential_ref: None,
            ..base.clone()
        },
        GatewaySettings {
            credential_ref: Some("  ".to_string()),
            ..base.clone()
        },
        GatewaySettings {
            kind: Some("carrier-pigeon".to_string()),
            ..base.clone()
        },
        GatewaySettings {
            environment: None,
            ..base.clone()
        },
        GatewaySettings {
            weight: Some(0),
            ..base.clone()
        },
        GatewaySettings {
            timeout_ms: Some(0),
            ..base.clone()
        },
        GatewaySettings {
            max_retry_attempts: Some(0),
            ..base.clone()
        },
        GatewaySettings {
            min_amount: Some(dec!(10)),
            max_amount: Some(dec!(5)),
            ..base.clone()
        },
        GatewaySettings {
            supported_currencies: Some(vec!["XYZ".to_string()]),
            ..base.clone()
        },
        GatewaySettings {
            supported_methods: Some(vec!["barter".to_string()]),
            ..base.clone()
        },
    ];

    for settings in cases {
        let result = registry.register_config("x", settings.clone());
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "expected rejection for {:?}",
            settings
        );
    }
    assert!(matches!(
        registry.register_config("", base),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(registry.get_config("x"), Err(AppError::GatewayNotConfigured(_))));
}

#[test]
fn test_update_merges_patch() {
    let ctx = context(&["a"]);
    let registry = ctx.orchestrator.registry();

    let updated = registry
        .update_config(
            "a",
            GatewaySettings {
                weight: Some(7),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.weight, 7);
    assert_eq!(updated.timeout_ms, 1_000);
    assert_eq!(registry.get_config("a").unwrap(), updated);

    let invalid = registry.update_config(
        "a",
        GatewaySettings {
            weight: Some(0),
            ..Default::default()
        },
    );
    assert!(matches!(invalid, Err(AppError::Validation(_))));
    assert_eq!(registry.get_config("a").unwrap().weight, 7);

    assert!(matches!(
        registry.update_config("missing", GatewaySettings::default()),
        Err(AppError::GatewayNotConfigured(_))
    ));
}

#[test]
fn test_disabled_and_unknown_gateways() {
    let ctx = context(&["a"]);
    let registry = ctx.orchestrator.registry();

    registry.disable("a").unwrap();
    assert!(matches!(registry.get_gateway("a"), Err(AppError::GatewayDisabled(_))));
    assert!(registry.enabled_configs().is_empty());

    registry.enable("a").unwrap();
    assert!(registry.get_gateway("a").is_ok());

    assert!(matches!(registry.get_gateway("nope"), Err(AppError::GatewayNotConfigured(_))));
    assert!(matches!(registry.disable("nope"), Err(AppError::GatewayNotConfigured(_))));
}

#[test]
fn test_remove_clears_circuit_state() {
    let ctx = context(&["a", "b"]);
    let registry = ctx.orchestrator.registry();
    ctx.orchestrator.circuit_breaker().force_open("a");

    let removed = registry.remove("a").unwrap();
    assert_eq!(removed.name, "a");
    assert_eq!(registry.len(), 1);
    assert_eq!(ctx.orchestrator.circuit_breaker().state("a"), CircuitState::Closed);

    registry.register_config("a", TestDataFactory::gateway("a")).unwrap();
    assert!(ctx.orchestrator.circuit_breaker().is_available("a"));
}

#[test]
fn test_build_fails_for_kind_without_adapter() {
    let result = PaymentOrchestrator::builder()
        .gateway(TestDataFactory::gateway("a"))
        .gateway(GatewaySettings {
            kind: Some("stripe".to_string()),
            ..TestDataFactory::gateway("card-processor")
        })
        .build();

    match result {
        Err(AppError::Configuration(message)) => assert!(message.contains("card-processor")),
        Err(other) => panic!("expected configuration error, got {:?}", other),
        Ok(_) => panic!("expected configuration error"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_health_results_are_cached_per_ttl() {
    let pool = SandboxPool::new();
    let a = pool.add("a");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![probed("a")],
        pool,
    );
    let monitor = ctx.orchestrator.health_monitor();

    assert!(monitor.check_health("a").await.unwrap());
    assert!(monitor.check_health("a").await.unwrap());
    assert_eq!(a.probe_count(), 1);

    tokio::time::advance(Duration::from_secs(301)).await;
    a.set_connected(false);
    assert!(!monitor.check_health("a").await.unwrap());
    assert_eq!(a.probe_count(), 2);

    // unhealthy results expire sooner
    a.set_connected(true);
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!monitor.check_health("a").await.unwrap());
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(monitor.check_health("a").await.unwrap());
    assert_eq!(a.probe_count(), 3);
}

#[tokio::test]
async fn test_config_change_drops_cached_health() {
    let pool = SandboxPool::new();
    let a = pool.add("a");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![probed("a")],
        pool,
    );
    let monitor = ctx.orchestrator.health_monitor();

    monitor.check_health("a").await.unwrap();
    assert_eq!(monitor.cached_health("a"), Some(true));

    ctx.orchestrator
        .registry()
        .update_config(
            "a",
            GatewaySettings {
                priority: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(monitor.cached_health("a"), None);

    monitor.check_health("a").await.unwrap();
    assert_eq!(a.probe_count(), 2);
}

#[tokio::test]
async fn test_health_disabled_skips_probe() {
    let ctx = context(&["a"]);
    assert!(ctx.orchestrator.health_monitor().check_health("a").await.unwrap());
    assert_eq!(ctx.gateways.get("a").probe_count(), 0);
}

#[tokio::test]
async fn test_open_circuit_makes_gateway_unavailable() {
    let ctx = context(&["a"]);
    let monitor = ctx.orchestrator.health_monitor();
    assert!(monitor.is_available("a").await);

    ctx.orchestrator.circuit_breaker().force_open("a");
    assert!(!monitor.is_available("a").await);
}

#[tokio::test]
async fn test_check_all_probes_enabled_gateways() {
    let pool = SandboxPool::new();
    pool.add("a");
    pool.add("b").set_connected(false);
    let c = pool.add("c");
    let ctx = TestContext::build(
        TestDataFactory::settings(LoadBalancingStrategy::RoundRobin, 5),
        vec![
            probed("a"),
            probed("b"),
            GatewaySettings {
                enabled: Some(false),
                ..probed("c")
            },
        ],
        pool,
    );

    let results = ctx.orchestrator.health_monitor().check_all().await;
    assert_eq!(
        results,
        vec![("a".to_string(), true), ("b".to_string(), false)]
    );
    assert_eq!(c.probe_count(), 0);

    let status = ctx.orchestrator.gateway_status();
    assert_eq!(status.len(), 3);
    assert_eq!(status[0].healthy, Some(true));
    assert_eq!(status[1].healthy, Some(false));
    assert!(!status[2].enabled);
    assert_eq!(status[0].circuit.state, CircuitState::Closed);
    assert_eq!(status[0].api_version.as_deref(), Some("sandbox-2024-01"));
    assert_eq!(status[2].api_version, None);
}
