use anyhow::Context;
use payment_orchestrator::config::Config;
use payment_orchestrator::telemetry;
use payment_orchestrator::OrchestratorBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match std::env::var("CONFIG_FILE") {
        Ok(path) => Config::from_yaml_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        Err(_) => Config::from_env().context("Failed to load configuration")?,
    };
    config.validate().context("Configuration validation failed")?;

    telemetry::init_tracing(&config.app);

    tracing::info!("Starting payment orchestrator");
    tracing::info!(
        env = %config.app.env,
        strategy = %config.orchestrator.strategy,
        failover = config.orchestrator.failover_enabled,
        gateways = config.gateways.len(),
        "Configuration loaded"
    );

    let orchestrator = OrchestratorBuilder::from_config(&config)
        .build()
        .context("Failed to build orchestrator")?;

    let probes = orchestrator.health_monitor().check_all().await;
    for (gateway, healthy) in &probes {
        tracing::info!(gateway = %gateway, healthy, "Startup health probe");
    }

    let status = orchestrator.gateway_status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    Ok(())
}
