use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Install the global subscriber
///
/// `RUST_LOG` wins over `LOG_LEVEL`. Returns `false` when a subscriber was
/// already installed, which is expected in tests.
pub fn init_tracing(app: &AppConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("payment_orchestrator={}", app.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if app.log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.is_ok()
}
