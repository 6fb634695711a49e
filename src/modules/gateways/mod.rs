pub mod models;
pub mod services;

pub use models::{GatewayConfig, GatewayEnvironment, GatewayKind};
pub use services::{
    CircuitBreaker, CircuitPermit, CircuitState, GatewayFactory, GatewayRegistry, HealthMonitor, LoadBalancer,
    LoadBalancingStrategy, PaymentGateway, PerformanceMetrics, RetryExecutor, RetryPolicy,
    SandboxBehavior, SandboxGateway, SelectionCriteria,
};
