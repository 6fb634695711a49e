pub mod circuit_breaker;
pub mod factory;
pub mod gateway_trait;
pub mod health_monitor;
pub mod load_balancer;
pub mod performance;
pub mod registry;
pub mod retry;
pub mod sandbox;

pub use circuit_breaker::{CircuitBreaker, CircuitPermit, CircuitSnapshot, CircuitState};
pub use factory::{GatewayConstructor, GatewayFactory};
pub use gateway_trait::{
    GatewayPaymentRequest, GatewayRefundRequest, GatewayRefundResponse, GatewayResponse,
    GatewayStatusResponse, PaymentGateway,
};
pub use health_monitor::{HealthCache, HealthMonitor};
pub use load_balancer::{LoadBalancer, LoadBalancingStrategy, SelectionCriteria};
pub use performance::{PerformanceMetrics, PerformanceTracker};
pub use registry::GatewayRegistry;
pub use retry::{with_deadline, RetryExecutor, RetryPolicy};
pub use sandbox::{SandboxBehavior, SandboxGateway};
