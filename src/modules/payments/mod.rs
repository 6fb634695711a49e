pub mod models;
pub mod repositories;
pub mod services;

pub use models::{
    CardDetails, Payment, PaymentFilters, PaymentMethod, PaymentRequest, PaymentStatistics,
    PaymentStatus, Refund,
};
pub use repositories::{InMemoryPaymentRepository, PaymentRepository};
pub use services::{
    BasicCardValidator, CardValidator, GatewayStatus, OrchestratorBuilder, PaymentOrchestrator,
};
