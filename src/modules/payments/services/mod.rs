pub mod orchestrator;
pub mod payment_locks;
pub mod validator;

pub use orchestrator::{GatewayStatus, OrchestratorBuilder, PaymentOrchestrator};
pub use payment_locks::{PaymentLockGuard, PaymentLocks};
pub use validator::{BasicCardValidator, CardValidator};
