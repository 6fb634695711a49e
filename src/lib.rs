//! Payment gateway orchestration library
//!
//! Routes payment operations across interchangeable gateways with circuit
//! breaking, retry with backoff, health probing, load balancing and failover.

pub mod config;
pub mod core;
pub mod modules;
pub mod telemetry;

// Re-export commonly used types
pub use crate::core::{AppError, Currency, ErrorKind, Result};
pub use modules::gateways;
pub use modules::payments;
pub use modules::payments::{OrchestratorBuilder, PaymentOrchestrator};
