pub mod filters;
pub mod payment;
pub mod payment_request;

pub use filters::{PaymentFilters, PaymentStatistics};
pub use payment::{Payment, PaymentStatus, Refund};
pub use payment_request::{CardDetails, PaymentMethod, PaymentRequest};
