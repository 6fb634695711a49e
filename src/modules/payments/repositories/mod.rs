pub mod payment_repository;

pub use payment_repository::{
    InMemoryPaymentRepository, NewPayment, PaymentRepository, StatusUpdate,
};
