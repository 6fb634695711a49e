use std::fmt;

/// Crate-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Coarse classification used by retry, failover and caller-facing triage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, never retried
    Validation,
    /// Gateway cannot be used right now, skip to the next candidate
    Unavailable,
    /// Remote call failed in a way that may succeed on retry
    Transient,
    /// Remote call failed and retrying will not help
    Permanent,
    /// Illegal payment lifecycle transition
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::State => write!(f, "state"),
        }
    }
}

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Validation errors for payment input and configuration entries
    #[error("Validation error: {0}")]
    Validation(String),

    /// No configuration registered under this gateway name
    #[error("Gateway '{0}' is not configured")]
    GatewayNotConfigured(String),

    /// Gateway is configured but switched off
    #[error("Gateway '{0}' is disabled")]
    GatewayDisabled(String),

    /// Gateway is unhealthy or its circuit is open
    #[error("Gateway '{gateway}' is unavailable: {reason}")]
    GatewayUnavailable { gateway: String, reason: String },

    /// Selection found no enabled, available, matching gateway
    #[error("No gateway available: {0}")]
    NoGatewayAvailable(String),

    /// Remote gateway call failed
    #[error("Gateway '{gateway}' operation failed: {message}")]
    GatewayOperation {
        gateway: String,
        message: String,
        retryable: bool,
    },

    /// Remote gateway call exceeded its deadline
    #[error("Gateway '{gateway}' timed out after {timeout_ms}ms")]
    GatewayTimeout { gateway: String, timeout_ms: u64 },

    /// Illegal lifecycle transition or refund beyond the refundable balance
    #[error("Payment state error: {0}")]
    PaymentState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every matching gateway was tried and failed
    #[error(
        "Payment {payment_id} failed on every gateway (attempted: {}): {cause}",
        attempted.join(", ")
    )]
    FailoverExhausted {
        payment_id: String,
        attempted: Vec<String>,
        cause: Box<AppError>,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::Json(_) => ErrorKind::Validation,
            AppError::GatewayNotConfigured(_)
            | AppError::GatewayDisabled(_)
            | AppError::GatewayUnavailable { .. }
            | AppError::NoGatewayAvailable(_) => ErrorKind::Unavailable,
            AppError::GatewayOperation { retryable: true, .. } | AppError::GatewayTimeout { .. } => {
                ErrorKind::Transient
            }
            AppError::GatewayOperation {
                retryable: false, ..
            } => ErrorKind::Permanent,
            AppError::PaymentState(_) => ErrorKind::State,
            AppError::FailoverExhausted { .. }
            | AppError::NotFound(_)
            | AppError::Configuration(_)
            | AppError::Yaml(_)
            | AppError::Internal(_) => ErrorKind::Permanent,
        }
    }

    /// Only transient gateway failures are retried, counted against the
    /// circuit breaker, and failed over
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        AppError::PaymentState(msg.into())
    }

    pub fn unavailable(gateway: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::GatewayUnavailable {
            gateway: gateway.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(gateway: impl Into<String>, msg: impl Into<String>) -> Self {
        AppError::GatewayOperation {
            gateway: gateway.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    pub fn declined(gateway: impl Into<String>, msg: impl Into<String>) -> Self {
        AppError::GatewayOperation {
            gateway: gateway.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}
