pub mod currency;
pub mod error;
pub mod events;

pub use currency::Currency;
pub use error::{AppError, ErrorKind, Result};
pub use events::{EventSink, FanoutEventSink, MemoryEventSink, OrchestrationEvent, TracingEventSink};
