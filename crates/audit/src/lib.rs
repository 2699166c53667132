//! Audit emitter: typed events, the subscriber bus and a JSON-lines sink.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::{AuditBus, EmitReport, HandlerError, HandlerResult, Subscription, DEFAULT_CHANNEL_CAPACITY};
pub use event::{AuditEvent, AuditOutcome, EventSelector, InvalidSelector, Phase};
pub use sink::{AuditWriter, JsonlAuditSink, SinkError};
