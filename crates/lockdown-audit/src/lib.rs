//! Buffers DNS verdicts and batches them to an append-only JSON-lines log
//! without ever blocking the task that produced them.

mod error;
mod event;
mod sink;

pub use error::AuditError;
pub use event::AuditEvent;
pub use sink::{AuditSink, CHANNEL_CAPACITY};
