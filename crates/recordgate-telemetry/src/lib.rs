//! RecordGate Telemetry
//!
//! Audit trail and metrics for record-level reads.
//!
//! Provides:
//! - A SHA-256 hash-chained trail of read outcomes, with tamper detection
//! - Append-only JSON-lines persistence for that trail
//! - In-process reader metrics mirrored to the `metrics` recorder

pub mod audit;
pub mod metrics;
pub mod persistence;

pub use audit::{AuditEvent, AuditSeverity, AuditTrail, ReadOutcome, ReadStatus};
pub use metrics::{MetricsSnapshot, ReaderMetrics};
pub use persistence::{load_trail, read_trail, AuditLog, LogFile, PersistenceConfig, PersistenceError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditTrail, ReadOutcome, ReadStatus};
    pub use crate::metrics::ReaderMetrics;
    pub use crate::persistence::{AuditLog, PersistenceConfig};
}
