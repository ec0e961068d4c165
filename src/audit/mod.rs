//! Audit trail: one JSON line per authorization decision.

pub mod record;
pub mod trust_score;
pub mod writer;

pub use record::{AuditRecord, MonotonicClock};
pub use trust_score::TrustScore;
pub use writer::AuditWriter;
