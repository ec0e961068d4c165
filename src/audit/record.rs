//! Audit record and its timestamp source.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::policy::Decision;

/// One authorization decision, as written to the audit log.
///
/// Serialized as a single JSON object per line:
///
/// ```text
/// {"ts":"2025-01-01T12:00:00.123456789Z","caller_id":"spiffe://trust/serviceB",
///  "attested":true,"allowed":true,"reason":"","path":"/protected",
///  "method":"GET","tls_verified":true}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Decision time (UTC, nanosecond precision).
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// Extracted caller identity; empty when unattested.
    pub caller_id: String,
    /// Whether a SPIFFE identity was extracted.
    pub attested: bool,
    /// Final decision.
    pub allowed: bool,
    /// Audit-only explanation; empty when allowed without anomaly.
    pub reason: String,
    /// Request path.
    pub path: String,
    /// Request method.
    pub method: String,
    /// Mirrors `attested`: extraction success is the only verified-peer signal.
    pub tls_verified: bool,
}

impl AuditRecord {
    /// Build the record for a finished decision.
    #[must_use]
    pub fn from_decision(
        timestamp: DateTime<Utc>,
        caller_id: impl Into<String>,
        attested: bool,
        decision: Decision,
        path: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            caller_id: caller_id.into(),
            attested,
            allowed: decision.allowed,
            reason: decision.reason,
            path: path.into(),
            method: method.into(),
            tls_verified: attested,
        }
    }
}

/// Wall-clock source that never goes backwards within a process.
///
/// If the system clock steps back, the previous timestamp is reused so the
/// audit log stays ordered.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    /// Create a clock with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current UTC time, never earlier than any previous result.
    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    fn observe(&self, candidate: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let ts = match *last {
            Some(prev) if prev > candidate => prev,
            _ => candidate,
        };
        *last = Some(ts);
        ts
    }
}
