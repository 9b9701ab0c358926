//! Hash-chained audit trail of read outcomes

use recordgate_core::RecordCounter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Audit trail with hash-chained events for tamper detection
///
/// With a retention limit only the most recent events are kept. The chain
/// stays checkable: the window is anchored on the hash of the last event
/// that was let go.
#[derive(Debug, Default)]
pub struct AuditTrail {
    events: VecDeque<AuditEvent>,
    chain_hash: Option<String>,
    anchor: Option<String>,
    retention: Option<usize>,
    recorded: usize,
}

impl AuditTrail {
    /// Create a new audit trail
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` recent events in memory; the head is always kept
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retention = Some(limit.max(1));
        self.evict();
        self
    }

    /// Chain an event onto the trail and return the stored copy
    pub fn add_event(&mut self, event: AuditEvent) -> &AuditEvent {
        let event = self.link(event);
        self.push_linked(event)
    }

    /// Link an event to the current head without storing it
    pub fn link(&self, mut event: AuditEvent) -> AuditEvent {
        event.previous_hash = self.chain_hash.clone();
        event.hash = Some(compute_hash(&event));
        event
    }

    /// Store an event produced by [`link`](Self::link), making it the new head
    pub(crate) fn push_linked(&mut self, event: AuditEvent) -> &AuditEvent {
        self.chain_hash = event.hash.clone();
        self.events.push_back(event);
        self.recorded += 1;
        self.evict();
        &self.events[self.events.len() - 1]
    }

    fn evict(&mut self) {
        let Some(limit) = self.retention else {
            return;
        };
        while self.events.len() > limit {
            if let Some(dropped) = self.events.pop_front() {
                self.anchor = dropped.hash;
            }
        }
    }

    /// Verify the integrity of the audit trail
    pub fn verify(&self) -> bool {
        self.first_broken_link().is_none()
    }

    /// Index of the first retained event whose link or hash does not check out
    pub fn first_broken_link(&self) -> Option<usize> {
        let mut prev_hash: Option<&String> = self.anchor.as_ref();

        for (index, event) in self.events.iter().enumerate() {
            if event.previous_hash.as_ref() != prev_hash {
                return Some(index);
            }
            if event.hash.as_deref() != Some(compute_hash(event).as_str()) {
                return Some(index);
            }
            prev_hash = event.hash.as_ref();
        }

        None
    }

    /// Retained events, oldest first
    pub fn events(&self) -> &VecDeque<AuditEvent> {
        &self.events
    }

    /// Hash of the most recent event
    pub fn head(&self) -> Option<&str> {
        self.chain_hash.as_deref()
    }

    /// Number of retained events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are retained
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events chained over the trail's lifetime, including evicted ones
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Rebuild a trail from previously chained events, keeping their hashes
    pub fn from_events(events: Vec<AuditEvent>) -> Self {
        let chain_hash = events.last().and_then(|e| e.hash.clone());
        Self {
            recorded: events.len(),
            events: events.into(),
            chain_hash,
            anchor: None,
            retention: None,
        }
    }
}

fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();

    // Everything except the hash field itself
    hasher.update(event.id.as_bytes());
    hasher.update(event.timestamp_ms.to_be_bytes());
    hasher.update([event.severity as u8]);
    if let Ok(outcome) = serde_json::to_vec(&event.outcome) {
        hasher.update(&outcome);
    }
    if let Some(ref prev) = event.previous_hash {
        hasher.update(prev.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// A single audit event in the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,

    /// What happened to the read
    pub outcome: ReadOutcome,

    /// Severity level
    pub severity: AuditSeverity,

    /// Hash of this event
    pub hash: Option<String>,

    /// Hash of previous event (for chaining)
    pub previous_hash: Option<String>,
}

impl AuditEvent {
    /// Create an event for a read outcome, with severity derived from its status
    pub fn new(outcome: ReadOutcome) -> Self {
        let severity = match outcome.status {
            ReadStatus::Completed => AuditSeverity::Info,
            ReadStatus::Refused => AuditSeverity::Warning,
            ReadStatus::Failed => AuditSeverity::High,
        };
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4()),
            timestamp_ms,
            outcome,
            severity,
            hash: None,
            previous_hash: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    High,
}

/// How a read ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    /// The response was written in full
    Completed,
    /// The reader had no capacity
    Refused,
    /// The read or write failed
    Failed,
}

/// Record of one read request and what it returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOutcome {
    pub resource: String,
    pub reader: String,
    pub user: String,
    pub purpose: String,
    pub status: ReadStatus,

    /// Records read, or -1 when the resource was passed through unparsed
    pub records_processed: i64,

    /// Records written, or -1 when the resource was passed through unparsed
    pub records_returned: i64,

    /// Error text for refused and failed reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadOutcome {
    /// Outcome of a completed read, taken from its audit counters
    pub fn completed(
        resource: impl Into<String>,
        reader: impl Into<String>,
        user: impl Into<String>,
        purpose: impl Into<String>,
        processed: &RecordCounter,
        returned: &RecordCounter,
    ) -> Self {
        Self {
            resource: resource.into(),
            reader: reader.into(),
            user: user.into(),
            purpose: purpose.into(),
            status: ReadStatus::Completed,
            records_processed: processed.get(),
            records_returned: returned.get(),
            error: None,
        }
    }

    /// Mark the outcome as ended by an error
    pub fn with_error(mut self, status: ReadStatus, error: impl ToString) -> Self {
        self.status = status;
        self.error = Some(error.to_string());
        self
    }

    /// Whether the resource was copied without being parsed
    pub fn bypassed(&self) -> bool {
        self.status == ReadStatus::Completed && self.records_processed == recordgate_core::NOT_COUNTED
    }

    /// Records withheld by rules; zero when nothing was counted
    pub fn records_withheld(&self) -> i64 {
        if self.records_processed < 0 || self.records_returned < 0 {
            return 0;
        }
        self.records_processed - self.records_returned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(resource: &str, processed: i64, returned: i64) -> ReadOutcome {
        ReadOutcome {
            resource: resource.to_string(),
            reader: "local-1".to_string(),
            user: "alice".to_string(),
            purpose: "reporting".to_string(),
            status: ReadStatus::Completed,
            records_processed: processed,
            records_returned: returned,
            error: None,
        }
    }

    #[test]
    fn test_audit_trail() {
        let mut trail = AuditTrail::new();

        trail.add_event(AuditEvent::new(outcome("/a", 10, 10)));
        trail.add_event(AuditEvent::new(outcome("/b", 10, 5)));

        assert!(trail.verify());
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.events()[1].previous_hash, trail.events()[0].hash);
        assert_eq!(trail.head(), trail.events()[1].hash.as_deref());
    }

    #[test]
    fn test_tamper_detection() {
        let mut trail = AuditTrail::new();

        trail.add_event(AuditEvent::new(outcome("/a", 10, 10)));
        trail.add_event(AuditEvent::new(outcome("/b", 10, 5)));
        trail.add_event(AuditEvent::new(outcome("/c", 3, 3)));

        // Hide that records were withheld
        trail.events[1].outcome.records_returned = 10;

        assert!(!trail.verify());
        assert_eq!(trail.first_broken_link(), Some(1));
    }

    #[test]
    fn test_removed_event_breaks_chain() {
        let mut trail = AuditTrail::new();
        for resource in ["/a", "/b", "/c"] {
            trail.add_event(AuditEvent::new(outcome(resource, 1, 1)));
        }

        trail.events.remove(1);

        assert_eq!(trail.first_broken_link(), Some(1));
    }

    #[test]
    fn test_rebuilt_trail_continues_chain() {
        let mut trail = AuditTrail::new();
        trail.add_event(AuditEvent::new(outcome("/a", 1, 1)));

        let mut rebuilt = AuditTrail::from_events(trail.events().iter().cloned().collect());
        rebuilt.add_event(AuditEvent::new(outcome("/b", 1, 0)));

        assert!(rebuilt.verify());
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_retention_keeps_recent_window_verifiable() {
        let mut trail = AuditTrail::new().with_retention(2);
        for resource in ["/a", "/b", "/c", "/d", "/e"] {
            trail.add_event(AuditEvent::new(outcome(resource, 1, 1)));
        }

        assert_eq!(trail.len(), 2);
        assert_eq!(trail.recorded(), 5);
        assert_eq!(trail.events()[0].outcome.resource, "/d");
        assert_eq!(trail.head(), trail.events()[1].hash.as_deref());
        assert!(trail.verify());

        trail.events[0].outcome.records_returned = 0;
        assert_eq!(trail.first_broken_link(), Some(0));
    }

    #[test]
    fn test_retention_applies_to_rebuilt_trail() {
        let mut trail = AuditTrail::new();
        for resource in ["/a", "/b", "/c"] {
            trail.add_event(AuditEvent::new(outcome(resource, 1, 1)));
        }

        let mut rebuilt = AuditTrail::from_events(trail.events().iter().cloned().collect()).with_retention(1);
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt.verify());

        rebuilt.add_event(AuditEvent::new(outcome("/d", 1, 1)));
        assert_eq!(rebuilt.recorded(), 4);
        assert!(rebuilt.verify());
    }

    #[test]
    fn test_severity_follows_status() {
        let refused = outcome("/a", 0, 0).with_error(ReadStatus::Refused, "busy");
        let failed = outcome("/a", 0, 0).with_error(ReadStatus::Failed, "gone");

        assert_eq!(AuditEvent::new(outcome("/a", 1, 1)).severity, AuditSeverity::Info);
        assert_eq!(AuditEvent::new(refused).severity, AuditSeverity::Warning);
        assert_eq!(AuditEvent::new(failed).severity, AuditSeverity::High);
    }

    #[test]
    fn test_outcome_from_counters() {
        let processed = RecordCounter::new();
        let returned = RecordCounter::new();
        processed.mark_not_counted();
        returned.mark_not_counted();

        let bypass = ReadOutcome::completed("/a", "local-1", "alice", "audit", &processed, &returned);
        assert!(bypass.bypassed());
        assert_eq!(bypass.records_withheld(), 0);

        assert!(!outcome("/a", 10, 4).bypassed());
        assert_eq!(outcome("/a", 10, 4).records_withheld(), 6);
    }
}
