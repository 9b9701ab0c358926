//! Append-only persistence for the audit trail
//!
//! Events are written as JSON lines. Reopening a log replays it, checks the
//! chain, and continues from its last hash.

use crate::audit::{AuditEvent, AuditTrail, ReadOutcome};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors reading or writing a persisted audit log
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed audit event on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Audit chain broken at event {index}")]
    Tampered { index: usize },
}

/// Configuration for audit persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// File the log is appended to
    pub path: PathBuf,

    /// Flush to disk after this many events
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,

    /// Recent events kept in memory; all of them when unset
    #[serde(default)]
    pub retention: Option<usize>,
}

impl PersistenceConfig {
    /// Configuration for a log file with default flushing
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_interval: default_flush_interval(),
            retention: None,
        }
    }

    /// Keep at most `limit` recent events in memory
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retention = Some(limit);
        self
    }
}

fn default_flush_interval() -> usize {
    1
}

/// Append target of a persisted log
pub trait LogFile: Write + Send {
    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Audit trail backed by an append-only JSON-lines file
///
/// Whole lines are staged in memory and written out together. The trail
/// advances as soon as an event is staged, so a failed flush never strands
/// the chain head: the staged lines stay queued for the next flush, and any
/// torn tail the failed write left on disk is cut back off.
pub struct AuditLog<F: LogFile = File> {
    config: PersistenceConfig,
    file: F,
    durable_len: u64,
    pending: Vec<u8>,
    events_since_flush: usize,
    trail: AuditTrail,
}

impl AuditLog<File> {
    /// Open or create the log, restoring and verifying any existing events
    pub fn open(config: PersistenceConfig) -> Result<Self, PersistenceError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let trail = if config.path.exists() {
            load_trail(&config.path)?
        } else {
            AuditTrail::new()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;
        let durable_len = file.metadata()?.len();
        info!(path = %config.path.display(), events = trail.len(), "Opened audit log");

        Ok(Self::from_parts(config, file, durable_len, trail))
    }
}

impl<F: LogFile> AuditLog<F> {
    fn from_parts(config: PersistenceConfig, file: F, durable_len: u64, trail: AuditTrail) -> Self {
        let trail = match config.retention {
            Some(limit) => trail.with_retention(limit),
            None => trail,
        };
        Self {
            config,
            file,
            durable_len,
            pending: Vec::new(),
            events_since_flush: 0,
            trail,
        }
    }

    /// Chain and persist the outcome of a read.
    ///
    /// A flush error is returned after the event has been chained; its line
    /// is written by the next successful flush.
    pub fn record(&mut self, outcome: ReadOutcome) -> Result<&AuditEvent, PersistenceError> {
        let event = self.trail.link(AuditEvent::new(outcome));
        let mut line = serde_json::to_vec(&event).map_err(io::Error::from)?;
        line.push(b'\n');

        self.pending.extend_from_slice(&line);
        self.events_since_flush += 1;
        let flushed = if self.events_since_flush >= self.config.flush_interval {
            self.flush()
        } else {
            Ok(())
        };

        debug!(event = %event.id, resource = %event.outcome.resource, "Recorded audit event");
        let event = self.trail.push_linked(event);
        flushed.map(|()| event)
    }

    /// Write staged events to disk
    pub fn flush(&mut self) -> Result<(), PersistenceError> {
        if let Err(e) = self.file.write_all(&self.pending).and_then(|()| self.file.flush()) {
            if let Err(truncate) = self.file.truncate(self.durable_len) {
                warn!(error = %truncate, "Failed to cut torn audit line");
            }
            warn!(error = %e, pending = self.pending.len(), "Audit flush failed, keeping events queued");
            return Err(e.into());
        }

        self.durable_len += self.pending.len() as u64;
        self.pending.clear();
        self.events_since_flush = 0;
        Ok(())
    }

    /// The in-memory trail
    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

/// Read a persisted log and verify its chain
pub fn load_trail(path: impl AsRef<Path>) -> Result<AuditTrail, PersistenceError> {
    read_trail(BufReader::new(File::open(path)?))
}

/// Read JSON-lines audit events and verify their chain
pub fn read_trail(reader: impl BufRead) -> Result<AuditTrail, PersistenceError> {
    let mut events = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| PersistenceError::Malformed {
            line: index + 1,
            source,
        })?;
        events.push(event);
    }

    let trail = AuditTrail::from_events(events);
    if let Some(index) = trail.first_broken_link() {
        return Err(PersistenceError::Tampered { index });
    }
    Ok(trail)
}
