//! Shared fixtures for reader integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use recordgate_core::{Context, LeafResource, Result, Rule, Rules, User};
use recordgate_reader::{ResourceReader, ResourceStream};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory stream that counts how often it is closed
pub struct TrackedStream {
    data: io::Cursor<Vec<u8>>,
    closes: Arc<AtomicUsize>,
    fail_after: Option<u64>,
    fail_close: bool,
}

impl Read for TrackedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(limit) = self.fail_after {
            if self.data.position() >= limit {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"));
            }
        }
        self.data.read(buf)
    }
}

impl ResourceStream for TrackedStream {
    fn close(&mut self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(io::Error::other("close failed"));
        }
        Ok(())
    }
}

/// Resource reader serving fixed bytes and recording stream lifecycle
#[derive(Default)]
pub struct MemoryResourceReader {
    data: Vec<u8>,
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    fail_after: Option<u64>,
    fail_close: bool,
    pub opened: Mutex<Vec<String>>,
}

impl MemoryResourceReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Make reads fail once this many bytes have been served
    pub fn failing_after(mut self, bytes: u64) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    /// Make close report an error
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ResourceReader for MemoryResourceReader {
    fn open_raw(&self, resource: &LeafResource) -> Result<Box<dyn ResourceStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().push(resource.id.clone());
        Ok(Box::new(TrackedStream {
            data: io::Cursor::new(self.data.clone()),
            closes: self.closes.clone(),
            fail_after: self.fail_after,
            fail_close: self.fail_close,
        }))
    }
}

/// Rule with fixed applicability that keeps every record unchanged
#[derive(Debug)]
pub struct Identity {
    pub applicable: bool,
}

impl Rule<String> for Identity {
    fn is_applicable(&self, _: &User, _: &Context) -> bool {
        self.applicable
    }

    fn apply(&self, record: String, _: &User, _: &Context) -> Result<Option<String>> {
        Ok(Some(record))
    }
}

/// Rule dropping records whose trailing index is odd
#[derive(Debug)]
pub struct DropOddIndexed;

impl Rule<String> for DropOddIndexed {
    fn apply(&self, record: String, _: &User, _: &Context) -> Result<Option<String>> {
        let index: u32 = record
            .rsplit('-')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Ok((index % 2 == 0).then_some(record))
    }
}

/// Ten line records `record-0` .. `record-9`
pub fn ten_records() -> String {
    (0..10).map(|i| format!("record-{}\n", i)).collect()
}

pub fn rules(entries: Vec<(&str, Arc<dyn Rule<String>>)>) -> Rules<String> {
    entries
        .into_iter()
        .fold(Rules::new(), |rules, (name, rule)| rules.add_rule(name, rule))
}

pub fn resource() -> LeafResource {
    LeafResource::new("mem://records/all", "record", "text")
}

pub fn user() -> User {
    User::new("alice").with_role("analyst")
}

pub fn context() -> Context {
    Context::new("testing")
}
