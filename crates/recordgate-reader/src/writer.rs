//! Write-once response writer applying record-level rules

use crate::backend::ResourceStream;
use crate::capacity::ReadPermit;
use crate::reader::DataReaderRequest;
use parking_lot::Mutex;
use recordgate_core::{apply_rules_to_stream, Error, RecordCounter, Result, Serialiser};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes one resource's records to an output, enforcing the request's rules.
///
/// If no rule applies to the requesting user and context, the raw bytes are
/// copied through untouched and both audit counters are set to
/// [`recordgate_core::NOT_COUNTED`]. Otherwise records are deserialised,
/// filtered, counted and re-serialised. Either way the input stream is closed
/// when [`write`](Self::write) exits, and a second call is refused.
pub struct SerialisingResponseWriter<T> {
    stream: Mutex<Option<Box<dyn ResourceStream>>>,
    written: AtomicBool,
    serialiser: Arc<dyn Serialiser<T>>,
    request: DataReaderRequest<T>,
    records_processed: RecordCounter,
    records_returned: RecordCounter,
    _permit: Option<ReadPermit>,
}

impl<T> SerialisingResponseWriter<T> {
    /// Create a writer bound to an open stream
    pub fn new(
        stream: Box<dyn ResourceStream>,
        serialiser: Arc<dyn Serialiser<T>>,
        request: DataReaderRequest<T>,
        records_processed: RecordCounter,
        records_returned: RecordCounter,
    ) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
            written: AtomicBool::new(false),
            serialiser,
            request,
            records_processed,
            records_returned,
            _permit: None,
        }
    }

    /// Hold a capacity slot for as long as this writer lives
    pub fn with_permit(mut self, permit: ReadPermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Whether `write` has been invoked
    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }

    /// Write the permitted records to `output`. Callable once.
    pub fn write(&self, output: &mut dyn Write) -> Result<&Self> {
        if self.written.swap(true, Ordering::AcqRel) {
            warn!(resource = %self.request.resource.id, "Response writer invoked twice");
            return Err(Error::AlreadyWritten);
        }

        let Some(mut stream) = self.stream.lock().take() else {
            return Err(Error::AlreadyWritten);
        };

        let result = self.transfer(&mut stream, output);
        self.close(stream);
        result.map(|()| self)
    }

    fn transfer(&self, stream: &mut Box<dyn ResourceStream>, output: &mut dyn Write) -> Result<()> {
        let request = &self.request;
        let mut input = TrackedRead::new(stream);

        let outcome = if request.rules.any_applicable(&request.user, &request.context) {
            self.apply_rules(&mut input, output)
        } else {
            self.copy_raw(&mut input, output)
        };

        // Failures pulling from the resource are read errors, not sink errors
        match outcome {
            Err(Error::Io(source)) if input.failed() => Err(Error::read(&request.resource.id, source)),
            other => other,
        }
    }

    fn copy_raw(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
        debug!(resource = %self.request.resource.id, "No rules to apply");
        let copied = io::copy(input, output)?;
        output.flush()?;

        self.records_processed.mark_not_counted();
        self.records_returned.mark_not_counted();
        metrics::counter!("recordgate_reads_bypassed_total").increment(1);
        debug!(resource = %self.request.resource.id, bytes = copied, "Copied resource without deserialising");
        Ok(())
    }

    fn apply_rules(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
        let request = &self.request;
        debug!(
            resource = %request.resource.id,
            rules = ?request.rules,
            serialiser = self.serialiser.name(),
            "Applying rules"
        );

        // Callers own the counters; only this read's increments are exported
        let processed_before = self.records_processed.get().max(0);
        let returned_before = self.records_returned.get().max(0);

        let records = self.serialiser.deserialise(input);
        let mut permitted = apply_rules_to_stream(
            records,
            &request.user,
            &request.context,
            &request.rules,
            &self.records_processed,
            &self.records_returned,
        );
        self.serialiser.serialise(&mut permitted, output)?;

        let processed = self.records_processed.get();
        let returned = self.records_returned.get();
        metrics::counter!("recordgate_records_processed_total")
            .increment((processed.max(0) - processed_before).max(0) as u64);
        metrics::counter!("recordgate_records_returned_total")
            .increment((returned.max(0) - returned_before).max(0) as u64);
        debug!(resource = %request.resource.id, processed, returned, "Rules applied");
        Ok(())
    }

    fn close(&self, mut stream: Box<dyn ResourceStream>) {
        if let Err(e) = stream.close() {
            debug!(resource = %self.request.resource.id, error = %e, "Error closing stream");
        }
    }
}

impl<T> Drop for SerialisingResponseWriter<T> {
    fn drop(&mut self) {
        // Never written: release the stream that was opened for it
        if let Some(stream) = self.stream.get_mut().take() {
            self.close(stream);
        }
    }
}

impl<T> fmt::Debug for SerialisingResponseWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialisingResponseWriter")
            .field("resource", &self.request.resource.id)
            .field("written", &self.is_written())
            .field("serialiser", &self.serialiser.name())
            .field("rules", &self.request.rules)
            .field("records_processed", &self.records_processed.get())
            .field("records_returned", &self.records_returned.get())
            .finish()
    }
}

/// Remembers whether the wrapped reader ever failed
struct TrackedRead<R> {
    inner: R,
    failed: bool,
}

impl<R: Read> TrackedRead<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            failed: false,
        }
    }

    fn failed(&self) -> bool {
        self.failed
    }
}

impl<R: Read> Read for TrackedRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| {
            if e.kind() != io::ErrorKind::Interrupted {
                self.failed = true;
            }
            e
        })
    }
}
