//! The data reader contract
//!
//! A data reader connects to the requested resource, and hands back a
//! response whose single `write` applies the request's rules while streaming
//! the resource to the caller's output.

use crate::capacity::CapacityLimiter;
use crate::resource::ResourceReader;
use crate::writer::SerialisingResponseWriter;
use recordgate_core::{
    Context, DataFlavour, Error, LeafResource, RecordCounter, Result, Rules, Serialiser,
    SerialiserRegistry, User,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reads single resources under record-level rules
pub trait DataReader<T>: Send + Sync {
    /// Accept a read request.
    ///
    /// Fails with [`Error::NoCapacity`] before any I/O when this reader is
    /// already serving as many requests as it can. The counters are shared
    /// with the caller and updated as the response is written.
    fn read(
        &self,
        request: DataReaderRequest<T>,
        records_processed: RecordCounter,
        records_returned: RecordCounter,
    ) -> Result<DataReaderResponse<T>>;

    /// Register the serialiser for a data flavour, replacing any existing one
    fn add_serialiser(&mut self, flavour: DataFlavour, serialiser: Arc<dyn Serialiser<T>>);

    /// Identity of this reader
    fn descriptor(&self) -> &ReaderDescriptor;
}

/// Caller-supplied identity of a reader, used in logs and refusals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderDescriptor {
    /// Instance identifier
    pub id: String,

    /// Kind of storage the reader serves, e.g. `local-fs`
    pub kind: String,
}

impl ReaderDescriptor {
    /// Create a new descriptor
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ReaderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.kind)
    }
}

/// One resource to read, with the rules, user and context to read it under
pub struct DataReaderRequest<T> {
    /// Resource to read
    pub resource: LeafResource,

    /// Rules to enforce on its records
    pub rules: Rules<T>,

    /// User the data is read for
    pub user: User,

    /// Declared context of the request
    pub context: Context,
}

impl<T> DataReaderRequest<T> {
    /// Create a new request
    pub fn new(resource: LeafResource, rules: Rules<T>, user: User, context: Context) -> Self {
        Self {
            resource,
            rules,
            user,
            context,
        }
    }
}

impl<T> Clone for DataReaderRequest<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            rules: self.rules.clone(),
            user: self.user.clone(),
            context: self.context.clone(),
        }
    }
}

impl<T> fmt::Debug for DataReaderRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataReaderRequest")
            .field("resource", &self.resource)
            .field("rules", &self.rules)
            .field("user", &self.user.user_id)
            .field("context", &self.context)
            .finish()
    }
}

/// Response to an accepted read; consumed by one `write`
#[derive(Debug)]
pub struct DataReaderResponse<T> {
    message: Option<String>,
    writer: SerialisingResponseWriter<T>,
}

impl<T> DataReaderResponse<T> {
    /// Wrap a writer
    pub fn new(writer: SerialisingResponseWriter<T>, message: Option<String>) -> Self {
        Self { message, writer }
    }

    /// Message attached by the rule set, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Write the resource's permitted records to `output`. Callable once.
    pub fn write(&self, output: &mut dyn Write) -> Result<&SerialisingResponseWriter<T>> {
        self.writer.write(output)
    }
}

/// Data reader combining a resource reader with per-flavour serialisers
pub struct SerialisedDataReader<T, R> {
    descriptor: ReaderDescriptor,
    resource_reader: R,
    serialisers: SerialiserRegistry<T>,
    capacity: CapacityLimiter,
}

impl<T, R: ResourceReader> SerialisedDataReader<T, R> {
    /// Create a reader with no serialisers and unbounded capacity
    pub fn new(descriptor: ReaderDescriptor, resource_reader: R) -> Self {
        Self {
            descriptor,
            resource_reader,
            serialisers: SerialiserRegistry::new(),
            capacity: CapacityLimiter::unbounded(),
        }
    }

    /// Limit concurrent reads
    pub fn with_capacity(mut self, capacity: CapacityLimiter) -> Self {
        self.capacity = capacity;
        self
    }

    /// Register a serialiser while building the reader
    pub fn with_serialiser(mut self, flavour: DataFlavour, serialiser: Arc<dyn Serialiser<T>>) -> Self {
        self.serialisers.register(flavour, serialiser);
        self
    }

    /// Registered serialisers
    pub fn serialisers(&self) -> &SerialiserRegistry<T> {
        &self.serialisers
    }

    /// Capacity limiter
    pub fn capacity(&self) -> &CapacityLimiter {
        &self.capacity
    }

    /// The resource reader
    pub fn resource_reader(&self) -> &R {
        &self.resource_reader
    }
}

impl<T, R> DataReader<T> for SerialisedDataReader<T, R>
where
    T: 'static,
    R: ResourceReader,
{
    fn read(
        &self,
        request: DataReaderRequest<T>,
        records_processed: RecordCounter,
        records_returned: RecordCounter,
    ) -> Result<DataReaderResponse<T>> {
        let permit = self.capacity.try_acquire().ok_or_else(|| {
            let in_flight = self.capacity.in_flight();
            warn!(reader = %self.descriptor, in_flight, "Refusing read: no capacity");
            metrics::counter!("recordgate_reads_refused_total").increment(1);
            Error::NoCapacity {
                reader: self.descriptor.id.clone(),
                in_flight,
            }
        })?;

        let flavour = request.resource.flavour();
        let serialiser = self.serialisers.resolve(&flavour)?;
        debug!(resource = %request.resource.id, flavour = %flavour, serialiser = serialiser.name(), "Using serialiser");

        let stream = self.resource_reader.open_raw(&request.resource)?;
        metrics::counter!("recordgate_reads_total").increment(1);

        let message = Some(request.rules.message().to_string()).filter(|m| !m.is_empty());
        let writer = SerialisingResponseWriter::new(
            stream,
            serialiser,
            request,
            records_processed,
            records_returned,
        )
        .with_permit(permit);

        Ok(DataReaderResponse::new(writer, message))
    }

    fn add_serialiser(&mut self, flavour: DataFlavour, serialiser: Arc<dyn Serialiser<T>>) {
        self.serialisers.register(flavour, serialiser);
    }

    fn descriptor(&self) -> &ReaderDescriptor {
        &self.descriptor
    }
}

impl<T, R> fmt::Debug for SerialisedDataReader<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialisedDataReader")
            .field("descriptor", &self.descriptor)
            .field("serialisers", &self.serialisers)
            .field("capacity", &self.capacity.max_in_flight())
            .finish()
    }
}
