//! RecordGate Reader
//!
//! Record-level enforcement over raw resource streams.
//!
//! A [`DataReader`] accepts a request (resource, rules, user, context),
//! opens the resource through a [`ResourceReader`], and returns a response
//! whose single `write` either copies the raw bytes verbatim (when no rule
//! applies) or deserialises, filters, counts, and re-serialises records.
//!
//! This crate provides:
//! - Storage backends and the URI-then-plain-path resource reader
//! - The write-once [`SerialisingResponseWriter`]
//! - The [`SerialisedDataReader`] contract implementation with capacity refusal

pub mod backend;
pub mod capacity;
pub mod reader;
pub mod resource;
pub mod writer;

pub use backend::{BackendConfig, LocalFileSystem, ResourceStream, StorageBackend, FS_ROOT, IO_BUFFER_SIZE};
pub use capacity::{CapacityLimiter, ReadPermit};
pub use reader::{DataReader, DataReaderRequest, DataReaderResponse, ReaderDescriptor, SerialisedDataReader};
pub use resource::{BackendResourceReader, ResourceReader};
pub use writer::SerialisingResponseWriter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{BackendConfig, LocalFileSystem, ResourceStream, StorageBackend};
    pub use crate::reader::{DataReader, DataReaderRequest, DataReaderResponse, ReaderDescriptor, SerialisedDataReader};
    pub use crate::resource::{BackendResourceReader, ResourceReader};
}
