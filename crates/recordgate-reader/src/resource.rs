//! Resource reader: resolves an identifier to a raw stream

use crate::backend::{ResourceStream, StorageBackend};
use recordgate_core::{Error, LeafResource, Result};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Opens the raw byte stream for a resource
pub trait ResourceReader: Send + Sync {
    /// Open the resource; bytes are not read until the stream is pulled
    fn open_raw(&self, resource: &LeafResource) -> Result<Box<dyn ResourceStream>>;

    /// The one identifier every spelling of `id` opens as
    ///
    /// Policy lookup and the open must both use this form.
    fn canonical_id(&self, id: &str) -> Result<String> {
        Ok(id.to_string())
    }
}

impl<R: ResourceReader + ?Sized> ResourceReader for Arc<R> {
    fn open_raw(&self, resource: &LeafResource) -> Result<Box<dyn ResourceStream>> {
        self.as_ref().open_raw(resource)
    }

    fn canonical_id(&self, id: &str) -> Result<String> {
        self.as_ref().canonical_id(id)
    }
}

/// Resource reader over a [`StorageBackend`]
///
/// Identifiers come from upstream systems with different conventions, so
/// each is first treated as a URI and, only if it does not parse as one,
/// retried once as a plain path. An I/O failure on the URI attempt is final.
#[derive(Debug)]
pub struct BackendResourceReader<B> {
    backend: B,
}

impl<B: StorageBackend> BackendResourceReader<B> {
    /// Create a reader over a backend
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: StorageBackend> ResourceReader for BackendResourceReader<B> {
    fn open_raw(&self, resource: &LeafResource) -> Result<Box<dyn ResourceStream>> {
        let id = resource.id.as_str();

        let stream = match Url::parse(id) {
            Ok(uri) => self.backend.open_uri(&uri),
            Err(parse_error) => {
                debug!(
                    resource = %id,
                    error = %parse_error,
                    "Resource is not a URI, retrying as a plain path"
                );
                self.backend.open_path(id)
            }
        }
        .map_err(|e| Error::read(id, e))?;

        debug!(resource = %id, "Successfully created stream to resource");
        Ok(stream)
    }

    fn canonical_id(&self, id: &str) -> Result<String> {
        match Url::parse(id) {
            Ok(uri) => self.backend.locate_uri(&uri),
            Err(_) => self.backend.locate_path(id),
        }
        .map_err(|e| Error::read(id, e))
    }
}
