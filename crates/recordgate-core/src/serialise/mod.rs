//! Serialisers
//!
//! Pluggable conversion between raw resource bytes and lazy sequences of
//! typed records, selected per [`DataFlavour`].

mod json_lines;
mod lines;

pub use json_lines::JsonLinesSerialiser;
pub use lines::LineSerialiser;

use crate::types::DataFlavour;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

/// A lazily decoded sequence of records borrowing its input
pub type RecordIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// Converts raw bytes to records and back
pub trait Serialiser<T>: Send + Sync + fmt::Debug {
    /// Name of this serialiser (for logging/debugging)
    fn name(&self) -> &str;

    /// Decode records from the input on demand.
    ///
    /// Nothing is read until the returned iterator is pulled.
    fn deserialise<'a>(&self, input: &'a mut dyn Read) -> RecordIter<'a, T>;

    /// Encode every record of the sequence into the output.
    ///
    /// Stops at the first error yielded by the sequence and returns it.
    fn serialise(
        &self,
        records: &mut dyn Iterator<Item = Result<T>>,
        output: &mut dyn Write,
    ) -> Result<()>;
}

/// Registry of serialisers keyed by data flavour
///
/// Populated at setup time; lookups in the request path take `&self` and
/// need no locking.
pub struct SerialiserRegistry<T> {
    serialisers: HashMap<DataFlavour, Arc<dyn Serialiser<T>>>,
}

impl<T> SerialiserRegistry<T> {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            serialisers: HashMap::new(),
        }
    }

    /// Register a serialiser, returning the one it replaced
    pub fn register(
        &mut self,
        flavour: DataFlavour,
        serialiser: Arc<dyn Serialiser<T>>,
    ) -> Option<Arc<dyn Serialiser<T>>> {
        debug!(flavour = %flavour, serialiser = serialiser.name(), "Registering serialiser");
        let previous = self.serialisers.insert(flavour, serialiser);
        if let Some(old) = &previous {
            debug!(replaced = old.name(), "Replaced existing serialiser");
        }
        previous
    }

    /// Resolve the serialiser for a flavour.
    ///
    /// There is no default: an unregistered flavour is a deployment defect.
    pub fn resolve(&self, flavour: &DataFlavour) -> Result<Arc<dyn Serialiser<T>>> {
        self.serialisers
            .get(flavour)
            .cloned()
            .ok_or_else(|| Error::config(format!("no serialiser registered for flavour '{}'", flavour)))
    }

    /// List all registered flavours
    pub fn flavours(&self) -> Vec<&DataFlavour> {
        self.serialisers.keys().collect()
    }

    /// Number of registered flavours
    pub fn len(&self) -> usize {
        self.serialisers.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.serialisers.is_empty()
    }
}

impl<T> Default for SerialiserRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerialiserRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.serialisers.iter().map(|(k, v)| (k.to_string(), v.name().to_string())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_flavour_is_config_error() {
        let registry: SerialiserRegistry<String> = SerialiserRegistry::new();
        let err = registry
            .resolve(&DataFlavour::new("employee", "csv"))
            .unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("employee/csv"));
    }

    #[test]
    fn test_register_overwrites() {
        let mut registry: SerialiserRegistry<String> = SerialiserRegistry::new();
        let flavour = DataFlavour::new("log", "text");

        assert!(registry
            .register(flavour.clone(), Arc::new(LineSerialiser::new()))
            .is_none());
        let previous = registry.register(flavour.clone(), Arc::new(LineSerialiser::new()));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(&flavour).unwrap().name(), "lines");
    }

    #[test]
    fn test_lookup_is_exact() {
        let mut registry: SerialiserRegistry<String> = SerialiserRegistry::new();
        registry.register(DataFlavour::new("log", "text"), Arc::new(LineSerialiser::new()));

        assert!(registry.resolve(&DataFlavour::new("log", "jsonl")).is_err());
        assert!(registry.resolve(&DataFlavour::new("audit", "text")).is_err());
    }
}
