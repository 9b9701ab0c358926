//! RecordGate Core
//!
//! Core types, traits, and utilities shared across RecordGate components.
//!
//! This crate provides:
//! - Request-side types: users, contexts, resources, and data flavours
//! - Error types and result handling
//! - The record-level [`Rule`] trait and rule application over record streams
//! - Shared audit counters with the "not counted" sentinel
//! - The [`Serialiser`] trait, its registry, and reference serialisers

pub mod counter;
pub mod error;
pub mod rule;
pub mod serialise;
pub mod types;

pub use counter::{RecordCounter, NOT_COUNTED};
pub use error::{Error, Result};
pub use rule::{apply_rules_to_record, apply_rules_to_stream, Rule, Rules};
pub use serialise::{JsonLinesSerialiser, LineSerialiser, RecordIter, Serialiser, SerialiserRegistry};
pub use types::{Context, DataFlavour, LeafResource, User};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::counter::{RecordCounter, NOT_COUNTED};
    pub use crate::error::{Error, Result};
    pub use crate::rule::{Rule, Rules};
    pub use crate::serialise::{Serialiser, SerialiserRegistry};
    pub use crate::types::{Context, DataFlavour, LeafResource, User};
}
