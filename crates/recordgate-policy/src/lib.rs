//! RecordGate Policy Engine
//!
//! Declarative record-level policies compiled into the rule sets a data
//! reader enforces.
//!
//! Policies are defined in YAML and specify:
//! - The resources they cover (identifier prefixes, matched per path segment)
//! - Triggers (user, role, purpose, context conditions)
//! - Record actions (drop, filter, redact, remove fields)

pub mod action;
pub mod engine;
pub mod rule;
pub mod trigger;

pub use action::RecordAction;
pub use engine::{DeclarativeRule, PolicyEngine};
pub use rule::{Policy, PolicyRule};
pub use trigger::{CompositeOperator, Trigger};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::action::RecordAction;
    pub use crate::engine::{DeclarativeRule, PolicyEngine};
    pub use crate::rule::{Policy, PolicyRule};
    pub use crate::trigger::Trigger;
}
