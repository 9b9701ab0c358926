//! Record actions applied when a policy rule is triggered

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transformation of a single JSON record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    /// Drop every record
    Drop,

    /// Drop records whose field equals a value
    DropWhere {
        /// Dot-notation path of the field
        field: String,

        /// Value that causes the drop
        equals: Value,
    },

    /// Keep only records whose field equals a value
    KeepWhere {
        /// Dot-notation path of the field
        field: String,

        /// Value that must be present
        equals: Value,
    },

    /// Replace a field's value
    Redact {
        /// Dot-notation path of the field
        field: String,

        /// Replacement value
        #[serde(default = "default_redaction")]
        replacement: Value,
    },

    /// Remove a field entirely
    Remove {
        /// Dot-notation path of the field
        field: String,
    },
}

impl RecordAction {
    /// Apply the action, returning `None` when the record is dropped.
    ///
    /// Redacting or removing a field that is absent leaves the record as is.
    pub fn apply(&self, mut record: Value) -> Option<Value> {
        match self {
            RecordAction::Drop => None,
            RecordAction::DropWhere { field, equals } => {
                if lookup(&record, field) == Some(equals) {
                    None
                } else {
                    Some(record)
                }
            }
            RecordAction::KeepWhere { field, equals } => {
                if lookup(&record, field) == Some(equals) {
                    Some(record)
                } else {
                    None
                }
            }
            RecordAction::Redact { field, replacement } => {
                if let Some(slot) = lookup_mut(&mut record, field) {
                    *slot = replacement.clone();
                }
                Some(record)
            }
            RecordAction::Remove { field } => {
                let (parent, leaf) = match field.rsplit_once('.') {
                    Some((parent, leaf)) => (lookup_mut(&mut record, parent), leaf),
                    None => (Some(&mut record), field.as_str()),
                };
                if let Some(Value::Object(map)) = parent {
                    map.remove(leaf);
                }
                Some(record)
            }
        }
    }
}

/// Extract a value from JSON using dot notation, e.g. `address.city`
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, part| current.get(part))
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(value, |current, part| current.get_mut(part))
}

fn default_redaction() -> Value {
    Value::String("[REDACTED]".to_string())
}
