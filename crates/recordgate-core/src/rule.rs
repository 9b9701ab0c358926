//! Record-level rules and their application to record streams

use crate::counter::RecordCounter;
use crate::types::{Context, User};
use crate::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A record-level rule
///
/// Rules are supplied by an upstream policy decision. The core only asks
/// whether a rule applies to the request and, if it does, runs every record
/// through it.
pub trait Rule<T>: Send + Sync + fmt::Debug {
    /// Whether this rule has any effect for the given user and context
    fn is_applicable(&self, _user: &User, _context: &Context) -> bool {
        true
    }

    /// Transform a record, or return `None` to drop it from the output
    fn apply(&self, record: T, user: &User, context: &Context) -> Result<Option<T>>;
}

/// A named set of rules for one resource
pub struct Rules<T> {
    message: String,
    rules: BTreeMap<String, Arc<dyn Rule<T>>>,
}

impl<T> Rules<T> {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self {
            message: String::new(),
            rules: BTreeMap::new(),
        }
    }

    /// Set the message describing this rule set
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add a rule, replacing any rule already registered under the same name
    pub fn add_rule(mut self, name: impl Into<String>, rule: Arc<dyn Rule<T>>) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    /// Message describing this rule set
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Rules keyed by name
    pub fn rules(&self) -> &BTreeMap<String, Arc<dyn Rule<T>>> {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the set holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule applies to the user and context.
    ///
    /// An empty set applies to nobody.
    pub fn any_applicable(&self, user: &User, context: &Context) -> bool {
        self.rules
            .values()
            .any(|rule| rule.is_applicable(user, context))
    }

    /// The rules that apply to the user and context, in name order
    pub fn applicable<'a>(
        &'a self,
        user: &User,
        context: &Context,
    ) -> Vec<(&'a str, &'a dyn Rule<T>)> {
        self.rules
            .iter()
            .filter(|(_, rule)| rule.is_applicable(user, context))
            .map(|(name, rule)| (name.as_str(), rule.as_ref()))
            .collect()
    }
}

impl<T> Default for Rules<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Rules<T> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl<T> fmt::Debug for Rules<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rules")
            .field("message", &self.message)
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Run one record through the given rules in order.
///
/// Stops at the first rule that drops the record.
pub fn apply_rules_to_record<T>(
    record: T,
    user: &User,
    context: &Context,
    rules: &[(&str, &dyn Rule<T>)],
) -> Result<Option<T>> {
    let mut current = record;
    for (_, rule) in rules {
        match rule.apply(current, user, context)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Apply the applicable rules to a lazy sequence of records.
///
/// `processed` is incremented for every record pulled from `records` and
/// `returned` for every record that survives, both in emission order.
/// Errors from the source or from a rule are passed through uncounted.
pub fn apply_rules_to_stream<'a, T, I>(
    records: I,
    user: &'a User,
    context: &'a Context,
    rules: &'a Rules<T>,
    processed: &'a RecordCounter,
    returned: &'a RecordCounter,
) -> impl Iterator<Item = Result<T>> + 'a
where
    T: 'a,
    I: Iterator<Item = Result<T>> + 'a,
{
    let applicable = rules.applicable(user, context);

    records.filter_map(move |item| {
        let record = match item {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        processed.increment();
        match apply_rules_to_record(record, user, context, &applicable) {
            Ok(Some(record)) => {
                returned.increment();
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    })
}
