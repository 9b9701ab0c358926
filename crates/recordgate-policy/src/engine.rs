//! Policy evaluation engine
//!
//! Compiles loaded policies into the record-level [`Rules`] handed to a
//! data reader.

use recordgate_core::{Context, LeafResource, Result, Rule, Rules, User};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{Policy, PolicyRule, RecordAction, Trigger};

/// A policy rule compiled for record-level enforcement
#[derive(Debug, Clone)]
pub struct DeclarativeRule {
    name: String,
    trigger: Trigger,
    actions: Vec<RecordAction>,
    enabled: bool,
}

impl DeclarativeRule {
    /// Compile a policy rule
    pub fn new(rule: &PolicyRule) -> Self {
        Self {
            name: rule.name.clone(),
            trigger: rule.trigger.clone(),
            actions: rule.actions.clone(),
            enabled: rule.enabled,
        }
    }

    /// Rule name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Rule<Value> for DeclarativeRule {
    fn is_applicable(&self, user: &User, context: &Context) -> bool {
        self.enabled && self.trigger.matches(user, context)
    }

    fn apply(&self, record: Value, _user: &User, _context: &Context) -> Result<Option<Value>> {
        let mut current = record;
        for action in &self.actions {
            match action.apply(current) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

/// Policy evaluation engine
pub struct PolicyEngine {
    policies: Vec<Policy>,
}

impl PolicyEngine {
    /// Create a new policy engine
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Load a policy from file
    pub fn load_policy(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let policy = Policy::from_file(path).map_err(|e| {
            recordgate_core::Error::config(format!("Failed to load policy: {}", e))
        })?;

        self.policies.push(policy);
        Ok(())
    }

    /// Add a policy directly
    pub fn add_policy(&mut self, policy: Policy) {
        self.policies.push(policy);
    }

    /// Rewrite every resource prefix into canonical identifier form.
    ///
    /// `canonical` must be the same mapping applied to request identifiers
    /// before [`rules_for`](Self::rules_for). A prefix it rejects is kept as
    /// written; it then matches no canonical identifier.
    pub fn canonicalise_resources<F>(&mut self, canonical: F)
    where
        F: Fn(&str) -> Result<String>,
    {
        for policy in &mut self.policies {
            for prefix in &mut policy.resources {
                match canonical(prefix) {
                    Ok(resolved) => {
                        debug!(policy = %policy.name, prefix = %prefix, resolved = %resolved, "Canonicalised resource prefix");
                        *prefix = resolved;
                    }
                    Err(e) => {
                        warn!(policy = %policy.name, prefix = %prefix, error = %e, "Resource prefix names no readable location");
                    }
                }
            }
        }
    }

    /// Build the rule set for a resource.
    ///
    /// Rules are named `<policy>/<rule>`. A resource no policy covers gets an
    /// empty set, which a reader treats as "nothing applies".
    pub fn rules_for(&self, resource: &LeafResource) -> Rules<Value> {
        let mut rules = Rules::new();
        let mut covering = Vec::new();

        for policy in self.policies.iter().filter(|p| p.covers(&resource.id)) {
            covering.push(policy.name.as_str());
            for rule in &policy.rules {
                let name = format!("{}/{}", policy.name, rule.name);
                rules = rules.add_rule(name, Arc::new(DeclarativeRule::new(rule)) as Arc<dyn Rule<Value>>);
            }
        }

        debug!(
            resource = %resource.id,
            policies = ?covering,
            rules = rules.len(),
            "Compiled rules for resource"
        );
        if covering.is_empty() {
            return rules;
        }
        rules.with_message(format!("policies: {}", covering.join(", ")))
    }

    /// Get loaded policies
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POLICY: &str = r#"
name: hr
description: Employee data handling
resources:
  - "/data/employees"
rules:
  - name: redact-salary
    trigger:
      type: composite
      operator: not
      triggers:
        - type: role
          role: hr
    actions:
      - type: redact
        field: salary
  - name: marketing-opt-out
    trigger:
      type: purpose
      purpose: marketing
    actions:
      - type: drop_where
        field: opt_out
        equals: true
"#;

    fn engine() -> PolicyEngine {
        let mut engine = PolicyEngine::new();
        engine.add_policy(Policy::from_yaml(POLICY).unwrap());
        engine
    }

    #[test]
    fn test_rules_named_by_policy() {
        let resource = LeafResource::new("/data/employees/a.jsonl", "employee", "jsonl");
        let rules = engine().rules_for(&resource);

        let names: Vec<_> = rules.rules().keys().cloned().collect();
        assert_eq!(names, vec!["hr/marketing-opt-out", "hr/redact-salary"]);
        assert_eq!(rules.message(), "policies: hr");
    }

    #[test]
    fn test_uncovered_resource_gets_empty_rules() {
        let resource = LeafResource::new("/data/public/a.jsonl", "public", "jsonl");
        let rules = engine().rules_for(&resource);
        assert!(rules.is_empty());
        assert_eq!(rules.message(), "");
    }

    #[test]
    fn test_canonical_prefixes_cover_canonical_ids() {
        let mut engine = engine();
        engine.canonicalise_resources(|id| {
            if id.contains("..") {
                return Err(recordgate_core::Error::config("escapes root"));
            }
            Ok(format!("file:///srv{}", id))
        });

        assert_eq!(engine.policies()[0].resources, vec!["file:///srv/data/employees"]);
        let resource = LeafResource::new("file:///srv/data/employees/a.jsonl", "employee", "jsonl");
        assert_eq!(engine.rules_for(&resource).len(), 2);

        let raw = LeafResource::new("/data/employees/a.jsonl", "employee", "jsonl");
        assert!(engine.rules_for(&raw).is_empty());
    }

    #[test]
    fn test_rejected_prefix_is_kept_and_matches_nothing() {
        let mut engine = engine();
        engine.canonicalise_resources(|_| Err(recordgate_core::Error::config("unreachable")));

        assert_eq!(engine.policies()[0].resources, vec!["/data/employees"]);
        let resource = LeafResource::new("file:///srv/data/employees/a.jsonl", "employee", "jsonl");
        assert!(engine.rules_for(&resource).is_empty());
    }

    #[test]
    fn test_applicability_follows_trigger() {
        let resource = LeafResource::new("/data/employees/a.jsonl", "employee", "jsonl");
        let rules = engine().rules_for(&resource);

        let hr = User::new("bob").with_role("hr");
        assert!(!rules.any_applicable(&hr, &Context::new("payroll")));
        assert!(rules.any_applicable(&hr, &Context::new("marketing")));
        assert!(rules.any_applicable(&User::new("eve"), &Context::new("payroll")));
    }

    #[test]
    fn test_disabled_rule_never_applies() {
        let rule = PolicyRule {
            name: "off".to_string(),
            description: String::new(),
            trigger: Trigger::Always,
            actions: vec![RecordAction::Drop],
            enabled: false,
        };
        let compiled = DeclarativeRule::new(&rule);

        assert!(!compiled.is_applicable(&User::new("a"), &Context::default()));
    }

    #[test]
    fn test_actions_apply_in_order() {
        let rule = PolicyRule {
            name: "mask".to_string(),
            description: String::new(),
            trigger: Trigger::Always,
            actions: vec![
                RecordAction::Remove {
                    field: "ssn".to_string(),
                },
                RecordAction::DropWhere {
                    field: "ssn".to_string(),
                    equals: json!("123"),
                },
            ],
            enabled: true,
        };
        let compiled = DeclarativeRule::new(&rule);
        let user = User::new("a");
        let context = Context::default();

        // The field is removed before the drop check, so the record survives
        let record = compiled
            .apply(json!({"id": 1, "ssn": "123"}), &user, &context)
            .unwrap();
        assert_eq!(record, Some(json!({"id": 1})));
    }
}
