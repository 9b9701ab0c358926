//! Policy trigger definitions

use recordgate_core::{Context, User};
use serde::{Deserialize, Serialize};

/// Condition deciding whether a rule applies to a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Applies to every request
    Always,

    /// Applies to one user
    User {
        /// User identifier to match
        user_id: String,
    },

    /// Applies to users holding a role
    Role {
        /// Role to match
        role: String,
    },

    /// Applies to requests made for a purpose
    Purpose {
        /// Purpose to match
        purpose: String,
    },

    /// Context-based trigger
    Context {
        /// Context field to check
        field: String,

        /// Expected value
        value: String,
    },

    /// Composite trigger (AND/OR/NOT logic)
    Composite {
        /// Logic operator
        operator: CompositeOperator,

        /// Sub-triggers
        triggers: Vec<Trigger>,
    },
}

/// Operator for composite triggers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeOperator {
    And,
    Or,
    /// True when none of the sub-triggers match
    Not,
}

impl Trigger {
    /// Evaluate the trigger for a user and context
    pub fn matches(&self, user: &User, context: &Context) -> bool {
        match self {
            Trigger::Always => true,
            Trigger::User { user_id } => &user.user_id == user_id,
            Trigger::Role { role } => user.has_role(role),
            Trigger::Purpose { purpose } => &context.purpose == purpose,
            Trigger::Context { field, value } => context.get(field) == Some(value.as_str()),
            Trigger::Composite { operator, triggers } => match operator {
                CompositeOperator::And => triggers.iter().all(|t| t.matches(user, context)),
                CompositeOperator::Or => triggers.iter().any(|t| t.matches(user, context)),
                CompositeOperator::Not => !triggers.iter().any(|t| t.matches(user, context)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_trigger() {
        let json = r#"{"type": "purpose", "purpose": "marketing"}"#;
        let trigger: Trigger = serde_json::from_str(json).unwrap();

        let user = User::new("alice");
        assert!(trigger.matches(&user, &Context::new("marketing")));
        assert!(!trigger.matches(&user, &Context::new("payroll")));
    }

    #[test]
    fn test_role_trigger() {
        let json = r#"{"type": "role", "role": "hr"}"#;
        let trigger: Trigger = serde_json::from_str(json).unwrap();

        let context = Context::new("payroll");
        assert!(trigger.matches(&User::new("bob").with_role("hr"), &context));
        assert!(!trigger.matches(&User::new("bob"), &context));
    }

    #[test]
    fn test_composite_not() {
        // Applies to everyone who is not in the hr role
        let trigger = Trigger::Composite {
            operator: CompositeOperator::Not,
            triggers: vec![Trigger::Role {
                role: "hr".to_string(),
            }],
        };

        let context = Context::default();
        assert!(trigger.matches(&User::new("eve"), &context));
        assert!(!trigger.matches(&User::new("bob").with_role("hr"), &context));
    }

    #[test]
    fn test_context_field_trigger() {
        let trigger = Trigger::Context {
            field: "region".to_string(),
            value: "eu".to_string(),
        };

        let user = User::new("alice");
        assert!(trigger.matches(&user, &Context::new("x").with("region", "eu")));
        assert!(!trigger.matches(&user, &Context::new("x")));
    }
}
