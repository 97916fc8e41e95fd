//! Permission checks (spec §4.5): admin short-circuits to allow; otherwise
//! a grant matches if resource and action match and the requested
//! condition map is a subset of the grant's condition map.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub conditions: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    pub allow: bool,
    pub reason: String,
}

fn is_subset(requested: &HashMap<String, Value>, granted: &HashMap<String, Value>) -> bool {
    requested.iter().all(|(k, v)| granted.get(k) == Some(v))
}

pub fn check(
    is_admin: bool,
    grants: &[Permission],
    resource: &str,
    action: &str,
    conditions: Option<&HashMap<String, Value>>,
) -> PermissionDecision {
    if is_admin {
        return PermissionDecision {
            allow: true,
            reason: "admin role".to_string(),
        };
    }
    let empty = HashMap::new();
    let requested = conditions.unwrap_or(&empty);
    let matched = grants
        .iter()
        .any(|g| g.resource == resource && g.action == action && is_subset(requested, &g.conditions));
    if matched {
        PermissionDecision {
            allow: true,
            reason: "matched grant".to_string(),
        }
    } else {
        PermissionDecision {
            allow: false,
            reason: format!("no grant for {action} on {resource}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_always_allowed() {
        let decision = check(true, &[], "any", "any", None);
        assert!(decision.allow);
    }

    #[test]
    fn non_admin_needs_a_matching_grant() {
        let grants = vec![Permission {
            resource: "reports".into(),
            action: "read".into(),
            conditions: HashMap::new(),
        }];
        assert!(check(false, &grants, "reports", "read", None).allow);
        assert!(!check(false, &grants, "reports", "write", None).allow);
    }

    #[test]
    fn condition_must_be_a_subset_of_the_grant() {
        let mut grant_conditions = HashMap::new();
        grant_conditions.insert("team".to_string(), serde_json::json!("blue"));
        let grants = vec![Permission {
            resource: "reports".into(),
            action: "read".into(),
            conditions: grant_conditions,
        }];

        let mut matching = HashMap::new();
        matching.insert("team".to_string(), serde_json::json!("blue"));
        assert!(check(false, &grants, "reports", "read", Some(&matching)).allow);

        let mut mismatching = HashMap::new();
        mismatching.insert("team".to_string(), serde_json::json!("red"));
        assert!(!check(false, &grants, "reports", "read", Some(&mismatching)).allow);
    }
}
