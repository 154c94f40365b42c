// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-entity payload rules applied before a mutation may enter the queue.
//!
//! Rules are intentionally shallow: they reject payloads the remote store
//! would certainly refuse, so they never sit in the queue burning retries.
//!
//! # Example
//!
//! ```
//! use ledger_sync::validation::validate;
//! use ledger_sync::{EntityType, Operation};
//! use serde_json::json;
//!
//! let errors = validate(EntityType::Transaction, Operation::Create, &json!({"accountId": "a1"}));
//! assert_eq!(errors, vec!["amount required".to_string()]);
//! ```

use serde_json::{Map, Value};

use crate::sync_item::{EntityType, Operation};

/// Validate a payload. An empty vec means the payload is acceptable.
#[must_use]
pub fn validate(entity_type: EntityType, operation: Operation, payload: &Value) -> Vec<String> {
    let Some(fields) = payload.as_object() else {
        return vec!["payload must be an object".to_string()];
    };

    let mut errors = Vec::new();

    match operation {
        Operation::Delete => {
            require_id(fields, &mut errors);
        }
        Operation::Update => {
            require_id(fields, &mut errors);
            // Partial update: only check what is present
            check_fields(entity_type, fields, false, &mut errors);
        }
        Operation::Create => {
            check_fields(entity_type, fields, true, &mut errors);
        }
    }

    errors
}

fn check_fields(
    entity_type: EntityType,
    fields: &Map<String, Value>,
    required: bool,
    errors: &mut Vec<String>,
) {
    match entity_type {
        EntityType::Transaction => {
            positive_amount(fields, "amount", "amount", required, errors);
            non_empty_str(fields, "accountId", "account", required, errors);
        }
        EntityType::Budget => {
            non_empty_str(fields, "categoryId", "category", required, errors);
            positive_amount(fields, "amount", "amount", required, errors);
        }
        EntityType::Account => {
            non_empty_str(fields, "name", "name", required, errors);
            if let Some(balance) = fields.get("balance") {
                if !balance.is_number() {
                    errors.push("balance must be a number".to_string());
                }
            }
        }
        EntityType::Goal => {
            non_empty_str(fields, "name", "name", required, errors);
            positive_amount(fields, "targetAmount", "target amount", required, errors);
        }
    }
}

fn require_id(fields: &Map<String, Value>, errors: &mut Vec<String>) {
    let ok = fields
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !ok {
        errors.push("id required".to_string());
    }
}

fn positive_amount(
    fields: &Map<String, Value>,
    key: &str,
    label: &str,
    required: bool,
    errors: &mut Vec<String>,
) {
    match fields.get(key) {
        None | Some(Value::Null) => {
            if required {
                errors.push(format!("{label} required"));
            }
        }
        Some(value) => match value.as_f64() {
            Some(n) if n > 0.0 && n.is_finite() => {}
            Some(_) => errors.push(format!("{label} must be positive")),
            None => errors.push(format!("{label} must be a number")),
        },
    }
}

fn non_empty_str(
    fields: &Map<String, Value>,
    key: &str,
    label: &str,
    required: bool,
    errors: &mut Vec<String>,
) {
    match fields.get(key) {
        None | Some(Value::Null) => {
            if required {
                errors.push(format!("{label} required"));
            }
        }
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(_) => errors.push(format!("{label} required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_transaction_create() {
        let errors = validate(
            EntityType::Transaction,
            Operation::Create,
            &json!({"amount": 100, "accountId": "acc-1"}),
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_transaction_missing_amount() {
        let errors = validate(
            EntityType::Transaction,
            Operation::Create,
            &json!({"accountId": "acc-1"}),
        );
        assert_eq!(errors, vec!["amount required"]);
    }

    #[test]
    fn test_transaction_collects_all_errors() {
        let errors = validate(EntityType::Transaction, Operation::Create, &json!({"amount": -5}));
        assert_eq!(errors, vec!["amount must be positive", "account required"]);
    }

    #[test]
    fn test_non_numeric_amount() {
        let errors = validate(
            EntityType::Transaction,
            Operation::Create,
            &json!({"amount": "100", "accountId": "acc-1"}),
        );
        assert_eq!(errors, vec!["amount must be a number"]);
    }

    #[test]
    fn test_payload_must_be_object() {
        for payload in [json!(null), json!([1, 2]), json!("x"), json!(3)] {
            let errors = validate(EntityType::Goal, Operation::Create, &payload);
            assert_eq!(errors, vec!["payload must be an object"]);
        }
    }

    #[test]
    fn test_update_requires_id_and_checks_present_fields_only() {
        let errors = validate(EntityType::Transaction, Operation::Update, &json!({"note": "x"}));
        assert_eq!(errors, vec!["id required"]);

        let ok = validate(EntityType::Transaction, Operation::Update, &json!({"id": "t1", "note": "x"}));
        assert!(ok.is_empty());

        let bad_amount = validate(EntityType::Transaction, Operation::Update, &json!({"id": "t1", "amount": 0}));
        assert_eq!(bad_amount, vec!["amount must be positive"]);
    }

    #[test]
    fn test_delete_only_needs_id() {
        assert!(validate(EntityType::Account, Operation::Delete, &json!({"id": "a1"})).is_empty());
        assert_eq!(
            validate(EntityType::Account, Operation::Delete, &json!({"id": "  "})),
            vec!["id required"]
        );
    }

    #[test]
    fn test_budget_account_goal_rules() {
        assert_eq!(
            validate(EntityType::Budget, Operation::Create, &json!({"amount": 10})),
            vec!["category required"]
        );
        assert_eq!(
            validate(EntityType::Account, Operation::Create, &json!({"name": "Checking", "balance": "lots"})),
            vec!["balance must be a number"]
        );
        assert_eq!(
            validate(EntityType::Goal, Operation::Create, &json!({"name": "Car"})),
            vec!["target amount required"]
        );
        assert!(validate(
            EntityType::Goal,
            Operation::Create,
            &json!({"name": "Car", "targetAmount": 5000})
        )
        .is_empty());
    }
}
