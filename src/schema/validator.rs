use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constraint::json_type_name;
use super::rule::SchemaRule;

/// A single field-level failure, reported back to API callers as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Evaluates `doc` against `rule` and returns every violation found.
///
/// This is the only place constraint logic lives: stores call it on each
/// write while a validator is applied, and the audit path calls it on
/// documents that were stored before enforcement began.
pub fn validate_document(rule: &SchemaRule, doc: &Value) -> Vec<Violation> {
    let mut out = Vec::new();

    let Some(fields) = doc.as_object() else {
        out.push(Violation::new(
            "$root",
            format!("expected object, found {}", json_type_name(doc)),
        ));
        return out;
    };

    for required in &rule.required {
        if !fields.contains_key(required) {
            out.push(Violation::new(required, "field is required"));
        }
    }

    for (name, value) in fields {
        match rule.property(name) {
            Some(spec) => spec.check(name, value, &mut out),
            None if !rule.additional_properties => {
                out.push(Violation::new(name, "field is not allowed by the schema"));
            }
            None => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::registry;
    use serde_json::json;

    fn employee_rule() -> &'static SchemaRule {
        registry::get_rule(registry::EMPLOYEES).unwrap()
    }

    fn valid_employee() -> Value {
        json!({
            "employee_id": "E123",
            "name": "Ada Lovelace",
            "department": "Engineering",
            "salary": 90000,
            "joining_date": "2023-01-15",
            "skills": ["Rust", "MongoDB"]
        })
    }

    fn fields(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn valid_employee_passes() {
        assert!(validate_document(employee_rule(), &valid_employee()).is_empty());
    }

    #[test]
    fn skills_are_optional() {
        let mut doc = valid_employee();
        doc.as_object_mut().unwrap().remove("skills");
        assert!(validate_document(employee_rule(), &doc).is_empty());
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let doc = json!({ "employee_id": "E123", "name": "Ada" });
        let violations = validate_document(employee_rule(), &doc);
        assert_eq!(fields(&violations), vec!["department", "salary", "joining_date"]);
    }

    #[test]
    fn malformed_employee_id_is_rejected() {
        for bad in ["INVALID", "E12", "E1234", "e123", "X123"] {
            let mut doc = valid_employee();
            doc["employee_id"] = json!(bad);
            let violations = validate_document(employee_rule(), &doc);
            assert_eq!(fields(&violations), vec!["employee_id"], "id {bad}");
        }
    }

    #[test]
    fn department_outside_enum_is_rejected() {
        let mut doc = valid_employee();
        doc["department"] = json!("InvalidDept");
        assert_eq!(fields(&validate_document(employee_rule(), &doc)), vec!["department"]);
    }

    #[test]
    fn salary_out_of_range_is_rejected() {
        for bad in [json!(-1000), json!(1_000_001), json!("90000"), json!(1.5)] {
            let mut doc = valid_employee();
            doc["salary"] = bad;
            assert_eq!(fields(&validate_document(employee_rule(), &doc)), vec!["salary"]);
        }
    }

    #[test]
    fn extra_properties_are_allowed() {
        let mut doc = valid_employee();
        doc["nickname"] = json!("Countess");
        assert!(validate_document(employee_rule(), &doc).is_empty());
    }

    #[test]
    fn non_object_documents_fail_at_root() {
        let violations = validate_document(employee_rule(), &json!(["E123"]));
        assert_eq!(fields(&violations), vec!["$root"]);
    }

    #[test]
    fn closed_rules_reject_unknown_fields() {
        let mut rule = employee_rule().clone();
        rule.additional_properties = false;
        let mut doc = valid_employee();
        doc["nickname"] = json!("Countess");
        assert_eq!(fields(&validate_document(&rule, &doc)), vec!["nickname"]);
    }

    #[test]
    fn user_email_must_look_like_an_address() {
        let rule = registry::get_rule(registry::USERS).unwrap();
        let ok = json!({ "username": "testuser123", "email": "test@example.com" });
        assert!(validate_document(rule, &ok).is_empty());

        let bad = json!({ "username": "testuser123", "email": "invalid-email" });
        assert_eq!(fields(&validate_document(rule, &bad)), vec!["email"]);

        let bad_name = json!({ "username": "no spaces!" });
        assert_eq!(fields(&validate_document(rule, &bad_name)), vec!["username"]);
    }
}
