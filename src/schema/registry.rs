//! Built-in validation rules, one per collection.
//!
//! Rules are constants; changing one means shipping a new build and
//! re-running `apply-schema`.

use once_cell::sync::Lazy;

use super::constraint::{FieldSpec, Pattern};
use super::rule::SchemaRule;
use super::SchemaError;
use crate::models::employee::Department;

pub const EMPLOYEES: &str = "employees";
pub const USERS: &str = "users";

pub const EMPLOYEE_ID_PATTERN: &str = "^E[0-9]{3}$";
pub const USERNAME_PATTERN: &str = "^[a-zA-Z0-9_]+$";
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

fn pattern(source: &str) -> Pattern {
    Pattern::new(source).expect("built-in pattern must compile")
}

static EMPLOYEE_RULE: Lazy<SchemaRule> = Lazy::new(|| {
    SchemaRule::new(EMPLOYEES, "employee_id")
        .require(&["employee_id", "name", "department", "salary", "joining_date"])
        .with_property(
            "employee_id",
            FieldSpec::string()
                .pattern(pattern(EMPLOYEE_ID_PATTERN))
                .describe_as("E followed by exactly 3 digits, e.g. E123"),
        )
        .with_property(
            "name",
            FieldSpec::string()
                .length(Some(1), Some(100))
                .describe_as("between 1 and 100 characters"),
        )
        .with_property(
            "department",
            FieldSpec::string()
                .one_of(Department::ALL.iter().map(|d| d.as_str()))
                .describe_as("one of the fixed departments"),
        )
        .with_property(
            "salary",
            FieldSpec::int()
                .range(Some(0), Some(1_000_000))
                .describe_as("integer between 0 and 1,000,000"),
        )
        .with_property(
            "joining_date",
            FieldSpec::date().describe_as("date or date-formatted string"),
        )
        .with_property(
            "skills",
            FieldSpec::array_of(FieldSpec::string().length(Some(1), Some(50)))
                .unique_items()
                .describe_as("unique strings, each 1-50 characters"),
        )
});

static USER_RULE: Lazy<SchemaRule> = Lazy::new(|| {
    SchemaRule::new(USERS, "username")
        .require(&["username"])
        .with_property(
            "username",
            FieldSpec::string()
                .length(Some(3), Some(30))
                .pattern(pattern(USERNAME_PATTERN))
                .describe_as("3-30 characters, letters, digits and underscores"),
        )
        .with_property(
            "email",
            FieldSpec::string()
                .pattern(pattern(EMAIL_PATTERN))
                .describe_as("valid email address"),
        )
        .with_property("first_name", FieldSpec::string().length(None, Some(50)))
        .with_property("last_name", FieldSpec::string().length(None, Some(50)))
        .with_property("is_active", FieldSpec::bool())
        .with_property("date_joined", FieldSpec::date())
});

pub fn get_rule(collection: &str) -> Result<&'static SchemaRule, SchemaError> {
    match collection {
        EMPLOYEES => Ok(&EMPLOYEE_RULE),
        USERS => Ok(&USER_RULE),
        other => Err(SchemaError::UnknownCollection(other.to_string())),
    }
}

pub fn collections() -> [&'static str; 2] {
    [EMPLOYEES, USERS]
}

pub fn all_rules() -> Vec<&'static SchemaRule> {
    vec![&*EMPLOYEE_RULE, &*USER_RULE]
}
