use std::fmt;

use log::{info, warn};
use serde_json::{json, Value};

use super::AdminError;
use crate::schema::registry::{self, EMPLOYEES, USERS};
use crate::store::{DocumentStore, StoreError};

struct ProbeCase {
    name: &'static str,
    expect_accept: bool,
    doc: Value,
}

fn employee_cases() -> Vec<ProbeCase> {
    vec![
        ProbeCase {
            name: "valid document",
            expect_accept: true,
            doc: json!({
                "employee_id": "E999",
                "name": "Test Employee",
                "department": "Engineering",
                "salary": 75000,
                "joining_date": "2023-01-15",
                "skills": ["Python", "MongoDB"]
            }),
        },
        ProbeCase {
            name: "missing required field",
            expect_accept: false,
            doc: json!({
                "employee_id": "E998",
                "name": "Test Employee",
                "salary": 75000,
                "joining_date": "2023-01-15"
            }),
        },
        ProbeCase {
            name: "invalid employee_id format",
            expect_accept: false,
            doc: json!({
                "employee_id": "INVALID",
                "name": "Test Employee",
                "department": "Engineering",
                "salary": 75000,
                "joining_date": "2023-01-15"
            }),
        },
        ProbeCase {
            name: "invalid department",
            expect_accept: false,
            doc: json!({
                "employee_id": "E997",
                "name": "Test Employee",
                "department": "InvalidDept",
                "salary": 75000,
                "joining_date": "2023-01-15"
            }),
        },
        ProbeCase {
            name: "negative salary",
            expect_accept: false,
            doc: json!({
                "employee_id": "E996",
                "name": "Test Employee",
                "department": "Engineering",
                "salary": -1000,
                "joining_date": "2023-01-15"
            }),
        },
    ]
}

fn user_cases() -> Vec<ProbeCase> {
    vec![
        ProbeCase {
            name: "valid user document",
            expect_accept: true,
            doc: json!({
                "username": "testuser123",
                "email": "test@example.com",
                "first_name": "Test",
                "last_name": "User",
                "is_active": true,
                "date_joined": "2023-01-15T00:00:00.000Z"
            }),
        },
        ProbeCase {
            name: "invalid email",
            expect_accept: false,
            doc: json!({
                "username": "testuser123",
                "email": "invalid-email",
                "first_name": "Test",
                "last_name": "User"
            }),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub case: &'static str,
    pub expected_accept: bool,
    pub accepted: bool,
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        self.expected_accept == self.accepted
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed() { "ok" } else { "FAIL" };
        let verdict = if self.accepted { "accepted" } else { "rejected" };
        let expected = if self.expected_accept { "accept" } else { "reject" };
        write!(f, "[{}] {}: {} (expected {})", mark, self.case, verdict, expected)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Writes a fixed set of good and bad documents into `collection` and
/// records which ones the store let through. Accepted probes are deleted
/// again, so running this against live data leaves nothing behind.
pub async fn run_probe(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<ProbeOutcome>, AdminError> {
    let rule = registry::get_rule(collection)?;
    let cases = match collection {
        EMPLOYEES => employee_cases(),
        USERS => user_cases(),
        _ => Vec::new(),
    };
    if !store.collection_exists(collection).await? {
        return Err(StoreError::CollectionNotFound(collection.to_string()).into());
    }

    let mut outcomes = Vec::with_capacity(cases.len());
    for case in cases {
        let key = rule.key_of(&case.doc).unwrap_or_default().to_string();
        let outcome = match store.insert_one(collection, &key, case.doc).await {
            Ok(()) => {
                store.delete_one(collection, &key).await?;
                ProbeOutcome {
                    case: case.name,
                    expected_accept: case.expect_accept,
                    accepted: true,
                    detail: None,
                }
            }
            Err(StoreError::Validation { violations, .. }) => ProbeOutcome {
                case: case.name,
                expected_accept: case.expect_accept,
                accepted: false,
                detail: violations.first().map(|v| format!("{}: {}", v.field, v.message)),
            },
            Err(StoreError::DuplicateKey { key, .. }) => ProbeOutcome {
                case: case.name,
                expected_accept: case.expect_accept,
                accepted: false,
                detail: Some(format!("key {} is already taken", key)),
            },
            Err(other) => return Err(other.into()),
        };

        if outcome.passed() {
            info!("Probe '{}' on {} behaved as expected", outcome.case, collection);
        } else {
            warn!("Probe '{}' on {} did not behave as expected", outcome.case, collection);
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
