use std::fmt;

use log::warn;

use super::AdminError;
use crate::schema::{EnforcementMode, SchemaRule};
use crate::store::{AppliedValidator, DocumentStore};

/// Rules are always checked against inserts and updates alike.
pub const VALIDATION_LEVEL: &str = "strict";

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSummary {
    pub name: String,
    pub type_name: &'static str,
    pub constraints: Vec<String>,
    pub description: Option<String>,
}

impl FieldSummary {
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

/// Operator view of the rule a store is enforcing on one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSummary {
    pub collection: String,
    pub mode: EnforcementMode,
    pub level: &'static str,
    pub required: Vec<String>,
    pub fields: Vec<FieldSummary>,
}

impl RuleSummary {
    pub fn new(collection: &str, rule: &SchemaRule, mode: EnforcementMode) -> Self {
        let fields = rule
            .properties
            .iter()
            .map(|prop| FieldSummary {
                name: prop.name.clone(),
                type_name: prop.spec.field_type.name(),
                constraints: prop.spec.constraints.iter().map(|c| c.describe()).collect(),
                description: prop.spec.description.clone(),
            })
            .collect();

        Self {
            collection: collection.to_string(),
            mode,
            level: VALIDATION_LEVEL,
            required: rule.required.clone(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl From<(&str, &AppliedValidator)> for RuleSummary {
    fn from((collection, applied): (&str, &AppliedValidator)) -> Self {
        RuleSummary::new(collection, &applied.rule, applied.mode)
    }
}

impl fmt::Display for RuleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.collection)?;
        writeln!(f, "  validation: enabled")?;
        writeln!(f, "  level: {}", self.level)?;
        writeln!(f, "  action: {}", self.mode)?;
        writeln!(f, "  required: [{}]", self.required.join(", "))?;
        write!(f, "  fields: {}", self.fields.len())?;
        for field in &self.fields {
            write!(
                f,
                "\n    {} ({}): {} constraint(s)",
                field.name,
                field.type_name,
                field.constraint_count()
            )?;
            if let Some(description) = &field.description {
                write!(f, "\n      {}", description)?;
            }
            for constraint in &field.constraints {
                write!(f, "\n      - {}", constraint)?;
            }
        }
        Ok(())
    }
}

/// Reads the rule currently applied to `collection`.
pub async fn describe_rule(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<RuleSummary, AdminError> {
    match store.validator(collection).await? {
        Some(applied) => Ok(RuleSummary::from((collection, &applied))),
        None => Err(AdminError::NoValidation(collection.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollectionStatus {
    Enabled(RuleSummary),
    Disabled { collection: String },
    Unreadable { collection: String, error: String },
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionStatus::Enabled(summary) => summary.fmt(f),
            CollectionStatus::Disabled { collection } => {
                write!(f, "{}:\n  validation: disabled", collection)
            }
            CollectionStatus::Unreadable { collection, error } => {
                write!(f, "{}:\n  could not read validation info: {}", collection, error)
            }
        }
    }
}

/// One entry per existing collection. A collection whose rule cannot be
/// read is reported rather than failing the whole listing.
pub async fn validation_status(
    store: &dyn DocumentStore,
) -> Result<Vec<CollectionStatus>, AdminError> {
    let mut statuses = Vec::new();
    for collection in store.list_collections().await? {
        let status = match store.validator(&collection).await {
            Ok(Some(applied)) => {
                CollectionStatus::Enabled(RuleSummary::from((collection.as_str(), &applied)))
            }
            Ok(None) => CollectionStatus::Disabled { collection },
            Err(err) => {
                warn!("Could not get validation info for {}: {}", collection, err);
                CollectionStatus::Unreadable {
                    collection,
                    error: err.to_string(),
                }
            }
        };
        statuses.push(status);
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, GroupAverage, GroupRow, QuerySpec};
    use crate::schema::registry;
    use crate::store::{IndexSpec, MemoryStore, StoreError};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Memory store whose rule lookup fails for one collection.
    struct BrokenValidator {
        inner: MemoryStore,
        broken: &'static str,
    }

    #[async_trait]
    impl DocumentStore for BrokenValidator {
        async fn create_collection(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.create_collection(name).await
        }

        async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
            self.inner.collection_exists(name).await
        }

        async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_collections().await
        }

        async fn insert_one(&self, c: &str, key: &str, doc: Value) -> Result<(), StoreError> {
            self.inner.insert_one(c, key, doc).await
        }

        async fn find_one(&self, c: &str, key: &str) -> Result<Option<Value>, StoreError> {
            self.inner.find_one(c, key).await
        }

        async fn replace_one(&self, c: &str, key: &str, doc: Value) -> Result<bool, StoreError> {
            self.inner.replace_one(c, key, doc).await
        }

        async fn delete_one(&self, c: &str, key: &str) -> Result<bool, StoreError> {
            self.inner.delete_one(c, key).await
        }

        async fn find(&self, c: &str, query: &QuerySpec) -> Result<Vec<Value>, StoreError> {
            self.inner.find(c, query).await
        }

        async fn count(&self, c: &str, filter: &Filter) -> Result<u64, StoreError> {
            self.inner.count(c, filter).await
        }

        async fn group_average(
            &self,
            c: &str,
            aggregation: &GroupAverage,
        ) -> Result<Vec<GroupRow>, StoreError> {
            self.inner.group_average(c, aggregation).await
        }

        async fn set_validator(
            &self,
            c: &str,
            rule: &SchemaRule,
            mode: EnforcementMode,
        ) -> Result<(), StoreError> {
            self.inner.set_validator(c, rule, mode).await
        }

        async fn validator(&self, c: &str) -> Result<Option<AppliedValidator>, StoreError> {
            if c == self.broken {
                return Err(StoreError::Malformed(format!("validator for {} is corrupt", c)));
            }
            self.inner.validator(c).await
        }

        async fn create_index(&self, c: &str, index: &IndexSpec) -> Result<(), StoreError> {
            self.inner.create_index(c, index).await
        }

        async fn list_indexes(&self, c: &str) -> Result<Vec<IndexSpec>, StoreError> {
            self.inner.list_indexes(c).await
        }
    }

    #[tokio::test]
    async fn describes_the_employee_rule() {
        let store = MemoryStore::new();
        store.create_collection("employees").await.unwrap();
        let rule = registry::get_rule(registry::EMPLOYEES).unwrap();
        store.set_validator("employees", rule, EnforcementMode::Error).await.unwrap();

        let summary = describe_rule(&store, "employees").await.unwrap();
        assert_eq!(summary.mode, EnforcementMode::Error);
        assert_eq!(summary.level, "strict");
        assert_eq!(summary.required.len(), 5);
        assert_eq!(summary.fields.len(), 6);

        let salary = summary.field("salary").unwrap();
        assert_eq!(salary.type_name, "int");
        assert_eq!(salary.constraints, vec!["min: 0, max: 1000000"]);
        assert_eq!(salary.description.as_deref(), Some("integer between 0 and 1,000,000"));

        let skills = summary.field("skills").unwrap();
        assert_eq!(skills.constraint_count(), 2);

        let text = summary.to_string();
        assert!(text.contains("action: error"));
        assert!(text.contains("employee_id (string): 1 constraint(s)"));
        assert!(text.contains("E followed by exactly 3 digits"));
    }

    #[tokio::test]
    async fn missing_rule_is_reported() {
        let store = MemoryStore::new();
        store.create_collection("employees").await.unwrap();
        let err = describe_rule(&store, "employees").await.unwrap_err();
        assert!(matches!(err, AdminError::NoValidation(name) if name == "employees"));
    }

    #[tokio::test]
    async fn status_lists_every_collection() {
        let store = MemoryStore::new();
        store.create_collection("employees").await.unwrap();
        store.create_collection("audit_log").await.unwrap();
        let rule = registry::get_rule(registry::EMPLOYEES).unwrap();
        store.set_validator("employees", rule, EnforcementMode::Warn).await.unwrap();

        let statuses = validation_status(&store).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(
            statuses[0],
            CollectionStatus::Disabled {
                collection: "audit_log".into()
            }
        );
        match &statuses[1] {
            CollectionStatus::Enabled(summary) => assert_eq!(summary.mode, EnforcementMode::Warn),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreadable_rule_does_not_stop_the_listing() {
        let store = BrokenValidator {
            inner: MemoryStore::new(),
            broken: "employees",
        };
        for name in ["audit_log", "employees", "users"] {
            store.create_collection(name).await.unwrap();
        }
        let rule = registry::get_rule(registry::USERS).unwrap();
        store.set_validator("users", rule, EnforcementMode::Error).await.unwrap();

        let statuses = validation_status(&store).await.unwrap();
        assert_eq!(statuses.len(), 3);
        assert!(matches!(&statuses[0], CollectionStatus::Disabled { .. }));
        match &statuses[1] {
            CollectionStatus::Unreadable { collection, error } => {
                assert_eq!(collection, "employees");
                assert!(error.contains("corrupt"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(matches!(
            &statuses[2],
            CollectionStatus::Enabled(summary) if summary.collection == "users"
        ));
        assert!(statuses[1].to_string().contains("could not read validation info"));
    }
}
