//! Document store boundary.
//!
//! Both backends enforce applied schema rules on every write through
//! [`enforce`], so callers that skip the service layer are still checked.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::query::{Filter, GroupAverage, GroupRow, QuerySpec};
use crate::schema::{EnforcementMode, SchemaRule, Violation};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type SharedStore = Arc<dyn DocumentStore>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),
    #[error("duplicate key '{key}' in collection '{collection}'")]
    DuplicateKey { collection: String, key: String },
    #[error("document failed validation for collection '{collection}'")]
    Validation {
        collection: String,
        violations: Vec<Violation>,
    },
    #[error("invalid identifier '{0}'")]
    InvalidName(String),
    #[error("malformed stored data: {0}")]
    Malformed(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Rule currently enforced by a store for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedValidator {
    pub rule: SchemaRule,
    pub mode: EnforcementMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(field: &str, unique: bool) -> Self {
        Self {
            field: field.to_string(),
            unique,
        }
    }

    pub fn name(&self, collection: &str) -> String {
        format!("{}_{}_idx", collection, self.field)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns `true` when the collection did not exist before.
    async fn create_collection(&self, name: &str) -> Result<bool, StoreError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError>;

    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Atomic insert; the first writer of a key wins and later writers get
    /// `DuplicateKey`. Creates the collection on first use.
    async fn insert_one(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError>;

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Returns `false` if no document has that key.
    async fn replace_one(
        &self,
        collection: &str,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError>;

    /// Returns `false` if no document has that key.
    async fn delete_one(&self, collection: &str, key: &str) -> Result<bool, StoreError>;

    async fn find(&self, collection: &str, query: &QuerySpec) -> Result<Vec<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn group_average(
        &self,
        collection: &str,
        aggregation: &GroupAverage,
    ) -> Result<Vec<GroupRow>, StoreError>;

    /// Enforce `rule` on all future writes. Fails with `CollectionNotFound`
    /// if the collection has not been created.
    async fn set_validator(
        &self,
        collection: &str,
        rule: &SchemaRule,
        mode: EnforcementMode,
    ) -> Result<(), StoreError>;

    async fn validator(&self, collection: &str) -> Result<Option<AppliedValidator>, StoreError>;

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError>;
}

/// Write-path check shared by every backend.
pub fn enforce(
    collection: &str,
    applied: Option<&AppliedValidator>,
    doc: &Value,
) -> Result<(), StoreError> {
    let Some(applied) = applied else {
        return Ok(());
    };
    let violations = applied.rule.validate(doc);
    if violations.is_empty() {
        return Ok(());
    }
    match applied.mode {
        EnforcementMode::Error => Err(StoreError::Validation {
            collection: collection.to_string(),
            violations,
        }),
        EnforcementMode::Warn => {
            let key = applied.rule.key_of(doc).unwrap_or("<no key>");
            for v in &violations {
                warn!(
                    "Schema violation accepted in {} ({}): {}: {}",
                    collection, key, v.field, v.message
                );
            }
            Ok(())
        }
    }
}

/// Chooses a backend from the connection URL.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SharedStore, StoreError> {
    if database_url.starts_with("memory://") {
        log::info!("Using in-memory document store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PgStore::connect(database_url, max_connections).await?;
    Ok(Arc::new(store))
}
