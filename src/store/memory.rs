use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::{enforce, AppliedValidator, DocumentStore, IndexSpec, StoreError};
use crate::query::{self, Filter, GroupAverage, GroupRow, QuerySpec};
use crate::schema::{EnforcementMode, SchemaRule};

struct Stored {
    seq: u64,
    body: Value,
}

#[derive(Default)]
struct Collection {
    docs: HashMap<String, Stored>,
    next_seq: u64,
    validator: Option<AppliedValidator>,
    indexes: Vec<IndexSpec>,
}

impl Collection {
    /// Documents in insertion order.
    fn natural(&self) -> Vec<&Value> {
        let mut docs: Vec<&Stored> = self.docs.values().collect();
        docs.sort_by_key(|d| d.seq);
        docs.into_iter().map(|d| &d.body).collect()
    }

    fn check_unique(&self, collection: &str, key: &str, doc: &Value) -> Result<(), StoreError> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let Some(value) = doc.get(&index.field) else {
                continue;
            };
            let clash = self
                .docs
                .iter()
                .any(|(other, stored)| {
                    other != key && stored.body.get(&index.field) == Some(value)
                });
            if clash {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key: format!("{}={}", index.field, value),
                });
            }
        }
        Ok(())
    }
}

/// In-process document store. Every mutation happens under one write lock,
/// which makes key-unique inserts atomic.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(name.to_string(), Collection::default());
        Ok(true)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collections.read().contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn insert_one(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.docs.contains_key(key) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }
        enforce(collection, coll.validator.as_ref(), &doc)?;
        coll.check_unique(collection, key, &doc)?;
        let seq = coll.next_seq;
        coll.next_seq += 1;
        coll.docs.insert(key.to_string(), Stored { seq, body: doc });
        Ok(())
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.docs.get(key))
            .map(|d| d.body.clone()))
    }

    async fn replace_one(
        &self,
        collection: &str,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(false);
        };
        if !coll.docs.contains_key(key) {
            return Ok(false);
        }
        enforce(collection, coll.validator.as_ref(), &doc)?;
        coll.check_unique(collection, key, &doc)?;
        if let Some(stored) = coll.docs.get_mut(key) {
            stored.body = doc;
        }
        Ok(true)
    }

    async fn delete_one(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .map(|c| c.docs.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn find(&self, collection: &str, query: &QuerySpec) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let matching: Vec<Value> = coll
            .natural()
            .into_iter()
            .filter(|doc| query.filter.matches(doc))
            .cloned()
            .collect();
        Ok(query.apply(matching))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.docs.values().filter(|d| filter.matches(&d.body)).count() as u64)
            .unwrap_or(0))
    }

    async fn group_average(
        &self,
        collection: &str,
        aggregation: &GroupAverage,
    ) -> Result<Vec<GroupRow>, StoreError> {
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|c| query::group_average(aggregation, c.docs.values().map(|d| &d.body)))
            .unwrap_or_default())
    }

    async fn set_validator(
        &self,
        collection: &str,
        rule: &SchemaRule,
        mode: EnforcementMode,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let coll = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        coll.validator = Some(AppliedValidator {
            rule: rule.clone(),
            mode,
        });
        Ok(())
    }

    async fn validator(&self, collection: &str) -> Result<Option<AppliedValidator>, StoreError> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(coll.validator.clone())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|i| i.field == index.field) {
            return Ok(());
        }
        if index.unique {
            let mut seen = std::collections::HashSet::new();
            for stored in coll.docs.values() {
                if let Some(value) = stored.body.get(&index.field) {
                    if !seen.insert(value.to_string()) {
                        return Err(StoreError::DuplicateKey {
                            collection: collection.to_string(),
                            key: format!("{}={}", index.field, value),
                        });
                    }
                }
            }
        }
        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        let collections = self.collections.read();
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(coll.indexes.clone())
    }
}
