use log::info;

use super::AdminError;
use crate::schema::registry::EMPLOYEES;
use crate::store::{DocumentStore, IndexSpec};

/// Field and uniqueness of every index the employees collection carries.
pub const EMPLOYEE_INDEXES: [(&str, bool); 4] = [
    ("employee_id", true),
    ("department", false),
    ("joining_date", false),
    ("skills", false),
];

/// Creates the employee indexes. Existing ones are left alone.
pub async fn create_employee_indexes(
    store: &dyn DocumentStore,
) -> Result<Vec<IndexSpec>, AdminError> {
    let mut created = Vec::with_capacity(EMPLOYEE_INDEXES.len());
    for (field, unique) in EMPLOYEE_INDEXES {
        let index = IndexSpec::new(field, unique);
        store.create_index(EMPLOYEES, &index).await?;
        info!("Ensured index {}", index.name(EMPLOYEES));
        created.push(index);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use serde_json::json;

    #[tokio::test]
    async fn creates_indexes_once() {
        let store = MemoryStore::new();
        create_employee_indexes(&store).await.unwrap();
        create_employee_indexes(&store).await.unwrap();

        let indexes = store.list_indexes(EMPLOYEES).await.unwrap();
        assert_eq!(indexes.len(), 4);
        assert!(indexes.iter().any(|i| i.field == "employee_id" && i.unique));
    }

    #[tokio::test]
    async fn unique_index_fails_on_existing_duplicates() {
        let store = MemoryStore::new();
        store
            .insert_one(EMPLOYEES, "a", json!({ "employee_id": "E001" }))
            .await
            .unwrap();
        store
            .insert_one(EMPLOYEES, "b", json!({ "employee_id": "E001" }))
            .await
            .unwrap();

        let err = create_employee_indexes(&store).await.unwrap_err();
        assert!(matches!(err, AdminError::Store(StoreError::DuplicateKey { .. })));
    }
}
