use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::errors::AppError;
use crate::models::employee::{DepartmentSalary, Employee, EmployeeUpdate, NewEmployee};
use crate::models::page::{Page, PageMeta};
use crate::query::{
    build_aggregation, build_filter, build_page, build_sort, AggregationKind, Filter, QuerySpec,
    DEFAULT_PAGE, DEFAULT_PAGE_SIZE,
};
use crate::schema::registry::EMPLOYEES;
use crate::schema::Violation;
use crate::store::{SharedStore, StoreError};
use crate::utils::validation::validate_payload;

#[derive(Deserialize, Validate, Debug, Default)]
pub struct ListParams {
    pub department: Option<String>,
    pub skill: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    pub skill: Option<String>,
}

/// Blank values count as absent; anything else is matched exactly as sent.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn not_found(employee_id: &str) -> AppError {
    AppError::NotFound(format!("Employee {} not found", employee_id))
}

fn duplicate(employee_id: &str) -> AppError {
    AppError::DuplicateId(format!("employee_id {} must be unique", employee_id))
}

fn decode(doc: Value) -> Result<Employee, AppError> {
    Ok(serde_json::from_value(doc)?)
}

/// Documents that no longer fit `Employee` (written before the rule was
/// enforced, or under `warn`) are left out of listings instead of failing them.
fn decode_readable(docs: Vec<Value>) -> Vec<Employee> {
    docs.into_iter()
        .filter_map(|doc| {
            let key = doc
                .get("employee_id")
                .and_then(Value::as_str)
                .unwrap_or("<no id>")
                .to_string();
            match serde_json::from_value(doc) {
                Ok(employee) => Some(employee),
                Err(err) => {
                    warn!("Skipping unreadable employee document {}: {}", key, err);
                    None
                }
            }
        })
        .collect()
}

/// CRUD and reporting over the `employees` collection.
///
/// Field validation is left to the rule the store enforces; this layer only
/// checks what it can without a write: existence and key uniqueness.
pub struct EmployeeService {
    store: SharedStore,
}

impl EmployeeService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, new_employee: NewEmployee) -> Result<Employee, AppError> {
        let employee_id = new_employee.employee_id.clone();
        if self.store.find_one(EMPLOYEES, &employee_id).await?.is_some() {
            return Err(duplicate(&employee_id));
        }

        let doc = serde_json::to_value(&new_employee)?;
        // A concurrent insert of the same id can still win the race here.
        self.store
            .insert_one(EMPLOYEES, &employee_id, doc.clone())
            .await
            .map_err(|err| match err {
                StoreError::DuplicateKey { .. } => duplicate(&employee_id),
                other => other.into(),
            })?;

        info!("Created employee {}", employee_id);
        decode(doc)
    }

    pub async fn get_by_id(&self, employee_id: &str) -> Result<Employee, AppError> {
        let doc = self
            .store
            .find_one(EMPLOYEES, employee_id)
            .await?
            .ok_or_else(|| not_found(employee_id))?;
        decode(doc)
    }

    /// Merges the supplied fields into the stored record. The id is the
    /// primary key and cannot change.
    pub async fn update(
        &self,
        employee_id: &str,
        changes: EmployeeUpdate,
    ) -> Result<Employee, AppError> {
        if let Some(new_id) = &changes.employee_id {
            if new_id != employee_id {
                return Err(AppError::Validation {
                    message: "employee_id cannot be changed".to_string(),
                    details: vec![Violation::new("employee_id", "is immutable after creation")],
                });
            }
        }

        let mut doc = self
            .store
            .find_one(EMPLOYEES, employee_id)
            .await?
            .ok_or_else(|| not_found(employee_id))?;

        match (doc.as_object_mut(), serde_json::to_value(&changes)?) {
            (Some(fields), Value::Object(changes)) => fields.extend(changes),
            _ => {
                return Err(AppError::InternalServerError(format!(
                    "employee {} is not stored as a document",
                    employee_id
                )))
            }
        }

        if !self.store.replace_one(EMPLOYEES, employee_id, doc.clone()).await? {
            return Err(not_found(employee_id));
        }
        info!("Updated employee {}", employee_id);
        decode(doc)
    }

    pub async fn delete(&self, employee_id: &str) -> Result<(), AppError> {
        if !self.store.delete_one(EMPLOYEES, employee_id).await? {
            return Err(not_found(employee_id));
        }
        info!("Deleted employee {}", employee_id);
        Ok(())
    }

    /// Newest joiners first, optionally narrowed by department and skill.
    pub async fn list(&self, params: &ListParams) -> Result<Page<Employee>, AppError> {
        validate_payload(params)?;

        let filter = build_filter(
            non_empty(params.department.as_deref()),
            non_empty(params.skill.as_deref()),
        );
        let page = build_page(
            params.page.and_then(|p| u64::try_from(p).ok()).unwrap_or(DEFAULT_PAGE),
            params
                .page_size
                .and_then(|p| u64::try_from(p).ok())
                .unwrap_or(DEFAULT_PAGE_SIZE),
        );

        let total_count = self.store.count(EMPLOYEES, &filter).await?;
        let query = QuerySpec::filter(filter).sorted(build_sort()).paged(&page);
        let results = decode_readable(self.store.find(EMPLOYEES, &query).await?);

        Ok(Page {
            results,
            pagination: PageMeta::new(&page, total_count),
        })
    }

    /// Every record whose skills contain `skill`, in storage order.
    pub async fn search(&self, skill: Option<&str>) -> Result<Vec<Employee>, AppError> {
        let skill = non_empty(skill)
            .ok_or_else(|| AppError::MissingParameter("skill parameter is required".to_string()))?;

        let docs = self
            .store
            .find(EMPLOYEES, &QuerySpec::filter(Filter::contains("skills", skill)))
            .await?;
        Ok(decode_readable(docs))
    }

    /// One row per department that has employees; means are truncated.
    pub async fn aggregate_avg_salary(&self) -> Result<Vec<DepartmentSalary>, AppError> {
        let aggregation = build_aggregation(AggregationKind::AvgSalaryByDepartment);
        let rows = self.store.group_average(EMPLOYEES, &aggregation).await?;
        Ok(rows
            .into_iter()
            .map(|row| DepartmentSalary {
                department: row.key,
                avg_salary: row.average.trunc() as i64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin;
    use crate::schema::EnforcementMode;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    async fn service() -> EmployeeService {
        let store: SharedStore = Arc::new(MemoryStore::new());
        admin::bootstrap(&store, EnforcementMode::Error).await.unwrap();
        EmployeeService::new(store)
    }

    fn new_employee(
        id: &str,
        department: &str,
        salary: i64,
        joined: &str,
        skills: &[&str],
    ) -> NewEmployee {
        NewEmployee {
            employee_id: id.to_string(),
            name: format!("Employee {}", id),
            department: department.to_string(),
            salary,
            joining_date: joined.to_string(),
            skills: skills.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_equal_record() {
        let service = service().await;
        let created = service
            .create(new_employee("E123", "Engineering", 90000, "2023-01-15", &["Rust", "MongoDB"]))
            .await
            .unwrap();
        assert_eq!(service.get_by_id("E123").await.unwrap(), created);
        assert_eq!(created.skills, vec!["Rust", "MongoDB"]);
    }

    #[tokio::test]
    async fn second_create_with_same_id_is_duplicate() {
        let service = service().await;
        service.create(new_employee("E123", "HR", 1, "2023-01-15", &[])).await.unwrap();
        let err = service
            .create(new_employee("E123", "Sales", 2, "2023-01-16", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn duplicate_is_reported_before_validation() {
        let service = service().await;
        service.create(new_employee("E123", "HR", 1, "2023-01-15", &[])).await.unwrap();
        let err = service
            .create(new_employee("E123", "Nowhere", -1, "soon", &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn invalid_fields_fail_validation() {
        let service = service().await;
        let cases = [
            new_employee("E123", "Engineering", -1, "2023-01-15", &[]),
            new_employee("E124", "Engineering", 1_000_001, "2023-01-15", &[]),
            new_employee("E125", "Legal", 10, "2023-01-15", &[]),
            new_employee("123", "Engineering", 10, "2023-01-15", &[]),
            new_employee("E126", "Engineering", 10, "2023-01-15", &["Rust", "Rust"]),
        ];
        for case in cases {
            let id = case.employee_id.clone();
            let err = service.create(case).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }), "{id} should fail validation");
        }
    }

    #[tokio::test]
    async fn update_merges_supplied_fields_only() {
        let service = service().await;
        service
            .create(new_employee("E123", "HR", 50000, "2023-01-15", &["Excel"]))
            .await
            .unwrap();
        let updated = service
            .update(
                "E123",
                EmployeeUpdate {
                    salary: Some(55000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.salary, 55000);
        assert_eq!(updated.department, "HR");
        assert_eq!(updated.skills, vec!["Excel"]);
    }

    #[tokio::test]
    async fn update_is_revalidated_and_keeps_old_record_on_failure() {
        let service = service().await;
        service.create(new_employee("E123", "HR", 50000, "2023-01-15", &[])).await.unwrap();
        let err = service
            .update(
                "E123",
                EmployeeUpdate {
                    department: Some("Legal".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(service.get_by_id("E123").await.unwrap().department, "HR");
    }

    #[tokio::test]
    async fn update_cannot_change_the_id() {
        let service = service().await;
        service.create(new_employee("E123", "HR", 1, "2023-01-15", &[])).await.unwrap();
        let err = service
            .update(
                "E123",
                EmployeeUpdate {
                    employee_id: Some("E999".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let service = service().await;
        let err = service.update("E404", EmployeeUpdate::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_permanently() {
        let service = service().await;
        assert!(matches!(service.delete("E123").await, Err(AppError::NotFound(_))));
        service.create(new_employee("E123", "HR", 1, "2023-01-15", &[])).await.unwrap();
        service.delete("E123").await.unwrap();
        assert!(matches!(service.get_by_id("E123").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let service = service().await;
        for (i, joined) in ["2020-01-01", "2023-05-01", "2021-07-01", "2022-02-01", "2019-03-01"]
            .iter()
            .enumerate()
        {
            service
                .create(new_employee(&format!("E00{}", i), "Engineering", 10, joined, &[]))
                .await
                .unwrap();
        }
        let params = ListParams {
            page: Some(1),
            page_size: Some(2),
            ..Default::default()
        };
        let page = service.list(&params).await.unwrap();
        let ids: Vec<&str> = page.results.iter().map(|e| e.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["E001", "E003"]);
        assert_eq!(page.pagination.total_count, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);
        assert!(!page.pagination.has_previous);
    }

    #[tokio::test]
    async fn list_rejects_non_positive_paging() {
        let service = service().await;
        for params in [
            ListParams { page: Some(0), ..Default::default() },
            ListParams { page_size: Some(0), ..Default::default() },
            ListParams { page_size: Some(101), ..Default::default() },
        ] {
            assert!(matches!(service.list(&params).await, Err(AppError::Validation { .. })));
        }
    }

    #[tokio::test]
    async fn list_composes_department_and_skill() {
        let service = service().await;
        service.create(new_employee("E001", "HR", 1, "2020-01-01", &["Excel"])).await.unwrap();
        service.create(new_employee("E002", "HR", 1, "2020-01-02", &["Rust"])).await.unwrap();
        service.create(new_employee("E003", "Sales", 1, "2020-01-03", &["Excel"])).await.unwrap();

        let params = ListParams {
            department: Some("HR".into()),
            skill: Some("Excel".into()),
            ..Default::default()
        };
        let page = service.list(&params).await.unwrap();
        assert_eq!(page.pagination.total_count, 1);
        assert_eq!(page.results[0].employee_id, "E001");
    }

    #[tokio::test]
    async fn search_returns_exact_skill_matches() {
        let service = service().await;
        service
            .create(new_employee("E001", "HR", 1, "2020-01-01", &["MongoDB", "Excel"]))
            .await
            .unwrap();
        service.create(new_employee("E002", "HR", 1, "2020-01-02", &["Mongo"])).await.unwrap();
        service.create(new_employee("E003", "Sales", 1, "2020-01-03", &["MongoDB"])).await.unwrap();

        let found = service.search(Some("MongoDB")).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["E001", "E003"]);

        assert!(matches!(service.search(None).await, Err(AppError::MissingParameter(_))));
        assert!(matches!(service.search(Some("  ")).await, Err(AppError::MissingParameter(_))));
    }

    #[tokio::test]
    async fn average_salary_per_department() {
        let service = service().await;
        service.create(new_employee("E001", "Engineering", 100, "2020-01-01", &[])).await.unwrap();
        service.create(new_employee("E002", "Engineering", 200, "2020-01-01", &[])).await.unwrap();
        service.create(new_employee("E003", "HR", 50, "2020-01-01", &[])).await.unwrap();
        service.create(new_employee("E004", "Sales", 1, "2020-01-01", &[])).await.unwrap();
        service.create(new_employee("E005", "Sales", 2, "2020-01-01", &[])).await.unwrap();

        let rows = service.aggregate_avg_salary().await.unwrap();
        assert_eq!(
            rows,
            vec![
                DepartmentSalary { department: "Engineering".into(), avg_salary: 150 },
                DepartmentSalary { department: "HR".into(), avg_salary: 50 },
                DepartmentSalary { department: "Sales".into(), avg_salary: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn page_far_past_the_end_is_empty() {
        let service = service().await;
        service.create(new_employee("E001", "HR", 1, "2020-01-01", &[])).await.unwrap();

        let params = ListParams {
            page: Some(i64::MAX),
            page_size: Some(100),
            ..Default::default()
        };
        let page = service.list(&params).await.unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.pagination.total_count, 1);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_previous);
    }

    #[tokio::test]
    async fn unreadable_documents_are_left_out_of_listings() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store
            .insert_one(
                EMPLOYEES,
                "E001",
                serde_json::json!({
                    "employee_id": "E001",
                    "name": "Legacy",
                    "department": "HR",
                    "joining_date": "2019-01-01",
                    "skills": ["Excel"]
                }),
            )
            .await
            .unwrap();
        admin::apply_registry_rule(store.as_ref(), EMPLOYEES, true).await.unwrap();

        let service = EmployeeService::new(store);
        service.create(new_employee("E002", "HR", 10, "2020-01-01", &["Excel"])).await.unwrap();

        let page = service.list(&ListParams::default()).await.unwrap();
        let ids: Vec<&str> = page.results.iter().map(|e| e.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["E002"]);

        let found = service.search(Some("Excel")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].employee_id, "E002");
    }

    #[tokio::test]
    async fn filters_match_values_exactly_as_sent() {
        let service = service().await;
        service.create(new_employee("E001", "HR", 1, "2020-01-01", &[" Rust"])).await.unwrap();
        service.create(new_employee("E002", "HR", 1, "2020-01-02", &["Rust"])).await.unwrap();

        let found = service.search(Some(" Rust")).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.employee_id.as_str()).collect();
        assert_eq!(ids, vec!["E001"]);

        let params = ListParams {
            skill: Some("Rust".into()),
            ..Default::default()
        };
        let page = service.list(&params).await.unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].employee_id, "E002");
    }
}
