//! PostgreSQL document store: each document is a JSONB row keyed by
//! `(collection, doc_key)`.

use async_trait::async_trait;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};

use super::{enforce, AppliedValidator, DocumentStore, IndexSpec, StoreError};
use crate::query::{Filter, GroupAverage, GroupRow, QuerySpec, SortOrder};
use crate::schema::{EnforcementMode, SchemaRule};

const MIGRATIONS: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
        doc_key TEXT NOT NULL,
        seq BIGSERIAL,
        body JSONB NOT NULL,
        PRIMARY KEY (collection, doc_key)
    )",
    "CREATE TABLE IF NOT EXISTS collection_validators (
        collection TEXT PRIMARY KEY REFERENCES collections(name) ON DELETE CASCADE,
        rule JSONB NOT NULL,
        mode TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS collection_indexes (
        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
        field TEXT NOT NULL,
        is_unique BOOLEAN NOT NULL,
        PRIMARY KEY (collection, field)
    )",
];

const UNIQUE_VIOLATION: &str = "23505";

static IDENT: Lazy<Regex> =
    Lazy::new(|| {
        Regex::new("^[A-Za-z_][A-Za-z0-9_]{0,40}$").expect("identifier pattern must compile")
    });

fn identifier(name: &str) -> Result<&str, StoreError> {
    if IDENT.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Document store tables are ready");
        Ok(())
    }

    async fn ensure_collection(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO collections (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_validator(
        &self,
        collection: &str,
    ) -> Result<Option<AppliedValidator>, StoreError> {
        let row = sqlx::query("SELECT rule, mode FROM collection_validators WHERE collection = $1")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let Json(rule): Json<SchemaRule> = row
            .try_get("rule")
            .map_err(|e| StoreError::Malformed(format!("validator for {}: {}", collection, e)))?;
        let mode: String = row.try_get("mode")?;
        let mode = mode
            .parse::<EnforcementMode>()
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Some(AppliedValidator { rule, mode }))
    }
}

/// Appends ` AND <filter>` conditions for `filter`.
pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {}
        Filter::Eq { field, value } => {
            qb.push(" AND body -> ");
            qb.push_bind(field.clone());
            qb.push(" = ");
            qb.push_bind(Json(value.clone()));
        }
        Filter::Contains { field, value } => {
            qb.push(" AND (body -> ");
            qb.push_bind(field.clone());
            qb.push(" @> ");
            qb.push_bind(Json(json!([value])));
            qb.push(" OR body -> ");
            qb.push_bind(field.clone());
            qb.push(" = ");
            qb.push_bind(Json(value.clone()));
            qb.push(")");
        }
        Filter::And(parts) => {
            for part in parts {
                push_filter(qb, part);
            }
        }
    }
}

pub(crate) fn select_query(collection: &str, query: &QuerySpec) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT body FROM documents WHERE collection = ");
    qb.push_bind(collection.to_string());
    push_filter(&mut qb, &query.filter);
    qb.push(" ORDER BY ");
    if let Some(sort) = &query.sort {
        qb.push("body -> ");
        qb.push_bind(sort.field.clone());
        qb.push(match sort.order {
            SortOrder::Ascending => " ASC NULLS FIRST, ",
            SortOrder::Descending => " DESC NULLS LAST, ",
        });
    }
    qb.push("seq");
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if query.skip > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
    }
    qb
}

pub(crate) fn group_average_query(
    collection: &str,
    aggregation: &GroupAverage,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT body ->> ");
    qb.push_bind(aggregation.group_by.clone());
    qb.push(" AS key, AVG((body ->> ");
    qb.push_bind(aggregation.field.clone());
    qb.push(")::float8) AS average FROM documents WHERE collection = ");
    qb.push_bind(collection.to_string());
    qb.push(" AND jsonb_typeof(body -> ");
    qb.push_bind(aggregation.group_by.clone());
    qb.push(") = 'string' AND jsonb_typeof(body -> ");
    qb.push_bind(aggregation.field.clone());
    qb.push(") = 'number'");
    push_filter(&mut qb, &aggregation.filter);
    qb.push(" GROUP BY 1 ORDER BY 1");
    qb
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create_collection(&self, name: &str) -> Result<bool, StoreError> {
        let result =
            sqlx::query("INSERT INTO collections (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(name)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM collections WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    async fn insert_one(&self, collection: &str, key: &str, doc: Value) -> Result<(), StoreError> {
        self.ensure_collection(collection).await?;
        enforce(collection, self.load_validator(collection).await?.as_ref(), &doc)?;

        let result = sqlx::query(
            "INSERT INTO documents (collection, doc_key, body) VALUES ($1, $2, $3)
             ON CONFLICT (collection, doc_key) DO NOTHING",
        )
        .bind(collection)
        .bind(key)
        .bind(Json(&doc))
        .execute(&self.pool)
        .await;

        let duplicate = || StoreError::DuplicateKey {
            collection: collection.to_string(),
            key: key.to_string(),
        };
        match result {
            Ok(done) if done.rows_affected() == 0 => Err(duplicate()),
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(duplicate()),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_one(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let body: Option<Json<Value>> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = $1 AND doc_key = $2")
                .bind(collection)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(body.map(|Json(value)| value))
    }

    async fn replace_one(
        &self,
        collection: &str,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        enforce(collection, self.load_validator(collection).await?.as_ref(), &doc)?;
        let result =
            sqlx::query("UPDATE documents SET body = $3 WHERE collection = $1 AND doc_key = $2")
                .bind(collection)
                .bind(key)
                .bind(Json(&doc))
                .execute(&self.pool)
                .await;
        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                key: key.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_one(&self, collection: &str, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND doc_key = $2")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, collection: &str, query: &QuerySpec) -> Result<Vec<Value>, StoreError> {
        let mut qb = select_query(collection, query);
        let rows: Vec<Json<Value>> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|Json(value)| value).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());
        push_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn group_average(
        &self,
        collection: &str,
        aggregation: &GroupAverage,
    ) -> Result<Vec<GroupRow>, StoreError> {
        let mut qb = group_average_query(collection, aggregation);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<GroupRow, StoreError> {
                Ok(GroupRow {
                    key: row.try_get("key")?,
                    average: row.try_get("average")?,
                })
            })
            .collect()
    }

    async fn set_validator(
        &self,
        collection: &str,
        rule: &SchemaRule,
        mode: EnforcementMode,
    ) -> Result<(), StoreError> {
        if !self.collection_exists(collection).await? {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        }
        sqlx::query(
            "INSERT INTO collection_validators (collection, rule, mode) VALUES ($1, $2, $3)
             ON CONFLICT (collection) DO UPDATE
             SET rule = EXCLUDED.rule, mode = EXCLUDED.mode, updated_at = now()",
        )
        .bind(collection)
        .bind(Json(rule))
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn validator(&self, collection: &str) -> Result<Option<AppliedValidator>, StoreError> {
        if !self.collection_exists(collection).await? {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        }
        self.load_validator(collection).await
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        let name = index.name(identifier(collection)?);
        identifier(&index.field)?;
        identifier(&name)?;
        self.ensure_collection(collection).await?;

        // DDL cannot take bind parameters; both names passed `identifier`.
        let ddl = format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON documents ((body -> '{}')) WHERE collection = '{}'",
            if index.unique { "UNIQUE " } else { "" },
            name,
            index.field,
            collection,
        );
        sqlx::query(&ddl).execute(&self.pool).await.map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    key: index.field.clone(),
                }
            } else {
                err.into()
            }
        })?;

        sqlx::query(
            "INSERT INTO collection_indexes (collection, field, is_unique) VALUES ($1, $2, $3)
             ON CONFLICT (collection, field) DO NOTHING",
        )
        .bind(collection)
        .bind(&index.field)
        .bind(index.unique)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        if !self.collection_exists(collection).await? {
            return Err(StoreError::CollectionNotFound(collection.to_string()));
        }
        let rows = sqlx::query(
            "SELECT field, is_unique FROM collection_indexes WHERE collection = $1 ORDER BY field",
        )
        .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<IndexSpec, StoreError> {
                Ok(IndexSpec {
                    field: row.try_get("field")?,
                    unique: row.try_get("is_unique")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_aggregation, build_filter, build_page, build_sort, AggregationKind};

    #[test]
    fn identifiers_are_checked_before_ddl() {
        assert!(identifier("employees").is_ok());
        assert!(identifier("employee_id").is_ok());
        assert!(identifier("x'; DROP TABLE documents; --").is_err());
        assert!(identifier("").is_err());
    }

    #[test]
    fn list_query_binds_every_value() {
        let spec = QuerySpec::filter(build_filter(Some("HR"), Some("Excel")))
            .sorted(build_sort())
            .paged(&build_page(2, 10));
        let qb = select_query("employees", &spec);
        assert_eq!(
            qb.sql(),
            "SELECT body FROM documents WHERE collection = $1 \
             AND body -> $2 = $3 \
             AND (body -> $4 @> $5 OR body -> $6 = $7) \
             ORDER BY body -> $8 DESC NULLS LAST, seq LIMIT $9 OFFSET $10"
        );
    }

    #[test]
    fn unsorted_query_keeps_natural_order() {
        let qb = select_query("employees", &QuerySpec::filter(Filter::All));
        assert_eq!(
            qb.sql(),
            "SELECT body FROM documents WHERE collection = $1 ORDER BY seq"
        );
    }

    #[test]
    fn group_average_skips_non_numeric_values() {
        let agg = build_aggregation(AggregationKind::AvgSalaryByDepartment);
        let qb = group_average_query("employees", &agg);
        let sql = qb.sql();
        assert!(
            sql.starts_with("SELECT body ->> $1 AS key, AVG((body ->> $2)::float8) AS average")
        );
        assert!(sql.contains("jsonb_typeof(body -> $5) = 'number'"));
        assert!(sql.ends_with("GROUP BY 1 ORDER BY 1"));
    }
}
