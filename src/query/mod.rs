//! Store-neutral query descriptions.
//!
//! Nothing here touches a store. `MemoryStore` evaluates these values
//! directly and `PgStore` renders them to SQL.

use serde_json::Value;
use std::cmp::Ordering;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Field equals the value exactly.
    Eq { field: String, value: Value },
    /// Field is an array holding the value (or is equal to it).
    Contains { field: String, value: Value },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::All, other) | (other, Filter::All) => other,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (one, other) => Filter::And(vec![one, other]),
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { field, value } => doc.get(field) == Some(value),
            Filter::Contains { field, value } => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                Some(other) => other == value,
                None => false,
            },
            Filter::And(parts) => parts.iter().all(|part| part.matches(doc)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Descending,
        }
    }

    /// Orders two documents by this key. Missing values sort lowest, so
    /// they trail a descending sort.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ordering = compare_values(a.get(&self.field), b.get(&self.field));
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a)
                .cmp(&type_rank(b))
                .then_with(|| a.to_string().cmp(&b.to_string())),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Saturates, so a page far past the end yields an empty slice.
    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl QuerySpec {
    pub fn filter(filter: Filter) -> Self {
        Self {
            filter,
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn paged(mut self, page: &PageRequest) -> Self {
        self.skip = page.skip();
        self.limit = Some(page.limit());
        self
    }

    pub fn limited(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Applies sort, skip and limit to documents already in natural order.
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some(sort) = &self.sort {
            docs.sort_by(|a, b| sort.compare(a, b));
        }
        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        docs.into_iter().skip(skip).take(limit).collect()
    }
}

/// Average of `field` per distinct string value of `group_by`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAverage {
    pub filter: Filter,
    pub group_by: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub key: String,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationKind {
    AvgSalaryByDepartment,
}

/// Department is exact-match; skill selects records whose skills contain it.
/// Both given means both must hold.
pub fn build_filter(department: Option<&str>, skill: Option<&str>) -> Filter {
    let mut filter = Filter::All;
    if let Some(department) = department {
        filter = filter.and(Filter::eq("department", department));
    }
    if let Some(skill) = skill {
        filter = filter.and(Filter::contains("skills", skill));
    }
    filter
}

pub fn build_sort() -> Sort {
    Sort::descending("joining_date")
}

/// Expects validated input; zero values are clamped to 1.
pub fn build_page(page: u64, page_size: u64) -> PageRequest {
    PageRequest {
        page: page.max(1),
        page_size: page_size.max(1),
    }
}

pub fn build_aggregation(kind: AggregationKind) -> GroupAverage {
    match kind {
        AggregationKind::AvgSalaryByDepartment => GroupAverage {
            filter: Filter::All,
            group_by: "department".to_string(),
            field: "salary".to_string(),
        },
    }
}

/// In-process evaluation of a group average, rows ordered by key.
///
/// Documents whose group key is not a string, or whose field is not a
/// number, are left out.
pub fn group_average<'a, I>(agg: &GroupAverage, docs: I) -> Vec<GroupRow>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut groups: std::collections::BTreeMap<String, (f64, u64)> = Default::default();
    for doc in docs.into_iter().filter(|doc| agg.filter.matches(doc)) {
        let key = doc.get(&agg.group_by).and_then(Value::as_str);
        let value = doc.get(&agg.field).and_then(Value::as_f64);
        if let (Some(key), Some(value)) = (key, value) {
            let entry = groups.entry(key.to_string()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    groups
        .into_iter()
        .map(|(key, (sum, count))| GroupRow {
            key,
            average: sum / count as f64,
        })
        .collect()
}
