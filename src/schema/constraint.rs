use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use super::validator::Violation;

/// Storage type a field value must have before any constraint is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Bool,
    /// A string holding a calendar date (`2023-01-15`) or an RFC 3339 timestamp.
    Date,
    Array,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Array => "array",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Date => value.as_str().map(is_date_like).unwrap_or(false),
            FieldType::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_date_like(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// Compiled regular expression that serializes as its source text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(de::Error::custom)
    }
}

/// One check applied to a field whose type already matched.
///
/// Constraints that do not apply to the value's type are skipped, so a
/// `Range` on a string field never fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    Pattern { pattern: Pattern },
    Enum { values: Vec<String> },
    Range { min: Option<i64>, max: Option<i64> },
    Length { min: Option<usize>, max: Option<usize> },
    Items { spec: Box<FieldSpec> },
    UniqueItems,
}

impl Constraint {
    pub fn check(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        match self {
            Constraint::Pattern { pattern } => {
                if let Some(text) = value.as_str() {
                    if !pattern.is_match(text) {
                        out.push(Violation::new(
                            path,
                            format!("does not match pattern {}", pattern.as_str()),
                        ));
                    }
                }
            }
            Constraint::Enum { values } => {
                if let Some(text) = value.as_str() {
                    if !values.iter().any(|allowed| allowed == text) {
                        out.push(Violation::new(
                            path,
                            format!("must be one of: {}", values.join(", ")),
                        ));
                    }
                }
            }
            Constraint::Range { min, max } => {
                if let Some(number) = value.as_i64() {
                    let below = min.map_or(false, |min| number < min);
                    let above = max.map_or(false, |max| number > max);
                    if below || above {
                        out.push(Violation::new(
                            path,
                            format!("must be within {}", bounds(min, max)),
                        ));
                    }
                } else if value.is_u64() && max.is_some() {
                    out.push(Violation::new(path, format!("must be within {}", bounds(min, max))));
                }
            }
            Constraint::Length { min, max } => {
                if let Some(text) = value.as_str() {
                    let len = text.chars().count();
                    if min.map_or(false, |min| len < min) || max.map_or(false, |max| len > max) {
                        out.push(Violation::new(
                            path,
                            format!("length must be within {}", bounds(min, max)),
                        ));
                    }
                }
            }
            Constraint::Items { spec } => {
                if let Some(items) = value.as_array() {
                    for (index, item) in items.iter().enumerate() {
                        spec.check(&format!("{}[{}]", path, index), item, out);
                    }
                }
            }
            Constraint::UniqueItems => {
                if let Some(items) = value.as_array() {
                    let mut seen = HashSet::with_capacity(items.len());
                    if !items.iter().all(|item| seen.insert(item.to_string())) {
                        out.push(Violation::new(path, "items must be unique"));
                    }
                }
            }
        }
    }

    /// Short operator-facing rendering, e.g. `minLen: 1`.
    pub fn describe(&self) -> String {
        match self {
            Constraint::Pattern { pattern } => format!("pattern: {}", pattern.as_str()),
            Constraint::Enum { values } => format!("enum: [{}]", values.join(", ")),
            Constraint::Range { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("min: {}, max: {}", min, max),
                (Some(min), None) => format!("min: {}", min),
                (None, Some(max)) => format!("max: {}", max),
                (None, None) => "range: any".to_string(),
            },
            Constraint::Length { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("minLen: {}, maxLen: {}", min, max),
                (Some(min), None) => format!("minLen: {}", min),
                (None, Some(max)) => format!("maxLen: {}", max),
                (None, None) => "length: any".to_string(),
            },
            Constraint::Items { spec } if spec.constraints.is_empty() => {
                format!("items: {}", spec.field_type)
            }
            Constraint::Items { spec } => format!(
                "items: {} ({})",
                spec.field_type,
                spec.constraints
                    .iter()
                    .map(Constraint::describe)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Constraint::UniqueItems => "uniqueItems".to_string(),
        }
    }
}

fn bounds<T: fmt::Display>(min: &Option<T>, max: &Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("[{}, {}]", min, max),
        (Some(min), None) => format!("[{}, ..)", min),
        (None, Some(max)) => format!("(.., {}]", max),
        (None, None) => "(.., ..)".to_string(),
    }
}

/// Type plus constraints for one property of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            constraints: Vec::new(),
            description: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn array_of(items: FieldSpec) -> Self {
        Self::new(FieldType::Array).with(Constraint::Items {
            spec: Box::new(items),
        })
    }

    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn pattern(self, pattern: Pattern) -> Self {
        self.with(Constraint::Pattern { pattern })
    }

    pub fn one_of<I, S>(self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Constraint::Enum {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn range(self, min: Option<i64>, max: Option<i64>) -> Self {
        self.with(Constraint::Range { min, max })
    }

    pub fn length(self, min: Option<usize>, max: Option<usize>) -> Self {
        self.with(Constraint::Length { min, max })
    }

    pub fn unique_items(self) -> Self {
        self.with(Constraint::UniqueItems)
    }

    pub fn describe_as(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Type check first; constraints only run on a value of the right type.
    pub fn check(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        if !self.field_type.matches(value) {
            out.push(Violation::new(
                path,
                format!("expected {}, found {}", self.field_type, json_type_name(value)),
            ));
            return;
        }
        for constraint in &self.constraints {
            constraint.check(path, value, out);
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
