use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::constraint::FieldSpec;
use super::validator::{validate_document, Violation};
use super::SchemaError;

/// What the store does with a write that violates the applied rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// Reject the write.
    Error,
    /// Accept the write and log the violations.
    Warn,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnforcementMode::Error => "error",
            EnforcementMode::Warn => "warn",
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementMode {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(EnforcementMode::Error),
            "warn" => Ok(EnforcementMode::Warn),
            other => Err(SchemaError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub spec: FieldSpec,
}

/// Validation contract for every document in one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRule {
    pub collection: String,
    /// Field whose value is the document's primary key.
    pub key_field: String,
    pub required: Vec<String>,
    pub properties: Vec<Property>,
    pub additional_properties: bool,
}

impl SchemaRule {
    pub fn new(collection: &str, key_field: &str) -> Self {
        Self {
            collection: collection.to_string(),
            key_field: key_field.to_string(),
            required: Vec::new(),
            properties: Vec::new(),
            additional_properties: true,
        }
    }

    pub fn require(mut self, fields: &[&str]) -> Self {
        self.required.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn property(&self, name: &str) -> Option<&FieldSpec> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.spec)
    }

    pub fn with_property(mut self, name: &str, spec: FieldSpec) -> Self {
        self.properties.push(Property {
            name: name.to_string(),
            spec,
        });
        self
    }

    pub fn validate(&self, doc: &Value) -> Vec<Violation> {
        validate_document(self, doc)
    }

    /// Key of `doc` under this rule, if present and a string.
    pub fn key_of<'a>(&self, doc: &'a Value) -> Option<&'a str> {
        doc.get(&self.key_field).and_then(Value::as_str)
    }
}
