pub mod constraint;
pub mod registry;
pub mod rule;
pub mod validator;

pub use constraint::{Constraint, FieldSpec, FieldType, Pattern};
pub use rule::{EnforcementMode, Property, SchemaRule};
pub use validator::{validate_document, Violation};

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("no schema rule registered for collection '{0}'")]
    UnknownCollection(String),
    #[error("unknown enforcement mode '{0}' (expected 'error' or 'warn')")]
    UnknownMode(String),
}
