use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde::Serialize;
use std::fmt;
use validator::ValidationErrors;

use crate::schema::{SchemaError, Violation};
use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    Validation { message: String, details: Vec<Violation> },
    DuplicateId(String),
    NotFound(String),
    MissingParameter(String),
    Unauthorized(String),
    CollectionNotFound(String),
    StoreUnavailable(String),
    InternalServerError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<Violation>,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation { message, .. } => write!(f, "Validation Error: {}", message),
            AppError::DuplicateId(msg) => write!(f, "Duplicate Id: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            AppError::MissingParameter(msg) => write!(f, "Missing Parameter: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::CollectionNotFound(msg) => write!(f, "Collection Not Found: {}", msg),
            AppError::StoreUnavailable(msg) => write!(f, "Store Unavailable: {}", msg),
            AppError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. }
            | AppError::DuplicateId(_)
            | AppError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::CollectionNotFound(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, details) = match self {
            AppError::Validation { message, details } => (message.clone(), details.clone()),
            AppError::DuplicateId(msg)
            | AppError::NotFound(msg)
            | AppError::MissingParameter(msg)
            | AppError::Unauthorized(msg) => (msg.clone(), Vec::new()),
            // Infrastructure detail stays in the logs.
            AppError::CollectionNotFound(_) | AppError::InternalServerError(_) => {
                ("Internal server error".to_string(), Vec::new())
            }
            AppError::StoreUnavailable(_) => ("Document store unavailable".to_string(), Vec::new()),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse { error, details })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { key, .. } => {
                AppError::DuplicateId(format!("'{}' already exists", key))
            }
            StoreError::Validation { collection, violations } => AppError::Validation {
                message: format!("Document failed {} schema validation", collection),
                details: violations,
            },
            StoreError::CollectionNotFound(name) => {
                error!("Collection {} is missing", name);
                AppError::CollectionNotFound(name)
            }
            StoreError::Unavailable(msg) => {
                error!("Document store error: {}", msg);
                AppError::StoreUnavailable(msg)
            }
            other => {
                error!("Document store error: {}", other);
                AppError::InternalServerError(other.to_string())
            }
        }
    }
}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        error!("Schema registry error: {}", err);
        AppError::InternalServerError(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        let mut details: Vec<Violation> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = match &e.message {
                        Some(message) => message.to_string(),
                        None => describe_validator_error(e),
                    };
                    Violation::new(field, message)
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation {
            message: "Validation failed".to_string(),
            details,
        }
    }
}

fn describe_validator_error(err: &validator::ValidationError) -> String {
    let bound = |name: &str| err.params.get(name).map(|v| v.to_string());
    match err.code.as_ref() {
        "range" => match (bound("min"), bound("max")) {
            (Some(min), Some(max)) => format!("must be between {} and {}", min, max),
            (Some(min), None) => format!("must be at least {}", min),
            (None, Some(max)) => format!("must be at most {}", max),
            (None, None) => "out of range".to_string(),
        },
        "length" => match (bound("min"), bound("max")) {
            (Some(min), Some(max)) => format!("length must be between {} and {}", min, max),
            (Some(min), None) => format!("length must be at least {}", min),
            (None, Some(max)) => format!("length must be at most {}", max),
            (None, None) => "invalid length".to_string(),
        },
        code => code.to_string(),
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        error!("Stored document could not be decoded: {}", err);
        AppError::InternalServerError(err.to_string())
    }
}
