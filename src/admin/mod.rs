//! Operator-side schema management. Nothing here runs per request.

pub mod audit;
pub mod indexes;
pub mod inspect;
pub mod probe;

use log::{info, warn};

use crate::schema::{registry, EnforcementMode, SchemaError, SchemaRule};
use crate::store::{DocumentStore, SharedStore, StoreError};

pub use audit::{audit_existing, AuditReport, AUDIT_SAMPLE_SIZE};
pub use indexes::{create_employee_indexes, EMPLOYEE_INDEXES};
pub use inspect::{describe_rule, validation_status, CollectionStatus, RuleSummary};
pub use probe::{run_probe, ProbeOutcome};

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("collection '{0}' has no schema validation")]
    NoValidation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Enforce `rule` on every future write to `collection`.
pub async fn apply_rule(
    store: &dyn DocumentStore,
    collection: &str,
    rule: &SchemaRule,
    mode: EnforcementMode,
) -> Result<(), AdminError> {
    store.set_validator(collection, rule, mode).await?;
    info!("Applied {} schema validation to {} (mode: {})", rule.collection, collection, mode);
    Ok(())
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub collection: String,
    pub mode: EnforcementMode,
    pub audit: Option<AuditReport>,
    pub summary: Option<RuleSummary>,
}

/// Applies the registry rule for `collection`. With `audit_first` the
/// existing data is sampled and the rule goes in as `warn` so the suspect
/// documents can be fixed before switching to `error`.
pub async fn apply_registry_rule(
    store: &dyn DocumentStore,
    collection: &str,
    audit_first: bool,
) -> Result<ApplyOutcome, AdminError> {
    let rule = registry::get_rule(collection)?;
    if !store.collection_exists(collection).await? {
        return Err(StoreError::CollectionNotFound(collection.to_string()).into());
    }

    let audit = if audit_first {
        Some(audit_existing(store, collection, rule, AUDIT_SAMPLE_SIZE).await?)
    } else {
        None
    };
    let mode = if audit_first {
        EnforcementMode::Warn
    } else {
        EnforcementMode::Error
    };
    apply_rule(store, collection, rule, mode).await?;

    let summary = match describe_rule(store, collection).await {
        Ok(summary) => Some(summary),
        Err(err) => {
            warn!("Could not retrieve schema info for {}: {}", collection, err);
            None
        }
    };

    Ok(ApplyOutcome {
        collection: collection.to_string(),
        mode,
        audit,
        summary,
    })
}

/// Creates every registry collection that is missing and applies its rule.
pub async fn bootstrap(store: &SharedStore, mode: EnforcementMode) -> Result<(), AdminError> {
    for rule in registry::all_rules() {
        if store.create_collection(&rule.collection).await? {
            info!("Created collection {}", rule.collection);
        }
        apply_rule(store.as_ref(), &rule.collection, rule, mode).await?;
    }
    Ok(())
}
