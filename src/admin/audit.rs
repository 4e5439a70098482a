use log::{info, warn};

use super::AdminError;
use crate::query::{Filter, QuerySpec};
use crate::schema::SchemaRule;
use crate::store::DocumentStore;

pub const AUDIT_SAMPLE_SIZE: u64 = 100;
const MAX_SAMPLE_IDS: usize = 3;
const UNKNOWN_ID: &str = "Unknown ID";

/// Result of checking stored documents against a rule the store may not
/// have been enforcing when they were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub collection: String,
    pub total: u64,
    pub examined: u64,
    pub suspect: u64,
    pub sample_ids: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.suspect == 0
    }
}

/// Reads up to `sample_size` documents in storage order and runs the same
/// validator the store uses on writes. Never modifies data.
pub async fn audit_existing(
    store: &dyn DocumentStore,
    collection: &str,
    rule: &SchemaRule,
    sample_size: u64,
) -> Result<AuditReport, AdminError> {
    let total = store.count(collection, &Filter::All).await?;
    let docs = store
        .find(collection, &QuerySpec::filter(Filter::All).limited(sample_size))
        .await?;

    let mut report = AuditReport {
        collection: collection.to_string(),
        total,
        examined: docs.len() as u64,
        suspect: 0,
        sample_ids: Vec::new(),
    };

    for doc in &docs {
        if rule.validate(doc).is_empty() {
            continue;
        }
        report.suspect += 1;
        if report.sample_ids.len() < MAX_SAMPLE_IDS {
            report
                .sample_ids
                .push(rule.key_of(doc).unwrap_or(UNKNOWN_ID).to_string());
        }
    }

    if total == 0 {
        warn!("No documents found in {} collection", collection);
    } else if report.is_clean() {
        info!("All sampled documents in {} appear valid", collection);
    } else {
        warn!(
            "Found {} potentially invalid documents in {}. Sample IDs: {:?}",
            report.suspect, collection, report.sample_ids
        );
    }
    Ok(report)
}
