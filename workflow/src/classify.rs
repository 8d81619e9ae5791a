//! Classifier gateway: one call to the classification collaborator, then
//! strict validation of what came back.
//!
//! The collaborator returns raw JSON. Nothing it says is trusted until
//! `validate_classification` has checked the response against the input
//! rows; any gap is reported as `ClassificationIncomplete` rather than
//! papered over with empty buckets.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::WorkflowError;
use crate::model::{AutoFixed, ClassificationResult, Escalation, Record, COLUMNS};

/// Request handed to the classifier: every input row, in input order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassifierRequest {
    pub total_rows: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl ClassifierRequest {
    pub fn new(records: &[Record]) -> Self {
        Self {
            total_rows: records.len(),
            columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: records.to_vec(),
        }
    }
}

/// Strict shape of a classifier response. Every field is required.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassifierResponse {
    pub total_rows: usize,
    pub valid_rows: Vec<Record>,
    pub auto_fixed: Vec<AutoFixed>,
    pub escalations: Vec<Escalation>,
}

/// The external classification collaborator.
///
/// Implementations may retry internally; whatever they finally return (or
/// fail with) is taken as terminal by the workflow.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Classify all rows. Returns the raw response document.
    async fn classify(&self, request: &ClassifierRequest) -> anyhow::Result<serde_json::Value>;
}

/// Run the classifier once over `records` and validate its answer.
pub async fn invoke(
    classifier: &dyn Classifier,
    records: &[Record],
) -> Result<ClassificationResult, WorkflowError> {
    let request = ClassifierRequest::new(records);
    info!(
        classifier = classifier.name(),
        rows = records.len(),
        "Classifying rows"
    );

    let raw = classifier
        .classify(&request)
        .await
        .map_err(|e| WorkflowError::ClassifierUnavailable(format!("{e:#}")))?;

    let result = validate_classification(records, raw)?;
    info!(
        total = result.total_rows(),
        valid = result.valid().len(),
        auto_fixed = result.auto_fixed().len(),
        escalations = result.escalations().len(),
        "Classification accepted"
    );
    Ok(result)
}

/// Check a raw classifier response against the input rows.
///
/// Rejects: schema failures, a wrong `total_rows`, inner records whose row
/// number disagrees with their bucket entry, escalations without issues,
/// any row number seen twice, and any gap or surplus relative to the input.
/// Valid and escalated rows always carry the input values, whatever the
/// classifier echoed back.
pub fn validate_classification(
    records: &[Record],
    raw: serde_json::Value,
) -> Result<ClassificationResult, WorkflowError> {
    let response: ClassifierResponse = serde_json::from_value(raw).map_err(|e| {
        WorkflowError::ClassificationIncomplete(format!("response failed schema validation: {e}"))
    })?;

    if response.total_rows != records.len() {
        return Err(WorkflowError::ClassificationIncomplete(format!(
            "total_rows mismatch: expected {}, got {}",
            records.len(),
            response.total_rows
        )));
    }

    for fixed in &response.auto_fixed {
        if fixed.corrected.row_number != fixed.row_number {
            return Err(WorkflowError::ClassificationIncomplete(format!(
                "auto_fixed entry for row {} carries a corrected row numbered {}",
                fixed.row_number, fixed.corrected.row_number
            )));
        }
    }

    for escalation in &response.escalations {
        if escalation.record.row_number != escalation.row_number {
            return Err(WorkflowError::ClassificationIncomplete(format!(
                "escalation for row {} carries a current row numbered {}",
                escalation.row_number, escalation.record.row_number
            )));
        }
        if escalation.issues.is_empty() {
            return Err(WorkflowError::ClassificationIncomplete(format!(
                "escalation for row {} lists no issues",
                escalation.row_number
            )));
        }
    }

    // Row number → buckets it appeared in.
    let mut seen: BTreeMap<u32, Vec<&'static str>> = BTreeMap::new();
    let tagged = response
        .valid_rows
        .iter()
        .map(|r| (r.row_number, "valid_rows"))
        .chain(
            response
                .auto_fixed
                .iter()
                .map(|f| (f.row_number, "auto_fixed")),
        )
        .chain(
            response
                .escalations
                .iter()
                .map(|e| (e.row_number, "escalations")),
        );
    for (row, bucket) in tagged {
        seen.entry(row).or_default().push(bucket);
    }

    let duplicates: Vec<String> = seen
        .iter()
        .filter(|(_, buckets)| buckets.len() > 1)
        .map(|(row, buckets)| format!("row {row} in [{}]", buckets.join(", ")))
        .collect();
    if !duplicates.is_empty() {
        return Err(WorkflowError::ClassificationIncomplete(format!(
            "buckets overlap: {}",
            duplicates.join("; ")
        )));
    }

    let expected: BTreeSet<u32> = records.iter().map(|r| r.row_number).collect();
    let got: BTreeSet<u32> = seen.keys().copied().collect();
    if expected != got {
        let missing: Vec<u32> = expected.difference(&got).copied().collect();
        let unknown: Vec<u32> = got.difference(&expected).copied().collect();
        warn!(?missing, ?unknown, "Classifier row coverage mismatch");
        return Err(WorkflowError::ClassificationIncomplete(format!(
            "row coverage mismatch: expected {} rows, got {}; missing {missing:?}, unknown {unknown:?}",
            expected.len(),
            got.len()
        )));
    }

    // Only auto_fixed may change a row; everywhere else the input values stand.
    let originals: BTreeMap<u32, &Record> = records.iter().map(|r| (r.row_number, r)).collect();
    let mut valid = response.valid_rows;
    for record in &mut valid {
        keep_input_values(record, &originals, "valid_rows");
    }
    let mut escalations = response.escalations;
    for escalation in &mut escalations {
        keep_input_values(&mut escalation.record, &originals, "escalations");
    }

    Ok(ClassificationResult {
        total_rows: response.total_rows,
        valid,
        auto_fixed: response.auto_fixed,
        escalations,
    })
}

fn keep_input_values(record: &mut Record, originals: &BTreeMap<u32, &Record>, bucket: &str) {
    let Some(original) = originals.get(&record.row_number) else {
        return;
    };
    let changed = record.changed_columns(original);
    if !changed.is_empty() {
        warn!(
            row = record.row_number,
            bucket,
            ?changed,
            "Classifier altered a row outside auto_fixed; keeping the input values"
        );
        *record = (*original).clone();
    }
}
