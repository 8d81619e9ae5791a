//! Reconciler: merge every bucket back into one ordered record set.
//!
//! Two accounting invariants are checked before anything is merged:
//!
//! 1. `escalations == resolved_fixed + resolved_skipped`
//! 2. `total_rows == valid + auto_fixed + resolved_fixed + resolved_skipped`
//!
//! After those, resolutions that answer no escalation and rows that collide
//! in the merge are rejected as well.
//!
//! The merge is all-or-nothing. A violation returns an error and no rows;
//! callers must not write anything in that case.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::model::{ClassificationResult, Record, Resolution};

/// A failed row-accounting invariant, with every count involved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationViolation {
    #[error(
        "escalation count mismatch: expected {expected}, got {answered} ({fixed} fixed + {skipped} skipped)"
    )]
    UnansweredEscalations {
        expected: usize,
        answered: usize,
        fixed: usize,
        skipped: usize,
    },

    #[error(
        "row count mismatch: expected {expected}, got {accounted} ({valid} valid + {auto_fixed} auto-fixed + {fixed} user-fixed + {skipped} user-skipped)"
    )]
    RowCountMismatch {
        expected: usize,
        accounted: usize,
        valid: usize,
        auto_fixed: usize,
        fixed: usize,
        skipped: usize,
    },

    #[error("row {0} appears more than once in the merged output")]
    DuplicateRow(u32),

    #[error("resolution for row {0} answers no escalation")]
    UnexpectedRow(u32),
}

/// Merge the classification buckets and the resolution accumulators.
///
/// Each bucket contributes its current-best view of a row: valid rows as
/// they are, auto-fixed rows as corrected, resolver-fixed rows as replaced,
/// skipped rows as originally escalated. The result is sorted by row number.
pub fn reconcile(
    classification: &ClassificationResult,
    resolved_fixed: &[Resolution],
    resolved_skipped: &[Resolution],
) -> Result<Vec<Record>, ReconciliationViolation> {
    let expected = classification.escalations().len();
    let answered = resolved_fixed.len() + resolved_skipped.len();
    if expected != answered {
        let violation = ReconciliationViolation::UnansweredEscalations {
            expected,
            answered,
            fixed: resolved_fixed.len(),
            skipped: resolved_skipped.len(),
        };
        error!(%violation, "Reconciliation aborted");
        return Err(violation);
    }

    let valid = classification.valid().len();
    let auto_fixed = classification.auto_fixed().len();
    let accounted = valid + auto_fixed + answered;
    if classification.total_rows() != accounted {
        let violation = ReconciliationViolation::RowCountMismatch {
            expected: classification.total_rows(),
            accounted,
            valid,
            auto_fixed,
            fixed: resolved_fixed.len(),
            skipped: resolved_skipped.len(),
        };
        error!(%violation, "Reconciliation aborted");
        return Err(violation);
    }

    let escalated: BTreeSet<u32> = classification
        .escalations()
        .iter()
        .map(|e| e.row_number)
        .collect();
    if let Some(stray) = resolved_fixed
        .iter()
        .chain(resolved_skipped)
        .find(|r| !escalated.contains(&r.row_number))
    {
        let violation = ReconciliationViolation::UnexpectedRow(stray.row_number);
        error!(%violation, "Reconciliation aborted");
        return Err(violation);
    }

    let views = classification
        .valid()
        .iter()
        .chain(classification.auto_fixed().iter().map(|f| &f.corrected))
        .chain(resolved_fixed.iter().map(Resolution::record))
        .chain(resolved_skipped.iter().map(Resolution::record));

    let mut merged: BTreeMap<u32, Record> = BTreeMap::new();
    for record in views {
        if merged.insert(record.row_number, record.clone()).is_some() {
            let violation = ReconciliationViolation::DuplicateRow(record.row_number);
            error!(%violation, "Reconciliation aborted");
            return Err(violation);
        }
    }

    info!(rows = merged.len(), "Reconciliation complete");
    Ok(merged.into_values().collect())
}

/// Per-bucket counts of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub total_rows: usize,
    pub valid: usize,
    pub auto_fixed: usize,
    pub user_fixed: usize,
    pub user_skipped: usize,
}

impl CleaningSummary {
    pub fn new(
        classification: &ClassificationResult,
        resolved_fixed: &[Resolution],
        resolved_skipped: &[Resolution],
    ) -> Self {
        Self {
            total_rows: classification.total_rows(),
            valid: classification.valid().len(),
            auto_fixed: classification.auto_fixed().len(),
            user_fixed: resolved_fixed.len(),
            user_skipped: resolved_skipped.len(),
        }
    }
}

impl fmt::Display for CleaningSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Input rows:        {}", self.total_rows)?;
        writeln!(f, "- Already valid:     {}", self.valid)?;
        writeln!(f, "- Auto-fixed:        {}", self.auto_fixed)?;
        write!(f, "- Resolved by user:  {}", self.user_fixed)?;
        if self.user_skipped > 0 {
            write!(
                f,
                "\n- Skipped by user:   {} (original data kept)",
                self.user_skipped
            )?;
        }
        Ok(())
    }
}
