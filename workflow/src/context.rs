//! Typed run context owned by the orchestrator.
//!
//! Holds everything the stages share: the classification result, the
//! escalation cursor, and the two resolution accumulators. Decisions read it
//! through `&self` (`route`); the only mutation after classification is
//! `commit_resolution`.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cursor::EscalationCursor;
use crate::model::{ClassificationResult, Record, Resolution};
use crate::reconcile::{self, CleaningSummary, ReconciliationViolation};
use crate::state_machine::WorkflowState;

/// What `commit_resolution` did with a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// The resolution was appended to an accumulator.
    pub recorded: bool,
    /// The escalation cursor moved forward.
    pub advanced: bool,
}

/// A resolution that does not fit the escalation queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueViolation {
    /// The resolution answers a row other than the one under the cursor.
    #[error("resolution for row {row_number} does not answer the pending escalation (pending: {pending:?})")]
    NotCurrent { row_number: u32, pending: Option<u32> },
    /// The row under the cursor was already answered.
    #[error("row {0} was already answered")]
    AlreadyAnswered(u32),
    /// `Resolving` was entered with nothing left in the queue.
    #[error("no escalation is pending")]
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    classification: Option<ClassificationResult>,
    cursor: EscalationCursor,
    resolved_fixed: Vec<Resolution>,
    resolved_skipped: Vec<Resolution>,
    answered: HashSet<u32>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the classifier's result and reset the loop state.
    pub fn install_classification(&mut self, classification: ClassificationResult) {
        self.cursor = EscalationCursor::new(classification.escalations().to_vec());
        self.resolved_fixed.clear();
        self.resolved_skipped.clear();
        self.answered.clear();
        self.classification = Some(classification);
    }

    /// Which state follows `Routing`. Pure; safe to evaluate repeatedly.
    pub fn route(&self) -> WorkflowState {
        if self.cursor.peek().is_some() {
            WorkflowState::Resolving
        } else {
            WorkflowState::Reconciling
        }
    }

    /// Record `resolution` and move the cursor past it.
    ///
    /// Only the escalation under the cursor can be answered. Replaying a
    /// resolution for a row that is already answered leaves the context
    /// unchanged (`recorded` and `advanced` both false). A resolution for any
    /// other row is rejected without touching the context.
    pub fn commit_resolution(
        &mut self,
        resolution: Resolution,
    ) -> Result<CommitOutcome, QueueViolation> {
        let row = resolution.row_number;
        if self.answered.contains(&row) {
            debug!(row, "Row already recorded, skipping");
            let advanced = self.cursor.advance();
            return Ok(CommitOutcome {
                recorded: false,
                advanced,
            });
        }

        let pending = self.cursor.peek().map(|e| e.row_number);
        if pending != Some(row) {
            warn!(row, ?pending, "Resolution does not match the pending escalation");
            return Err(QueueViolation::NotCurrent {
                row_number: row,
                pending,
            });
        }

        self.answered.insert(row);
        if resolution.is_fixed() {
            self.resolved_fixed.push(resolution);
        } else {
            self.resolved_skipped.push(resolution);
        }
        self.cursor.mark_resolved();
        let advanced = self.cursor.advance();
        info!(
            row,
            remaining = self.cursor.remaining(),
            "Resolution recorded"
        );
        Ok(CommitOutcome {
            recorded: true,
            advanced,
        })
    }

    /// Merge all buckets. Fails if classification never happened or any
    /// accounting invariant is violated.
    pub fn reconcile(&self) -> Option<Result<Vec<Record>, ReconciliationViolation>> {
        let classification = self.classification.as_ref()?;
        Some(reconcile::reconcile(
            classification,
            &self.resolved_fixed,
            &self.resolved_skipped,
        ))
    }

    pub fn summary(&self) -> Option<CleaningSummary> {
        self.classification.as_ref().map(|c| {
            CleaningSummary::new(c, &self.resolved_fixed, &self.resolved_skipped)
        })
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        self.classification.as_ref()
    }

    pub fn cursor(&self) -> &EscalationCursor {
        &self.cursor
    }

    pub fn resolved_fixed(&self) -> &[Resolution] {
        &self.resolved_fixed
    }

    pub fn resolved_skipped(&self) -> &[Resolution] {
        &self.resolved_skipped
    }

    /// Escalations answered so far.
    pub fn answered(&self) -> usize {
        self.answered.len()
    }
}
