//! Workflow error taxonomy.
//!
//! Every failure the core can report is a `WorkflowError`. Callers query
//! `kind()` / `exit_code()` instead of matching on message text.
//!
//! | Kind                        | Policy                                   |
//! |-----------------------------|------------------------------------------|
//! | SchemaMismatch              | fatal before the workflow starts         |
//! | ClassificationIncomplete    | fatal; never replaced by empty buckets   |
//! | GatewayFailure              | fatal; collaborators own their retries   |
//! | ResolverOutputInvalid       | fatal for the whole run                  |
//! | ReconciliationInconsistency | fatal; nothing is written                |
//! | Cancelled                   | terminal; nothing is written             |
//!
//! A double `advance()` on the escalation cursor is not an error: the cursor
//! logs it and ignores the call.

use std::fmt;

use thiserror::Error;

use crate::reconcile::ReconciliationViolation;
use crate::context::QueueViolation;
use crate::state_machine::IllegalTransition;

/// Coarse classification of a `WorkflowError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaMismatch,
    ClassificationIncomplete,
    GatewayFailure,
    ResolverOutputInvalid,
    ReconciliationInconsistency,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaMismatch => write!(f, "schema_mismatch"),
            Self::ClassificationIncomplete => write!(f, "classification_incomplete"),
            Self::GatewayFailure => write!(f, "gateway_failure"),
            Self::ResolverOutputInvalid => write!(f, "resolver_output_invalid"),
            Self::ReconciliationInconsistency => write!(f, "reconciliation_inconsistency"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Unified error type for the cleaning workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Input table header differs from the expected column set.
    #[error("Column mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Classifier response failed schema or row-coverage validation.
    #[error("Classification incomplete: {0}")]
    ClassificationIncomplete(String),

    /// The classifier collaborator could not produce a response at all.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Resolver response was malformed or ambiguous for this row.
    #[error("Resolver output invalid for row {row_number}: {reason}")]
    ResolverOutputInvalid { row_number: u32, reason: String },

    /// The resolver collaborator failed while handling this row.
    #[error("Resolver unavailable for row {row_number}: {message}")]
    ResolverUnavailable { row_number: u32, message: String },

    /// A row-accounting invariant failed during the final merge.
    #[error("Reconciliation failed: {0}")]
    Reconciliation(#[from] ReconciliationViolation),

    /// The state machine was asked to take an edge it does not have.
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// The run loop and the escalation queue disagree.
    #[error("Escalation queue out of step: {0}")]
    Queue(#[from] QueueViolation),

    /// The run was interrupted before it finished.
    #[error("Run cancelled")]
    Cancelled,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::ClassificationIncomplete(_) => ErrorKind::ClassificationIncomplete,
            Self::ClassifierUnavailable(_) | Self::ResolverUnavailable { .. } => {
                ErrorKind::GatewayFailure
            }
            Self::ResolverOutputInvalid { .. } => ErrorKind::ResolverOutputInvalid,
            Self::Reconciliation(_) => ErrorKind::ReconciliationInconsistency,
            Self::IllegalTransition(_) | Self::Queue(_) => ErrorKind::Internal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Process exit code for this failure. Never 0.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::SchemaMismatch => 3,
            ErrorKind::ClassificationIncomplete => 4,
            ErrorKind::GatewayFailure => 5,
            ErrorKind::ResolverOutputInvalid => 6,
            ErrorKind::ReconciliationInconsistency => 7,
            ErrorKind::Internal => 70,
            ErrorKind::Cancelled => 130,
        }
    }

    pub fn resolver_invalid(row_number: u32, reason: impl Into<String>) -> Self {
        Self::ResolverOutputInvalid {
            row_number,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_failures_share_a_kind() {
        let classifier = WorkflowError::ClassifierUnavailable("connection refused".into());
        let resolver = WorkflowError::ResolverUnavailable {
            row_number: 2,
            message: "stdin closed".into(),
        };
        assert_eq!(classifier.kind(), ErrorKind::GatewayFailure);
        assert_eq!(resolver.kind(), ErrorKind::GatewayFailure);
        assert_eq!(classifier.exit_code(), resolver.exit_code());
    }

    #[test]
    fn reconciliation_message_carries_counts() {
        let err = WorkflowError::from(ReconciliationViolation::UnansweredEscalations {
            expected: 3,
            answered: 2,
            fixed: 1,
            skipped: 1,
        });
        assert_eq!(err.kind(), ErrorKind::ReconciliationInconsistency);
        let msg = err.to_string();
        assert!(msg.contains("expected 3"), "{msg}");
        assert!(msg.contains("got 2"), "{msg}");
    }

    #[test]
    fn no_failure_maps_to_success_exit() {
        let errors = [
            WorkflowError::SchemaMismatch {
                expected: vec!["name".into()],
                actual: vec!["nome".into()],
            },
            WorkflowError::ClassificationIncomplete("row 3 missing".into()),
            WorkflowError::resolver_invalid(4, "both user_fixed and user_skipped present"),
            WorkflowError::Cancelled,
        ];
        for err in errors {
            assert_ne!(err.exit_code(), 0, "{err}");
        }
    }

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(
            ErrorKind::ClassificationIncomplete.to_string(),
            "classification_incomplete"
        );
    }
}
