//! Contact-table cleaning workflow.
//!
//! The deterministic core of the cleaner:
//!
//! - `classify`: one call to the classifier collaborator, strictly validated
//!   into valid / auto-fixed / escalated buckets
//! - `cursor`: the escalation queue with a single-fire advance
//! - `resolve`: one call per escalation to the resolver collaborator
//! - `reconcile`: the all-or-nothing merge with row accounting
//! - `orchestrator`: drives the run through the `state_machine`
//!
//! Collaborators (LLM agents, console prompts, file I/O) live outside this
//! crate and plug in through the [`Classifier`] and [`Resolver`] traits.
//!
//! ```text
//! Classifying → Routing ⇄ Resolving
//!                  └──→ Reconciling → Done
//! (any live state) ──→ Aborted
//! ```

pub mod classify;
pub mod context;
pub mod cursor;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod resolve;
pub mod state_machine;

pub use classify::{Classifier, ClassifierRequest, ClassifierResponse};
pub use context::{CommitOutcome, QueueViolation, WorkflowContext};
pub use cursor::{CompletedStage, EscalationCursor};
pub use error::{ErrorKind, WorkflowError};
pub use model::{
    AutoFixed, ClassificationResult, Column, Escalation, FieldFix, Issue, Record, Resolution,
    ResolutionOutcome, COLUMNS,
};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use reconcile::{CleaningSummary, ReconciliationViolation};
pub use resolve::{Resolver, ResolverResponse};
pub use state_machine::{IllegalTransition, StateMachine, TransitionRecord, WorkflowState};
