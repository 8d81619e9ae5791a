//! Workflow state machine: explicit states and legal transition guards.
//!
//! Gives the cleaning run a typed state model so that:
//! 1. Every state transition is checked against the transition table and logged.
//! 2. The Routing ⇄ Resolving loop cannot skip ahead to reconciliation
//!    from anywhere but `Routing`.
//! 3. The transition log can be written out after the run for audit.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The set of workflow states.
///
/// Every run starts at `Classifying` and terminates at either `Done` or
/// `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Running the classifier over the full input.
    Classifying,
    /// Deciding whether another escalation is waiting.
    Routing,
    /// Waiting on the resolver for the current escalation.
    Resolving,
    /// Merging buckets and checking row accounting.
    Reconciling,
    /// Output produced. Terminal.
    Done,
    /// Fatal error or cancellation. Terminal.
    Aborted,
}

impl WorkflowState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifying => write!(f, "Classifying"),
            Self::Routing => write!(f, "Routing"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Reconciling => write!(f, "Reconciling"),
            Self::Done => write!(f, "Done"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Legal transitions between workflow states.
///
/// ```text
/// Classifying → Routing
/// Routing     → Resolving | Reconciling
/// Resolving   → Routing
/// Reconciling → Done
/// any non-terminal → Aborted
/// ```
fn is_legal_transition(from: WorkflowState, to: WorkflowState) -> bool {
    use WorkflowState::*;

    if to == Aborted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Classifying, Routing)
            | (Routing, Resolving)
            | (Routing, Reconciling)
            | (Resolving, Routing)
            | (Reconciling, Done)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowState,
    pub to: WorkflowState,
    /// Escalations resolved so far when the transition happened.
    pub step: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A transition the table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("workflow cannot move from {from} to {to}")]
pub struct IllegalTransition {
    pub from: WorkflowState,
    pub to: WorkflowState,
}

/// The workflow state machine.
///
/// Tracks the current state, enforces legal transitions, and keeps a log of
/// every transition taken.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: WorkflowState,
    step: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `Classifying`.
    pub fn new() -> Self {
        Self {
            current: WorkflowState::Classifying,
            step: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> WorkflowState {
        self.current
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Set the resolved-escalation counter (called by the orchestrator).
    pub fn set_step(&mut self, step: u32) {
        self.step = step;
    }

    /// Attempt to move to `to`.
    ///
    /// Returns `Err(IllegalTransition)` if the edge is not in the table; the
    /// current state is left unchanged in that case.
    pub fn advance(
        &mut self,
        to: WorkflowState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            step: self.step,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            step = self.step,
            "State transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Transition to `Aborted` from any non-terminal state.
    pub fn abort(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(WorkflowState::Aborted, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, e.g. `Classifying → Done (12ms, 6 transitions) [...]`.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} → {} ({}ms, {} transitions)",
            WorkflowState::Classifying,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !self.transitions.is_empty() {
            let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
            summary.push_str(&format!(" [{}]", states.join(" → ")));
        }
        summary
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
