//! Escalation cursor: the queue of rows awaiting resolution.
//!
//! `peek()` is idempotent. `advance()` is gated by the completed-stage
//! marker: it fires only after `mark_resolved()` and consumes the marker,
//! so evaluating the routing logic again for the same event cannot move the
//! cursor twice.
//!
//! ```text
//! None ──new()──▶ Classified ──mark_resolved()──▶ Resolved
//!                     ▲                               │
//!                     └──────────advance()────────────┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::Escalation;

/// Last stage that completed for the item under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedStage {
    /// Nothing classified yet.
    None,
    /// Classification done; the current item is waiting for its resolution.
    Classified,
    /// A resolution for the current item was recorded and not yet consumed.
    Resolved,
}

/// Ordered escalation queue plus a single-fire cursor.
#[derive(Debug, Clone)]
pub struct EscalationCursor {
    escalations: Vec<Escalation>,
    position: usize,
    stage: CompletedStage,
    /// `advance()` calls that were ignored because no resolution was pending.
    suppressed_advances: u32,
}

impl EscalationCursor {
    /// A cursor over the escalations established by classification.
    pub fn new(escalations: Vec<Escalation>) -> Self {
        Self {
            escalations,
            position: 0,
            stage: CompletedStage::Classified,
            suppressed_advances: 0,
        }
    }

    /// A cursor for a run that has not been classified yet.
    pub fn empty() -> Self {
        Self {
            escalations: Vec::new(),
            position: 0,
            stage: CompletedStage::None,
            suppressed_advances: 0,
        }
    }

    /// The escalation under the cursor, or `None` once the queue is exhausted.
    pub fn peek(&self) -> Option<&Escalation> {
        self.escalations.get(self.position)
    }

    /// Record that the current item has been resolved.
    ///
    /// Returns `false` (and changes nothing) if the queue is already exhausted
    /// or the run was never classified.
    pub fn mark_resolved(&mut self) -> bool {
        if self.stage == CompletedStage::None || self.peek().is_none() {
            warn!(
                position = self.position,
                len = self.escalations.len(),
                "Resolution marked with no current escalation; ignored"
            );
            return false;
        }
        self.stage = CompletedStage::Resolved;
        true
    }

    /// Move past the current item, consuming the `Resolved` marker.
    ///
    /// A call without a pending resolution is a no-op; it is logged and
    /// counted, and returns `false`.
    pub fn advance(&mut self) -> bool {
        if self.stage != CompletedStage::Resolved {
            self.suppressed_advances += 1;
            warn!(
                kind = "queue_double_advance",
                position = self.position,
                stage = ?self.stage,
                "advance() without a new resolution; ignored"
            );
            return false;
        }

        self.position += 1;
        self.stage = CompletedStage::Classified;
        debug!(
            position = self.position,
            remaining = self.remaining(),
            "Escalation cursor advanced"
        );
        true
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.escalations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escalations.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.escalations.len().saturating_sub(self.position)
    }

    pub fn stage(&self) -> CompletedStage {
        self.stage
    }

    pub fn suppressed_advances(&self) -> u32 {
        self.suppressed_advances
    }

    pub fn escalations(&self) -> &[Escalation] {
        &self.escalations
    }
}

impl Default for EscalationCursor {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Issue, Record};

    fn escalation(n: u32) -> Escalation {
        Escalation {
            row_number: n,
            issues: vec![Issue {
                column: "email".into(),
                issue_type: "invalid_format".into(),
                current_value: "bad@".into(),
                description: "incomplete domain".into(),
                suggestions: vec!["bad@example.com".into()],
            }],
            record: Record::from_cells(n, Default::default()),
        }
    }

    #[test]
    fn test_peek_is_idempotent() {
        let cursor = EscalationCursor::new(vec![escalation(4), escalation(7)]);
        let first = cursor.peek().cloned();
        let second = cursor.peek().cloned();
        assert_eq!(first, second);
        assert_eq!(first.map(|e| e.row_number), Some(4));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_advance_requires_resolution() {
        let mut cursor = EscalationCursor::new(vec![escalation(4), escalation(7)]);
        assert!(!cursor.advance());
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.suppressed_advances(), 1);

        assert!(cursor.mark_resolved());
        assert!(cursor.advance());
        assert_eq!(cursor.peek().map(|e| e.row_number), Some(7));
    }

    #[test]
    fn test_repeated_advance_fires_once_per_resolution() {
        let mut cursor = EscalationCursor::new(vec![escalation(1), escalation(2), escalation(3)]);
        cursor.mark_resolved();
        for _ in 0..5 {
            cursor.advance();
        }
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.suppressed_advances(), 4);
        assert_eq!(cursor.stage(), CompletedStage::Classified);
    }

    #[test]
    fn test_exhausted_queue() {
        let mut cursor = EscalationCursor::new(vec![escalation(9)]);
        cursor.mark_resolved();
        cursor.advance();
        assert!(cursor.peek().is_none());
        assert_eq!(cursor.remaining(), 0);
        assert!(!cursor.mark_resolved());
        assert!(!cursor.advance());
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_empty_cursor_never_moves() {
        let mut cursor = EscalationCursor::empty();
        assert_eq!(cursor.stage(), CompletedStage::None);
        assert!(cursor.peek().is_none());
        assert!(!cursor.mark_resolved());
        assert!(!cursor.advance());
        assert_eq!(cursor.position(), 0);
    }
}
