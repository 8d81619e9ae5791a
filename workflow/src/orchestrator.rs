//! Workflow orchestrator.
//!
//! Drives one cleaning run through the state machine:
//!
//! ```text
//! Orchestrator::run(records)
//!   → Classifying   classify::invoke, install result in the context
//!   → loop:
//!       Routing     context.route()  (pure)
//!       Resolving   resolve::invoke on cursor.peek(), then commit_resolution
//!   → Reconciling   context.reconcile()
//!   → Done | Aborted
//! ```
//!
//! The loop runs on a single task. Collaborator calls race against the
//! cancellation token; cancellation is also checked at the top of each step.
//! Any failure moves the machine to `Aborted` and yields no output.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::classify::{self, Classifier};
use crate::context::{QueueViolation, WorkflowContext};
use crate::error::WorkflowError;
use crate::model::Record;
use crate::reconcile::CleaningSummary;
use crate::resolve::{self, Resolver};
use crate::state_machine::{IllegalTransition, StateMachine, WorkflowState};

/// Everything a finished run leaves behind.
///
/// The context and machine are returned on both success and failure so the
/// caller can report counts and the transition log either way.
#[derive(Debug)]
pub struct RunOutcome {
    pub output: Result<Vec<Record>, WorkflowError>,
    pub context: WorkflowContext,
    pub machine: StateMachine,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.output.is_ok()
    }

    /// Bucket counts, if classification got far enough to produce any.
    pub fn summary(&self) -> Option<CleaningSummary> {
        self.context.summary()
    }
}

pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    resolver: Arc<dyn Resolver>,
    machine: StateMachine,
    context: WorkflowContext,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(classifier: Arc<dyn Classifier>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            classifier,
            resolver,
            machine: StateMachine::new(),
            context: WorkflowContext::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token (e.g. one wired to Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the workflow over `records` to a terminal state.
    pub async fn run(mut self, records: &[Record]) -> RunOutcome {
        info!(
            rows = records.len(),
            classifier = self.classifier.name(),
            resolver = self.resolver.name(),
            "Cleaning run starting"
        );

        let output = match self.drive(records).await {
            Ok(rows) => {
                info!(rows = rows.len(), summary = %self.machine.summary(), "Cleaning run complete");
                Ok(rows)
            }
            Err(e) => {
                let reason = e.to_string();
                if let Err(illegal) = self.machine.abort(&reason) {
                    warn!(error = %illegal, "Run failed after reaching a terminal state");
                }
                if matches!(e, WorkflowError::Cancelled) {
                    warn!(state = %self.machine.current(), "Cleaning run cancelled");
                } else {
                    error!(kind = %e.kind(), error = %e, "Cleaning run aborted");
                }
                Err(e)
            }
        };

        RunOutcome {
            output,
            context: self.context,
            machine: self.machine,
        }
    }

    async fn drive(&mut self, records: &[Record]) -> Result<Vec<Record>, WorkflowError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            match self.machine.current() {
                WorkflowState::Classifying => {
                    let classifier = Arc::clone(&self.classifier);
                    let result = until_cancelled(
                        &self.cancel,
                        classify::invoke(classifier.as_ref(), records)
                            .instrument(info_span!("classify", rows = records.len())),
                    )
                    .await?;
                    let queued = result.escalations().len();
                    self.context.install_classification(result);
                    self.machine.advance(
                        WorkflowState::Routing,
                        Some(&format!("{queued} escalations queued")),
                    )?;
                }
                WorkflowState::Routing => {
                    let next = self.context.route();
                    let reason = match next {
                        WorkflowState::Resolving => "escalation pending",
                        _ => "queue exhausted",
                    };
                    self.machine.advance(next, Some(reason))?;
                }
                WorkflowState::Resolving => {
                    let Some(escalation) = self.context.cursor().peek().cloned() else {
                        return Err(QueueViolation::Exhausted.into());
                    };
                    let resolver = Arc::clone(&self.resolver);
                    let resolution = until_cancelled(
                        &self.cancel,
                        resolve::invoke(resolver.as_ref(), &escalation)
                            .instrument(info_span!("resolve", row = escalation.row_number)),
                    )
                    .await?;
                    let commit = self.context.commit_resolution(resolution)?;
                    if !commit.recorded {
                        // Sending the same row to the resolver again would loop forever.
                        return Err(QueueViolation::AlreadyAnswered(escalation.row_number).into());
                    }
                    self.machine.set_step(self.context.answered() as u32);
                    self.machine.advance(WorkflowState::Routing, None)?;
                }
                WorkflowState::Reconciling => {
                    let rows = match self.context.reconcile() {
                        Some(result) => result?,
                        None => {
                            return Err(WorkflowError::ClassificationIncomplete(
                                "reconciling before classification".into(),
                            ))
                        }
                    };
                    self.machine.advance(WorkflowState::Done, None)?;
                    return Ok(rows);
                }
                terminal @ (WorkflowState::Done | WorkflowState::Aborted) => {
                    return Err(IllegalTransition {
                        from: terminal,
                        to: WorkflowState::Routing,
                    }
                    .into());
                }
            }
        }
    }
}

/// Await `fut`, giving up as soon as `cancel` fires.
async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
        result = fut => result,
    }
}
