//! One cleaning run over a file: load, run the workflow, write the output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use workflow::{Classifier, ErrorKind, Orchestrator, Resolver, RunOutcome, WorkflowError};

use crate::handoff::{confirm, Handoff, HandoffError};
use crate::report::RunReport;
use crate::table;

/// Result of [`clean_file`].
pub struct CleanRun {
    pub outcome: RunOutcome,
    /// The file written, when the run reconciled.
    pub output_path: Option<PathBuf>,
    pub report: RunReport,
}

impl CleanRun {
    /// Process exit code: 0 on success, the workflow error's code otherwise.
    pub fn exit_code(&self) -> u8 {
        match &self.outcome.output {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        }
    }

    /// Final message for the operator.
    pub fn render(&self) -> String {
        match (&self.outcome.output, &self.output_path) {
            (Ok(_), Some(path)) => {
                let mut text = format!("✓ Cleaning complete.\n\nCleaned file saved to: {}\n", path.display());
                if let Some(summary) = self.outcome.summary() {
                    text.push_str(&format!("\nSummary:\n{summary}\n"));
                }
                text
            }
            (Err(WorkflowError::Cancelled), _) => "Cancelled. No output was written.\n".to_string(),
            (Err(e), _) => {
                let mut text =
                    format!("Cleaning failed ({}): {e}\nNo output was written.\n", e.kind());
                text.push_str(&render_hints(Some(e.kind()), &e.to_string()));
                text
            }
            (Ok(_), None) => "Cleaning finished but no output path was recorded.\n".to_string(),
        }
    }
}

const KEY_HINTS: &[&str] = &[
    "Check that OPENAI_API_KEY is set correctly",
    "Make sure the key is valid and has not expired",
    "When using a compatible API, check OPENAI_BASE_URL",
];
const NETWORK_HINTS: &[&str] = &[
    "Check the network connection",
    "If you use a proxy, check its settings",
    "Check that the model endpoint is up",
];
const RATE_HINTS: &[&str] = &[
    "The API rate limit was hit; wait and try again",
    "A higher plan may raise the rate limit",
];
const MODEL_HINTS: &[&str] = &[
    "Check MODEL_NAME",
    "Make sure the API key has access to that model",
    "Try the default model (gpt-4)",
];
const TERMINAL_HINTS: &[&str] = &["Input was closed; run again from an interactive terminal"];
const CSV_HINTS: &[&str] = &[
    "Check the CSV columns: name,gender,title,email,mobile,wechat,remark",
    "Make sure the file is UTF-8 encoded",
];
const OUTPUT_HINTS: &[&str] = &[
    "The model returned a malformed answer; run again or lower TEMPERATURE",
    "A more capable MODEL_NAME usually follows the output format better",
    "Run with -v and --report to see what was rejected",
];
const INTERNAL_HINTS: &[&str] = &["This is a bug; keep the --report output and the -v log"];

/// Troubleshooting hints for a failure.
///
/// `kind` is `None` for errors raised outside the workflow (configuration,
/// file access); those are classified by message alone.
pub fn troubleshooting_hints(kind: Option<ErrorKind>, message: &str) -> &'static [&'static str] {
    let lower = message.to_lowercase();
    match kind {
        Some(ErrorKind::Cancelled) => &[],
        Some(ErrorKind::SchemaMismatch) => CSV_HINTS,
        Some(ErrorKind::ClassificationIncomplete | ErrorKind::ResolverOutputInvalid) => {
            OUTPUT_HINTS
        }
        Some(ErrorKind::ReconciliationInconsistency | ErrorKind::Internal) => INTERNAL_HINTS,
        Some(ErrorKind::GatewayFailure) | None => {
            if lower.contains("input closed") {
                TERMINAL_HINTS
            } else if lower.contains("api key") || lower.contains("api_key") || lower.contains("401") {
                KEY_HINTS
            } else if lower.contains("rate limit") || lower.contains("429") {
                RATE_HINTS
            } else if ["connection", "network", "timed out", "dns"]
                .iter()
                .any(|needle| lower.contains(needle))
            {
                NETWORK_HINTS
            } else if lower.contains("model") {
                MODEL_HINTS
            } else if kind.is_some() {
                NETWORK_HINTS
            } else {
                CSV_HINTS
            }
        }
    }
}

/// Hints as a printable block; empty when there are none.
pub fn render_hints(kind: Option<ErrorKind>, message: &str) -> String {
    let hints = troubleshooting_hints(kind, message);
    if hints.is_empty() {
        return String::new();
    }
    let mut text = String::from("\nTroubleshooting:\n");
    for hint in hints {
        text.push_str(&format!("- {hint}\n"));
    }
    text
}

/// Load `input`, run the workflow and write `<stem><suffix><.ext>` on success.
///
/// A malformed input table is returned as an error (downcastable to
/// [`WorkflowError::SchemaMismatch`]) before any collaborator is called.
/// Workflow failures are reported through `CleanRun::outcome`; nothing is
/// written in that case.
pub async fn clean_file(
    input: &Path,
    output_suffix: &str,
    classifier: Arc<dyn Classifier>,
    resolver: Arc<dyn Resolver>,
    cancel: CancellationToken,
) -> Result<CleanRun> {
    let started_at = Utc::now();
    let records = table::load_records(input)?;

    let outcome = Orchestrator::new(classifier, resolver)
        .with_cancellation(cancel)
        .run(&records)
        .instrument(info_span!("cleaning_run", input = %input.display(), rows = records.len()))
        .await;

    let output_path = match &outcome.output {
        Ok(rows) => {
            let path = table::output_path(input, output_suffix);
            table::write_records(&path, rows)?;
            Some(path)
        }
        Err(_) => None,
    };

    let report = RunReport::from_outcome(&outcome, input, output_path.as_deref(), started_at);
    Ok(CleanRun {
        outcome,
        output_path,
        report,
    })
}

/// Ask the operator for the input file.
///
/// Re-asks on empty input, confirms a name without a `.csv` extension and
/// offers another try when the file does not exist. Returns `None` if the
/// operator gives up.
pub async fn prompt_for_input(handoff: &dyn Handoff) -> Result<Option<PathBuf>> {
    handoff.show(
        "============================================================\n\
         Contact table cleaner\n\
         ============================================================\n\
         Fixes common format problems automatically and asks you about the rest.\n",
    );

    loop {
        let answer = match handoff.ask("CSV file (relative to the current directory): ").await {
            Ok(answer) => answer,
            Err(HandoffError::Closed) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let name = answer.trim();
        if name.is_empty() {
            handoff.show("The file name cannot be empty.\n");
            continue;
        }

        let path = PathBuf::from(name);
        if path.extension().map_or(true, |ext| !ext.eq_ignore_ascii_case("csv")) {
            handoff.show("Warning: the name does not end in .csv.");
            if !confirm(handoff, "Continue anyway? (y/n): ").await? {
                continue;
            }
        }

        if !path.exists() {
            handoff.show(&format!("File not found: {}", path.display()));
            if confirm(handoff, "Try another name? (y/n): ").await? {
                continue;
            }
            info!("Operator cancelled at the file prompt");
            return Ok(None);
        }

        return Ok(Some(path));
    }
}

/// Check a file named on the command line.
pub fn require_input(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("File not found: {}", path.display());
    }
    Ok(())
}
