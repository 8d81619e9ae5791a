//! JSON run report.
//!
//! One snapshot per run, written on success and on abort. It carries counts,
//! the state transition log and one line per resolution, never row data.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use workflow::{CleaningSummary, Resolution, RunOutcome, TransitionRecord, WorkflowState};

use crate::prompts::PROMPT_VERSION;

/// Bump when adding/removing/renaming fields.
pub const REPORT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionEntry {
    pub row_number: u32,
    pub fixed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl From<&Resolution> for ResolutionEntry {
    fn from(resolution: &Resolution) -> Self {
        Self {
            row_number: resolution.row_number,
            fixed: resolution.is_fixed(),
            rationale: resolution.rationale.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: String,
    pub message: String,
    pub exit_code: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u8,
    pub prompt_version: String,
    /// RFC 3339.
    pub started_at: String,
    pub finished_at: String,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub final_state: WorkflowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CleaningSummary>,
    pub resolutions: Vec<ResolutionEntry>,
    /// Cursor advances ignored because no new resolution was pending.
    pub suppressed_advances: u32,
    pub transitions: Vec<TransitionRecord>,
}

impl RunReport {
    /// Snapshot a finished run. `output` is the written file, if any.
    pub fn from_outcome(
        outcome: &RunOutcome,
        input: &Path,
        output: Option<&Path>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let context = &outcome.context;
        let failure = outcome.output.as_ref().err().map(|e| RunFailure {
            kind: e.kind().to_string(),
            message: e.to_string(),
            exit_code: e.exit_code(),
        });
        let resolutions = context
            .resolved_fixed()
            .iter()
            .chain(context.resolved_skipped())
            .map(ResolutionEntry::from)
            .collect();

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            prompt_version: PROMPT_VERSION.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            input: input.display().to_string(),
            output: output.map(|p| p.display().to_string()),
            final_state: outcome.machine.current(),
            failure,
            summary: outcome.summary(),
            resolutions,
            suppressed_advances: context.cursor().suppressed_advances(),
            transitions: outcome.machine.transitions().to_vec(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to encode run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote run report");
        Ok(())
    }
}
