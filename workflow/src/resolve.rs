//! Resolver gateway: hand one escalation to the resolution collaborator and
//! turn its reply into a `Resolution`.
//!
//! The collaborator may block for as long as it likes (a human is usually on
//! the other end). There is no timeout here; the orchestrator's cancellation
//! token is the only way to stop waiting.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::WorkflowError;
use crate::model::{Escalation, Record, Resolution};

/// Reply shape expected from a resolver.
///
/// Exactly one of `user_fixed` / `user_skipped` must be present, and
/// `success` must be `true` precisely when `user_fixed` is the one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResolverResponse {
    pub success: bool,
    /// Full replacement row (all seven fields) when the issue was fixed.
    #[serde(default)]
    pub user_fixed: Option<Record>,
    /// The original row when the resolver chose to leave it as is.
    #[serde(default)]
    pub user_skipped: Option<Record>,
    /// How the row was fixed, or why it was skipped.
    #[serde(default)]
    pub reason: Option<String>,
}

impl ResolverResponse {
    pub fn fixed(record: Record, reason: impl Into<String>) -> Self {
        Self {
            success: true,
            user_fixed: Some(record),
            user_skipped: None,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(record: Record, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            user_fixed: None,
            user_skipped: Some(record),
            reason: Some(reason.into()),
        }
    }
}

/// The external resolution collaborator.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Answer one escalation. Returns the raw response document.
    async fn resolve(&self, escalation: &Escalation) -> anyhow::Result<serde_json::Value>;
}

/// Run the resolver on `escalation` and validate the reply.
pub async fn invoke(
    resolver: &dyn Resolver,
    escalation: &Escalation,
) -> Result<Resolution, WorkflowError> {
    info!(
        resolver = resolver.name(),
        row = escalation.row_number,
        issues = escalation.issues.len(),
        "Resolving escalation"
    );

    let raw = resolver
        .resolve(escalation)
        .await
        .map_err(|e| WorkflowError::ResolverUnavailable {
            row_number: escalation.row_number,
            message: format!("{e:#}"),
        })?;

    let resolution = validate_resolution(escalation, raw)?;
    info!(
        row = resolution.row_number,
        fixed = resolution.is_fixed(),
        "Escalation resolved"
    );
    Ok(resolution)
}

/// Check a raw resolver reply against the escalation it answers.
pub fn validate_resolution(
    escalation: &Escalation,
    raw: serde_json::Value,
) -> Result<Resolution, WorkflowError> {
    let row = escalation.row_number;
    let response: ResolverResponse = serde_json::from_value(raw)
        .map_err(|e| WorkflowError::resolver_invalid(row, format!("schema validation: {e}")))?;

    let rationale = response.reason.filter(|r| !r.trim().is_empty());

    match (response.success, response.user_fixed, response.user_skipped) {
        (true, Some(fixed), None) => {
            check_row(row, &fixed, "user_fixed")?;
            Ok(Resolution::fixed(fixed, rationale))
        }
        (false, None, Some(skipped)) => {
            check_row(row, &skipped, "user_skipped")?;
            if skipped != escalation.record {
                warn!(
                    row,
                    changed = ?escalation.record.changed_columns(&skipped),
                    "Skipped row differs from its escalated form; keeping the original"
                );
            }
            Ok(Resolution::skipped(escalation.record.clone(), rationale))
        }
        (_, Some(_), Some(_)) => Err(WorkflowError::resolver_invalid(
            row,
            "both user_fixed and user_skipped are present",
        )),
        (_, None, None) => Err(WorkflowError::resolver_invalid(
            row,
            "neither user_fixed nor user_skipped is present",
        )),
        (success, _, _) => Err(WorkflowError::resolver_invalid(
            row,
            format!("success={success} contradicts the populated record"),
        )),
    }
}

fn check_row(expected: u32, record: &Record, field: &str) -> Result<(), WorkflowError> {
    if record.row_number == expected {
        Ok(())
    } else {
        Err(WorkflowError::resolver_invalid(
            expected,
            format!(
                "{field} is numbered {} but answers row {expected}",
                record.row_number
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{Column, Issue, ResolutionOutcome};

    fn escalation() -> Escalation {
        let record = Record::from_cells(
            5,
            [
                "李四".into(),
                "男".into(),
                "工程师".into(),
                "lisi@".into(),
                "".into(),
                "".into(),
                "".into(),
            ],
        );
        Escalation {
            row_number: 5,
            issues: vec![Issue {
                column: "email".into(),
                issue_type: "invalid_format".into(),
                current_value: "lisi@".into(),
                description: "domain missing".into(),
                suggestions: vec!["lisi@example.com".into()],
            }],
            record,
        }
    }

    fn reason_of(result: Result<Resolution, WorkflowError>) -> String {
        match result {
            Err(WorkflowError::ResolverOutputInvalid { row_number, reason }) => {
                assert_eq!(row_number, 5);
                reason
            }
            other => panic!("expected ResolverOutputInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_reply() {
        let esc = escalation();
        let fixed = esc.record.with(Column::Email, "lisi@example.com");
        let raw = serde_json::to_value(ResolverResponse::fixed(fixed.clone(), "补全域名")).unwrap();
        let resolution = validate_resolution(&esc, raw).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Fixed(fixed));
        assert_eq!(resolution.rationale.as_deref(), Some("补全域名"));
    }

    #[test]
    fn test_skipped_reply_keeps_original() {
        let esc = escalation();
        let echoed = esc.record.with(Column::Remark, "touched");
        let raw = serde_json::to_value(ResolverResponse::skipped(echoed, "稍后处理")).unwrap();
        let resolution = validate_resolution(&esc, raw).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Skipped(esc.record.clone()));
    }

    #[test]
    fn test_partial_patch_rejected() {
        let esc = escalation();
        let raw = json!({
            "success": true,
            "user_fixed": {"_row_number": 5, "email": "lisi@example.com"}
        });
        let reason = reason_of(validate_resolution(&esc, raw));
        assert!(reason.contains("schema"), "{reason}");
    }

    #[test]
    fn test_both_records_rejected() {
        let esc = escalation();
        let raw = json!({
            "success": true,
            "user_fixed": esc.record,
            "user_skipped": esc.record,
        });
        let reason = reason_of(validate_resolution(&esc, raw));
        assert!(reason.contains("both"), "{reason}");
    }

    #[test]
    fn test_neither_record_rejected() {
        let reason = reason_of(validate_resolution(&escalation(), json!({"success": false})));
        assert!(reason.contains("neither"), "{reason}");
    }

    #[test]
    fn test_contradictory_success_flag_rejected() {
        let esc = escalation();
        let raw = json!({"success": false, "user_fixed": esc.record});
        let reason = reason_of(validate_resolution(&esc, raw));
        assert!(reason.contains("success=false"), "{reason}");
    }

    #[test]
    fn test_wrong_row_rejected() {
        let esc = escalation();
        let mut other = esc.record.clone();
        other.row_number = 6;
        let raw = serde_json::to_value(ResolverResponse::fixed(other, "")).unwrap();
        let reason = reason_of(validate_resolution(&esc, raw));
        assert!(reason.contains("numbered 6"), "{reason}");
    }

    #[test]
    fn test_blank_reason_dropped() {
        let esc = escalation();
        let raw = serde_json::to_value(ResolverResponse::skipped(esc.record.clone(), "  ")).unwrap();
        assert_eq!(validate_resolution(&esc, raw).unwrap().rationale, None);
    }
}
