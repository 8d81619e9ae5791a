//! Resolvers: the console walk-through and the LLM-assisted resolver.
//!
//! Both show the escalation to the operator through a [`Handoff`] and return
//! a raw resolver response for the workflow gateway to validate.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::providers::openai;
use tracing::{debug, info, warn};
use workflow::{Column, Escalation, Issue, Resolver, ResolverResponse};

use super::{parse_json_reply, Completion, OaiAgent};
use crate::config::CleanerConfig;
use crate::handoff::{confirm, Handoff};
use crate::prompts;

const RULE: &str = "------------------------------------------------------------";

/// Operator-facing description of one escalation.
pub fn render_escalation(escalation: &Escalation) -> String {
    let record = &escalation.record;
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Row {} needs your attention:", escalation.row_number);
    for column in Column::ALL {
        let _ = writeln!(out, "  {:<7} {}", column.as_str(), record.get(column));
    }
    let _ = writeln!(out);
    for (i, issue) in escalation.issues.iter().enumerate() {
        let _ = writeln!(
            out,
            "Issue {}: [{}] {} = \"{}\"",
            i + 1,
            issue.issue_type,
            issue.column,
            issue.current_value
        );
        if !issue.description.is_empty() {
            let _ = writeln!(out, "  {}", issue.description);
        }
        for (j, suggestion) in issue.suggestions.iter().enumerate() {
            let _ = writeln!(out, "  Suggestion {}: {}", j + 1, suggestion);
        }
    }
    let _ = write!(out, "{RULE}");
    out
}

// ── Console resolver ────────────────────────────────────────────────────────

/// What the operator answered for one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IssueAnswer {
    Keep,
    SkipRow,
    Set(String),
}

fn parse_issue_answer(answer: &str, issue: &Issue) -> IssueAnswer {
    let answer = answer.trim();
    match answer.to_lowercase().as_str() {
        "" => IssueAnswer::Keep,
        "s" | "skip" | "跳过" => IssueAnswer::SkipRow,
        _ => match answer.parse::<usize>() {
            Ok(n) if n >= 1 && n <= issue.suggestions.len() => {
                IssueAnswer::Set(issue.suggestions[n - 1].clone())
            }
            _ => IssueAnswer::Set(answer.to_string()),
        },
    }
}

/// Interactive resolver that walks the operator through each issue.
///
/// For every issue the operator can pick a numbered suggestion, type a new
/// value, press Enter to keep the current value, or skip the whole row.
/// Changed rows are confirmed before they are returned as fixed.
pub struct ConsoleResolver {
    handoff: Arc<dyn Handoff>,
}

impl ConsoleResolver {
    pub fn new(handoff: Arc<dyn Handoff>) -> Self {
        Self { handoff }
    }

    fn skipped(escalation: &Escalation, reason: &str) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(ResolverResponse::skipped(
            escalation.record.clone(),
            reason,
        ))?)
    }
}

#[async_trait]
impl Resolver for ConsoleResolver {
    fn name(&self) -> &str {
        "console"
    }

    async fn resolve(&self, escalation: &Escalation) -> Result<serde_json::Value> {
        self.handoff.show(&render_escalation(escalation));

        let mut record = escalation.record.clone();
        let mut changes = Vec::new();
        for (i, issue) in escalation.issues.iter().enumerate() {
            let Some(column) = Column::from_name(&issue.column) else {
                warn!(
                    row = escalation.row_number,
                    column = %issue.column,
                    "Issue names an unknown column; it cannot be edited"
                );
                continue;
            };
            let prompt = format!(
                "Issue {} ({}): suggestion number or new value, Enter to keep, s to skip the row: ",
                i + 1,
                column
            );
            let answer = self.handoff.ask(&prompt).await?;
            match parse_issue_answer(&answer, issue) {
                IssueAnswer::Keep => debug!(row = escalation.row_number, %column, "Kept value"),
                IssueAnswer::SkipRow => {
                    info!(row = escalation.row_number, "Operator skipped row");
                    return Self::skipped(escalation, "skipped by operator");
                }
                IssueAnswer::Set(value) => {
                    let old = record.get(column).to_string();
                    if old != value {
                        record = record.with(column, value.clone());
                        changes.push(format!("{column}: \"{old}\" → \"{value}\""));
                    }
                }
            }
        }

        if changes.is_empty() {
            return Self::skipped(escalation, "no changes entered; original data kept");
        }

        let summary = changes.join("; ");
        self.handoff.show(&format!("Pending changes: {summary}"));
        if confirm(self.handoff.as_ref(), "Apply these changes? (y/n): ").await? {
            Ok(serde_json::to_value(ResolverResponse::fixed(record, summary))?)
        } else {
            Self::skipped(escalation, "changes declined by operator")
        }
    }
}

// ── Agent resolver ──────────────────────────────────────────────────────────

/// Build the resolver agent.
pub fn build_resolver(client: &openai::CompletionsClient, config: &CleanerConfig) -> OaiAgent {
    client
        .agent(&config.model)
        .name("escalation_handler")
        .description("Applies a human instruction to one escalated contact row")
        .preamble(&prompts::resolver_preamble())
        .temperature(config.temperature)
        .max_tokens(config.max_tokens)
        .build()
}

/// Resolver that asks the operator for a free-text instruction and lets the
/// model turn it into a full resolver response.
pub struct AgentResolver {
    handoff: Arc<dyn Handoff>,
    model: Box<dyn Completion>,
}

impl AgentResolver {
    pub fn new(handoff: Arc<dyn Handoff>, model: impl Completion + 'static) -> Self {
        Self {
            handoff,
            model: Box::new(model),
        }
    }
}

#[async_trait]
impl Resolver for AgentResolver {
    fn name(&self) -> &str {
        "llm-escalation-handler"
    }

    async fn resolve(&self, escalation: &Escalation) -> Result<serde_json::Value> {
        self.handoff.show(&render_escalation(escalation));
        let instruction = self
            .handoff
            .ask("Describe how to fix this row (or type \"skip\"): ")
            .await?;

        let task = prompts::resolver_task(escalation, &instruction);
        let reply = self
            .model
            .complete(&task)
            .await
            .with_context(|| format!("resolver request failed for row {}", escalation.row_number))?;
        let value = parse_json_reply(&reply)?;

        if let Some(reason) = value.get("reason").and_then(|r| r.as_str()) {
            self.handoff.show(&format!("Result: {reason}"));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use workflow::resolve::validate_resolution;
    use workflow::{Record, ResolutionOutcome};

    use super::*;
    use crate::agents::testing::ScriptedModel;
    use crate::handoff::ScriptedHandoff;

    fn escalation() -> Escalation {
        Escalation {
            row_number: 3,
            issues: vec![
                Issue {
                    column: "email".into(),
                    issue_type: "invalid_format".into(),
                    current_value: "wang@".into(),
                    description: "缺少域名".into(),
                    suggestions: vec!["wang@example.com".into(), "wang@corp.cn".into()],
                },
                Issue {
                    column: "mobile".into(),
                    issue_type: "invalid_length".into(),
                    current_value: "138000".into(),
                    description: "位数不足".into(),
                    suggestions: Vec::new(),
                },
            ],
            record: Record::from_cells(
                3,
                [
                    "王五".into(),
                    "男".into(),
                    "".into(),
                    "wang@".into(),
                    "138000".into(),
                    "".into(),
                    "".into(),
                ],
            ),
        }
    }

    fn issue_with(suggestions: &[&str]) -> Issue {
        Issue {
            column: "email".into(),
            issue_type: "x".into(),
            current_value: "".into(),
            description: "".into(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parse_issue_answer() {
        let issue = issue_with(&["a@b.com"]);
        assert_eq!(parse_issue_answer("  ", &issue), IssueAnswer::Keep);
        assert_eq!(parse_issue_answer("S", &issue), IssueAnswer::SkipRow);
        assert_eq!(parse_issue_answer("跳过", &issue), IssueAnswer::SkipRow);
        assert_eq!(
            parse_issue_answer("1", &issue),
            IssueAnswer::Set("a@b.com".into())
        );
        // Out-of-range numbers are taken literally.
        assert_eq!(parse_issue_answer("2", &issue), IssueAnswer::Set("2".into()));
        assert_eq!(
            parse_issue_answer(" new@x.cn ", &issue),
            IssueAnswer::Set("new@x.cn".into())
        );
    }

    #[test]
    fn test_render_lists_issues_and_suggestions() {
        let text = render_escalation(&escalation());
        assert!(text.contains("Row 3 needs"));
        assert!(text.contains("Issue 1: [invalid_format] email = \"wang@\""));
        assert!(text.contains("Suggestion 2: wang@corp.cn"));
        assert!(text.contains("Issue 2: [invalid_length] mobile"));
    }

    #[tokio::test]
    async fn test_console_fix_with_suggestion_and_typed_value() {
        let handoff = Arc::new(ScriptedHandoff::new(["1", "13800001111", "y"]));
        let resolver = ConsoleResolver::new(handoff.clone());
        let esc = escalation();

        let raw = resolver.resolve(&esc).await.unwrap();
        let resolution = validate_resolution(&esc, raw).unwrap();
        match resolution.outcome {
            ResolutionOutcome::Fixed(record) => {
                assert_eq!(record.email, "wang@example.com");
                assert_eq!(record.mobile, "13800001111");
                assert_eq!(record.name, "王五");
            }
            other => panic!("expected fixed, got {other:?}"),
        }
        assert_eq!(handoff.remaining(), 0);
    }

    #[tokio::test]
    async fn test_console_skip_stops_asking() {
        let handoff = Arc::new(ScriptedHandoff::new(["s", "unused"]));
        let resolver = ConsoleResolver::new(handoff.clone());
        let esc = escalation();

        let raw = resolver.resolve(&esc).await.unwrap();
        assert_eq!(raw["success"], json!(false));
        let resolution = validate_resolution(&esc, raw).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Skipped(esc.record));
        assert_eq!(handoff.remaining(), 1);
    }

    #[tokio::test]
    async fn test_console_no_changes_is_skip() {
        let handoff = Arc::new(ScriptedHandoff::new(["", ""]));
        let resolver = ConsoleResolver::new(handoff);
        let raw = resolver.resolve(&escalation()).await.unwrap();
        assert_eq!(raw["success"], json!(false));
    }

    #[tokio::test]
    async fn test_console_declined_confirmation_is_skip() {
        let handoff = Arc::new(ScriptedHandoff::new(["2", "", "n"]));
        let resolver = ConsoleResolver::new(handoff);
        let raw = resolver.resolve(&escalation()).await.unwrap();
        assert_eq!(raw["success"], json!(false));
        assert_eq!(raw["user_skipped"]["email"], json!("wang@"));
    }

    #[tokio::test]
    async fn test_console_closed_input_is_error() {
        let handoff = Arc::new(ScriptedHandoff::new(Vec::<String>::new()));
        let resolver = ConsoleResolver::new(handoff);
        assert!(resolver.resolve(&escalation()).await.is_err());
    }

    #[tokio::test]
    async fn test_agent_resolver_forwards_instruction() {
        let esc = escalation();
        let fixed = esc
            .record
            .with(Column::Email, "wang@example.com")
            .with(Column::Mobile, "13800001111");
        let reply = format!(
            "```json\n{}\n```",
            serde_json::to_string(&ResolverResponse::fixed(fixed.clone(), "按用户指示修改")).unwrap()
        );
        let model = Arc::new(ScriptedModel::replying(&[&reply]));
        let handoff = Arc::new(ScriptedHandoff::new(["邮箱用建议1，手机号 13800001111"]));
        let resolver = AgentResolver::new(handoff.clone(), model.clone());

        let raw = resolver.resolve(&esc).await.unwrap();
        let resolution = validate_resolution(&esc, raw).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Fixed(fixed));

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("邮箱用建议1"));
        assert!(handoff
            .transcript()
            .iter()
            .any(|line| line.contains("按用户指示修改")));
    }

    #[tokio::test]
    async fn test_agent_resolver_model_failure() {
        let handoff = Arc::new(ScriptedHandoff::new(["跳过"]));
        let resolver = AgentResolver::new(handoff, ScriptedModel::failing("timeout"));
        let err = resolver.resolve(&escalation()).await.unwrap_err();
        assert!(format!("{err:#}").contains("row 3"));
    }
}
