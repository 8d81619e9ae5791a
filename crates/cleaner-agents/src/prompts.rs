//! System prompts for the classifier and resolver agents.
//!
//! Record content rules (phone formats, gender values, ...) live here and
//! nowhere else; the workflow core only checks structure and accounting.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes.

use schemars::schema_for;
use workflow::{ClassifierResponse, Escalation, ResolverResponse};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

const ANALYZER_RULES: &str = "\
You are a data-cleaning analyst for a table of Chinese business contacts. \
Each row has the columns name, gender, title, email, mobile, wechat, remark \
and an integer `_row_number` that identifies it.

## Your job
Sort EVERY input row into exactly one of three buckets:

1. **valid_rows**: nothing to change. Copy the row unchanged.
2. **auto_fixed**: problems you can repair with certainty. List each change \
   in `fixes` (column, old_value, new_value, reason) and give the complete \
   corrected row in `fixed_row`.
3. **escalations**: problems that need a human decision. List each problem \
   in `issues` (column, issue_type, current_value, description, suggestions) \
   and copy the unchanged row into `current_row`.

## Safe automatic fixes
- Trim leading/trailing whitespace and full-width spaces in any cell.
- mobile: remove spaces, dashes and a leading +86 / 86 from an 11-digit \
  mainland number starting with 1.
- email: lowercase; replace a full-width ＠ or 。 with @ or .
- gender: normalise 男性/M/male to 男 and 女性/F/female to 女.

## Escalate instead of guessing
- mobile with the wrong number of digits, or not starting with 1.
- email without a domain, without @, or with an obviously misspelled domain.
- name that looks like a company, contains digits, or is empty.
- gender that cannot be derived from the data.
- Any cell holding another column's data (e.g. an email in wechat).

## Hard rules
- `total_rows` MUST equal the number of input rows.
- Every `_row_number` from the input appears in exactly one bucket.
- Never invent rows, never drop rows, never change `_row_number`.
- Every row object carries all seven columns plus `_row_number`; use \"\" for \
  empty cells.
- Respond with a single JSON object and nothing else.
";

const RESOLVER_RULES: &str = "\
You apply a human's decision to one escalated contact row.

You receive the escalated row (`current_row`), the issues found in it, and \
the human's instruction. Produce the final resolver response.

## Rules
- If the instruction supplies corrected values (or accepts a suggestion), set \
  `success` to true and put the COMPLETE row, all seven columns plus the \
  unchanged `_row_number`, in `user_fixed`. Columns the human did not mention \
  keep their current values.
- If the human says to skip, keep, ignore, or leave the row (跳过, 保留, 不改), \
  set `success` to false and copy `current_row` unchanged into `user_skipped`.
- Never fill both `user_fixed` and `user_skipped`.
- Put a short description of what was changed, or why it was skipped, in \
  `reason`.
- Respond with a single JSON object and nothing else.
";

fn schema_json<T: schemars::JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_for!(T)).unwrap_or_default()
}

/// Preamble for the classifier agent, with the response schema appended.
pub fn analyzer_preamble() -> String {
    format!(
        "{ANALYZER_RULES}\n## Response JSON schema\n```json\n{}\n```\n",
        schema_json::<ClassifierResponse>()
    )
}

/// Preamble for the resolver agent, with the response schema appended.
pub fn resolver_preamble() -> String {
    format!(
        "{RESOLVER_RULES}\n## Response JSON schema\n```json\n{}\n```\n",
        schema_json::<ResolverResponse>()
    )
}

/// User message for the resolver agent.
pub fn resolver_task(escalation: &Escalation, instruction: &str) -> String {
    let escalation_json = serde_json::to_string_pretty(escalation).unwrap_or_default();
    format!(
        "## Escalated row\n```json\n{escalation_json}\n```\n\n## Human instruction\n{}\n",
        instruction.trim()
    )
}
