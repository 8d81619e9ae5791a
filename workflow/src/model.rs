//! Record and bucket model shared by every stage of the cleaning workflow.
//!
//! ## Key types
//!
//! | Type                   | Produced by         | Consumed by                  |
//! |------------------------|---------------------|------------------------------|
//! | `Record`               | Table loader        | Classifier, Reconciler       |
//! | `AutoFixed`            | Classifier          | Reconciler                   |
//! | `Escalation`           | Classifier          | Escalation cursor, Resolver  |
//! | `Resolution`           | Resolver gateway    | Orchestrator accumulators    |
//! | `ClassificationResult` | Classifier gateway  | Orchestrator, Reconciler     |
//!
//! On the wire the identity key is spelled `_row_number` (the classifier and
//! resolver see it next to the seven data columns); `row_number` is accepted
//! as an alias when reading.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Column names in the order the input and output tables carry them.
pub const COLUMNS: [&str; 7] = [
    "name", "gender", "title", "email", "mobile", "wechat", "remark",
];

/// One of the seven data columns of a contact record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Name,
    Gender,
    Title,
    Email,
    Mobile,
    Wechat,
    Remark,
}

impl Column {
    /// All columns in table order.
    pub const ALL: [Column; 7] = [
        Self::Name,
        Self::Gender,
        Self::Title,
        Self::Email,
        Self::Mobile,
        Self::Wechat,
        Self::Remark,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Gender => "gender",
            Self::Title => "title",
            Self::Email => "email",
            Self::Mobile => "mobile",
            Self::Wechat => "wechat",
            Self::Remark => "remark",
        }
    }

    /// Look a column up by its header name (exact match).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Record ──────────────────────────────────────────────────────────────────

/// A single contact row.
///
/// `row_number` is the sole identity key. Every data field is required when
/// deserializing; an empty string is a legitimate value and is never treated
/// as missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Record {
    /// 1-based position of the row in the input table.
    #[serde(rename = "_row_number", alias = "row_number")]
    pub row_number: u32,
    pub name: String,
    pub gender: String,
    pub title: String,
    pub email: String,
    pub mobile: String,
    pub wechat: String,
    pub remark: String,
}

impl Record {
    /// Build a record from cells given in `COLUMNS` order.
    pub fn from_cells(row_number: u32, cells: [String; 7]) -> Self {
        let [name, gender, title, email, mobile, wechat, remark] = cells;
        Self {
            row_number,
            name,
            gender,
            title,
            email,
            mobile,
            wechat,
            remark,
        }
    }

    /// Cells in `COLUMNS` order, without the row number.
    pub fn cells(&self) -> [&str; 7] {
        [
            &self.name,
            &self.gender,
            &self.title,
            &self.email,
            &self.mobile,
            &self.wechat,
            &self.remark,
        ]
    }

    pub fn get(&self, column: Column) -> &str {
        match column {
            Column::Name => &self.name,
            Column::Gender => &self.gender,
            Column::Title => &self.title,
            Column::Email => &self.email,
            Column::Mobile => &self.mobile,
            Column::Wechat => &self.wechat,
            Column::Remark => &self.remark,
        }
    }

    /// Return a corrected copy with one field replaced. `self` is untouched.
    pub fn with(&self, column: Column, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        let value = value.into();
        match column {
            Column::Name => next.name = value,
            Column::Gender => next.gender = value,
            Column::Title => next.title = value,
            Column::Email => next.email = value,
            Column::Mobile => next.mobile = value,
            Column::Wechat => next.wechat = value,
            Column::Remark => next.remark = value,
        }
        next
    }

    /// Columns whose values differ between `self` and `other`.
    pub fn changed_columns(&self, other: &Record) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|c| self.get(*c) != other.get(*c))
            .collect()
    }
}

// ── Classification buckets ──────────────────────────────────────────────────

/// One field-level correction applied by the classifier. Descriptive only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldFix {
    pub column: String,
    pub old_value: String,
    pub new_value: String,
    pub reason: String,
}

/// A row the classifier repaired on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AutoFixed {
    #[serde(rename = "_row_number", alias = "row_number")]
    pub row_number: u32,
    pub fixes: Vec<FieldFix>,
    /// The full corrected row. Its `row_number` must equal the outer one.
    #[serde(rename = "fixed_row")]
    pub corrected: Record,
}

/// A single problem the classifier could not fix on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Issue {
    pub column: String,
    pub issue_type: String,
    pub current_value: String,
    pub description: String,
    /// Candidate resolutions, best first. May be empty.
    pub suggestions: Vec<String>,
}

/// A row routed to the resolver, with every issue found on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Escalation {
    #[serde(rename = "_row_number", alias = "row_number")]
    pub row_number: u32,
    pub issues: Vec<Issue>,
    /// The row as it stood at classification time.
    #[serde(rename = "current_row")]
    pub record: Record,
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// What the resolver decided for one escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Full-record replacement supplied by the resolver.
    Fixed(Record),
    /// Left as is; carries the original record unchanged.
    Skipped(Record),
}

/// The answer to exactly one escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub row_number: u32,
    pub outcome: ResolutionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Resolution {
    pub fn fixed(record: Record, rationale: Option<String>) -> Self {
        Self {
            row_number: record.row_number,
            outcome: ResolutionOutcome::Fixed(record),
            rationale,
        }
    }

    pub fn skipped(original: Record, rationale: Option<String>) -> Self {
        Self {
            row_number: original.row_number,
            outcome: ResolutionOutcome::Skipped(original),
            rationale,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.outcome, ResolutionOutcome::Fixed(_))
    }

    /// The record this resolution contributes to the output.
    pub fn record(&self) -> &Record {
        match &self.outcome {
            ResolutionOutcome::Fixed(r) | ResolutionOutcome::Skipped(r) => r,
        }
    }
}

// ── ClassificationResult ────────────────────────────────────────────────────

/// Validated, immutable output of the classifier gateway.
///
/// Only `classify::validate_classification` constructs one, so holding a
/// value means the four buckets are pairwise disjoint by row number and
/// cover exactly `total_rows` input rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub(crate) total_rows: usize,
    pub(crate) valid: Vec<Record>,
    pub(crate) auto_fixed: Vec<AutoFixed>,
    pub(crate) escalations: Vec<Escalation>,
}

impl ClassificationResult {
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn valid(&self) -> &[Record] {
        &self.valid
    }

    pub fn auto_fixed(&self) -> &[AutoFixed] {
        &self.auto_fixed
    }

    pub fn escalations(&self) -> &[Escalation] {
        &self.escalations
    }
}
