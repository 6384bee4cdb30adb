//! Domain models for Reckon

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{MatchEngineError, RecordError};

/// Identifies whose ledger, queue and rules an operation touches
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which account a decoded record came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    /// Bank or card issuer, e.g. "Chase"
    pub institution: Option<String>,
    /// Free-form type as exported, e.g. "CHECKING" or "credit card"
    pub account_type: Option<String>,
    /// Last known account identifier (usually the trailing digits)
    pub account_id: Option<String>,
}

/// One record as handed over by a decoder, before any interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBankRecord {
    pub date: NaiveDate,
    /// Negative = money out, positive = money in
    pub amount: Decimal,
    pub name: Option<String>,
    pub memo: Option<String>,
    /// Bank-issued transaction identifier (FITID and friends)
    pub bank_id: Option<String>,
    pub account: AccountDescriptor,
}

/// A normalized record ready for duplicate classification and rule matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    pub date: NaiveDate,
    pub amount: Decimal,
    /// Never empty
    pub payee: String,
    pub memo: Option<String>,
    /// Human-readable origin, e.g. "Chase - Checking 1234"
    pub source: String,
    /// Bank identifier, or a content hash when the bank supplied none
    pub external_id: String,
    /// True when `external_id` was derived rather than bank-supplied
    pub external_id_derived: bool,
}

/// Outcome of comparing a candidate against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStatus {
    /// Nothing in the ledger looks like this record
    New,
    /// Same record is already in the ledger
    ExactDuplicate,
    /// Same bank identifier but a core field differs; needs a human decision
    PotentialDuplicate,
}

impl DuplicateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::ExactDuplicate => "exact_duplicate",
            Self::PotentialDuplicate => "potential_duplicate",
        }
    }

    /// Selection state a freshly staged item starts with
    pub fn selected_by_default(&self) -> bool {
        matches!(self, Self::New)
    }

    /// Whether the item should be highlighted for review
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::PotentialDuplicate)
    }

    pub fn all() -> &'static [DuplicateStatus] {
        &[Self::New, Self::ExactDuplicate, Self::PotentialDuplicate]
    }
}

impl std::str::FromStr for DuplicateStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "new" => Ok(Self::New),
            "exact_duplicate" | "exact" => Ok(Self::ExactDuplicate),
            "potential_duplicate" | "potential" => Ok(Self::PotentialDuplicate),
            _ => Err(format!("Unknown duplicate status: {}", s)),
        }
    }
}

impl std::fmt::Display for DuplicateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An item waiting in a tenant's review queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedImportItem {
    pub id: i64,
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payee: String,
    pub memo: Option<String>,
    pub source: String,
    pub external_id: String,
    pub external_id_derived: bool,
    pub duplicate_status: DuplicateStatus,
    /// Ledger transaction this item duplicates (only when status != New)
    pub duplicate_of: Option<i64>,
    pub is_selected: bool,
    /// Assigned by the payee rules; not editable from the review queue
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StagedImportItem {
    pub fn needs_attention(&self) -> bool {
        self.duplicate_status.needs_attention()
    }
}

/// A classified, categorized candidate about to be appended to the queue
#[derive(Debug, Clone, PartialEq)]
pub struct NewStagedItem {
    pub candidate: TransactionCandidate,
    pub duplicate_status: DuplicateStatus,
    pub duplicate_of: Option<i64>,
    pub is_selected: bool,
    pub category: Option<String>,
}

/// A committed transaction in the tenant's ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payee: String,
    pub memo: Option<String>,
    pub source: String,
    pub external_id: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A transaction to be written to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerTransaction {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub payee: String,
    pub memo: Option<String>,
    pub source: String,
    pub external_id: Option<String>,
    pub category: Option<String>,
}

impl From<&StagedImportItem> for NewLedgerTransaction {
    fn from(item: &StagedImportItem) -> Self {
        Self {
            date: item.date,
            amount: item.amount,
            payee: item.payee.clone(),
            memo: item.memo.clone(),
            source: item.source.clone(),
            external_id: Some(item.external_id.clone()),
            category: item.category.clone(),
        }
    }
}

/// A tenant-owned rule mapping payee text to a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayeeMatchingRule {
    pub id: i64,
    pub tenant_id: TenantId,
    pub pattern: String,
    pub is_regex: bool,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub match_count: i64,
}

/// Input for creating or editing a payee rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayeeRule {
    pub pattern: String,
    pub is_regex: bool,
    pub category: String,
}

/// Usage recorded against one rule during a matching pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleUsage {
    pub rule_id: i64,
    pub matches: i64,
    pub last_used_at: DateTime<Utc>,
}

/// Counts shown alongside a page of review items
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: i64,
    pub selected: i64,
    pub new: i64,
    pub exact_duplicate: i64,
    pub potential_duplicate: i64,
}

/// One page of the review queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPage {
    pub items: Vec<StagedImportItem>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub summary: ReviewSummary,
}

/// Result of a selection toggle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub updated: usize,
    /// Keys that are not (or no longer) in the tenant's queue
    pub not_found: Vec<i64>,
}

/// Result of accepting the selected items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptResult {
    pub accepted_count: usize,
    /// Items left pending (the unselected ones)
    pub remaining_count: usize,
}

impl AcceptResult {
    /// Items not accepted in this round, as reported to API callers
    pub fn rejected_count(&self) -> usize {
        self.remaining_count
    }
}

/// Result of importing one decoded batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportBatchResult {
    pub staged_count: usize,
    /// Candidates skipped because the same external id is already queued
    pub already_staged: usize,
    pub new_count: usize,
    pub exact_duplicate_count: usize,
    pub potential_duplicate_count: usize,
    /// Staged items that received a category from a payee rule
    pub categorized_count: usize,
    pub error_count: usize,
    pub errors: Vec<RecordError>,
    /// Rules that could not be evaluated (each listed once)
    pub rule_errors: Vec<MatchEngineError>,
}
