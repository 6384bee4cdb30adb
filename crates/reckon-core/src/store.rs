//! Persistence interfaces used by the pipeline
//!
//! - `LedgerStore` - committed transactions, read for duplicate checks
//! - `ReviewStore` - the durable review queue, the atomic merge and the atomic accept move
//! - `RuleStore` - payee rules and their usage counters
//!
//! `Database` implements all three. Every method is scoped to one tenant;
//! keys belonging to another tenant behave as if they did not exist.

use crate::error::Result;
use crate::models::{
    AcceptResult, DuplicateStatus, LedgerTransaction, NewLedgerTransaction, NewPayeeRule,
    NewStagedItem, PayeeMatchingRule, ReviewSummary, RuleUsage, SelectionResult,
    StagedImportItem, TenantId,
};

/// A tenant's persisted state as seen by one merge
#[derive(Debug, Clone, Default)]
pub struct MergeSnapshot {
    pub ledger: Vec<LedgerTransaction>,
    pub staged: Vec<StagedImportItem>,
    /// Newest modification first
    pub rules: Vec<PayeeMatchingRule>,
}

/// What a merge writes
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub items: Vec<NewStagedItem>,
    /// Added to the rules' counters in the same transaction as the items
    pub usage: Vec<RuleUsage>,
}

/// Committed ledger transactions
pub trait LedgerStore: Send + Sync {
    /// All committed transactions for a tenant, ordered by id
    fn ledger_transactions(&self, tenant: &TenantId) -> Result<Vec<LedgerTransaction>>;

    /// Insert one transaction outside the review flow (seeding, manual entry)
    fn insert_ledger_transaction(
        &self,
        tenant: &TenantId,
        tx: &NewLedgerTransaction,
    ) -> Result<i64>;

    fn count_ledger_transactions(&self, tenant: &TenantId) -> Result<i64>;
}

/// Durable review queue
pub trait ReviewStore: Send + Sync {
    /// Every pending item in insertion order
    fn staged_items(&self, tenant: &TenantId) -> Result<Vec<StagedImportItem>>;

    /// Merge new items into the queue against a consistent snapshot
    ///
    /// Opens one write transaction, reads the tenant's ledger, queue and rules
    /// inside it, and hands them to `plan`. The planned items are appended in
    /// order and the rule usage applied before the transaction commits, so no
    /// other writer (in this process or another) can slip in between the read
    /// and the write. If `plan` or any write fails nothing is stored. Returns
    /// the keys of the appended items.
    fn merge_staged<F>(&self, tenant: &TenantId, plan: F) -> Result<Vec<i64>>
    where
        F: FnOnce(MergeSnapshot) -> Result<MergePlan>;

    /// A window of pending items in insertion order
    fn staged_page(
        &self,
        tenant: &TenantId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StagedImportItem>>;

    fn review_summary(&self, tenant: &TenantId) -> Result<ReviewSummary>;

    /// Set selection on the given keys; keys not in the queue are reported back
    fn set_selected(
        &self,
        tenant: &TenantId,
        keys: &[i64],
        selected: bool,
    ) -> Result<SelectionResult>;

    /// Set selection on every item with `status`, or on the whole queue when None
    fn set_selected_where(
        &self,
        tenant: &TenantId,
        status: Option<DuplicateStatus>,
        selected: bool,
    ) -> Result<usize>;

    /// Remove the given keys; keys not in the queue are reported back
    fn delete_staged(&self, tenant: &TenantId, keys: &[i64]) -> Result<SelectionResult>;

    /// Remove every pending item; returns how many were removed
    fn delete_all_staged(&self, tenant: &TenantId) -> Result<usize>;

    /// Move every selected item into the ledger and out of the queue
    ///
    /// Runs as one atomic unit: either every selected item is committed and
    /// removed, or nothing changes.
    fn commit_selected(&self, tenant: &TenantId) -> Result<AcceptResult>;
}

/// Payee rules
pub trait RuleStore: Send + Sync {
    /// Rules ordered by modification time, newest first
    fn payee_rules(&self, tenant: &TenantId) -> Result<Vec<PayeeMatchingRule>>;

    fn get_payee_rule(&self, tenant: &TenantId, id: i64) -> Result<Option<PayeeMatchingRule>>;

    /// Insert an already validated rule
    fn create_payee_rule(&self, tenant: &TenantId, rule: &NewPayeeRule) -> Result<i64>;

    /// Replace pattern, kind and category, bumping modified_at
    fn update_payee_rule(&self, tenant: &TenantId, id: i64, rule: &NewPayeeRule) -> Result<()>;

    fn delete_payee_rule(&self, tenant: &TenantId, id: i64) -> Result<()>;
}
