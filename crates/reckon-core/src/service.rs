//! Tenant-facing entry points
//!
//! `ImportService` owns the store, the per-tenant locks and the configuration,
//! and hands out the pipeline components wired to them.

use serde::Serialize;
use tracing::info;

use crate::accept::AcceptanceCommitter;
use crate::concurrency::{CancelToken, TenantLocks};
use crate::config::ReckonConfig;
use crate::decode::DecodedBatch;
use crate::error::{Error, Result};
use crate::models::{
    AcceptResult, DuplicateStatus, ImportBatchResult, NewPayeeRule, PayeeMatchingRule,
    RawBankRecord, ReviewPage, ReviewSummary, SelectionResult, TenantId,
};
use crate::normalize::Normalizer;
use crate::pipeline::ImportPipeline;
use crate::review::ReviewQueue;
use crate::rules::{prepare_rule, MatchKind, MatchOutcome, PayeeRuleMatcher};
use crate::store::{LedgerStore, ReviewStore, RuleStore};

/// One rule that matched in a rule test
#[derive(Debug, Clone, Serialize)]
pub struct RuleTestMatch {
    pub rule: PayeeMatchingRule,
    pub kind: MatchKind,
    /// True for the rule that would categorize this payee
    pub wins: bool,
}

pub struct ImportService<S> {
    store: S,
    locks: TenantLocks,
    config: ReckonConfig,
}

impl<S> ImportService<S>
where
    S: LedgerStore + ReviewStore + RuleStore,
{
    pub fn new(store: S, config: ReckonConfig) -> Self {
        Self {
            store,
            locks: TenantLocks::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReckonConfig {
        &self.config
    }

    pub fn queue(&self) -> ReviewQueue<'_, S> {
        ReviewQueue::new(
            &self.store,
            &self.locks,
            &self.config.review,
            &self.config.rules,
        )
    }

    pub fn committer(&self) -> AcceptanceCommitter<'_, S> {
        AcceptanceCommitter::new(&self.store, &self.locks)
    }

    pub fn pipeline(&self) -> ImportPipeline<'_, S> {
        ImportPipeline::new(Normalizer::new(&self.config.normalize), self.queue())
    }

    // ========== Import & review ==========

    pub fn import_batch(
        &self,
        tenant: &TenantId,
        records: &[RawBankRecord],
        cancel: &CancelToken,
    ) -> Result<ImportBatchResult> {
        self.pipeline().import_batch(tenant, records, cancel)
    }

    pub fn import_decoded(
        &self,
        tenant: &TenantId,
        decoded: &DecodedBatch,
        cancel: &CancelToken,
    ) -> Result<ImportBatchResult> {
        self.pipeline().import_decoded(tenant, decoded, cancel)
    }

    pub fn list_review(
        &self,
        tenant: &TenantId,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<ReviewPage> {
        self.queue().list_paged(tenant, page, page_size)
    }

    pub fn review_summary(&self, tenant: &TenantId) -> Result<ReviewSummary> {
        self.queue().summary(tenant)
    }

    pub fn set_selection(
        &self,
        tenant: &TenantId,
        keys: &[i64],
        is_selected: bool,
    ) -> Result<SelectionResult> {
        self.queue().set_selection(tenant, keys, is_selected)
    }

    pub fn select_by_status(
        &self,
        tenant: &TenantId,
        status: DuplicateStatus,
        is_selected: bool,
    ) -> Result<usize> {
        self.queue().select_by_status(tenant, status, is_selected)
    }

    pub fn select_all(&self, tenant: &TenantId, is_selected: bool) -> Result<usize> {
        self.queue().select_all(tenant, is_selected)
    }

    pub fn delete_items(&self, tenant: &TenantId, keys: &[i64]) -> Result<SelectionResult> {
        self.queue().delete_items(tenant, keys)
    }

    pub fn delete_all_pending(&self, tenant: &TenantId) -> Result<usize> {
        self.queue().delete_all(tenant)
    }

    pub fn accept(&self, tenant: &TenantId) -> Result<AcceptResult> {
        self.committer().accept(tenant)
    }

    // ========== Payee rules ==========

    pub fn list_rules(&self, tenant: &TenantId) -> Result<Vec<PayeeMatchingRule>> {
        self.store.payee_rules(tenant)
    }

    pub fn get_rule(&self, tenant: &TenantId, id: i64) -> Result<PayeeMatchingRule> {
        self.store
            .get_payee_rule(tenant, id)?
            .ok_or_else(|| Error::NotFound(format!("payee rule {}", id)))
    }

    /// Validate and store a new rule; invalid rules are never persisted
    pub fn create_rule(&self, tenant: &TenantId, rule: &NewPayeeRule) -> Result<PayeeMatchingRule> {
        let rule = prepare_rule(rule, &self.config.rules)?;
        let id = self.store.create_payee_rule(tenant, &rule)?;
        info!(
            "Created payee rule {} for tenant {}: '{}' -> {}",
            id, tenant, rule.pattern, rule.category
        );
        self.get_rule(tenant, id)
    }

    /// Validate and replace a rule, bumping its modification time
    pub fn update_rule(
        &self,
        tenant: &TenantId,
        id: i64,
        rule: &NewPayeeRule,
    ) -> Result<PayeeMatchingRule> {
        let rule = prepare_rule(rule, &self.config.rules)?;
        self.store.update_payee_rule(tenant, id, &rule)?;
        info!("Updated payee rule {} for tenant {}", id, tenant);
        self.get_rule(tenant, id)
    }

    pub fn delete_rule(&self, tenant: &TenantId, id: i64) -> Result<()> {
        self.store.delete_payee_rule(tenant, id)?;
        info!("Deleted payee rule {} for tenant {}", id, tenant);
        Ok(())
    }

    fn matcher(&self, tenant: &TenantId) -> Result<PayeeRuleMatcher> {
        Ok(PayeeRuleMatcher::new(
            self.store.payee_rules(tenant)?,
            &self.config.rules,
        ))
    }

    /// Which category a payee would get, without recording usage
    pub fn explain(&self, tenant: &TenantId, payee: &str) -> Result<MatchOutcome> {
        Ok(self.matcher(tenant)?.find_category(payee))
    }

    /// Every rule matching a payee in evaluation order, with the winner marked
    pub fn test_rules(&self, tenant: &TenantId, payee: &str) -> Result<Vec<RuleTestMatch>> {
        let matcher = self.matcher(tenant)?;
        let winner = matcher.find_category(payee).hit.map(|hit| hit.rule_id);

        Ok(matcher
            .matching_rules(payee)
            .into_iter()
            .map(|(rule, kind)| RuleTestMatch {
                wins: Some(rule.id) == winner,
                rule: rule.clone(),
                kind,
            })
            .collect())
    }
}
