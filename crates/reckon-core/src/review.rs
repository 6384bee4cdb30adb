//! The review queue: staging, selection and paging
//!
//! Every mutation of a tenant's queue runs under that tenant's lock. Merging
//! reads a snapshot of the ledger, the queue and the rules, prepares every
//! candidate, and appends the lot along with rule usage, all inside one store
//! write transaction. Existing items are never modified by a merge.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::concurrency::{CancelToken, TenantLocks};
use crate::config::{ReviewConfig, RuleConfig};
use crate::duplicates::DuplicateClassifier;
use crate::error::{Error, MatchEngineError, Result};
use crate::models::{
    DuplicateStatus, NewStagedItem, ReviewPage, ReviewSummary, SelectionResult, TenantId,
    TransactionCandidate,
};
use crate::rules::{PayeeRuleMatcher, RuleUsageTally};
use crate::store::{LedgerStore, MergePlan, ReviewStore, RuleStore};

/// What a merge did to the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Keys of the appended items, in batch order
    pub staged_keys: Vec<i64>,
    pub already_staged: usize,
    pub new_count: usize,
    pub exact_duplicate_count: usize,
    pub potential_duplicate_count: usize,
    pub categorized_count: usize,
    /// Each failing rule once, in the order first seen
    pub rule_errors: Vec<MatchEngineError>,
}

/// A candidate after classification and rule matching
struct Prepared {
    item: Option<NewStagedItem>,
    rule_errors: Vec<MatchEngineError>,
}

pub struct ReviewQueue<'a, S> {
    store: &'a S,
    locks: &'a TenantLocks,
    review: &'a ReviewConfig,
    rules: &'a RuleConfig,
}

impl<'a, S> ReviewQueue<'a, S>
where
    S: LedgerStore + ReviewStore + RuleStore,
{
    pub fn new(
        store: &'a S,
        locks: &'a TenantLocks,
        review: &'a ReviewConfig,
        rules: &'a RuleConfig,
    ) -> Self {
        Self {
            store,
            locks,
            review,
            rules,
        }
    }

    /// Classify, categorize and append candidates to the tenant's queue
    ///
    /// Candidates whose external id is already queued are skipped, so merging
    /// the same upload twice adds nothing. Cancellation is honored until the
    /// append; a cancelled merge leaves the queue and rule counters untouched.
    pub fn merge_batch(
        &self,
        tenant: &TenantId,
        candidates: &[TransactionCandidate],
        cancel: &CancelToken,
    ) -> Result<MergeSummary> {
        self.locks.with_lock(tenant, || {
            cancel.check()?;

            let mut summary = MergeSummary::default();
            let staged_keys = self.store.merge_staged(tenant, |snapshot| {
                let matcher = PayeeRuleMatcher::new(snapshot.rules, self.rules);
                let classifier = DuplicateClassifier::new(&snapshot.ledger, &snapshot.staged);
                let tally = RuleUsageTally::new();

                let prepared = prepare_all(
                    candidates,
                    &classifier,
                    &matcher,
                    &tally,
                    self.review.parallel_threshold,
                    self.review.workers(),
                    cancel,
                )?;

                let mut failing_rules = HashSet::new();
                let mut items = Vec::with_capacity(prepared.len());

                for p in prepared {
                    for err in p.rule_errors {
                        if failing_rules.insert(err.rule_id) {
                            warn!("Payee rule skipped: {}", err);
                            summary.rule_errors.push(err);
                        }
                    }
                    let Some(item) = p.item else {
                        summary.already_staged += 1;
                        continue;
                    };
                    match item.duplicate_status {
                        DuplicateStatus::New => summary.new_count += 1,
                        DuplicateStatus::ExactDuplicate => summary.exact_duplicate_count += 1,
                        DuplicateStatus::PotentialDuplicate => {
                            summary.potential_duplicate_count += 1
                        }
                    }
                    if item.category.is_some() {
                        summary.categorized_count += 1;
                    }
                    items.push(item);
                }

                // Last point at which the batch can be abandoned
                cancel.check()?;

                Ok(MergePlan {
                    items,
                    usage: tally.into_usages(),
                })
            })?;
            summary.staged_keys = staged_keys;

            info!(
                "Merged batch for tenant {}: {} staged ({} new, {} exact, {} potential), {} already staged",
                tenant,
                summary.staged_keys.len(),
                summary.new_count,
                summary.exact_duplicate_count,
                summary.potential_duplicate_count,
                summary.already_staged
            );
            Ok(summary)
        })
    }

    /// Select or deselect specific items; unknown keys are reported, not fatal
    pub fn set_selection(
        &self,
        tenant: &TenantId,
        keys: &[i64],
        is_selected: bool,
    ) -> Result<SelectionResult> {
        self.locks.with_lock(tenant, || {
            let result = self.store.set_selected(tenant, keys, is_selected)?;
            if !result.not_found.is_empty() {
                debug!(
                    "Selection for tenant {} skipped unknown keys {:?}",
                    tenant, result.not_found
                );
            }
            Ok(result)
        })
    }

    /// Select or deselect every item with the given duplicate status
    pub fn select_by_status(
        &self,
        tenant: &TenantId,
        status: DuplicateStatus,
        is_selected: bool,
    ) -> Result<usize> {
        self.locks.with_lock(tenant, || {
            self.store
                .set_selected_where(tenant, Some(status), is_selected)
        })
    }

    /// Select or deselect the whole queue
    pub fn select_all(&self, tenant: &TenantId, is_selected: bool) -> Result<usize> {
        self.locks
            .with_lock(tenant, || self.store.set_selected_where(tenant, None, is_selected))
    }

    /// One page of the queue in insertion order, with queue-wide counts
    ///
    /// `page` is 1-based (0 is treated as 1). `page_size` falls back to the
    /// configured default and is capped at the configured maximum.
    pub fn list_paged(
        &self,
        tenant: &TenantId,
        page: u32,
        page_size: Option<u32>,
    ) -> Result<ReviewPage> {
        let page = page.max(1);
        let page_size = page_size
            .unwrap_or(self.review.default_page_size)
            .clamp(1, self.review.max_page_size);

        self.locks.with_lock(tenant, || {
            let summary = self.store.review_summary(tenant)?;
            let offset = u64::from(page - 1) * u64::from(page_size);
            let items = self
                .store
                .staged_page(tenant, offset, u64::from(page_size))?;
            let total_pages = (summary.total as u64).div_ceil(u64::from(page_size)) as u32;

            Ok(ReviewPage {
                items,
                page,
                page_size,
                total_pages,
                summary,
            })
        })
    }

    pub fn summary(&self, tenant: &TenantId) -> Result<ReviewSummary> {
        self.locks
            .with_lock(tenant, || self.store.review_summary(tenant))
    }

    /// Remove specific items without committing them
    pub fn delete_items(&self, tenant: &TenantId, keys: &[i64]) -> Result<SelectionResult> {
        self.locks.with_lock(tenant, || {
            let result = self.store.delete_staged(tenant, keys)?;
            info!("Deleted {} pending items for tenant {}", result.updated, tenant);
            Ok(result)
        })
    }

    /// Remove every pending item; returns how many were removed
    pub fn delete_all(&self, tenant: &TenantId) -> Result<usize> {
        self.locks
            .with_lock(tenant, || self.store.delete_all_staged(tenant))
    }
}

fn prepare_one(
    candidate: &TransactionCandidate,
    classifier: &DuplicateClassifier<'_>,
    matcher: &PayeeRuleMatcher,
    tally: &RuleUsageTally,
) -> Prepared {
    if let Some(key) = classifier.already_staged(candidate) {
        debug!(
            "Candidate {} already queued as item {}",
            candidate.external_id, key
        );
        return Prepared {
            item: None,
            rule_errors: Vec::new(),
        };
    }

    let classification = classifier.classify(candidate);
    let outcome = matcher.categorize(&candidate.payee, tally);

    Prepared {
        item: Some(NewStagedItem {
            candidate: candidate.clone(),
            duplicate_status: classification.status,
            duplicate_of: classification.duplicate_of,
            is_selected: classification.status.selected_by_default(),
            category: outcome.hit.map(|hit| hit.category),
        }),
        rule_errors: outcome.errors,
    }
}

/// Prepare every candidate, splitting batches of at least `threshold`
/// across `workers` threads
///
/// Results come back in batch order regardless of how the work was split.
fn prepare_all(
    candidates: &[TransactionCandidate],
    classifier: &DuplicateClassifier<'_>,
    matcher: &PayeeRuleMatcher,
    tally: &RuleUsageTally,
    threshold: usize,
    workers: usize,
    cancel: &CancelToken,
) -> Result<Vec<Prepared>> {
    if candidates.len() < threshold || workers <= 1 {
        let mut prepared = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            cancel.check()?;
            prepared.push(prepare_one(candidate, classifier, matcher, tally));
        }
        return Ok(prepared);
    }

    let chunk_size = candidates.len().div_ceil(workers);
    let chunks: Vec<Result<Vec<Prepared>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = candidates
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || -> Result<Vec<Prepared>> {
                    let mut prepared = Vec::with_capacity(chunk.len());
                    for candidate in chunk {
                        cancel.check()?;
                        prepared.push(prepare_one(candidate, classifier, matcher, tally));
                    }
                    Ok(prepared)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    Err(Error::Import("candidate worker panicked".to_string()))
                })
            })
            .collect()
    });

    let mut prepared = Vec::with_capacity(candidates.len());
    for chunk in chunks {
        prepared.extend(chunk?);
    }
    Ok(prepared)
}
