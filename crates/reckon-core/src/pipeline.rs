//! Batch import: decoded records in, staged review items out

use tracing::info;

use crate::concurrency::CancelToken;
use crate::decode::DecodedBatch;
use crate::error::{RecordError, Result};
use crate::models::{ImportBatchResult, RawBankRecord, TenantId, TransactionCandidate};
use crate::normalize::Normalizer;
use crate::review::ReviewQueue;
use crate::store::{LedgerStore, ReviewStore, RuleStore};

pub struct ImportPipeline<'a, S> {
    normalizer: Normalizer,
    queue: ReviewQueue<'a, S>,
}

impl<'a, S> ImportPipeline<'a, S>
where
    S: LedgerStore + ReviewStore + RuleStore,
{
    pub fn new(normalizer: Normalizer, queue: ReviewQueue<'a, S>) -> Self {
        Self { normalizer, queue }
    }

    /// Normalize, classify, categorize and stage one batch of raw records
    ///
    /// Records that fail normalization are reported in the result and do not
    /// stop the batch. Everything else is staged together or not at all.
    pub fn import_batch(
        &self,
        tenant: &TenantId,
        records: &[RawBankRecord],
        cancel: &CancelToken,
    ) -> Result<ImportBatchResult> {
        self.run(tenant, records, Vec::new(), |row| row, cancel)
    }

    /// Import a decoded file, reporting errors against file row numbers
    pub fn import_decoded(
        &self,
        tenant: &TenantId,
        decoded: &DecodedBatch,
        cancel: &CancelToken,
    ) -> Result<ImportBatchResult> {
        self.run(
            tenant,
            &decoded.records,
            decoded.errors.clone(),
            |idx| decoded.rows.get(idx).copied().unwrap_or(idx),
            cancel,
        )
    }

    fn run(
        &self,
        tenant: &TenantId,
        records: &[RawBankRecord],
        mut errors: Vec<RecordError>,
        row_of: impl Fn(usize) -> usize,
        cancel: &CancelToken,
    ) -> Result<ImportBatchResult> {
        info!(
            "Importing {} records for tenant {}",
            records.len(),
            tenant
        );
        cancel.check()?;

        let normalized = self.normalizer.normalize_batch(records);
        errors.extend(normalized.errors.into_iter().map(|mut e| {
            e.row = row_of(e.row);
            e
        }));
        errors.sort_by_key(|e| e.row);

        let candidates: Vec<TransactionCandidate> =
            normalized.candidates.into_iter().map(|(_, c)| c).collect();

        let merged = self.queue.merge_batch(tenant, &candidates, cancel)?;

        let result = ImportBatchResult {
            staged_count: merged.staged_keys.len(),
            already_staged: merged.already_staged,
            new_count: merged.new_count,
            exact_duplicate_count: merged.exact_duplicate_count,
            potential_duplicate_count: merged.potential_duplicate_count,
            categorized_count: merged.categorized_count,
            error_count: errors.len(),
            errors,
            rule_errors: merged.rule_errors,
        };

        info!(
            "Import finished for tenant {}: {} staged, {} errors",
            tenant, result.staged_count, result.error_count
        );
        Ok(result)
    }
}
