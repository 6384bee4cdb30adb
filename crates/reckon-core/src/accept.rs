//! Committing reviewed items to the ledger

use tracing::info;

use crate::concurrency::TenantLocks;
use crate::error::Result;
use crate::models::{AcceptResult, TenantId};
use crate::store::ReviewStore;

/// Moves selected queue items into the ledger
pub struct AcceptanceCommitter<'a, S> {
    store: &'a S,
    locks: &'a TenantLocks,
}

impl<'a, S: ReviewStore> AcceptanceCommitter<'a, S> {
    pub fn new(store: &'a S, locks: &'a TenantLocks) -> Self {
        Self { store, locks }
    }

    /// Accept every selected item for the tenant
    ///
    /// All selected items land in the ledger (category and fields as staged)
    /// and leave the queue together, or nothing changes. Unselected items stay
    /// queued with their selection and duplicate state intact.
    pub fn accept(&self, tenant: &TenantId) -> Result<AcceptResult> {
        self.locks.with_lock(tenant, || {
            let result = self.store.commit_selected(tenant)?;
            info!(
                "Accepted {} items for tenant {} ({} still pending)",
                result.accepted_count, tenant, result.remaining_count
            );
            Ok(result)
        })
    }
}
