//! Per-tenant write serialization and cooperative cancellation

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::TenantId;

/// One mutex per tenant; tenants never wait on each other
#[derive(Debug, Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<TenantId, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, tenant: &TenantId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| Error::Concurrency("tenant lock table poisoned".to_string()))?;
        Ok(locks.entry(tenant.clone()).or_default().clone())
    }

    /// Run `f` while holding the tenant's queue lock
    ///
    /// A lock poisoned by a panicking writer is reported as a concurrency
    /// error; the queue itself is protected by store transactions, so a retry
    /// is safe.
    pub fn with_lock<T>(&self, tenant: &TenantId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.lock_for(tenant)?;
        let _guard = lock.lock().map_err(|_| {
            Error::Concurrency(format!("queue lock for tenant {} poisoned", tenant))
        })?;
        debug!("Acquired queue lock for tenant {}", tenant);
        f()
    }
}

/// Shared flag for cancelling an import between steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Error::Cancelled)` once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
