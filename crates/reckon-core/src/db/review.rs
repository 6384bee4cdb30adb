//! Review queue storage and the accept move

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{debug, info};

use super::{amount_to_sql, format_datetime, get_amount, get_date, get_datetime, Database};
use crate::error::Result;
use crate::models::{
    AcceptResult, DuplicateStatus, NewLedgerTransaction, NewStagedItem, ReviewSummary,
    SelectionResult, StagedImportItem, TenantId,
};
use crate::store::{MergePlan, MergeSnapshot, ReviewStore};

const STAGED_COLUMNS: &str = "id, tenant_id, date, amount, payee, memo, source, external_id, \
     external_id_derived, duplicate_status, duplicate_of, is_selected, category, created_at";

/// Drop repeated keys, keeping first occurrence order
fn unique_keys(keys: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    keys.iter().copied().filter(|k| seen.insert(*k)).collect()
}

impl Database {
    pub(crate) fn row_to_staged_item(row: &rusqlite::Row) -> rusqlite::Result<StagedImportItem> {
        let tenant: String = row.get(1)?;
        let status_str: String = row.get(9)?;
        let duplicate_status: DuplicateStatus = status_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(StagedImportItem {
            id: row.get(0)?,
            tenant_id: TenantId::new(tenant),
            date: get_date(row, 2)?,
            amount: get_amount(row, 3)?,
            payee: row.get(4)?,
            memo: row.get(5)?,
            source: row.get(6)?,
            external_id: row.get(7)?,
            external_id_derived: row.get(8)?,
            duplicate_status,
            duplicate_of: row.get(10)?,
            is_selected: row.get(11)?,
            category: row.get(12)?,
            created_at: get_datetime(row, 13)?,
        })
    }

    /// A tenant's whole queue in insertion order, read on the given connection
    pub(crate) fn query_staged(
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<Vec<StagedImportItem>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM staged_import_items WHERE tenant_id = ? ORDER BY id",
            STAGED_COLUMNS
        ))?;

        let items = stmt
            .query_map(params![tenant.as_str()], Self::row_to_staged_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn insert_staged_rows(
        conn: &Connection,
        tenant: &TenantId,
        items: &[NewStagedItem],
    ) -> Result<Vec<i64>> {
        let now = format_datetime(&Utc::now());

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let c = &item.candidate;
            conn.execute(
                r#"
                INSERT INTO staged_import_items
                    (tenant_id, date, amount, payee, memo, source, external_id,
                     external_id_derived, duplicate_status, duplicate_of, is_selected,
                     category, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    tenant.as_str(),
                    c.date.to_string(),
                    amount_to_sql(&c.amount),
                    c.payee,
                    c.memo,
                    c.source,
                    c.external_id,
                    c.external_id_derived,
                    item.duplicate_status.as_str(),
                    item.duplicate_of,
                    item.is_selected,
                    item.category,
                    now,
                ],
            )?;
            keys.push(conn.last_insert_rowid());
        }
        Ok(keys)
    }
}

impl ReviewStore for Database {
    fn staged_items(&self, tenant: &TenantId) -> Result<Vec<StagedImportItem>> {
        let conn = self.conn()?;
        Self::query_staged(&conn, tenant)
    }

    fn merge_staged<F>(&self, tenant: &TenantId, plan: F) -> Result<Vec<i64>>
    where
        F: FnOnce(MergeSnapshot) -> Result<MergePlan>,
    {
        let mut conn = self.conn()?;
        // Holding the write lock from the first read keeps other processes from
        // staging the same rows between our snapshot and our insert
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let snapshot = MergeSnapshot {
            ledger: Self::query_ledger(&tx, tenant)?,
            staged: Self::query_staged(&tx, tenant)?,
            rules: Self::query_rules(&tx, tenant)?,
        };
        let plan = plan(snapshot)?;

        let keys = Self::insert_staged_rows(&tx, tenant, &plan.items)?;
        Self::apply_rule_usage(&tx, tenant, &plan.usage)?;

        tx.commit()?;
        debug!(
            "Staged {} items and {} rule usages for tenant {}",
            keys.len(),
            plan.usage.len(),
            tenant
        );
        Ok(keys)
    }

    fn staged_page(
        &self,
        tenant: &TenantId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<StagedImportItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM staged_import_items WHERE tenant_id = ? ORDER BY id LIMIT ? OFFSET ?",
            STAGED_COLUMNS
        ))?;

        let items = stmt
            .query_map(
                params![tenant.as_str(), limit as i64, offset as i64],
                Self::row_to_staged_item,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn review_summary(&self, tenant: &TenantId) -> Result<ReviewSummary> {
        let conn = self.conn()?;
        let summary = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(is_selected), 0),
                   COALESCE(SUM(duplicate_status = 'new'), 0),
                   COALESCE(SUM(duplicate_status = 'exact_duplicate'), 0),
                   COALESCE(SUM(duplicate_status = 'potential_duplicate'), 0)
            FROM staged_import_items
            WHERE tenant_id = ?
            "#,
            params![tenant.as_str()],
            |row| {
                Ok(ReviewSummary {
                    total: row.get(0)?,
                    selected: row.get(1)?,
                    new: row.get(2)?,
                    exact_duplicate: row.get(3)?,
                    potential_duplicate: row.get(4)?,
                })
            },
        )?;
        Ok(summary)
    }

    fn set_selected(
        &self,
        tenant: &TenantId,
        keys: &[i64],
        selected: bool,
    ) -> Result<SelectionResult> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut result = SelectionResult::default();
        for key in unique_keys(keys) {
            let changed = tx.execute(
                "UPDATE staged_import_items SET is_selected = ? WHERE tenant_id = ? AND id = ?",
                params![selected, tenant.as_str(), key],
            )?;
            if changed == 0 {
                result.not_found.push(key);
            } else {
                result.updated += 1;
            }
        }

        tx.commit()?;
        Ok(result)
    }

    fn set_selected_where(
        &self,
        tenant: &TenantId,
        status: Option<DuplicateStatus>,
        selected: bool,
    ) -> Result<usize> {
        let conn = self.conn()?;
        let changed = match status {
            Some(status) => conn.execute(
                r#"
                UPDATE staged_import_items SET is_selected = ?
                WHERE tenant_id = ? AND duplicate_status = ?
                "#,
                params![selected, tenant.as_str(), status.as_str()],
            )?,
            None => conn.execute(
                "UPDATE staged_import_items SET is_selected = ? WHERE tenant_id = ?",
                params![selected, tenant.as_str()],
            )?,
        };
        Ok(changed)
    }

    fn delete_staged(&self, tenant: &TenantId, keys: &[i64]) -> Result<SelectionResult> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut result = SelectionResult::default();
        for key in unique_keys(keys) {
            let removed = tx.execute(
                "DELETE FROM staged_import_items WHERE tenant_id = ? AND id = ?",
                params![tenant.as_str(), key],
            )?;
            if removed == 0 {
                result.not_found.push(key);
            } else {
                result.updated += 1;
            }
        }

        tx.commit()?;
        Ok(result)
    }

    fn delete_all_staged(&self, tenant: &TenantId) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM staged_import_items WHERE tenant_id = ?",
            params![tenant.as_str()],
        )?;
        info!("Cleared {} pending items for tenant {}", removed, tenant);
        Ok(removed)
    }

    fn commit_selected(&self, tenant: &TenantId) -> Result<AcceptResult> {
        let mut conn = self.conn()?;
        // Take the write lock up front so the snapshot we read is the one we move
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let selected = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM staged_import_items \
                 WHERE tenant_id = ? AND is_selected = 1 ORDER BY id",
                STAGED_COLUMNS
            ))?;
            let items = stmt
                .query_map(params![tenant.as_str()], Self::row_to_staged_item)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            items
        };

        for item in &selected {
            Self::insert_ledger_row(&tx, tenant, &NewLedgerTransaction::from(item))?;
            tx.execute(
                "DELETE FROM staged_import_items WHERE tenant_id = ? AND id = ?",
                params![tenant.as_str(), item.id],
            )?;
        }

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM staged_import_items WHERE tenant_id = ?",
            params![tenant.as_str()],
            |row| row.get(0),
        )?;

        tx.commit()?;

        Ok(AcceptResult {
            accepted_count: selected.len(),
            remaining_count: remaining as usize,
        })
    }
}
