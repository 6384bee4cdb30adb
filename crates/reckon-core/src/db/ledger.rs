//! Committed ledger transactions

use chrono::Utc;
use rusqlite::{params, Connection};

use super::{amount_to_sql, format_datetime, get_amount, get_date, get_datetime, Database};
use crate::error::Result;
use crate::models::{LedgerTransaction, NewLedgerTransaction, TenantId};
use crate::store::LedgerStore;

const LEDGER_COLUMNS: &str =
    "id, tenant_id, date, amount, payee, memo, source, external_id, category, created_at";

impl Database {
    pub(crate) fn row_to_ledger_transaction(
        row: &rusqlite::Row,
    ) -> rusqlite::Result<LedgerTransaction> {
        let tenant: String = row.get(1)?;
        Ok(LedgerTransaction {
            id: row.get(0)?,
            tenant_id: TenantId::new(tenant),
            date: get_date(row, 2)?,
            amount: get_amount(row, 3)?,
            payee: row.get(4)?,
            memo: row.get(5)?,
            source: row.get(6)?,
            external_id: row.get(7)?,
            category: row.get(8)?,
            created_at: get_datetime(row, 9)?,
        })
    }

    /// All of a tenant's ledger rows, read on the given connection
    pub(crate) fn query_ledger(
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<Vec<LedgerTransaction>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ledger_transactions WHERE tenant_id = ? ORDER BY id",
            LEDGER_COLUMNS
        ))?;

        let txs = stmt
            .query_map(params![tenant.as_str()], Self::row_to_ledger_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Insert on an existing connection or transaction
    pub(crate) fn insert_ledger_row(
        conn: &Connection,
        tenant: &TenantId,
        tx: &NewLedgerTransaction,
    ) -> Result<i64> {
        conn.execute(
            r#"
            INSERT INTO ledger_transactions
                (tenant_id, date, amount, payee, memo, source, external_id, category, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tenant.as_str(),
                tx.date.to_string(),
                amount_to_sql(&tx.amount),
                tx.payee,
                tx.memo,
                tx.source,
                tx.external_id,
                tx.category,
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get one ledger transaction by id
    pub fn get_ledger_transaction(
        &self,
        tenant: &TenantId,
        id: i64,
    ) -> Result<Option<LedgerTransaction>> {
        use rusqlite::OptionalExtension;

        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM ledger_transactions WHERE tenant_id = ? AND id = ?",
                    LEDGER_COLUMNS
                ),
                params![tenant.as_str(), id],
                Self::row_to_ledger_transaction,
            )
            .optional()?;
        Ok(tx)
    }
}

impl LedgerStore for Database {
    fn ledger_transactions(&self, tenant: &TenantId) -> Result<Vec<LedgerTransaction>> {
        let conn = self.conn()?;
        Self::query_ledger(&conn, tenant)
    }

    fn insert_ledger_transaction(
        &self,
        tenant: &TenantId,
        tx: &NewLedgerTransaction,
    ) -> Result<i64> {
        let conn = self.conn()?;
        Self::insert_ledger_row(&conn, tenant, tx)
    }

    fn count_ledger_transactions(&self, tenant: &TenantId) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ledger_transactions WHERE tenant_id = ?",
            params![tenant.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
