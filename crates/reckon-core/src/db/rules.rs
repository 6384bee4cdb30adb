//! Payee rule operations

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{format_datetime, get_datetime, get_opt_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewPayeeRule, PayeeMatchingRule, RuleUsage, TenantId};
use crate::store::RuleStore;

const RULE_COLUMNS: &str =
    "id, tenant_id, pattern, is_regex, category, created_at, modified_at, last_used_at, match_count";

impl Database {
    pub(crate) fn row_to_payee_rule(row: &rusqlite::Row) -> rusqlite::Result<PayeeMatchingRule> {
        let tenant: String = row.get(1)?;
        Ok(PayeeMatchingRule {
            id: row.get(0)?,
            tenant_id: TenantId::new(tenant),
            pattern: row.get(2)?,
            is_regex: row.get(3)?,
            category: row.get(4)?,
            created_at: get_datetime(row, 5)?,
            modified_at: get_datetime(row, 6)?,
            last_used_at: get_opt_datetime(row, 7)?,
            match_count: row.get(8)?,
        })
    }

    /// A tenant's rules, newest modification first, read on the given connection
    pub(crate) fn query_rules(
        conn: &Connection,
        tenant: &TenantId,
    ) -> Result<Vec<PayeeMatchingRule>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payee_rules WHERE tenant_id = ? ORDER BY modified_at DESC, id DESC",
            RULE_COLUMNS
        ))?;

        let rules = stmt
            .query_map(params![tenant.as_str()], Self::row_to_payee_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Add match counts and advance last-used times
    ///
    /// Rules deleted since the matching pass simply match no row.
    pub(crate) fn apply_rule_usage(
        conn: &Connection,
        tenant: &TenantId,
        usage: &[RuleUsage],
    ) -> Result<()> {
        for u in usage {
            let last_used = format_datetime(&u.last_used_at);
            conn.execute(
                r#"
                UPDATE payee_rules
                SET match_count = match_count + ?,
                    last_used_at = CASE
                        WHEN last_used_at IS NULL OR last_used_at < ? THEN ?
                        ELSE last_used_at
                    END
                WHERE tenant_id = ? AND id = ?
                "#,
                params![u.matches, last_used, last_used, tenant.as_str(), u.rule_id],
            )?;
        }
        Ok(())
    }
}

impl RuleStore for Database {
    fn payee_rules(&self, tenant: &TenantId) -> Result<Vec<PayeeMatchingRule>> {
        let conn = self.conn()?;
        Self::query_rules(&conn, tenant)
    }

    fn get_payee_rule(&self, tenant: &TenantId, id: i64) -> Result<Option<PayeeMatchingRule>> {
        let conn = self.conn()?;
        let rule = conn
            .query_row(
                &format!(
                    "SELECT {} FROM payee_rules WHERE tenant_id = ? AND id = ?",
                    RULE_COLUMNS
                ),
                params![tenant.as_str(), id],
                Self::row_to_payee_rule,
            )
            .optional()?;
        Ok(rule)
    }

    fn create_payee_rule(&self, tenant: &TenantId, rule: &NewPayeeRule) -> Result<i64> {
        let conn = self.conn()?;
        let now = format_datetime(&Utc::now());

        conn.execute(
            r#"
            INSERT INTO payee_rules (tenant_id, pattern, is_regex, category, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                tenant.as_str(),
                rule.pattern,
                rule.is_regex,
                rule.category,
                now,
                now
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn update_payee_rule(&self, tenant: &TenantId, id: i64, rule: &NewPayeeRule) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            r#"
            UPDATE payee_rules
            SET pattern = ?, is_regex = ?, category = ?, modified_at = ?
            WHERE tenant_id = ? AND id = ?
            "#,
            params![
                rule.pattern,
                rule.is_regex,
                rule.category,
                format_datetime(&Utc::now()),
                tenant.as_str(),
                id
            ],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!("payee rule {}", id)));
        }
        Ok(())
    }

    fn delete_payee_rule(&self, tenant: &TenantId, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM payee_rules WHERE tenant_id = ? AND id = ?",
            params![tenant.as_str(), id],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!("payee rule {}", id)));
        }
        Ok(())
    }
}
