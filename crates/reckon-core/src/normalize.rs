//! Turns decoded bank records into transaction candidates
//!
//! Banks disagree on where the payee lives. Some put it in NAME, some in MEMO,
//! and many truncate NAME while keeping the full text in MEMO. The normalizer
//! picks the most complete payee, builds a readable source string and makes
//! sure every candidate carries an external identifier.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::NormalizeConfig;
use crate::error::RecordError;
use crate::models::{AccountDescriptor, RawBankRecord, TransactionCandidate};

/// Prefix marking identifiers that were derived from record content
pub const DERIVED_ID_PREFIX: &str = "gen-";

/// Output of normalizing a whole batch
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Candidates paired with their row index in the batch
    pub candidates: Vec<(usize, TransactionCandidate)>,
    pub errors: Vec<RecordError>,
}

pub struct Normalizer {
    separator: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            separator: config.source_separator.clone(),
        }
    }

    /// Normalize one record; `row` is only used for error context
    pub fn normalize(
        &self,
        row: usize,
        record: &RawBankRecord,
    ) -> std::result::Result<TransactionCandidate, RecordError> {
        let (payee, memo) =
            resolve_payee(record.name.as_deref(), record.memo.as_deref()).ok_or_else(|| {
                RecordError {
                    row,
                    raw_date: Some(record.date.to_string()),
                    message: "record has neither a name nor a memo to use as payee".to_string(),
                }
            })?;

        let source = build_source(&record.account, &self.separator);

        let (external_id, external_id_derived) = match clean(record.bank_id.as_deref()) {
            Some(id) => (id, false),
            None => {
                let id = derive_external_id(
                    &record.date,
                    &record.amount,
                    &payee,
                    memo.as_deref(),
                    &source,
                );
                debug!("Row {} has no bank identifier, derived {}", row, id);
                (id, true)
            }
        };

        Ok(TransactionCandidate {
            date: record.date,
            amount: record.amount,
            payee,
            memo,
            source,
            external_id,
            external_id_derived,
        })
    }

    /// Normalize every record; failures are collected, never fatal
    pub fn normalize_batch(&self, records: &[RawBankRecord]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for (row, record) in records.iter().enumerate() {
            match self.normalize(row, record) {
                Ok(candidate) => batch.candidates.push((row, candidate)),
                Err(e) => {
                    warn!("Skipping record: {}", e);
                    batch.errors.push(e);
                }
            }
        }

        debug!(
            "Normalized {} records ({} failed)",
            batch.candidates.len(),
            batch.errors.len()
        );
        batch
    }
}

/// Trim a raw field; blank becomes None
fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decide which of NAME/MEMO is the payee
///
/// Returns (payee, memo) or None if neither field has text.
fn resolve_payee(name: Option<&str>, memo: Option<&str>) -> Option<(String, Option<String>)> {
    match (clean(name), clean(memo)) {
        (None, None) => None,
        (None, Some(memo)) => Some((memo, None)),
        (Some(name), None) => Some((name, None)),
        (Some(name), Some(memo)) => {
            // NAME is often a truncated prefix of MEMO
            if memo.to_lowercase().starts_with(&name.to_lowercase()) {
                Some((memo, None))
            } else {
                Some((name, Some(memo)))
            }
        }
    }
}

/// "Institution<sep>Type AccountId", skipping empty parts
fn build_source(account: &AccountDescriptor, separator: &str) -> String {
    let institution = clean(account.institution.as_deref());

    let account_part = [
        clean(account.account_type.as_deref()).map(|t| title_case(&t)),
        clean(account.account_id.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    [institution, Some(account_part).filter(|s| !s.is_empty())]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(separator)
}

/// "CREDIT_CARD" -> "Credit Card"
fn title_case(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Stable identifier for a record that arrived without one
///
/// Fields are separated with an ASCII unit separator so that shifting text
/// between payee and memo changes the hash.
pub fn derive_external_id(
    date: &NaiveDate,
    amount: &Decimal,
    payee: &str,
    memo: Option<&str>,
    source: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(date.to_string().as_bytes());
    hasher.update([0x1f]);
    hasher.update(amount.normalize().to_string().as_bytes());
    hasher.update([0x1f]);
    hasher.update(payee.as_bytes());
    hasher.update([0x1f]);
    hasher.update(memo.unwrap_or("").as_bytes());
    hasher.update([0x1f]);
    hasher.update(source.as_bytes());
    format!("{}{}", DERIVED_ID_PREFIX, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(name: Option<&str>, memo: Option<&str>, bank_id: Option<&str>) -> RawBankRecord {
        RawBankRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            amount: Decimal::from_str("-15.99").unwrap(),
            name: name.map(String::from),
            memo: memo.map(String::from),
            bank_id: bank_id.map(String::from),
            account: AccountDescriptor {
                institution: Some("Chase".to_string()),
                account_type: Some("CHECKING".to_string()),
                account_id: Some("1234".to_string()),
            },
        }
    }

    #[test]
    fn test_name_only() {
        let c = Normalizer::default()
            .normalize(0, &record(Some("NETFLIX.COM"), None, Some("T1")))
            .unwrap();
        assert_eq!(c.payee, "NETFLIX.COM");
        assert_eq!(c.memo, None);
    }

    #[test]
    fn test_empty_name_uses_memo() {
        let c = Normalizer::default()
            .normalize(0, &record(Some("   "), Some("SPOTIFY USA"), Some("T1")))
            .unwrap();
        assert_eq!(c.payee, "SPOTIFY USA");
        assert_eq!(c.memo, None);
    }

    #[test]
    fn test_truncated_name_prefers_memo() {
        let c = Normalizer::default()
            .normalize(
                0,
                &record(
                    Some("AMAZON  MKTPLACE PM"),
                    Some("amazon mktplace pmts amzn.com/bill wa"),
                    Some("T1"),
                ),
            )
            .unwrap();
        assert_eq!(c.payee, "amazon mktplace pmts amzn.com/bill wa");
        assert_eq!(c.memo, None);
    }

    #[test]
    fn test_unrelated_memo_is_kept() {
        let c = Normalizer::default()
            .normalize(0, &record(Some("STARBUCKS"), Some("Store #1234"), Some("T1")))
            .unwrap();
        assert_eq!(c.payee, "STARBUCKS");
        assert_eq!(c.memo.as_deref(), Some("Store #1234"));
    }

    #[test]
    fn test_missing_payee_is_a_record_error() {
        let err = Normalizer::default()
            .normalize(7, &record(None, Some(""), Some("T1")))
            .unwrap_err();
        assert_eq!(err.row, 7);
        assert_eq!(err.raw_date.as_deref(), Some("2024-01-15"));
    }

    #[test]
    fn test_source_string() {
        let c = Normalizer::default()
            .normalize(0, &record(Some("X"), None, Some("T1")))
            .unwrap();
        assert_eq!(c.source, "Chase - Checking 1234");

        let account = AccountDescriptor {
            institution: None,
            account_type: Some("credit_card".to_string()),
            account_id: None,
        };
        assert_eq!(build_source(&account, " - "), "Credit Card");
        assert_eq!(build_source(&AccountDescriptor::default(), " - "), "");
    }

    #[test]
    fn test_bank_id_passes_through() {
        let c = Normalizer::default()
            .normalize(0, &record(Some("X"), None, Some(" FIT-0001 ")))
            .unwrap();
        assert_eq!(c.external_id, "FIT-0001");
        assert!(!c.external_id_derived);
    }

    #[test]
    fn test_missing_bank_id_derives_stable_id() {
        let normalizer = Normalizer::default();
        let a = normalizer.normalize(0, &record(Some("X"), None, None)).unwrap();
        let b = normalizer.normalize(5, &record(Some("X"), None, None)).unwrap();
        assert!(a.external_id_derived);
        assert!(a.external_id.starts_with(DERIVED_ID_PREFIX));
        assert_eq!(a.external_id, b.external_id);

        let other = normalizer.normalize(0, &record(Some("Y"), None, None)).unwrap();
        assert_ne!(a.external_id, other.external_id);
    }

    #[test]
    fn test_derived_id_ignores_amount_scale() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let a = derive_external_id(&date, &Decimal::from_str("-5.50").unwrap(), "X", None, "S");
        let b = derive_external_id(&date, &Decimal::from_str("-5.5").unwrap(), "X", None, "S");
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_continues_past_bad_records() {
        let records = vec![
            record(Some("A"), None, Some("1")),
            record(None, None, Some("2")),
            record(Some("C"), None, Some("3")),
        ];
        let batch = Normalizer::default().normalize_batch(&records);
        assert_eq!(batch.candidates.len(), 2);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].row, 1);
        assert_eq!(batch.candidates[1].0, 2);
    }
}
