//! Duplicate classification of import candidates
//!
//! A candidate is compared against persisted state only: the tenant's ledger
//! and the items already waiting in its review queue. Candidates in the same
//! batch are never compared with each other.
//!
//! Order of checks:
//! 1. External identifier match in the ledger. Same date, amount and payee is an
//!    exact duplicate; any difference makes it a potential duplicate.
//! 2. Content match on (date, amount, payee ignoring case) is an exact duplicate.
//! 3. Everything else is new.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{DuplicateStatus, LedgerTransaction, StagedImportItem, TransactionCandidate};

/// Status plus the ledger transaction it refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: DuplicateStatus,
    /// Set only when status is not New
    pub duplicate_of: Option<i64>,
}

impl Classification {
    fn new_record() -> Self {
        Self {
            status: DuplicateStatus::New,
            duplicate_of: None,
        }
    }
}

/// Date, amount and case-folded payee
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContentKey {
    date: NaiveDate,
    amount: Decimal,
    payee: String,
}

impl ContentKey {
    fn new(date: NaiveDate, amount: Decimal, payee: &str) -> Self {
        Self {
            date,
            amount: amount.normalize(),
            payee: payee.to_lowercase(),
        }
    }
}

/// Index over a snapshot of the ledger and the review queue
///
/// Build once per batch; classification is read-only, so one classifier can be
/// shared across threads.
pub struct DuplicateClassifier<'a> {
    by_external_id: HashMap<&'a str, &'a LedgerTransaction>,
    by_content: HashMap<ContentKey, i64>,
    staged_by_external_id: HashMap<&'a str, i64>,
}

impl<'a> DuplicateClassifier<'a> {
    pub fn new(ledger: &'a [LedgerTransaction], staged: &'a [StagedImportItem]) -> Self {
        let mut by_external_id = HashMap::new();
        let mut by_content = HashMap::new();

        // Lowest id wins when the ledger holds several matches
        let mut ordered: Vec<&LedgerTransaction> = ledger.iter().collect();
        ordered.sort_by_key(|tx| tx.id);

        for tx in ordered {
            if let Some(ext) = tx.external_id.as_deref() {
                by_external_id.entry(ext).or_insert(tx);
            }
            by_content
                .entry(ContentKey::new(tx.date, tx.amount, &tx.payee))
                .or_insert(tx.id);
        }

        let mut staged_by_external_id = HashMap::new();
        for item in staged {
            staged_by_external_id
                .entry(item.external_id.as_str())
                .or_insert(item.id);
        }

        Self {
            by_external_id,
            by_content,
            staged_by_external_id,
        }
    }

    /// Classify a candidate against the ledger
    pub fn classify(&self, candidate: &TransactionCandidate) -> Classification {
        if let Some(existing) = self.by_external_id.get(candidate.external_id.as_str()) {
            let identical = existing.date == candidate.date
                && existing.amount == candidate.amount
                && existing.payee == candidate.payee;

            return Classification {
                status: if identical {
                    DuplicateStatus::ExactDuplicate
                } else {
                    DuplicateStatus::PotentialDuplicate
                },
                duplicate_of: Some(existing.id),
            };
        }

        let key = ContentKey::new(candidate.date, candidate.amount, &candidate.payee);
        if let Some(id) = self.by_content.get(&key) {
            return Classification {
                status: DuplicateStatus::ExactDuplicate,
                duplicate_of: Some(*id),
            };
        }

        Classification::new_record()
    }

    /// Key of the queued item carrying the same external id, if any
    ///
    /// A hit means this exact bank record was merged by an earlier upload.
    pub fn already_staged(&self, candidate: &TransactionCandidate) -> Option<i64> {
        self.staged_by_external_id
            .get(candidate.external_id.as_str())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TenantId;
    use chrono::Utc;
    use std::str::FromStr;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ledger_tx(id: i64, ext: Option<&str>, day: u32, amount: &str, payee: &str) -> LedgerTransaction {
        LedgerTransaction {
            id,
            tenant_id: TenantId::from("t1"),
            date: date(day),
            amount: dec(amount),
            payee: payee.to_string(),
            memo: None,
            source: "Bank".to_string(),
            external_id: ext.map(String::from),
            category: None,
            created_at: Utc::now(),
        }
    }

    fn candidate(ext: &str, day: u32, amount: &str, payee: &str) -> TransactionCandidate {
        TransactionCandidate {
            date: date(day),
            amount: dec(amount),
            payee: payee.to_string(),
            memo: None,
            source: "Bank".to_string(),
            external_id: ext.to_string(),
            external_id_derived: false,
        }
    }

    #[test]
    fn test_external_id_and_fields_match_is_exact() {
        let ledger = vec![ledger_tx(42, Some("FIT1"), 5, "-10.00", "COFFEE")];
        let classifier = DuplicateClassifier::new(&ledger, &[]);

        let result = classifier.classify(&candidate("FIT1", 5, "-10.00", "COFFEE"));
        assert_eq!(result.status, DuplicateStatus::ExactDuplicate);
        assert_eq!(result.duplicate_of, Some(42));
    }

    #[test]
    fn test_external_id_with_different_amount_is_potential() {
        let ledger = vec![ledger_tx(42, Some("FIT1"), 5, "-10.00", "COFFEE")];
        let classifier = DuplicateClassifier::new(&ledger, &[]);

        let result = classifier.classify(&candidate("FIT1", 5, "-12.00", "COFFEE"));
        assert_eq!(result.status, DuplicateStatus::PotentialDuplicate);
        assert_eq!(result.duplicate_of, Some(42));
    }

    #[test]
    fn test_external_id_with_different_date_or_payee_is_potential() {
        let ledger = vec![ledger_tx(42, Some("FIT1"), 5, "-10.00", "COFFEE")];
        let classifier = DuplicateClassifier::new(&ledger, &[]);

        assert_eq!(
            classifier.classify(&candidate("FIT1", 6, "-10.00", "COFFEE")).status,
            DuplicateStatus::PotentialDuplicate
        );
        assert_eq!(
            classifier.classify(&candidate("FIT1", 5, "-10.00", "TEA")).status,
            DuplicateStatus::PotentialDuplicate
        );
    }

    #[test]
    fn test_content_match_ignores_payee_case() {
        let ledger = vec![ledger_tx(7, None, 5, "-10.0", "Coffee Shop")];
        let classifier = DuplicateClassifier::new(&ledger, &[]);

        let result = classifier.classify(&candidate("NEW-ID", 5, "-10.00", "COFFEE SHOP"));
        assert_eq!(result.status, DuplicateStatus::ExactDuplicate);
        assert_eq!(result.duplicate_of, Some(7));
    }

    #[test]
    fn test_content_mismatch_is_new() {
        let ledger = vec![ledger_tx(7, Some("A"), 5, "-10.00", "COFFEE")];
        let classifier = DuplicateClassifier::new(&ledger, &[]);

        let result = classifier.classify(&candidate("B", 5, "-10.01", "COFFEE"));
        assert_eq!(result.status, DuplicateStatus::New);
        assert_eq!(result.duplicate_of, None);
    }

    #[test]
    fn test_lowest_ledger_id_wins() {
        let ledger = vec![
            ledger_tx(9, Some("FIT1"), 5, "-10.00", "COFFEE"),
            ledger_tx(3, Some("FIT1"), 5, "-10.00", "COFFEE"),
        ];
        let classifier = DuplicateClassifier::new(&ledger, &[]);
        assert_eq!(
            classifier.classify(&candidate("FIT1", 5, "-10.00", "COFFEE")).duplicate_of,
            Some(3)
        );
    }

    #[test]
    fn test_already_staged_by_external_id() {
        let staged = vec![StagedImportItem {
            id: 11,
            tenant_id: TenantId::from("t1"),
            date: date(5),
            amount: dec("-10.00"),
            payee: "COFFEE".to_string(),
            memo: None,
            source: "Bank".to_string(),
            external_id: "FIT1".to_string(),
            external_id_derived: false,
            duplicate_status: DuplicateStatus::New,
            duplicate_of: None,
            is_selected: true,
            category: None,
            created_at: Utc::now(),
        }];
        let classifier = DuplicateClassifier::new(&[], &staged);

        assert_eq!(
            classifier.already_staged(&candidate("FIT1", 5, "-10.00", "COFFEE")),
            Some(11)
        );
        assert_eq!(
            classifier.already_staged(&candidate("FIT2", 5, "-10.00", "COFFEE")),
            None
        );
        // Pending items never count as ledger duplicates
        assert_eq!(
            classifier.classify(&candidate("FIT1", 5, "-10.00", "COFFEE")).status,
            DuplicateStatus::New
        );
    }
}
