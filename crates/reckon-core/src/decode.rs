//! CSV decoder for common bank exports
//!
//! Formats are recognized from the header row; columns are then located by
//! name, so reordered or extra columns are fine. Rows that cannot be decoded
//! become per-row errors and the rest of the file is still returned.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, RecordError, Result};
use crate::models::{AccountDescriptor, RawBankRecord};

/// Recognized CSV layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvFormat {
    /// Transaction Date,Post Date,Description,Category,Type,Amount,Memo
    Chase,
    /// Date,Description,Amount,Running Bal.
    Bofa,
    /// Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit
    CapitalOne,
    /// Date,Name,Memo,Amount,Id (name may be "Payee", id may be "FITID")
    Generic,
}

impl CsvFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chase => "chase",
            Self::Bofa => "bofa",
            Self::CapitalOne => "capitalone",
            Self::Generic => "generic",
        }
    }

    /// Institution name used when the caller did not supply one
    pub fn institution(&self) -> Option<&'static str> {
        match self {
            Self::Chase => Some("Chase"),
            Self::Bofa => Some("Bank of America"),
            Self::CapitalOne => Some("Capital One"),
            Self::Generic => None,
        }
    }
}

impl FromStr for CsvFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "chase" => Ok(Self::Chase),
            "bofa" | "bankofamerica" => Ok(Self::Bofa),
            "capitalone" => Ok(Self::CapitalOne),
            "generic" => Ok(Self::Generic),
            _ => Err(format!("Unknown CSV format: {}", s)),
        }
    }
}

impl std::fmt::Display for CsvFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column positions for one file
#[derive(Debug, Default)]
struct Columns {
    date: usize,
    name: Option<usize>,
    memo: Option<usize>,
    amount: Option<usize>,
    debit: Option<usize>,
    credit: Option<usize>,
    id: Option<usize>,
    card: Option<usize>,
}

fn find(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().trim_start_matches('\u{feff}').to_lowercase();
        names.iter().any(|n| h == *n)
    })
}

/// Detect the format from a header row
///
/// Returns None if the format is not recognized.
pub fn detect_format(headers: &StringRecord) -> Option<CsvFormat> {
    let has = |names: &[&str]| find(headers, names).is_some();

    // "Posted Date" with 'ed' distinguishes Capital One from Chase's "Post Date"
    if has(&["posted date"]) && has(&["debit"]) && has(&["credit"]) {
        return Some(CsvFormat::CapitalOne);
    }
    if has(&["transaction date"]) && has(&["post date"]) && has(&["description"]) {
        return Some(CsvFormat::Chase);
    }
    if has(&["date"]) && has(&["description"]) && has(&["amount"]) {
        return Some(CsvFormat::Bofa);
    }
    if has(&["date"]) && has(&["amount"]) && has(&["name", "payee", "memo"]) {
        return Some(CsvFormat::Generic);
    }
    None
}

fn columns_for(format: CsvFormat, headers: &StringRecord) -> Result<Columns> {
    let missing = |col: &str| Error::Import(format!("{} CSV is missing the {} column", format, col));

    let columns = match format {
        CsvFormat::Chase => Columns {
            date: find(headers, &["transaction date"]).ok_or_else(|| missing("Transaction Date"))?,
            name: find(headers, &["description"]),
            memo: find(headers, &["memo"]),
            amount: Some(find(headers, &["amount"]).ok_or_else(|| missing("Amount"))?),
            ..Columns::default()
        },
        CsvFormat::Bofa => Columns {
            date: find(headers, &["date"]).ok_or_else(|| missing("Date"))?,
            name: find(headers, &["description"]),
            amount: Some(find(headers, &["amount"]).ok_or_else(|| missing("Amount"))?),
            ..Columns::default()
        },
        CsvFormat::CapitalOne => Columns {
            date: find(headers, &["transaction date"]).ok_or_else(|| missing("Transaction Date"))?,
            name: find(headers, &["description"]),
            debit: Some(find(headers, &["debit"]).ok_or_else(|| missing("Debit"))?),
            credit: Some(find(headers, &["credit"]).ok_or_else(|| missing("Credit"))?),
            card: find(headers, &["card no.", "card no"]),
            ..Columns::default()
        },
        CsvFormat::Generic => Columns {
            date: find(headers, &["date"]).ok_or_else(|| missing("Date"))?,
            name: find(headers, &["name", "payee"]),
            memo: find(headers, &["memo"]),
            amount: Some(find(headers, &["amount"]).ok_or_else(|| missing("Amount"))?),
            id: find(headers, &["id", "fitid", "transaction id"]),
            ..Columns::default()
        },
    };
    Ok(columns)
}

/// Records decoded from one file
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    pub format: CsvFormat,
    pub records: Vec<RawBankRecord>,
    /// Data row (zero-based, header excluded) each record came from
    pub rows: Vec<usize>,
    pub errors: Vec<RecordError>,
}

/// Decodes bank CSV exports into raw records
#[derive(Debug, Clone, Default)]
pub struct CsvDecoder {
    account: AccountDescriptor,
    format: Option<CsvFormat>,
}

impl CsvDecoder {
    pub fn new(account: AccountDescriptor) -> Self {
        Self {
            account,
            format: None,
        }
    }

    /// Skip detection and force a format
    pub fn with_format(mut self, format: CsvFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn decode_path(&self, path: &Path) -> Result<DecodedBatch> {
        let file = File::open(path)?;
        self.decode(file)
    }

    pub fn decode<R: Read>(&self, reader: R) -> Result<DecodedBatch> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(Error::Import("CSV file has no header row".into()));
        }

        let format = match self.format {
            Some(format) => format,
            None => detect_format(&headers).ok_or_else(|| {
                Error::Import(format!(
                    "Unrecognized CSV header: {}",
                    headers.iter().collect::<Vec<_>>().join(",")
                ))
            })?,
        };
        let columns = columns_for(format, &headers)?;
        debug!("Decoding {} CSV ({} columns)", format, headers.len());

        let mut batch = DecodedBatch {
            format,
            records: Vec::new(),
            rows: Vec::new(),
            errors: Vec::new(),
        };

        for (row, result) in rdr.records().enumerate() {
            let decoded = result
                .map_err(|e| RecordError {
                    row,
                    raw_date: None,
                    message: e.to_string(),
                })
                .and_then(|record| self.decode_row(format, &columns, row, &record));

            match decoded {
                Ok(Some(record)) => {
                    batch.records.push(record);
                    batch.rows.push(row);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping CSV row: {}", e);
                    batch.errors.push(e);
                }
            }
        }

        debug!(
            "Decoded {} {} records ({} rows failed)",
            batch.records.len(),
            format,
            batch.errors.len()
        );
        Ok(batch)
    }

    /// Ok(None) for blank lines
    fn decode_row(
        &self,
        format: CsvFormat,
        columns: &Columns,
        row: usize,
        record: &StringRecord,
    ) -> std::result::Result<Option<RawBankRecord>, RecordError> {
        if record.iter().all(|f| f.trim().is_empty()) {
            return Ok(None);
        }

        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let raw_date = field(Some(columns.date));
        let fail = |message: String| RecordError {
            row,
            raw_date: raw_date.map(String::from),
            message,
        };

        let date = raw_date
            .ok_or_else(|| fail("missing date".to_string()))
            .and_then(|s| parse_date(s).map_err(fail))?;

        let amount = match (columns.amount, columns.debit, columns.credit) {
            (Some(_), _, _) => field(columns.amount)
                .ok_or_else(|| fail("missing amount".to_string()))
                .and_then(|s| parse_amount(s).map_err(fail))?,
            // Debits are money out, credits money in
            (None, debit, credit) => match (field(debit), field(credit)) {
                (Some(d), _) => -parse_amount(d).map_err(fail)?,
                (None, Some(c)) => parse_amount(c).map_err(fail)?,
                (None, None) => return Err(fail("row has neither debit nor credit".to_string())),
            },
        };

        let mut account = self.account.clone();
        if account.institution.is_none() {
            account.institution = format.institution().map(String::from);
        }
        if account.account_id.is_none() {
            account.account_id = field(columns.card).map(String::from);
        }

        Ok(Some(RawBankRecord {
            date,
            amount,
            name: field(columns.name).map(String::from),
            memo: field(columns.memo).map(String::from),
            bank_id: field(columns.id).map(String::from),
            account,
        }))
    }
}

/// Parse a date in any of the common bank export formats
///
/// Month-first dates are read by the width of their year segment, so
/// "01/15/24" is 2024 rather than the year 24.
pub fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    let s = s.trim();

    let segments: Vec<&str> = s.split(['/', '-']).collect();
    let short_year = matches!(segments.as_slice(), [m, _, y] if m.len() <= 2 && y.len() == 2);

    let formats: &[&str] = if short_year {
        &[
            "%m/%d/%y", // 01/15/24
            "%m-%d-%y", // 01-15-24
        ]
    } else {
        &[
            "%m/%d/%Y", // 01/15/2024
            "%Y-%m-%d", // 2024-01-15
            "%m-%d-%Y", // 01-15-2024
            "%Y%m%d",   // 20240115
        ]
    };

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(format!("unable to parse date: {}", s))
}

/// Parse an amount, handling currency symbols, commas and parenthesized negatives
pub fn parse_amount(s: &str) -> std::result::Result<Decimal, String> {
    let cleaned: String = s
        .trim()
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    Decimal::from_str(&cleaned).map_err(|_| format!("unable to parse amount: {}", s))
}
