//! Reckon Core Library
//!
//! Import review and categorization for bank transaction batches:
//! - CSV decoding for common bank exports
//! - Normalization of raw records into transaction candidates
//! - Duplicate classification against the ledger
//! - Payee rule matching for automatic categorization
//! - A durable, per-tenant review queue and atomic acceptance into the ledger
//! - SQLite (SQLCipher) storage and migrations

pub mod accept;
pub mod concurrency;
pub mod config;
pub mod db;
pub mod decode;
pub mod duplicates;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod review;
pub mod rules;
pub mod service;
pub mod store;

pub use accept::AcceptanceCommitter;
pub use concurrency::{CancelToken, TenantLocks};
pub use config::ReckonConfig;
pub use db::Database;
pub use decode::{CsvDecoder, CsvFormat, DecodedBatch};
pub use duplicates::{Classification, DuplicateClassifier};
pub use error::{Error, FieldError, MatchEngineError, RecordError, Result};
pub use normalize::Normalizer;
pub use pipeline::ImportPipeline;
pub use review::{MergeSummary, ReviewQueue};
pub use rules::{MatchKind, MatchOutcome, PayeeRuleMatcher, RuleHit, RuleUsageTally};
pub use service::{ImportService, RuleTestMatch};
pub use store::{LedgerStore, ReviewStore, RuleStore};
