//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reckon - Review bank imports before they reach your ledger
#[derive(Parser)]
#[command(name = "reckon")]
#[command(about = "Import review and categorization for bank transactions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "reckon.db", global = true)]
    pub db: PathBuf,

    /// Config file (defaults to the data dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tenant whose ledger, queue and rules to use
    #[arg(long, default_value = "default", global = true)]
    pub tenant: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set RECKON_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Stage transactions from a bank CSV export for review
    ///
    /// Press Ctrl-C while the batch is processing to cancel; nothing is staged.
    Import {
        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Institution name (defaults to the one implied by the CSV format)
        #[arg(long)]
        institution: Option<String>,

        /// Account type, e.g. checking or credit_card
        #[arg(long)]
        account_type: Option<String>,

        /// Account identifier, e.g. the last four digits
        #[arg(long)]
        account_id: Option<String>,

        /// CSV format: chase, bofa, capitalone, generic (auto-detected if not specified)
        #[arg(long)]
        format: Option<String>,

        /// Print the import result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show pending items awaiting review
    Review {
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: u32,

        /// Items per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u32>,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Select or deselect pending items
    Select {
        /// Item keys as shown by `reckon review`
        keys: Vec<i64>,

        /// Deselect instead of select
        #[arg(long)]
        off: bool,

        /// Apply to every item with this status: new, exact, potential
        #[arg(long, conflicts_with_all = ["keys", "all"])]
        status: Option<String>,

        /// Apply to every pending item
        #[arg(long, conflicts_with = "keys")]
        all: bool,
    },

    /// Discard specific pending items without accepting them
    Discard {
        /// Item keys as shown by `reckon review`
        #[arg(required = true)]
        keys: Vec<i64>,
    },

    /// Move selected items into the ledger
    Accept,

    /// Discard every pending item
    Clear,

    /// Manage payee categorization rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules, most recently modified first
    List,

    /// Add a new rule
    Add {
        /// Category to assign when the rule matches
        category: String,
        /// Text to look for in the payee (case-insensitive)
        pattern: String,
        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
    },

    /// Change an existing rule
    Edit {
        /// Rule ID
        id: i64,
        /// New pattern
        #[arg(long)]
        pattern: Option<String>,
        /// New category
        #[arg(long)]
        category: Option<String>,
        /// Make the rule a regular expression
        #[arg(long, conflicts_with = "substring")]
        regex: bool,
        /// Make the rule a plain substring match
        #[arg(long)]
        substring: bool,
    },

    /// Delete a rule
    Delete {
        /// Rule ID to delete
        id: i64,
    },

    /// Test which rules match a payee
    Test {
        /// Payee text to test
        payee: String,
    },
}
