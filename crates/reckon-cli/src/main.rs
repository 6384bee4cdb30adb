//! Reckon CLI - Review bank imports before they reach your ledger
//!
//! Usage:
//!   reckon init                     Initialize database
//!   reckon import --file CSV        Stage a bank export (auto-detects format)
//!   reckon review                   Page through pending items
//!   reckon select --status new      Choose what to accept
//!   reckon accept                   Move selected items into the ledger
//!   reckon rules add CAT PATTERN    Categorize payees automatically

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use reckon_core::models::{AccountDescriptor, TenantId};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    run(cli).await
}

/// Dispatch a parsed command line
async fn run(cli: Cli) -> Result<()> {
    let tenant = TenantId::new(cli.tenant.as_str());
    // Init creates the database itself; every other command opens it first
    let service = || commands::open_service(&cli.db, cli.config.as_deref(), cli.no_encrypt);

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.config.as_deref(), cli.no_encrypt),
        Commands::Import {
            file,
            institution,
            account_type,
            account_id,
            format,
            json,
        } => {
            let account = AccountDescriptor {
                institution,
                account_type,
                account_id,
            };
            commands::cmd_import(service()?, &tenant, &file, account, format.as_deref(), json).await
        }
        Commands::Review {
            page,
            page_size,
            json,
        } => commands::cmd_review(&*service()?, &tenant, page, page_size, json),
        Commands::Select {
            keys,
            off,
            status,
            all,
        } => commands::cmd_select(&*service()?, &tenant, &keys, status.as_deref(), all, off),
        Commands::Discard { keys } => commands::cmd_discard(&*service()?, &tenant, &keys),
        Commands::Accept => commands::cmd_accept(&*service()?, &tenant),
        Commands::Clear => commands::cmd_clear(&*service()?, &tenant),
        Commands::Rules { action } => match action {
            None | Some(RulesAction::List) => commands::cmd_rules_list(&*service()?, &tenant),
            Some(RulesAction::Add {
                category,
                pattern,
                regex,
            }) => commands::cmd_rules_add(&*service()?, &tenant, &category, &pattern, regex),
            Some(RulesAction::Edit {
                id,
                pattern,
                category,
                regex,
                substring,
            }) => {
                let is_regex = match (regex, substring) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                commands::cmd_rules_edit(
                    &*service()?,
                    &tenant,
                    id,
                    pattern.as_deref(),
                    category.as_deref(),
                    is_regex,
                )
            }
            Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&*service()?, &tenant, id),
            Some(RulesAction::Test { payee }) => commands::cmd_rules_test(&*service()?, &tenant, &payee),
        },
    }
}
