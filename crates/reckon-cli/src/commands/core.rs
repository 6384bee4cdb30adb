//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `open_service` - Database plus configuration, ready for tenant operations
//! - `cmd_init` - Initialize the database

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use reckon_core::config::default_config_path;
use reckon_core::{Database, ImportService, ReckonConfig};

pub type Service = ImportService<Database>;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn load_config(config_path: Option<&Path>) -> Result<ReckonConfig> {
    ReckonConfig::load(config_path).context("Failed to load configuration")
}

/// Open the database and wrap it in a shareable service
pub fn open_service(
    db_path: &Path,
    config_path: Option<&Path>,
    no_encrypt: bool,
) -> Result<Arc<Service>> {
    let db = open_db(db_path, no_encrypt)?;
    let config = load_config(config_path)?;
    Ok(Arc::new(ImportService::new(db, config)))
}

pub fn cmd_init(db_path: &Path, config_path: Option<&Path>, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;
    let config = load_config(config_path)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    match config_path {
        Some(path) => println!("   ⚙️  Config: {}", path.display()),
        None => match default_config_path() {
            Some(path) if path.exists() => println!("   ⚙️  Config: {}", path.display()),
            _ => println!("   ⚙️  Config: built-in defaults"),
        },
    }
    println!(
        "   Review pages: {} items (max {})",
        config.review.default_page_size, config.review.max_page_size
    );

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add categorization rules: reckon rules add Groceries \"WHOLE FOODS\"");
    println!("  2. Stage a bank export:      reckon import --file statement.csv");
    println!("  3. Review and accept:        reckon review && reckon accept");

    Ok(())
}
