//! CSV import command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use reckon_core::models::{AccountDescriptor, ImportBatchResult, TenantId};
use reckon_core::{CancelToken, CsvDecoder, CsvFormat, Error};
use tracing::warn;

use super::Service;

/// Decode a bank CSV and stage its records for review
///
/// The batch runs on a blocking thread; Ctrl-C cancels it before anything is staged.
pub async fn cmd_import(
    service: Arc<Service>,
    tenant: &TenantId,
    file: &Path,
    account: AccountDescriptor,
    format: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut decoder = CsvDecoder::new(account);
    if let Some(format) = format {
        let format: CsvFormat = format.parse().map_err(|e: String| {
            anyhow::anyhow!("{}\nSpecify --format with one of: chase, bofa, capitalone, generic", e)
        })?;
        decoder = decoder.with_format(format);
    }

    let decoded = decoder
        .decode_path(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if !json {
        println!("📥 Importing {} from {}...", decoded.format, file.display());
        println!("   Found {} records", decoded.records.len());
    }

    let cancel = CancelToken::new();
    let mut worker = {
        let service = Arc::clone(&service);
        let tenant = tenant.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || service.import_decoded(&tenant, &decoded, &cancel))
    };

    let joined = tokio::select! {
        joined = &mut worker => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, cancelling import");
            cancel.cancel();
            worker.await
        }
    };

    let result = match joined.context("Import worker failed")? {
        Ok(result) => result,
        Err(Error::Cancelled) => {
            println!("⏹️  Import cancelled, nothing was staged");
            return Ok(());
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Import failed")),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_import_result(&result);
    }

    Ok(())
}

fn print_import_result(result: &ImportBatchResult) {
    println!("✅ Staged {} items for review", result.staged_count);
    println!("   New: {}", result.new_count);
    println!("   Exact duplicates: {}", result.exact_duplicate_count);
    if result.potential_duplicate_count > 0 {
        println!(
            "   ⚠️  Potential duplicates: {} (review before accepting)",
            result.potential_duplicate_count
        );
    }
    if result.already_staged > 0 {
        println!("   Already pending: {}", result.already_staged);
    }
    if result.categorized_count > 0 {
        println!("   🏷️  Categorized by rules: {}", result.categorized_count);
    }

    if result.error_count > 0 {
        println!();
        println!("❌ {} records could not be imported:", result.error_count);
        for error in &result.errors {
            println!("   {}", error);
        }
    }

    if !result.rule_errors.is_empty() {
        println!();
        println!("⚠️  Some rules could not be evaluated:");
        for error in &result.rule_errors {
            println!("   {}", error);
        }
    }

    println!();
    println!("Next: reckon review");
}
