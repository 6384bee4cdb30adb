//! Review queue command implementations

use anyhow::{bail, Result};
use reckon_core::models::{
    DuplicateStatus, ReviewPage, ReviewSummary, SelectionResult, StagedImportItem, TenantId,
};

use super::{truncate, Service};

fn status_label(status: DuplicateStatus) -> &'static str {
    match status {
        DuplicateStatus::New => "new",
        DuplicateStatus::ExactDuplicate => "duplicate",
        DuplicateStatus::PotentialDuplicate => "⚠️ check",
    }
}

fn print_summary(summary: &ReviewSummary) {
    println!(
        "   {} pending, {} selected ({} new, {} duplicates, {} potential duplicates)",
        summary.total,
        summary.selected,
        summary.new,
        summary.exact_duplicate,
        summary.potential_duplicate
    );
}

fn print_item(item: &StagedImportItem) {
    println!(
        "   {:>6} │ {} │ {:10} │ {} │ {:>10} │ {:30} │ {}",
        item.id,
        if item.is_selected { "[x]" } else { "[ ]" },
        status_label(item.duplicate_status),
        item.date,
        item.amount,
        truncate(&item.payee, 30),
        item.category.as_deref().unwrap_or("-")
    );
    if item.needs_attention() {
        if let Some(ledger_id) = item.duplicate_of {
            println!(
                "          └─ same bank id as ledger #{} with different details",
                ledger_id
            );
        }
    }
}

fn print_page(page: &ReviewPage) {
    println!();
    println!(
        "📋 Pending review (page {} of {})",
        page.page,
        page.total_pages.max(1)
    );
    print_summary(&page.summary);
    println!("   ──────────────────────────────────────────────────────────────────────────────");
    println!(
        "   {:>6} │ Sel │ {:10} │ {:10} │ {:>10} │ {:30} │ {}",
        "Key", "Status", "Date", "Amount", "Payee", "Category"
    );
    println!("   ───────┼─────┼────────────┼────────────┼────────────┼────────────────────────────────┼──────────");

    for item in &page.items {
        print_item(item);
    }

    if page.page < page.total_pages {
        println!();
        println!("   More: reckon review --page {}", page.page + 1);
    }
}

fn print_not_found(result: &SelectionResult) {
    if !result.not_found.is_empty() {
        let keys: Vec<String> = result.not_found.iter().map(|k| k.to_string()).collect();
        println!("   ⚠️  Not pending: {}", keys.join(", "));
    }
}

pub fn cmd_review(
    service: &Service,
    tenant: &TenantId,
    page: u32,
    page_size: Option<u32>,
    json: bool,
) -> Result<()> {
    let page = service.list_review(tenant, page, page_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.summary.total == 0 {
        println!("Nothing pending. Stage a bank export with:");
        println!("  reckon import --file statement.csv");
        return Ok(());
    }

    print_page(&page);
    Ok(())
}

pub fn cmd_select(
    service: &Service,
    tenant: &TenantId,
    keys: &[i64],
    status: Option<&str>,
    all: bool,
    deselect: bool,
) -> Result<()> {
    let is_selected = !deselect;
    let verb = if is_selected { "Selected" } else { "Deselected" };

    if let Some(status) = status {
        let status: DuplicateStatus = status
            .parse()
            .map_err(|e: String| anyhow::anyhow!("{} (valid: new, exact, potential)", e))?;
        let updated = service.select_by_status(tenant, status, is_selected)?;
        println!("✅ {} {} {} items", verb, updated, status);
    } else if all {
        let updated = service.select_all(tenant, is_selected)?;
        println!("✅ {} all {} pending items", verb, updated);
    } else if keys.is_empty() {
        bail!("Give item keys, --status or --all");
    } else {
        let result = service.set_selection(tenant, keys, is_selected)?;
        println!("✅ {} {} items", verb, result.updated);
        print_not_found(&result);
    }

    print_summary(&service.review_summary(tenant)?);
    Ok(())
}

pub fn cmd_discard(service: &Service, tenant: &TenantId, keys: &[i64]) -> Result<()> {
    let result = service.delete_items(tenant, keys)?;
    println!("🗑️  Discarded {} items", result.updated);
    print_not_found(&result);

    Ok(())
}

pub fn cmd_accept(service: &Service, tenant: &TenantId) -> Result<()> {
    let result = service.accept(tenant)?;

    if result.accepted_count == 0 {
        println!("Nothing selected. Select items with:");
        println!("  reckon select <keys...>  or  reckon select --status new");
        return Ok(());
    }

    println!(
        "✅ Accepted {} transactions into the ledger",
        result.accepted_count
    );
    if result.remaining_count > 0 {
        println!(
            "   {} unselected items are still pending",
            result.remaining_count
        );
    }

    Ok(())
}

pub fn cmd_clear(service: &Service, tenant: &TenantId) -> Result<()> {
    let deleted = service.delete_all_pending(tenant)?;
    println!("🗑️  Discarded {} pending items", deleted);

    Ok(())
}
