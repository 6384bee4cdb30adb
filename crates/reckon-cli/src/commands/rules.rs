//! Payee rule command implementations

use anyhow::Result;
use chrono::Local;
use reckon_core::models::{NewPayeeRule, TenantId};

use super::{truncate, Service};

fn kind_label(is_regex: bool) -> &'static str {
    if is_regex {
        "regex"
    } else {
        "substring"
    }
}

pub fn cmd_rules_list(service: &Service, tenant: &TenantId) -> Result<()> {
    let rules = service.list_rules(tenant)?;

    if rules.is_empty() {
        println!("No rules defined. Add one with:");
        println!("  reckon rules add <category> <pattern> [--regex]");
        return Ok(());
    }

    println!();
    println!("📋 Payee Rules (most recently modified first)");
    println!("   ─────────────────────────────────────────────────────────────────────");
    println!(
        "   {:>4} │ {:20} │ {:9} │ {:>6} │ {:10} │ {}",
        "ID", "Category", "Type", "Uses", "Last used", "Pattern"
    );
    println!("   ─────┼──────────────────────┼───────────┼────────┼────────────┼──────────────");

    for rule in rules {
        let last_used = rule
            .last_used_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "   {:>4} │ {:20} │ {:9} │ {:>6} │ {:10} │ {}",
            rule.id,
            truncate(&rule.category, 20),
            kind_label(rule.is_regex),
            rule.match_count,
            last_used,
            truncate(&rule.pattern, 40)
        );
    }

    Ok(())
}

pub fn cmd_rules_add(
    service: &Service,
    tenant: &TenantId,
    category: &str,
    pattern: &str,
    is_regex: bool,
) -> Result<()> {
    let rule = service.create_rule(
        tenant,
        &NewPayeeRule {
            pattern: pattern.to_string(),
            is_regex,
            category: category.to_string(),
        },
    )?;

    println!(
        "✅ Created rule #{}: {} ({}) -> {}",
        rule.id,
        rule.pattern,
        kind_label(rule.is_regex),
        rule.category
    );

    Ok(())
}

/// Change the given fields of a rule, keeping the rest
pub fn cmd_rules_edit(
    service: &Service,
    tenant: &TenantId,
    id: i64,
    pattern: Option<&str>,
    category: Option<&str>,
    is_regex: Option<bool>,
) -> Result<()> {
    let existing = service.get_rule(tenant, id)?;

    let edited = NewPayeeRule {
        pattern: pattern.map(String::from).unwrap_or(existing.pattern),
        is_regex: is_regex.unwrap_or(existing.is_regex),
        category: category.map(String::from).unwrap_or(existing.category),
    };
    let rule = service.update_rule(tenant, id, &edited)?;

    println!(
        "✅ Updated rule #{}: {} ({}) -> {}",
        rule.id,
        rule.pattern,
        kind_label(rule.is_regex),
        rule.category
    );

    Ok(())
}

pub fn cmd_rules_delete(service: &Service, tenant: &TenantId, id: i64) -> Result<()> {
    service.delete_rule(tenant, id)?;
    println!("✅ Deleted rule #{}", id);

    Ok(())
}

pub fn cmd_rules_test(service: &Service, tenant: &TenantId, payee: &str) -> Result<()> {
    let matches = service.test_rules(tenant, payee)?;
    let outcome = service.explain(tenant, payee)?;

    for error in &outcome.errors {
        println!("⚠️  Skipped {}", error);
    }

    if matches.is_empty() {
        println!("No rules match \"{}\"", payee);
        return Ok(());
    }

    println!();
    println!("🔍 Rules matching \"{}\":", payee);
    println!("   ─────────────────────────────────────────────────────────────");

    for m in &matches {
        println!(
            "   {} Rule #{} -> {} ({}: {})",
            if m.wins { "★" } else { " " },
            m.rule.id,
            m.rule.category,
            m.kind.as_str(),
            m.rule.pattern
        );
    }

    if let Some(category) = outcome.category() {
        println!();
        println!("   Category: {}", category);
    }

    Ok(())
}
