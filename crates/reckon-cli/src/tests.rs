//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use reckon_core::models::{AccountDescriptor, DuplicateStatus, TenantId};
use reckon_core::{Database, ImportService, LedgerStore, ReckonConfig, ReviewStore, RuleStore};
use clap::Parser;
use tempfile::TempDir;

use crate::cli::Cli;
use crate::commands::{self, truncate, Service};

fn setup_test_service() -> Arc<Service> {
    let db = Database::in_memory().unwrap();
    let config = ReckonConfig::embedded().unwrap();
    Arc::new(ImportService::new(db, config))
}

fn tenant() -> TenantId {
    TenantId::from("household")
}

fn checking() -> AccountDescriptor {
    AccountDescriptor {
        institution: Some("Acme Bank".to_string()),
        account_type: Some("checking".to_string()),
        account_id: Some("1234".to_string()),
    }
}

/// Write a generic-format CSV to a temp dir, returning (dir guard, path)
fn write_csv(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("statement.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    (dir, path)
}

const STATEMENT: &str = "Date,Name,Memo,Amount,Id
2024-03-01,WHOLE FOODS MARKET #123,,-54.20,T1
2024-03-02,SHELL OIL 5551,,-38.00,T2
2024-03-03,PAYROLL ACME CORP,March,2500.00,T3
2024-03-04,NETFLIX.COM,,-15.49,T4
";

async fn import_statement(service: &Arc<Service>, csv: &str) {
    let (_dir, path) = write_csv(csv);
    commands::cmd_import(
        Arc::clone(service),
        &tenant(),
        &path,
        checking(),
        None,
        false,
    )
    .await
    .unwrap();
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer payee name", 10), "a much ...");
    // Multibyte characters are never split
    assert_eq!(truncate("CAFÉ ÉTOILE PARIS", 8), "CAFÉ ...");
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_creates_database() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reckon.db");

    commands::cmd_init(&db_path, None, true).unwrap();
    assert!(db_path.exists());

    let db = commands::open_db(&db_path, true).unwrap();
    assert!(!db.is_encrypted().unwrap());
}

#[tokio::test]
async fn test_run_dispatches_init_and_service_commands() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reckon.db");
    let db_arg = db_path.to_str().unwrap();
    let parse = |command: &[&str]| {
        let mut args = vec!["reckon", "--db", db_arg, "--no-encrypt", "--tenant", "household"];
        args.extend_from_slice(command);
        Cli::try_parse_from(args).unwrap()
    };

    crate::run(parse(&["init"])).await.unwrap();
    assert!(db_path.exists());

    crate::run(parse(&["rules", "add", "Groceries", "WHOLE FOODS"]))
        .await
        .unwrap();
    crate::run(parse(&["accept"])).await.unwrap();

    let db = commands::open_db(&db_path, true).unwrap();
    let rules = db.payee_rules(&tenant()).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].category, "Groceries");
}

#[test]
fn test_open_service_with_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("reckon.db");
    let missing = dir.path().join("nope.toml");

    assert!(commands::open_service(&db_path, Some(&missing), true).is_err());
}

// ========== Import Command Tests ==========

#[tokio::test]
async fn test_cmd_import_stages_items() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;

    let summary = service.review_summary(&tenant()).unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.new, 4);
    assert_eq!(summary.selected, 4);

    // Nothing reaches the ledger before acceptance
    assert_eq!(
        service.store().count_ledger_transactions(&tenant()).unwrap(),
        0
    );

    let items = service.store().staged_items(&tenant()).unwrap();
    assert_eq!(items[0].source, "Acme Bank - Checking 1234");
}

#[tokio::test]
async fn test_cmd_import_categorizes_with_rules() {
    let service = setup_test_service();
    commands::cmd_rules_add(&service, &tenant(), "Groceries", "whole foods", false).unwrap();
    commands::cmd_rules_add(&service, &tenant(), "Fuel", r"^SHELL\b", true).unwrap();

    import_statement(&service, STATEMENT).await;

    let items = service.store().staged_items(&tenant()).unwrap();
    let category = |payee_prefix: &str| {
        items
            .iter()
            .find(|i| i.payee.starts_with(payee_prefix))
            .and_then(|i| i.category.clone())
    };
    assert_eq!(category("WHOLE FOODS").as_deref(), Some("Groceries"));
    assert_eq!(category("SHELL").as_deref(), Some("Fuel"));
    assert_eq!(category("NETFLIX"), None);
}

#[tokio::test]
async fn test_cmd_import_reports_bad_rows_and_keeps_good_ones() {
    let service = setup_test_service();
    import_statement(
        &service,
        "Date,Name,Memo,Amount,Id
2024-03-01,WHOLE FOODS,,-54.20,T1
not-a-date,BROKEN,,-1.00,T2
2024-03-03,PAYROLL,,abc,T3
",
    )
    .await;

    let summary = service.review_summary(&tenant()).unwrap();
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn test_cmd_import_twice_is_idempotent() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;
    import_statement(&service, STATEMENT).await;

    assert_eq!(service.review_summary(&tenant()).unwrap().total, 4);
}

#[tokio::test]
async fn test_cmd_import_marks_ledger_duplicates() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;
    commands::cmd_accept(&service, &tenant()).unwrap();

    // Same bank ids again, one with a changed amount
    import_statement(
        &service,
        "Date,Name,Memo,Amount,Id
2024-03-01,WHOLE FOODS MARKET #123,,-54.20,T1
2024-03-02,SHELL OIL 5551,,-40.00,T2
2024-03-05,SPOTIFY,,-9.99,T5
",
    )
    .await;

    let summary = service.review_summary(&tenant()).unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.exact_duplicate, 1);
    assert_eq!(summary.potential_duplicate, 1);
    assert_eq!(summary.new, 1);
    // Only the new item starts selected
    assert_eq!(summary.selected, 1);
}

#[tokio::test]
async fn test_cmd_import_unknown_format_fails() {
    let service = setup_test_service();
    let (_dir, path) = write_csv(STATEMENT);

    let result = commands::cmd_import(
        Arc::clone(&service),
        &tenant(),
        &path,
        checking(),
        Some("monzo"),
        false,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_import_unrecognized_header_fails() {
    let service = setup_test_service();
    let (_dir, path) = write_csv("Foo,Bar\n1,2\n");

    let result = commands::cmd_import(
        Arc::clone(&service),
        &tenant(),
        &path,
        checking(),
        None,
        true,
    )
    .await;
    assert!(result.is_err());
    assert_eq!(service.review_summary(&tenant()).unwrap().total, 0);
}

// ========== Review Command Tests ==========

#[tokio::test]
async fn test_cmd_review_pages() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;

    assert!(commands::cmd_review(&service, &tenant(), 1, Some(2), false).is_ok());
    assert!(commands::cmd_review(&service, &tenant(), 2, Some(2), true).is_ok());
    // Page 0 is treated as the first page
    assert!(commands::cmd_review(&service, &tenant(), 0, None, false).is_ok());
}

#[test]
fn test_cmd_review_empty_queue() {
    let service = setup_test_service();
    assert!(commands::cmd_review(&service, &tenant(), 1, None, false).is_ok());
}

#[tokio::test]
async fn test_cmd_select_by_keys_and_status() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;
    let keys: Vec<i64> = service
        .store()
        .staged_items(&tenant())
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();

    commands::cmd_select(&service, &tenant(), &keys[..2], None, false, true).unwrap();
    assert_eq!(service.review_summary(&tenant()).unwrap().selected, 2);

    // Unknown keys are reported, not fatal
    commands::cmd_select(&service, &tenant(), &[keys[0], 99_999], None, false, false).unwrap();
    assert_eq!(service.review_summary(&tenant()).unwrap().selected, 3);

    commands::cmd_select(&service, &tenant(), &[], Some("new"), false, true).unwrap();
    assert_eq!(service.review_summary(&tenant()).unwrap().selected, 0);

    commands::cmd_select(&service, &tenant(), &[], None, true, false).unwrap();
    assert_eq!(service.review_summary(&tenant()).unwrap().selected, 4);
}

#[test]
fn test_cmd_select_requires_a_target() {
    let service = setup_test_service();
    assert!(commands::cmd_select(&service, &tenant(), &[], None, false, false).is_err());
    assert!(commands::cmd_select(&service, &tenant(), &[], Some("bogus"), false, false).is_err());
}

#[tokio::test]
async fn test_cmd_accept_moves_selected_into_ledger() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;

    let items = service.store().staged_items(&tenant()).unwrap();
    let netflix = items.iter().find(|i| i.payee == "NETFLIX.COM").unwrap();
    commands::cmd_select(&service, &tenant(), &[netflix.id], None, false, true).unwrap();

    commands::cmd_accept(&service, &tenant()).unwrap();

    let ledger = service.store().ledger_transactions(&tenant()).unwrap();
    assert_eq!(ledger.len(), 3);
    assert!(ledger.iter().all(|t| t.payee != "NETFLIX.COM"));

    let remaining = service.store().staged_items(&tenant()).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payee, "NETFLIX.COM");
    assert!(!remaining[0].is_selected);
}

#[test]
fn test_cmd_accept_with_nothing_pending() {
    let service = setup_test_service();
    commands::cmd_accept(&service, &tenant()).unwrap();
    assert_eq!(
        service.store().count_ledger_transactions(&tenant()).unwrap(),
        0
    );
}

#[tokio::test]
async fn test_cmd_discard_and_clear() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;
    let first = service.store().staged_items(&tenant()).unwrap()[0].id;

    commands::cmd_discard(&service, &tenant(), &[first, 424_242]).unwrap();
    assert_eq!(service.review_summary(&tenant()).unwrap().total, 3);

    commands::cmd_clear(&service, &tenant()).unwrap();
    assert_eq!(service.review_summary(&tenant()).unwrap().total, 0);
    assert_eq!(
        service.store().count_ledger_transactions(&tenant()).unwrap(),
        0
    );
}

#[tokio::test]
async fn test_commands_are_tenant_scoped() {
    let service = setup_test_service();
    import_statement(&service, STATEMENT).await;

    let other = TenantId::from("someone-else");
    commands::cmd_clear(&service, &other).unwrap();
    commands::cmd_accept(&service, &other).unwrap();

    assert_eq!(service.review_summary(&tenant()).unwrap().total, 4);
    assert_eq!(service.store().count_ledger_transactions(&other).unwrap(), 0);
}

// ========== Rules Command Tests ==========

#[test]
fn test_cmd_rules_list_empty() {
    let service = setup_test_service();
    assert!(commands::cmd_rules_list(&service, &tenant()).is_ok());
}

#[test]
fn test_cmd_rules_add_and_list() {
    let service = setup_test_service();
    commands::cmd_rules_add(&service, &tenant(), "Groceries", "AMZN Mktp", false).unwrap();

    let rules = service.store().payee_rules(&tenant()).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].pattern, "AMZN Mktp");
    assert!(!rules[0].is_regex);
    assert!(commands::cmd_rules_list(&service, &tenant()).is_ok());
}

#[test]
fn test_cmd_rules_add_invalid_is_not_stored() {
    let service = setup_test_service();
    assert!(commands::cmd_rules_add(&service, &tenant(), "Bad", "(unclosed", true).is_err());
    assert!(commands::cmd_rules_add(&service, &tenant(), "", "coffee", false).is_err());
    assert!(commands::cmd_rules_add(&service, &tenant(), "Empty", "   ", false).is_err());

    assert!(service.store().payee_rules(&tenant()).unwrap().is_empty());
}

#[test]
fn test_cmd_rules_edit_keeps_unchanged_fields() {
    let service = setup_test_service();
    commands::cmd_rules_add(&service, &tenant(), "Coffee", "starbucks", false).unwrap();
    let id = service.store().payee_rules(&tenant()).unwrap()[0].id;

    commands::cmd_rules_edit(&service, &tenant(), id, None, Some("Dining"), None).unwrap();
    let rule = service.get_rule(&tenant(), id).unwrap();
    assert_eq!(rule.pattern, "starbucks");
    assert_eq!(rule.category, "Dining");
    assert!(!rule.is_regex);

    commands::cmd_rules_edit(&service, &tenant(), id, Some("^STARBUCKS"), None, Some(true))
        .unwrap();
    let rule = service.get_rule(&tenant(), id).unwrap();
    assert_eq!(rule.pattern, "^STARBUCKS");
    assert!(rule.is_regex);

    // Invalid edits leave the stored rule alone
    assert!(
        commands::cmd_rules_edit(&service, &tenant(), id, Some("(bad"), None, None).is_err()
    );
    assert_eq!(service.get_rule(&tenant(), id).unwrap().pattern, "^STARBUCKS");
}

#[test]
fn test_cmd_rules_edit_and_delete_missing() {
    let service = setup_test_service();
    assert!(commands::cmd_rules_edit(&service, &tenant(), 999, None, Some("X"), None).is_err());
    assert!(commands::cmd_rules_delete(&service, &tenant(), 999).is_err());
}

#[test]
fn test_cmd_rules_delete() {
    let service = setup_test_service();
    commands::cmd_rules_add(&service, &tenant(), "Coffee", "starbucks", false).unwrap();
    let id = service.store().payee_rules(&tenant()).unwrap()[0].id;

    commands::cmd_rules_delete(&service, &tenant(), id).unwrap();
    assert!(service.store().payee_rules(&tenant()).unwrap().is_empty());
}

#[test]
fn test_cmd_rules_test() {
    let service = setup_test_service();
    commands::cmd_rules_add(&service, &tenant(), "Shopping", "amzn", false).unwrap();
    commands::cmd_rules_add(&service, &tenant(), "Groceries", "AMZN Mktp", false).unwrap();

    assert!(commands::cmd_rules_test(&service, &tenant(), "AMZN Mktp US*2K4").is_ok());
    assert!(commands::cmd_rules_test(&service, &tenant(), "no match here").is_ok());

    // Testing never records usage
    let rules = service.store().payee_rules(&tenant()).unwrap();
    assert!(rules.iter().all(|r| r.match_count == 0));
}

#[test]
fn test_duplicate_status_names_accepted_by_select() {
    for name in ["new", "exact", "potential", "exact_duplicate"] {
        assert!(name.parse::<DuplicateStatus>().is_ok());
    }
}
