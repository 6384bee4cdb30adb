//! Payee rule matching for automatic categorization
//!
//! Rules are evaluated most-recently-modified first. Regex and substring rules
//! compete in separate classes:
//! - the first regex rule that matches takes the regex slot and keeps it
//! - among substring rules the longest pattern wins, earlier (more recent)
//!   rules win ties
//! - any regex match beats any substring match
//!
//! Patterns are compiled once when the matcher is built. The regex engine runs
//! in linear time and has no backreferences or lookaround; patterns using
//! those fail validation when the rule is saved.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RuleConfig;
use crate::error::{Error, FieldError, MatchEngineError, Result};
use crate::models::{NewPayeeRule, PayeeMatchingRule, RuleUsage};

/// Which class of rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Regex,
    Substring,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Substring => "substring",
        }
    }
}

/// The winning rule for a payee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub rule_id: i64,
    pub category: String,
    pub kind: MatchKind,
}

/// Result of matching one payee
///
/// `errors` lists rules that could not be evaluated and were skipped; the hit
/// (if any) is still valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub hit: Option<RuleHit>,
    pub errors: Vec<MatchEngineError>,
}

impl MatchOutcome {
    pub fn category(&self) -> Option<&str> {
        self.hit.as_ref().map(|h| h.category.as_str())
    }
}

#[derive(Debug)]
enum CompiledPattern {
    /// Lowercased needle
    Substring(String),
    Regex(Regex),
}

#[derive(Debug)]
struct CompiledRule {
    rule: PayeeMatchingRule,
    /// Err holds the reason a stored pattern cannot be evaluated
    pattern: std::result::Result<CompiledPattern, String>,
}

/// Build the case-insensitive, size-limited regex used for payee rules
pub fn compile_regex(pattern: &str, config: &RuleConfig) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(config.regex_size_limit)
        .build()
}

fn compile_pattern(
    rule: &PayeeMatchingRule,
    config: &RuleConfig,
) -> std::result::Result<CompiledPattern, String> {
    if rule.pattern.trim().is_empty() {
        return Err("pattern is empty".to_string());
    }
    if !rule.is_regex {
        return Ok(CompiledPattern::Substring(rule.pattern.to_lowercase()));
    }

    let re = compile_regex(&rule.pattern, config).map_err(|e| e.to_string())?;
    if re.is_match("") {
        return Err("pattern matches the empty string".to_string());
    }
    Ok(CompiledPattern::Regex(re))
}

/// Normalize a category: strip control characters and collapse whitespace
pub fn sanitize_category(category: &str) -> String {
    category
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check a rule before it is saved, returning every problem found
pub fn validate_rule(rule: &NewPayeeRule, config: &RuleConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if rule.pattern.trim().is_empty() {
        errors.push(FieldError::new("pattern", "must not be empty"));
    } else if rule.pattern.chars().count() > config.max_pattern_length {
        errors.push(FieldError::new(
            "pattern",
            format!("must be at most {} characters", config.max_pattern_length),
        ));
    } else if rule.is_regex {
        match compile_regex(&rule.pattern, config) {
            Ok(re) if re.is_match("") => errors.push(FieldError::new(
                "pattern",
                "regex matches the empty string and would categorize every payee",
            )),
            Ok(_) => {}
            Err(e) => errors.push(FieldError::new("pattern", format!("invalid regex: {}", e))),
        }
    }

    let category = sanitize_category(&rule.category);
    if category.is_empty() {
        errors.push(FieldError::new("category", "must not be empty"));
    } else if category.chars().count() > config.max_category_length {
        errors.push(FieldError::new(
            "category",
            format!("must be at most {} characters", config.max_category_length),
        ));
    }

    errors
}

/// Sanitize and validate a rule, ready to persist
///
/// The pattern is kept byte for byte; surrounding spaces are part of what it
/// matches, and the validated text must be the stored text.
pub fn prepare_rule(rule: &NewPayeeRule, config: &RuleConfig) -> Result<NewPayeeRule> {
    let errors = validate_rule(rule, config);
    if !errors.is_empty() {
        return Err(Error::Rule(errors));
    }
    Ok(NewPayeeRule {
        pattern: rule.pattern.clone(),
        is_regex: rule.is_regex,
        category: sanitize_category(&rule.category),
    })
}

/// Evaluates a tenant's rules against payee text
#[derive(Debug)]
pub struct PayeeRuleMatcher {
    rules: Vec<CompiledRule>,
}

impl PayeeRuleMatcher {
    /// Compile rules and order them most-recently-modified first
    ///
    /// Rules modified at the same instant are ordered by id, newest first.
    pub fn new(mut rules: Vec<PayeeMatchingRule>, config: &RuleConfig) -> Self {
        rules.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = compile_pattern(&rule, config);
                if let Err(ref reason) = pattern {
                    warn!(
                        "Payee rule {} ('{}') cannot be evaluated: {}",
                        rule.id, rule.pattern, reason
                    );
                }
                CompiledRule { rule, pattern }
            })
            .collect();

        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Find the winning category for a payee without recording usage
    pub fn find_category(&self, payee: &str) -> MatchOutcome {
        let folded = payee.to_lowercase();
        let mut outcome = MatchOutcome::default();

        let mut best_regex: Option<&PayeeMatchingRule> = None;
        let mut best_substring: Option<(&PayeeMatchingRule, usize)> = None;

        for compiled in &self.rules {
            let rule = &compiled.rule;
            match &compiled.pattern {
                Err(reason) => outcome.errors.push(MatchEngineError {
                    rule_id: rule.id,
                    pattern: rule.pattern.clone(),
                    message: reason.clone(),
                }),
                Ok(CompiledPattern::Regex(re)) => {
                    if best_regex.is_none() && re.is_match(payee) {
                        best_regex = Some(rule);
                    }
                }
                Ok(CompiledPattern::Substring(needle)) => {
                    if folded.contains(needle.as_str()) {
                        let len = needle.chars().count();
                        // Strictly longer only: ties keep the more recent rule
                        if best_substring.map_or(true, |(_, best)| len > best) {
                            best_substring = Some((rule, len));
                        }
                    }
                }
            }
        }

        outcome.hit = match (best_regex, best_substring) {
            (Some(rule), _) => Some(RuleHit {
                rule_id: rule.id,
                category: rule.category.clone(),
                kind: MatchKind::Regex,
            }),
            (None, Some((rule, _))) => Some(RuleHit {
                rule_id: rule.id,
                category: rule.category.clone(),
                kind: MatchKind::Substring,
            }),
            (None, None) => None,
        };

        if let Some(ref hit) = outcome.hit {
            debug!(
                "Payee '{}' matched {} rule {} -> {}",
                payee,
                hit.kind.as_str(),
                hit.rule_id,
                hit.category
            );
        }
        outcome
    }

    /// Find the winning category and record one use of the winning rule
    pub fn categorize(&self, payee: &str, tally: &RuleUsageTally) -> MatchOutcome {
        let outcome = self.find_category(payee);
        if let Some(ref hit) = outcome.hit {
            tally.record(hit.rule_id, Utc::now());
        }
        outcome
    }

    /// Every rule that matches a payee, in evaluation order
    ///
    /// Diagnostic view for operators; rules that cannot be evaluated are omitted.
    pub fn matching_rules(&self, payee: &str) -> Vec<(&PayeeMatchingRule, MatchKind)> {
        let folded = payee.to_lowercase();
        self.rules
            .iter()
            .filter_map(|compiled| match &compiled.pattern {
                Ok(CompiledPattern::Regex(re)) if re.is_match(payee) => {
                    Some((&compiled.rule, MatchKind::Regex))
                }
                Ok(CompiledPattern::Substring(needle)) if folded.contains(needle.as_str()) => {
                    Some((&compiled.rule, MatchKind::Substring))
                }
                _ => None,
            })
            .collect()
    }
}

/// Collects rule usage during a matching pass
///
/// Matching threads only touch this tally; the store applies the totals in one
/// write at the end of the batch.
#[derive(Debug, Default)]
pub struct RuleUsageTally {
    usage: Mutex<HashMap<i64, RuleUsage>>,
}

impl RuleUsageTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rule_id: i64, at: DateTime<Utc>) {
        let mut usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        let entry = usage.entry(rule_id).or_insert(RuleUsage {
            rule_id,
            matches: 0,
            last_used_at: at,
        });
        entry.matches += 1;
        if at > entry.last_used_at {
            entry.last_used_at = at;
        }
    }

    /// Totals per rule, ordered by rule id
    pub fn into_usages(self) -> Vec<RuleUsage> {
        let usage = self.usage.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut usages: Vec<RuleUsage> = usage.into_values().collect();
        usages.sort_by_key(|u| u.rule_id);
        usages
    }
}
