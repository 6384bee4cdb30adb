//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, open_service)
//! - `import` - CSV import into the review queue
//! - `review` - Review queue commands (list, select, discard, accept, clear)
//! - `rules` - Payee rule management commands

pub mod core;
pub mod import;
pub mod review;
pub mod rules;

// Re-export command functions for main.rs
pub use core::*;
pub use import::*;
pub use review::*;
pub use rules::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
