//! Configuration for the import pipeline
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a three-layer resolution:
//! 1. An explicit path (e.g. `--config`), if it exists
//! 2. The override in the data dir (~/.local/share/reckon/config/reckon.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Keys missing from a file keep their default values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/reckon.toml");

/// Review queue paging limits and merge parallelism
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Smallest batch prepared on several threads
    pub parallel_threshold: usize,
    /// 0 means one thread per available core
    pub worker_threads: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
            parallel_threshold: 256,
            worker_threads: 0,
        }
    }
}

impl ReviewConfig {
    /// Threads to use for one large batch
    pub fn workers(&self) -> usize {
        match self.worker_threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }
}

/// Limits applied when validating payee rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    pub max_pattern_length: usize,
    pub max_category_length: usize,
    /// Compiled program size limit handed to the regex engine
    pub regex_size_limit: usize,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_pattern_length: 200,
            max_category_length: 100,
            regex_size_limit: 1 << 20,
        }
    }
}

/// Normalizer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeConfig {
    pub source_separator: String,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            source_separator: " - ".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReckonConfig {
    pub review: ReviewConfig,
    pub rules: RuleConfig,
    pub normalize: NormalizeConfig,
}

impl ReckonConfig {
    /// Load configuration, preferring `override_path`, then the data dir override
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let content = match override_path {
            Some(path) if path.exists() => read_config(path)?,
            Some(path) => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )))
            }
            None => match default_config_path() {
                Some(path) if path.exists() => read_config(&path)?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        parse_config(&content)
    }

    /// Built-in defaults, ignoring any override files
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("reckon").join("config").join("reckon.toml"))
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    review: Option<RawReview>,
    rules: Option<RawRules>,
    normalize: Option<RawNormalize>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    default_page_size: Option<u32>,
    max_page_size: Option<u32>,
    parallel_threshold: Option<usize>,
    worker_threads: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawRules {
    max_pattern_length: Option<usize>,
    max_category_length: Option<usize>,
    regex_size_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawNormalize {
    source_separator: Option<String>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<ReckonConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = ReckonConfig::default();

    if let Some(review) = raw.review {
        if let Some(size) = review.default_page_size {
            config.review.default_page_size = size;
        }
        if let Some(size) = review.max_page_size {
            config.review.max_page_size = size;
        }
        if let Some(threshold) = review.parallel_threshold {
            config.review.parallel_threshold = threshold;
        }
        if let Some(threads) = review.worker_threads {
            config.review.worker_threads = threads;
        }
    }

    if let Some(rules) = raw.rules {
        if let Some(len) = rules.max_pattern_length {
            config.rules.max_pattern_length = len;
        }
        if let Some(len) = rules.max_category_length {
            config.rules.max_category_length = len;
        }
        if let Some(limit) = rules.regex_size_limit {
            config.rules.regex_size_limit = limit;
        }
    }

    if let Some(normalize) = raw.normalize {
        if let Some(sep) = normalize.source_separator {
            config.normalize.source_separator = sep;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &ReckonConfig) -> Result<()> {
    let review = &config.review;
    if review.default_page_size == 0 || review.max_page_size == 0 {
        return Err(Error::Config("page sizes must be positive".into()));
    }
    if review.default_page_size > review.max_page_size {
        return Err(Error::Config(format!(
            "default_page_size ({}) exceeds max_page_size ({})",
            review.default_page_size, review.max_page_size
        )));
    }
    if config.rules.max_pattern_length == 0 || config.rules.max_category_length == 0 {
        return Err(Error::Config("rule length limits must be positive".into()));
    }
    Ok(())
}
