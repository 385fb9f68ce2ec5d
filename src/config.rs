//! Runtime configuration for batch-pager.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! All pagination knobs (page size, batch size, window bound, sort order) live here.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid pagination config: {0}")]
    Invalid(String),
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "batch-pager", about = "Page through a batched data source in the terminal")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Override the number of records served by the demo data source.
    #[arg(long)]
    pub records: Option<usize>,

    /// Override the artificial fetch latency of the demo data source.
    #[arg(long)]
    pub latency_ms: Option<u64>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pagination and window settings.
    pub pagination: PaginationConfig,

    /// Synthetic data source used by the demo binary.
    pub demo: DemoConfig,
}

/// Page, batch and window sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Rows per display page.
    pub page_size: usize,

    /// Records per remote fetch. Must be a multiple of `page_size`.
    pub batch_size: usize,

    /// Upper bound on batches held in memory (at least 2).
    pub max_resident_batches: usize,

    /// Sort applied to every upstream query.
    pub sort: SortConfig,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            batch_size: 100,
            max_resident_batches: 10,
            sort: SortConfig::default(),
        }
    }
}

/// Fixed sort key and order passed to the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    pub key: String,
    pub ascending: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            key: "created_at".to_string(),
            ascending: false,
        }
    }
}

/// Demo data source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of records the synthetic source serves.
    pub total_records: usize,

    /// Artificial latency per fetch, in milliseconds.
    pub fetch_latency_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            total_records: 537,
            fetch_latency_ms: 250,
        }
    }
}

impl PaginationConfig {
    /// Display pages that make up one batch.
    pub fn pages_per_batch(&self) -> usize {
        self.batch_size / self.page_size
    }

    /// How close (in pages) to a window edge navigation must be before the
    /// neighbouring batch is fetched.
    pub fn prefetch_threshold_pages(&self) -> usize {
        self.pages_per_batch().saturating_sub(1)
    }

    /// Check the sizing constraints the window relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be non-zero".into()));
        }
        if self.batch_size == 0 || self.batch_size % self.page_size != 0 {
            return Err(ConfigError::Invalid(format!(
                "batch_size ({}) must be a non-zero multiple of page_size ({})",
                self.batch_size, self.page_size
            )));
        }
        if self.max_resident_batches < 2 {
            return Err(ConfigError::Invalid(format!(
                "max_resident_batches ({}) must be at least 2",
                self.max_resident_batches
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.pagination.validate()?;
        Ok(config)
    }
}
