//! Engine configuration.
//!
//! All fields have defaults, so a config file only needs the keys it changes:
//!
//! ```toml
//! batch_size = 32
//! max_depth = 5
//! max_tree_nodes = 2000000
//! flush = { after_ticks = 4 }
//! cache = { lru = { capacity = 200000 } }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SearchError;
use crate::tree::MAX_NODES;

/// When a partially filled batch is handed to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush whatever is outstanding at the end of every ply.
    Immediate,
    /// Hold a partial batch for at most this many idle builder ticks.
    AfterTicks(u32),
}

/// Bound on the evaluation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    Unbounded,
    /// Evict the least recently used entry once `capacity` is reached.
    Lru { capacity: usize },
}

/// Configuration for the search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of positions per evaluator call.
    pub batch_size: usize,
    /// Partial batch handling.
    pub flush: FlushPolicy,
    /// Evaluation cache bound.
    pub cache: CachePolicy,
    /// The builder stops expanding once the frontier is this many plies deep.
    pub max_depth: usize,
    /// The builder stops expanding before the tree would outgrow this many nodes.
    pub max_tree_nodes: usize,
    /// Evaluator retries per batch before the search is aborted.
    pub max_eval_retries: u32,
    /// Pause between evaluator retries.
    pub retry_backoff_ms: u64,
    /// Wait granularity of the builder and of a blocked `choose_move`.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            flush: FlushPolicy::Immediate,
            cache: CachePolicy::Unbounded,
            max_depth: 4,
            max_tree_nodes: MAX_NODES,
            max_eval_retries: 3,
            retry_backoff_ms: 10,
            poll_interval_ms: 5,
        }
    }
}

impl EngineConfig {
    /// Small batches and shallow trees for tests.
    pub fn for_testing() -> Self {
        Self {
            batch_size: 4,
            max_depth: 3,
            retry_backoff_ms: 1,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, SearchError> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.batch_size == 0 {
            return Err(SearchError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(SearchError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.max_tree_nodes == 0 || self.max_tree_nodes > MAX_NODES {
            return Err(SearchError::InvalidConfig(format!(
                "max_tree_nodes must be between 1 and {MAX_NODES}"
            )));
        }
        if let CachePolicy::Lru { capacity: 0 } = self.cache {
            return Err(SearchError::InvalidConfig(
                "lru cache capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
