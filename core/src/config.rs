//! Engine configuration.
//!
//! Everything that used to be ambient in the reference implementation
//! (watch-list, thresholds, chunk sizes, retry limits, the rebind
//! policy) is explicit here and handed to the pipeline at construction.
//! The engine never reads the process environment or the cwd.

use crate::rule::UnknownFieldPolicy;
use serde::{Deserialize, Serialize};

/// Thresholds and weights for the additive risk signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    #[serde(default = "default_large_txn_threshold")]
    pub large_txn_threshold: f64,
    #[serde(default = "default_large_txn_weight")]
    pub large_txn_weight: f64,
    #[serde(default = "default_negative_balance_weight")]
    pub negative_balance_weight: f64,
    #[serde(default = "default_mismatch_weight")]
    pub mismatch_weight: f64,
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    #[serde(default = "default_watchlist_weight")]
    pub watchlist_weight: f64,
    /// Seed for base-score synthesis on rows missing a Risk_Score.
    #[serde(default = "default_seed")]
    pub base_score_seed: u64,
}

fn default_large_txn_threshold() -> f64 {
    50_000.0
}
fn default_large_txn_weight() -> f64 {
    2.0
}
fn default_negative_balance_weight() -> f64 {
    3.0
}
fn default_mismatch_weight() -> f64 {
    1.5
}
fn default_watchlist() -> Vec<String> {
    vec!["North Korea".into(), "Iran".into(), "Syria".into()]
}
fn default_watchlist_weight() -> f64 {
    4.0
}
fn default_seed() -> u64 {
    42
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            large_txn_threshold: default_large_txn_threshold(),
            large_txn_weight: default_large_txn_weight(),
            negative_balance_weight: default_negative_balance_weight(),
            mismatch_weight: default_mismatch_weight(),
            watchlist: default_watchlist(),
            watchlist_weight: default_watchlist_weight(),
            base_score_seed: default_seed(),
        }
    }
}

/// Chunked-map/ordered-reduce execution for large tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_chunk_size() -> usize {
    5000
}
fn default_workers() -> usize {
    4
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            workers: default_workers(),
        }
    }
}

/// Bounded retry for the rule-drafting collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    250
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub unknown_field_policy: UnknownFieldPolicy,
    #[serde(default)]
    pub score: ScoreConfig,
    #[serde(default)]
    pub chunk: ChunkConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Load from a JSON file. In tests, use EngineConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Defaults with a pinned seed, for deterministic tests.
    pub fn default_test() -> Self {
        let mut config = EngineConfig::default();
        config.score.base_score_seed = 12345;
        config.chunk.chunk_size = 2;
        config.chunk.workers = 2;
        config
    }
}
