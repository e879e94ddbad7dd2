//! Engine configuration
//!
//! Rollup levels, retention, and aggregate capping limits. Loaded from a
//! JSON file or built from defaults; validated once at startup and immutable
//! afterwards.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_MAX_QUERY_AGGREGATES_PER_TYPE, DEFAULT_MAX_SERVICE_CALL_AGGREGATES_PER_TYPE,
    DEFAULT_QUERY_TEXT_TRUNCATE, DEFAULT_ROLLUP_EXPIRATION_HOURS, DEFAULT_ROLLUP_INTERVALS_MILLIS,
};

// =============================================================================
// Rollup Levels
// =============================================================================

/// One rollup level: how wide its time buckets are
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RollupConfig {
    /// Bucket width in milliseconds; capture times at this level are
    /// multiples of this value
    pub interval_millis: i64,
}

impl RollupConfig {
    pub fn new(interval_millis: i64) -> Self {
        Self { interval_millis }
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Retention and truncation settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Per-level retention in hours; index matches the rollup level.
    /// Zero means "keep forever" (no TTL applied).
    #[serde(default = "default_expiration_hours")]
    pub rollup_expiration_hours: Vec<i64>,

    /// Query texts longer than this are truncated inline and deduplicated
    /// through the full-text side table
    #[serde(default = "default_query_text_truncate")]
    pub query_text_truncate: usize,
}

fn default_expiration_hours() -> Vec<i64> {
    DEFAULT_ROLLUP_EXPIRATION_HOURS.to_vec()
}

fn default_query_text_truncate() -> usize {
    DEFAULT_QUERY_TEXT_TRUNCATE
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rollup_expiration_hours: default_expiration_hours(),
            query_text_truncate: default_query_text_truncate(),
        }
    }
}

// =============================================================================
// Per-Agent Overrides
// =============================================================================

/// Per-agent-rollup overrides for aggregate capping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdvancedConfig {
    #[serde(default = "default_max_queries")]
    pub max_query_aggregates_per_type: usize,
    #[serde(default = "default_max_service_calls")]
    pub max_service_call_aggregates_per_type: usize,
}

fn default_max_queries() -> usize {
    DEFAULT_MAX_QUERY_AGGREGATES_PER_TYPE
}

fn default_max_service_calls() -> usize {
    DEFAULT_MAX_SERVICE_CALL_AGGREGATES_PER_TYPE
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            max_query_aggregates_per_type: default_max_queries(),
            max_service_call_aggregates_per_type: default_max_service_calls(),
        }
    }
}

// =============================================================================
// Root Config
// =============================================================================

/// Root configuration for the aggregation engine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CentralConfig {
    /// Rollup levels, coarsest last; level 0 is the raw capture interval
    #[serde(default = "default_rollup_configs")]
    pub rollup_configs: Vec<RollupConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Capping overrides keyed by agent-rollup id
    #[serde(default)]
    pub advanced: HashMap<String, AdvancedConfig>,
}

fn default_rollup_configs() -> Vec<RollupConfig> {
    DEFAULT_ROLLUP_INTERVALS_MILLIS
        .iter()
        .map(|&interval_millis| RollupConfig { interval_millis })
        .collect()
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            rollup_configs: default_rollup_configs(),
            storage: StorageConfig::default(),
            advanced: HashMap::new(),
        }
    }
}

impl CentralConfig {
    /// Load from the file named by the config env var, or fall back to
    /// defaults when it is unset
    pub fn load_default() -> Result<Self> {
        match std::env::var(super::constants::ENV_CONFIG) {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the level structure once at startup
    pub fn validate(&self) -> Result<()> {
        if self.rollup_configs.len() < 2 {
            bail!("at least two rollup levels are required (raw + one rollup)");
        }
        for pair in self.rollup_configs.windows(2) {
            let (prev, next) = (pair[0].interval_millis, pair[1].interval_millis);
            if prev <= 0 {
                bail!("rollup intervals must be positive, got {}", prev);
            }
            if next <= prev {
                bail!(
                    "rollup intervals must be strictly increasing, got {} after {}",
                    next,
                    prev
                );
            }
            if next % prev != 0 {
                bail!(
                    "rollup interval {} is not a multiple of the previous level's {}",
                    next,
                    prev
                );
            }
        }
        if self.storage.rollup_expiration_hours.len() != self.rollup_configs.len() {
            bail!(
                "rollup_expiration_hours has {} entries but there are {} rollup levels",
                self.storage.rollup_expiration_hours.len(),
                self.rollup_configs.len()
            );
        }
        for pair in self.storage.rollup_expiration_hours.windows(2) {
            // 0 = keep forever, which trivially satisfies monotonicity
            if pair[1] != 0 && (pair[0] == 0 || pair[1] < pair[0]) {
                bail!(
                    "coarser rollup levels cannot expire before finer ones ({} < {})",
                    pair[1],
                    pair[0]
                );
            }
        }
        if self.storage.query_text_truncate == 0 {
            bail!("query_text_truncate must be positive");
        }
        Ok(())
    }

    /// Number of rollup levels, including level 0
    pub fn level_count(&self) -> usize {
        self.rollup_configs.len()
    }

    /// Bucket width of the given level in milliseconds
    pub fn interval_millis(&self, level: usize) -> i64 {
        self.rollup_configs[level].interval_millis
    }

    /// Per-level data TTLs in seconds (0 = no expiry)
    pub fn ttls_seconds(&self) -> Vec<i64> {
        self.storage
            .rollup_expiration_hours
            .iter()
            .map(|hours| hours * 3600)
            .collect()
    }

    /// Widest rollup interval, used to bound the work-queue TTL
    pub fn max_rollup_interval_millis(&self) -> i64 {
        self.rollup_configs
            .last()
            .map(|config| config.interval_millis)
            .unwrap_or(0)
    }

    /// Capping limits for an agent rollup, falling back to defaults
    pub fn advanced_for(&self, agent_rollup_id: &str) -> AdvancedConfig {
        self.advanced
            .get(agent_rollup_id)
            .copied()
            .unwrap_or_default()
    }
}
