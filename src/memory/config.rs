//! Allocator configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `POOLALLOC_*` environment variables (e.g. `POOLALLOC_POLICY=best_fit`).

use super::block::BLOCK_RECORD_SIZE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "POOLALLOC";

/// Default pool capacity (64 KiB)
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Default metadata ceiling, as a percentage of pool capacity
pub const DEFAULT_METADATA_CEILING_PERCENT: u8 = 20;

/// Default payload slack a split tail must offer beyond its own record
pub const DEFAULT_MIN_SPLIT_SLACK: usize = 16;

/// Record budget granted regardless of capacity, so small pools can still split
pub const MIN_METADATA_RECORDS: usize = 4;

/// Fit-search policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Lowest-addressed free block that is large enough
    #[default]
    FirstFit,
    /// Smallest free block that is large enough, ties broken by address
    BestFit,
}

/// Which neighbours a freed block is merged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coalescing {
    /// Merge with a free successor only. A free predecessor is left alone.
    #[default]
    Forward,
    /// Merge with free successor and free predecessor
    Bidirectional,
}

/// Handling of frees that target a block no longer owned by the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoubleFreePolicy {
    /// Return `DoubleFree` / `StaleReference` without touching the table
    #[default]
    Report,
    /// Re-mark an already free block free (may merge forward); ignore stale handles
    Tolerate,
}

/// Configuration for a [`MemoryManager`](super::MemoryManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Pool size in bytes
    pub capacity: usize,
    pub policy: FitPolicy,
    /// Maximum share of capacity spent on block records (1..=100)
    pub metadata_ceiling_percent: u8,
    pub min_split_slack: usize,
    pub coalescing: Coalescing,
    pub double_free: DoubleFreePolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            policy: FitPolicy::default(),
            metadata_ceiling_percent: DEFAULT_METADATA_CEILING_PERCENT,
            min_split_slack: DEFAULT_MIN_SPLIT_SLACK,
            coalescing: Coalescing::default(),
            double_free: DoubleFreePolicy::default(),
        }
    }
}

impl AllocatorConfig {
    /// Default configuration with the given pool capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn policy(mut self, policy: FitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn coalescing(mut self, coalescing: Coalescing) -> Self {
        self.coalescing = coalescing;
        self
    }

    pub fn double_free(mut self, double_free: DoubleFreePolicy) -> Self {
        self.double_free = double_free;
        self
    }

    pub fn metadata_ceiling_percent(mut self, percent: u8) -> Self {
        self.metadata_ceiling_percent = percent;
        self
    }

    pub fn min_split_slack(mut self, slack: usize) -> Self {
        self.min_split_slack = slack;
        self
    }

    /// Check that the configuration describes a usable pool
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if self.metadata_ceiling_percent == 0 || self.metadata_ceiling_percent > 100 {
            return Err(Error::InvalidConfig(format!(
                "metadata_ceiling_percent must be within 1..=100, got {}",
                self.metadata_ceiling_percent
            )));
        }
        Ok(())
    }

    /// Metadata budget in bytes for a pool of `capacity` bytes
    pub fn metadata_ceiling(&self, capacity: usize) -> usize {
        let percent = self.metadata_ceiling_percent as usize;
        // Split the product to stay clear of overflow on huge capacities
        let share = capacity / 100 * percent + capacity % 100 * percent / 100;
        share.max(MIN_METADATA_RECORDS * BLOCK_RECORD_SIZE)
    }

    /// Smallest tail worth splitting off into its own block
    pub fn split_threshold(&self) -> usize {
        BLOCK_RECORD_SIZE + self.min_split_slack
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration: defaults, then `path` (if any), then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}
