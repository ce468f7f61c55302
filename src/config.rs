//! Typed configuration, loaded from YAML at startup and validated once
//! before anything else is constructed: plain `serde` derives, `schemars`
//! for a generated JSON Schema, `camelCase` on the wire.

use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

/// The five cost-model knobs, as read off the wire. Kept
/// signed so an operator's accidental `-1` is caught by [`WeightConfig::validate`]
/// instead of failing an opaque unsigned-integer parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightConfig {
    pub query: i64,
    pub mutation: i64,
    pub object: i64,
    pub scalar: i64,
    pub connection: i64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        WeightConfig {
            query: 1,
            mutation: 10,
            object: 1,
            scalar: 0,
            connection: 2,
        }
    }
}

impl WeightConfig {
    /// Merging `self` over the defaults field-by-field is unnecessary here
    /// since every field is already required on the wire with defaults
    /// applied by serde; this just validates non-negativity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields: [(&'static str, i64); 5] = [
            ("query", self.query),
            ("mutation", self.mutation),
            ("object", self.object),
            ("scalar", self.scalar),
            ("connection", self.connection),
        ];
        for (field, value) in fields {
            if value < 0 {
                return Err(ConfigError::NegativeWeight { field, value });
            }
        }
        Ok(())
    }
}

/// Which rate-limit algorithm backs C4, and its parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum RateLimiterConfig {
    TokenBucket { capacity: i64, refill_rate: f64 },
    FixedWindow { capacity: i64, window_size_millis: i64 },
    SlidingWindowLog { capacity: i64, window_size_millis: i64 },
    SlidingWindowCounter { capacity: i64, window_size_millis: i64 },
}

impl RateLimiterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (capacity, window_or_rate) = match self {
            RateLimiterConfig::TokenBucket { capacity, refill_rate } => (*capacity, *refill_rate as i64),
            RateLimiterConfig::FixedWindow { capacity, window_size_millis } => (*capacity, *window_size_millis),
            RateLimiterConfig::SlidingWindowLog { capacity, window_size_millis } => (*capacity, *window_size_millis),
            RateLimiterConfig::SlidingWindowCounter { capacity, window_size_millis } => (*capacity, *window_size_millis),
        };
        if capacity <= 0 {
            return Err(ConfigError::InvalidAlgorithmParameter { field: "capacity", value: capacity });
        }
        if window_or_rate <= 0 {
            return Err(ConfigError::InvalidAlgorithmParameter { field: "windowSizeMillis/refillRate", value: window_or_rate });
        }
        Ok(())
    }
}

/// Cache backend connection options.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// `redis://host:port` style URLs; empty means use the in-process backend.
    pub urls: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub key_expiry: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            urls: Vec::new(),
            key_expiry: Duration::from_millis(86_400_000),
        }
    }
}

/// An optional upper bound on [`crate::analysis::AnalysisOutcome::max_depth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DepthLimit {
    Unbounded,
    Bounded(u32),
}

impl Default for DepthLimit {
    fn default() -> Self {
        DepthLimit::Unbounded
    }
}

/// Top-level configuration, the root of the YAML document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub rate_limiter: Option<RateLimiterConfig>,
    pub type_weights: WeightConfig,
    pub cache: CacheConfig,
    pub dark: bool,
    pub enforce_bounded_lists: bool,
    pub depth_limit: DepthLimit,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rate_limiter: None,
            type_weights: WeightConfig::default(),
            cache: CacheConfig::default(),
            dark: false,
            enforce_bounded_lists: false,
            depth_limit: DepthLimit::default(),
        }
    }
}

impl Config {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(source).map_err(|e| ConfigError::InvalidYaml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.type_weights.validate()?;
        if let Some(rl) = &self.rate_limiter {
            rl.validate()?;
        }
        Ok(())
    }
}
