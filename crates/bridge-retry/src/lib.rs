//! Retry strategies and backoff policies.
//!
//! Used by the Path & Lock Facility's NFS fallback, the Multi-Pass
//! Reviewer's model-adapter invocations, and the Destructive Command
//! Guard's transient-infra recovery (spec §4.1, §4.6, §7).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy type for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    /// No delay between retries - retry immediately.
    Immediate,
    /// Exponential backoff: delay doubles each attempt (default).
    #[default]
    Exponential,
    /// Linear backoff: delay increases linearly each attempt.
    Linear,
    /// Constant delay: same delay every attempt.
    Constant,
}

/// Predefined retry policies with sensible defaults for different use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Balanced retry behavior - good for most scenarios.
    #[default]
    Default,
    /// Aggressive retries - more attempts, faster recovery. Used by the
    /// Path & Lock Facility's mkdir-fallback acquisition loop.
    Aggressive,
    /// Conservative retries - fewer attempts, longer delays. Used by
    /// transient-infra recovery in the Bridge Iteration Engine (spec §7).
    Conservative,
    /// Fully custom configuration via an explicit `RetryStrategyConfig`.
    Custom,
}

impl RetryPolicy {
    pub fn to_config(self) -> RetryStrategyConfig {
        match self {
            RetryPolicy::Default => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 6,
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(120),
                jitter: 0.5,
            },
            RetryPolicy::Aggressive => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 10,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                jitter: 0.3,
            },
            RetryPolicy::Conservative => RetryStrategyConfig {
                strategy: RetryStrategyType::Linear,
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(60),
                jitter: 0.1,
            },
            RetryPolicy::Custom => RetryStrategyConfig::default(),
        }
    }
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    #[serde(default)]
    pub strategy: RetryStrategyType,
    #[serde(default)]
    pub max_attempts: u32,
    #[serde(with = "humantime_serde", default)]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde", default)]
    pub max_delay: Duration,
    /// Jitter factor (0.0 = no jitter, 1.0 = full jitter).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryPolicy::Default.to_config()
    }
}

fn default_jitter() -> f64 {
    0.5
}

/// Calculate the delay for the next retry attempt (1-indexed) based on the
/// strategy configuration.
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt.max(1)),
        RetryStrategyType::Constant => config.base_delay,
    };

    let capped = delay.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

/// Apply jitter to a delay value. A jitter factor of 0.5 means
/// `delay * (0.5 ..= 1.5)`.
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    let jitter_range = 2.0 * jitter;
    let random_factor = 1.0 - jitter + (rand::random::<f64>() * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round().max(0.0) as u64;
    Duration::from_millis(millis)
}
