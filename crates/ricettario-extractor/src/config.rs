//! Configuration for the extraction engine
//!
//! Every tunable the engine uses lives here and is passed down explicitly.
//! All sections default field by field, so a TOML file only needs the values
//! it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Retry policy for transient call failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt (milliseconds)
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay (milliseconds)
    pub max_delay_ms: u64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Backoff before attempt `attempt + 1`, without jitter
    ///
    /// `attempt` counts from 1 (the attempt that just failed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Batch status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// First wait between status queries (seconds)
    pub initial_interval_secs: u64,
    /// Cap on the doubling wait (seconds)
    pub max_interval_secs: u64,
    /// Cumulative wait after which the job is treated as failed (seconds)
    pub poll_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: 30,
            max_interval_secs: 60,
            poll_timeout_secs: 24 * 60 * 60,
        }
    }
}

impl PollingConfig {
    /// First wait as a Duration
    pub fn initial_interval(&self) -> Duration {
        Duration::from_secs(self.initial_interval_secs)
    }

    /// Wait cap as a Duration
    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }

    /// Poll timeout as a Duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

/// Token prices and latency assumptions used by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Average prompt tokens per request
    pub input_tokens_per_request: u64,
    /// Average completion tokens per request
    pub output_tokens_per_request: u64,
    /// Requests per caption (classification + extraction)
    pub requests_per_caption: u32,
    /// USD per million prompt tokens, standard tier
    pub input_price_per_million: f64,
    /// USD per million completion tokens, standard tier
    pub output_price_per_million: f64,
    /// Batch price as a fraction of the standard price
    pub batch_discount: f64,
    /// Assumed worst-case batch turnaround (seconds)
    pub batch_latency_ceiling_secs: u64,
    /// Per-call latency used before any call has been observed (milliseconds)
    pub default_call_latency_ms: u64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_tokens_per_request: 800,
            output_tokens_per_request: 400,
            requests_per_caption: 2,
            input_price_per_million: 0.150,
            output_price_per_million: 0.600,
            batch_discount: 0.5,
            batch_latency_ceiling_secs: 24 * 60 * 60,
            default_call_latency_ms: 1_500,
        }
    }
}

impl PricingConfig {
    /// Standard-tier cost of one request (USD)
    pub fn request_cost(&self) -> f64 {
        (self.input_tokens_per_request as f64 * self.input_price_per_million
            + self.output_tokens_per_request as f64 * self.output_price_per_million)
            / 1_000_000.0
    }

    /// Standard-tier cost of fully processing one caption (USD)
    pub fn unit_cost_standard(&self) -> f64 {
        self.request_cost() * self.requests_per_caption as f64
    }
}

/// Configuration for the extraction engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum completion calls in flight in concurrent mode
    pub concurrency: usize,

    /// Uncached caption count at which `auto` prefers batch mode
    pub batch_threshold: usize,

    /// Whether the caller accepts batch turnaround for `auto` runs
    pub accept_batch_latency: bool,

    /// Minimum classification confidence for a caption to be extracted
    pub min_confidence: f64,

    /// Upper bound on a single completion call (seconds)
    pub call_timeout_secs: u64,

    /// Look up and store results in the cache
    pub use_cache: bool,

    /// Directory holding `is_recipe.md` / `extract_details.md` overrides
    pub prompts_dir: Option<PathBuf>,

    /// Retry policy
    pub retry: RetryConfig,

    /// Batch polling
    pub polling: PollingConfig,

    /// Cost model
    pub pricing: PricingConfig,
}

impl Default for EngineConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_threshold: 20,
            accept_batch_latency: true,
            min_confidence: ricettario_domain::DEFAULT_MIN_CONFIDENCE,
            call_timeout_secs: 60,
            use_cache: true,
            prompts_dir: None,
            retry: RetryConfig::default(),
            polling: PollingConfig::default(),
            pricing: PricingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Interactive preset: never waits on batch turnaround, wider fan-out
    pub fn interactive() -> Self {
        Self {
            concurrency: 16,
            accept_batch_latency: false,
            call_timeout_secs: 30,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 250,
                max_delay_ms: 5_000,
                jitter: true,
            },
            ..Self::default()
        }
    }

    /// Economical preset: batch as soon as it pays off, gentle on rate limits
    pub fn economical() -> Self {
        Self {
            concurrency: 4,
            batch_threshold: 5,
            accept_batch_latency: true,
            retry: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 1_000,
                max_delay_ms: 60_000,
                jitter: true,
            },
            ..Self::default()
        }
    }

    /// Get the call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err("min_confidence must be between 0.0 and 1.0".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err("retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string());
        }
        if self.polling.initial_interval_secs == 0 {
            return Err("polling.initial_interval_secs must be greater than 0".to_string());
        }
        if self.polling.initial_interval_secs > self.polling.max_interval_secs {
            return Err(
                "polling.initial_interval_secs cannot exceed polling.max_interval_secs".to_string(),
            );
        }
        if self.polling.poll_timeout_secs == 0 {
            return Err("polling.poll_timeout_secs must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.pricing.batch_discount) {
            return Err("pricing.batch_discount must be between 0.0 and 1.0".to_string());
        }
        if self.pricing.input_price_per_million < 0.0 || self.pricing.output_price_per_million < 0.0 {
            return Err("pricing prices cannot be negative".to_string());
        }
        if self.pricing.requests_per_caption == 0 {
            return Err("pricing.requests_per_caption must be at least 1".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
