//! Configuration management for QuoteForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::Result;
use crate::verification::EllipsisPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Answer generation (streaming model) configuration
    #[serde(default)]
    #[validate(nested)]
    pub generation: GenerationConfig,

    /// Coherence judge configuration
    #[serde(default)]
    #[validate(nested)]
    pub judge: JudgeConfig,

    /// Model pricing table (USD per 1M tokens)
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Quote verification policy
    #[serde(default)]
    #[validate(nested)]
    pub verification: VerificationConfig,

    /// Upstream model API rate limiting
    #[serde(default)]
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Benchmark sweep configuration
    #[serde(default)]
    #[validate(nested)]
    pub bench: BenchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct GenerationConfig {
    /// Provider: openai, mock
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key for the model provider
    pub api_key: Option<String>,

    /// API base URL (OpenAI-compatible)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model used for answer generation
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,

    /// Maximum completion tokens
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_tokens: u32,

    /// Seconds to wait for the stream to open
    #[serde(default = "default_connect_timeout")]
    #[validate(range(min = 1))]
    pub connect_timeout_secs: u64,

    /// Seconds without an increment before the stream is failed
    #[serde(default = "default_idle_timeout")]
    #[validate(range(min = 1))]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct JudgeConfig {
    /// Enable coherence scoring
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Model used as judge
    #[serde(default = "default_judge_model")]
    pub model: String,

    /// Judge call timeout in seconds
    #[serde(default = "default_judge_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
    /// Model id -> per-million-token rates
    #[serde(default = "default_pricing_models")]
    pub models: HashMap<String, PricingEntry>,
}

/// Rates in USD per 1M tokens
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct PricingEntry {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct VerificationConfig {
    /// match_score at or above which a non-verbatim quote counts as drift
    #[serde(default = "default_drift_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub drift_threshold: f64,

    /// How `...`-elided quotes are scored
    #[serde(default)]
    pub ellipsis: EllipsisPolicy,

    /// Shape a citation token must have to be accepted
    #[serde(default = "default_citation_pattern")]
    pub citation_pattern: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RateLimitConfig {
    /// Model API requests per second (shared by all queries)
    #[serde(default = "default_rate_limit")]
    #[validate(range(min = 1))]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    #[validate(range(min = 1))]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BenchConfig {
    /// Retrieval fixture (queries with their hits)
    #[serde(default = "default_fixture_path")]
    pub fixture_path: String,

    /// Where report rows are written
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Maximum queries in flight
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 256))]
    pub concurrency: usize,
}

// Default value functions
fn default_provider() -> String { "openai".to_string() }
fn default_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_temperature() -> f32 { 0.6 }
fn default_max_tokens() -> u32 { 4096 }
fn default_connect_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 45 }
fn default_judge_model() -> String { "gpt-4o".to_string() }
fn default_judge_timeout() -> u64 { 60 }
fn default_drift_threshold() -> f64 { 0.85 }
fn default_citation_pattern() -> String { crate::quotes::DEFAULT_CITATION_PATTERN.to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 10 }
fn default_enabled() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_metrics_port() -> u16 { 0 }
fn default_service_name() -> String { "quoteforge".to_string() }
fn default_fixture_path() -> String { "data/queries.json".to_string() }
fn default_output_path() -> String { "outputs/benchmark_results.json".to_string() }
fn default_concurrency() -> usize { 4 }

fn default_pricing_models() -> HashMap<String, PricingEntry> {
    HashMap::from([
        (
            "gpt-4o-mini".to_string(),
            PricingEntry { input_per_million: 0.15, output_per_million: 0.60 },
        ),
        (
            "gpt-4o".to_string(),
            PricingEntry { input_per_million: 2.50, output_per_million: 10.00 },
        ),
    ])
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__GENERATION__MODEL=gpt-4o
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// API key, treating an empty string as absent
    pub fn api_key(&self) -> Option<&str> {
        self.generation
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

impl GenerationConfig {
    /// Stream open timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-increment idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl JudgeConfig {
    /// Judge call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: default_api_base(),
            model: default_generation_model(),
            temperature: default_temperature(),
            top_p: None,
            max_tokens: default_max_tokens(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            model: default_judge_model(),
            timeout_secs: default_judge_timeout(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            models: default_pricing_models(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            drift_threshold: default_drift_threshold(),
            ellipsis: EllipsisPolicy::default(),
            citation_pattern: default_citation_pattern(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            fixture_path: default_fixture_path(),
            output_path: default_output_path(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            judge: JudgeConfig::default(),
            pricing: PricingConfig::default(),
            verification: VerificationConfig::default(),
            rate_limit: RateLimitConfig::default(),
            observability: ObservabilityConfig::default(),
            bench: BenchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.judge.model, "gpt-4o");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_pricing_table() {
        let config = AppConfig::default();
        let mini = config.pricing.models["gpt-4o-mini"];
        assert_eq!(mini.input_per_million, 0.15);
        assert_eq!(mini.output_per_million, 0.60);
        assert!(config.pricing.models.contains_key("gpt-4o"));
    }

    #[test]
    fn test_empty_api_key_is_absent() {
        let mut config = AppConfig::default();
        config.generation.api_key = Some("  ".to_string());
        assert!(config.api_key().is_none());
        config.generation.api_key = Some("sk-test".to_string());
        assert_eq!(config.api_key(), Some("sk-test"));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = AppConfig::default();
        config.verification.drift_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
