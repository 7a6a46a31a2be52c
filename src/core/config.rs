//! Configuration types for linnaea

use crate::{LinnaeaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassifyConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Identity margin (percentage points below the best hit) for hits
    /// reported as alternatives; the adaptive upper margin is always
    /// derived per query
    #[serde(default = "default_lower_margin")]
    pub lower_margin: f64,
    /// Scientific-name terms removed from candidate hits
    /// (case-insensitive substring match)
    #[serde(default)]
    pub excluded_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Floor applied to reported evalues before reciprocal weighting,
    /// so an evalue of exactly zero scores as the strongest
    /// representable hit instead of dividing by zero
    #[serde(default = "default_min_evalue")]
    pub min_evalue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base URL of the taxonomy lookup service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries per taxon id before it is recorded as unresolved
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Delay between requests (0 = no throttling)
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
}

// Default value functions
fn default_lower_margin() -> f64 {
    2.0
}
fn default_min_evalue() -> f64 {
    1e-180
}
fn default_base_url() -> String {
    "https://taxonomy.example.org/api".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_rate_limit_ms() -> u64 {
    0
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            lower_margin: default_lower_margin(),
            excluded_names: Vec::new(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_evalue: default_min_evalue(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            rate_limit_ms: default_rate_limit_ms(),
        }
    }
}

impl ClassifyConfig {
    /// Reject values the classifier cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.filter.lower_margin.is_finite() || self.filter.lower_margin < 0.0 {
            return Err(LinnaeaError::Config(format!(
                "lower_margin must be a non-negative number, got {}",
                self.filter.lower_margin
            )));
        }
        if !(self.scoring.min_evalue > 0.0) {
            return Err(LinnaeaError::Config(format!(
                "min_evalue must be positive, got {}",
                self.scoring.min_evalue
            )));
        }
        if self.resolver.base_url.is_empty() {
            return Err(LinnaeaError::Config("resolver base_url is empty".to_string()));
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<ClassifyConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ClassifyConfig = toml::from_str(&content)
        .map_err(|e| LinnaeaError::Config(format!("{}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}
