//! Engine configuration
//!
//! Runtime settings for a reconciliation workflow. Values resolve from the
//! shared TOML config with environment-variable overrides (`WDR_*`), falling
//! back to compiled defaults.

use crate::error::{EngineError, EngineResult};
use std::time::Duration;
use tracing::warn;
use wdr_common::config::TomlConfig;

/// Default number of generation attempts per work
pub const DEFAULT_ATTEMPT_COUNT: usize = 4;

/// Default consensus confidence threshold (percent)
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 56.0;

/// Default per-call timeout for producer/arbiter invocations
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Minimum normalized records required before consensus applies
pub const MIN_RECORDS_FOR_CONSENSUS: usize = 2;

/// Configuration for one reconciliation workflow
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of generation attempts (K)
    pub attempt_count: usize,
    /// Confidence required to accept the consensus record (percent)
    pub confidence_threshold: f64,
    /// Producer identifiers, assigned to attempts cyclically
    pub generator_ids: Vec<String>,
    /// Arbiter identifier
    pub arbiter_id: String,
    /// Timeout applied to every producer/arbiter invocation
    pub call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attempt_count: DEFAULT_ATTEMPT_COUNT,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            generator_ids: Vec::new(),
            arbiter_id: String::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Build from the shared TOML config, applying `WDR_*` environment
    /// overrides for the numeric settings.
    pub fn from_toml(toml: &TomlConfig) -> Self {
        let mut config = Self {
            attempt_count: toml.attempt_count.unwrap_or(DEFAULT_ATTEMPT_COUNT),
            confidence_threshold: toml
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            generator_ids: toml.generator_ids.clone().unwrap_or_default(),
            arbiter_id: toml.arbiter_id.clone().unwrap_or_default(),
            call_timeout: toml
                .call_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
        };

        if let Some(count) = env_parse::<usize>("WDR_ATTEMPT_COUNT") {
            config.attempt_count = count;
        }
        if let Some(threshold) = env_parse::<f64>("WDR_CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = threshold;
        }
        if let Some(secs) = env_parse::<u64>("WDR_CALL_TIMEOUT_SECS") {
            config.call_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Validate the configuration.
    ///
    /// Zero configured producers is a fatal configuration error: the pool
    /// refuses to run rather than silently producing nothing.
    pub fn validate(&self) -> EngineResult<()> {
        if self.generator_ids.is_empty() {
            return Err(EngineError::Configuration(
                "No generator producers configured".to_string(),
            ));
        }
        if self.attempt_count == 0 {
            return Err(EngineError::Configuration(
                "Attempt count must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.confidence_threshold) {
            return Err(EngineError::Configuration(format!(
                "Confidence threshold out of range: {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Parse an environment variable, warning (not failing) on bad values
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparseable {}: {:?}", name, raw);
            None
        }
    }
}
