//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the extraction engine.
///
/// The defaults are the operating points the system was designed around;
/// deployments override them through a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-item share of the batch time budget, seconds
    pub per_item_budget_s: f64,

    /// Confidence score at or above which a cached extraction is returned
    /// without any model call
    pub accept: f64,

    /// Heuristic null-fraction at or above which a cold document goes to
    /// the model synchronously
    pub heuristic_failure: f64,

    /// How far a single item may stretch past its share, consuming time
    /// saved by faster items
    pub slack: f64,

    /// Root directory of the knowledge repository
    pub repository_root: PathBuf,

    /// Flat cost estimate charged per model call, used for batch
    /// accounting only
    pub llm_cost_estimate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            per_item_budget_s: 10.0,
            accept: 0.80,
            heuristic_failure: 0.50,
            slack: 1.5,
            repository_root: PathBuf::from("knowledge"),
            llm_cost_estimate: 0.000_15,
        }
    }
}

impl EngineConfig {
    /// Per-item budget as a Duration
    pub fn per_item_budget(&self) -> Duration {
        Duration::from_secs_f64(self.per_item_budget_s.max(0.0))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.per_item_budget_s.is_finite() || self.per_item_budget_s < 0.0 {
            return Err("per_item_budget_s must be a non-negative number".to_string());
        }
        if !(0.0..=1.0).contains(&self.accept) {
            return Err("accept must be within [0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.heuristic_failure) {
            return Err("heuristic_failure must be within [0, 1]".to_string());
        }
        if !self.slack.is_finite() || self.slack < 1.0 {
            return Err("slack must be at least 1.0".to_string());
        }
        if !self.llm_cost_estimate.is_finite() || self.llm_cost_estimate < 0.0 {
            return Err("llm_cost_estimate must be non-negative".to_string());
        }
        Ok(())
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("failed to parse TOML: {e}"))
    }

    /// Serialize configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("failed to serialize TOML: {e}"))
    }
}
