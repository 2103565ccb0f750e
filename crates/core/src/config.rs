use serde::Deserialize;

use crate::error::{FlowError, FlowResult};

/// Root application configuration. Loaded from environment variables with
/// the prefix `LEADFLOW__` and an optional `leadflow.toml` file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Exponent coefficient of the recency decay curve.
    #[serde(default = "default_recency_decay_rate")]
    pub recency_decay_rate: f64,
    /// Days after which recency contributes nothing.
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: f64,
    /// Recency component at zero elapsed time.
    #[serde(default = "default_component_max")]
    pub recency_max: f64,
    /// Cap on the profile-completeness component.
    #[serde(default = "default_component_max")]
    pub profile_max: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Default batch size for lifecycle sweeps.
    #[serde(default = "default_sweep_limit")]
    pub sweep_limit: usize,
    /// Trailing window for engagement aggregation.
    #[serde(default = "default_engagement_window_days")]
    pub engagement_window_days: i64,
    #[serde(default = "default_reengagement_min_days")]
    pub reengagement_min_inactive_days: i64,
    #[serde(default = "default_reengagement_max_days")]
    pub reengagement_max_inactive_days: i64,
}

impl AppConfig {
    pub fn load() -> FlowResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("leadflow").required(false))
            .add_source(config::Environment::with_prefix("LEADFLOW").separator("__"))
            .build()
            .map_err(|e| FlowError::Config(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| FlowError::Config(e.to_string()))
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_decay_rate: default_recency_decay_rate(),
            recency_window_days: default_recency_window_days(),
            recency_max: default_component_max(),
            profile_max: default_component_max(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_limit: default_sweep_limit(),
            engagement_window_days: default_engagement_window_days(),
            reengagement_min_inactive_days: default_reengagement_min_days(),
            reengagement_max_inactive_days: default_reengagement_max_days(),
        }
    }
}

// Default functions
fn default_recency_decay_rate() -> f64 {
    0.03
}
fn default_recency_window_days() -> f64 {
    90.0
}
fn default_component_max() -> f64 {
    20.0
}
fn default_sweep_limit() -> usize {
    100
}
fn default_engagement_window_days() -> i64 {
    90
}
fn default_reengagement_min_days() -> i64 {
    30
}
fn default_reengagement_max_days() -> i64 {
    90
}
