//! Lifecycle stage management — transition rules, dormancy and churn
//! detection, batch sweeps, and funnel reporting.

pub mod engine;
pub mod rules;
pub mod types;

pub use engine::LifecycleEngine;
pub use rules::{default_rules, dormancy_rules, validate_rules};
pub use types::{SweepOutcome, TransitionResult, TransitionRule};
