//! Lifecycle domain types — transition rules, evaluation results, and
//! engagement aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use leadflow_core::types::LifecycleStage;

/// Rule for an automatic stage transition: either a progression rule (a
/// conjunction of score/open/click thresholds) or a dormancy rule (a
/// maximum-inactivity threshold).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from_stage: LifecycleStage,
    pub to_stage: LifecycleStage,
    pub min_score: f64,
    pub min_opens: u64,
    pub min_clicks: u64,
    /// Carried as configuration; the data model keeps no stage-entry
    /// timestamp, so evaluation checks score/open/click thresholds.
    pub min_days_in_stage: i64,
    pub max_inactive_days: Option<i64>,
    pub description: String,
}

impl TransitionRule {
    pub fn new(from_stage: LifecycleStage, to_stage: LifecycleStage) -> Self {
        Self {
            from_stage,
            to_stage,
            min_score: 0.0,
            min_opens: 0,
            min_clicks: 0,
            min_days_in_stage: 0,
            max_inactive_days: None,
            description: String::new(),
        }
    }

    pub fn is_dormancy(&self) -> bool {
        self.max_inactive_days.is_some()
    }
}

/// Audit record of a lifecycle evaluation. `transitioned == false` (no-op)
/// is a valid, common outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionResult {
    pub contact_id: Uuid,
    pub previous_stage: LifecycleStage,
    pub new_stage: LifecycleStage,
    pub transitioned: bool,
    pub rule_description: String,
    pub reason: String,
}

impl TransitionResult {
    pub fn no_op(contact_id: Uuid, stage: LifecycleStage, reason: impl Into<String>) -> Self {
        Self {
            contact_id,
            previous_stage: stage,
            new_stage: stage,
            transitioned: false,
            rule_description: String::new(),
            reason: reason.into(),
        }
    }
}

/// Engagement aggregates over a trailing window — the shared input to both
/// dormancy and progression checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub total_opens: u64,
    pub total_clicks: u64,
    pub total_bounces: u64,
    pub total_unsubscribes: u64,
    pub last_open_at: Option<DateTime<Utc>>,
    pub last_click_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub days_since_last_activity: Option<i64>,
    /// Events per week over the window.
    pub engagement_velocity: f64,
}

/// Result of one lifecycle batch sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub processed: usize,
    pub transitioned: usize,
    pub transitions: Vec<TransitionResult>,
}

/// Per-stage slice of the lifecycle distribution report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStats {
    pub count: u64,
    pub pct: f64,
    pub avg_score: f64,
    pub avg_engagement: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleHealth {
    pub active_rate: f64,
    pub dormant_rate: f64,
    pub churn_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleReport {
    pub total_contacts: u64,
    pub stages: HashMap<String, StageStats>,
    pub health: LifecycleHealth,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReengagementPriority {
    High,
    Medium,
}

/// A contact sliding toward dormancy that still has past engagement worth
/// winning back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReengagementCandidate {
    pub contact_id: Uuid,
    pub email: String,
    pub name: String,
    pub lifecycle_stage: LifecycleStage,
    pub total_score: f64,
    pub engagement_score: f64,
    pub days_inactive: i64,
    pub priority: ReengagementPriority,
}
