//! Pure scoring math — profile completeness, recency decay, and the
//! ground-truth recompute over a contact's event ledger. No storage access,
//! so every component is unit-testable in isolation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leadflow_core::config::ScoringConfig;
use leadflow_core::types::{Contact, Grade, ScoreEvent};

/// Immutable result of a full score computation. The storage write is a
/// separate, explicit step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub engagement_score: f64,
    pub profile_score: f64,
    pub recency_score: f64,
    pub total_score: f64,
    pub grade: Grade,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Profile-completeness component, 0-20: 4 for email, 4 for first name,
/// 3 each for last name, phone, and country, plus a 3-point bonus when at
/// least two custom attributes are set.
pub fn profile_score(config: &ScoringConfig, contact: &Contact) -> f64 {
    let mut score: f64 = 0.0;
    if !contact.email.trim().is_empty() {
        score += 4.0;
    }
    if !contact.first_name.trim().is_empty() {
        score += 4.0;
    }
    if !contact.last_name.trim().is_empty() {
        score += 3.0;
    }
    if !contact.phone.trim().is_empty() {
        score += 3.0;
    }
    if !contact.country.trim().is_empty() {
        score += 3.0;
    }
    if contact.custom_attributes.len() >= 2 {
        score += 3.0;
    }
    score.min(config.profile_max)
}

/// Recency component: full marks at zero elapsed time, zero at or beyond the
/// decay window, `max · e^(−rate · days)` in between. A future-dated last
/// activity clamps to the maximum.
pub fn recency_score(
    config: &ScoringConfig,
    last_activity: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let Some(last) = last_activity else {
        return 0.0;
    };
    let days = (now - last).num_seconds() as f64 / 86_400.0;
    if days <= 0.0 {
        return config.recency_max;
    }
    if days >= config.recency_window_days {
        return 0.0;
    }
    let raw = config.recency_max * (-config.recency_decay_rate * days).exp();
    (raw * 100.0).round() / 100.0
}

/// Ground-truth recompute of a contact's score from the full ledger and the
/// current profile snapshot. Ignores any cap bookkeeping applied at event
/// time; the ledger is authoritative.
pub fn recompute(
    config: &ScoringConfig,
    events: &[ScoreEvent],
    contact: &Contact,
    now: DateTime<Utc>,
) -> ScoreSnapshot {
    let engagement: f64 = events.iter().map(|e| e.points).sum::<f64>().max(0.0);
    let last_activity = events.iter().map(|e| e.created_at).max();

    let profile = profile_score(config, contact);
    let recency = recency_score(config, last_activity, now);
    let total = engagement + profile + recency;

    ScoreSnapshot {
        engagement_score: engagement,
        profile_score: profile,
        recency_score: recency,
        total_score: total,
        grade: Grade::from_score(total),
        last_activity_at: last_activity,
    }
}
