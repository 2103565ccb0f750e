//! Shared contact data model — the single source of truth consumed by the
//! scoring, lifecycle, audience, and automation engines.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Contact ────────────────────────────────────────────────────────────────

/// A contact record. Owned by the system; mutated by profile edits, tagging,
/// and automation actions. Never hard-deleted while its ledger is referenced
/// except through the store's cascading delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub country: String,
    pub language: String,
    pub custom_attributes: HashMap<String, serde_json::Value>,
    pub tags: Vec<String>,
    pub subscribed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            country: String::new(),
            language: "en".to_string(),
            custom_attributes: HashMap::new(),
            tags: Vec::new(),
            subscribed: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Full display name from whichever name fields are populated.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

// ─── Event ledger ───────────────────────────────────────────────────────────

/// Engagement event types that can award (or deduct) points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Opened,
    Clicked,
    Bounced,
    Unsubscribed,
    FormSubmitted,
    PageVisited,
    TagAdded,
    Manual,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Opened => "opened",
            EventKind::Clicked => "clicked",
            EventKind::Bounced => "bounced",
            EventKind::Unsubscribed => "unsubscribed",
            EventKind::FormSubmitted => "form_submitted",
            EventKind::PageVisited => "page_visited",
            EventKind::TagAdded => "tag_added",
            EventKind::Manual => "manual",
        }
    }
}

/// Immutable point-valued fact in a contact's append-only ledger. Total
/// ordering by `created_at` per contact defines recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEvent {
    pub id: Uuid,
    pub contact_id: Uuid,
    /// Originating scoring rule, when the event was rule-generated.
    pub rule_id: Option<Uuid>,
    pub event_type: EventKind,
    /// Signed: penalties (bounce, unsubscribe) carry negative points.
    pub points: f64,
    pub reason: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ─── Materialized score ─────────────────────────────────────────────────────

/// Discrete letter grade derived from the composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

impl Grade {
    /// Inclusive lower-bound thresholds: 90/80/70/60/45/25, else F.
    pub fn from_score(total: f64) -> Self {
        if total >= 90.0 {
            Grade::APlus
        } else if total >= 80.0 {
            Grade::A
        } else if total >= 70.0 {
            Grade::BPlus
        } else if total >= 60.0 {
            Grade::B
        } else if total >= 45.0 {
            Grade::C
        } else if total >= 25.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// Named position in the engagement progression. `Dormant` and `Churned`
/// sit outside the forward order and are reachable from any active stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    New,
    Subscriber,
    Lead,
    Mql,
    Sql,
    Opportunity,
    Customer,
    Evangelist,
    Dormant,
    Churned,
}

impl LifecycleStage {
    /// Position in the forward progression; `None` for the non-progression
    /// markers (`Dormant`, `Churned`).
    pub fn progression_order(&self) -> Option<u8> {
        match self {
            LifecycleStage::New => Some(0),
            LifecycleStage::Subscriber => Some(1),
            LifecycleStage::Lead => Some(2),
            LifecycleStage::Mql => Some(3),
            LifecycleStage::Sql => Some(4),
            LifecycleStage::Opportunity => Some(5),
            LifecycleStage::Customer => Some(6),
            LifecycleStage::Evangelist => Some(7),
            LifecycleStage::Dormant | LifecycleStage::Churned => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.progression_order().is_some()
    }

    /// Customer and evangelist are promotion-only: score decline never
    /// demotes them, only an explicit churn/unsubscribe does.
    pub fn is_promotion_only(&self) -> bool {
        matches!(self, LifecycleStage::Customer | LifecycleStage::Evangelist)
    }

    /// Stage implied by a composite score (90/70/55/40/20 thresholds).
    /// Honors the non-demotion guard for `current`.
    pub fn for_score(total: f64, current: LifecycleStage) -> Self {
        if current.is_promotion_only() {
            return current;
        }
        if total >= 90.0 {
            LifecycleStage::Evangelist
        } else if total >= 70.0 {
            LifecycleStage::Customer
        } else if total >= 55.0 {
            LifecycleStage::Sql
        } else if total >= 40.0 {
            LifecycleStage::Mql
        } else if total >= 20.0 {
            LifecycleStage::Lead
        } else {
            LifecycleStage::Subscriber
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::New => "new",
            LifecycleStage::Subscriber => "subscriber",
            LifecycleStage::Lead => "lead",
            LifecycleStage::Mql => "mql",
            LifecycleStage::Sql => "sql",
            LifecycleStage::Opportunity => "opportunity",
            LifecycleStage::Customer => "customer",
            LifecycleStage::Evangelist => "evangelist",
            LifecycleStage::Dormant => "dormant",
            LifecycleStage::Churned => "churned",
        }
    }
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialized lead score, one row per contact. `total_score` is always
/// recomputable from the ledger + profile snapshot; this row is a cached
/// view, not independently authoritative state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactScore {
    pub contact_id: Uuid,
    pub total_score: f64,
    /// Sum of ledger event points, floored at 0.
    pub engagement_score: f64,
    /// 0-20 from profile completeness.
    pub profile_score: f64,
    /// 0-20, exponential decay of time since last event.
    pub recency_score: f64,
    pub grade: Grade,
    pub lifecycle_stage: LifecycleStage,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub score_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ContactScore {
    pub fn new(contact_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            contact_id,
            total_score: 0.0,
            engagement_score: 0.0,
            profile_score: 0.0,
            recency_score: 0.0,
            grade: Grade::F,
            lifecycle_stage: LifecycleStage::Subscriber,
            last_activity_at: None,
            score_updated_at: now,
            created_at: now,
        }
    }
}

// ─── Scoring rules ──────────────────────────────────────────────────────────

/// Declarative mapping from an engagement event to points, with an optional
/// metadata condition filter and a per-contact execution cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub event_type: EventKind,
    /// Optional filter body: `{field: value, ...}` matched by equality over
    /// event metadata. Stored as raw JSON; corrupt bodies decode to no
    /// filter rather than failing evaluation.
    pub condition: serde_json::Value,
    pub points: f64,
    /// 0 = unlimited.
    pub max_per_contact: u32,
    /// Decay window in days; 0 = none. Reserved for rule-level decay.
    pub decay_days: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScoringRule {
    pub fn new(name: impl Into<String>, event_type: EventKind, points: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            event_type,
            condition: serde_json::json!({}),
            points,
            max_per_contact: 0,
            decay_days: 0,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ─── Suppression ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Bounce,
    Complaint,
    Unsubscribe,
    Manual,
    Compliance,
}

/// Permanent send-exclusion record keyed by lower-cased email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub email: String,
    pub reason: SuppressionReason,
    pub source: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_thresholds_are_inclusive_lower_bounds() {
        assert_eq!(Grade::from_score(90.0), Grade::APlus);
        assert_eq!(Grade::from_score(89.9), Grade::A);
        assert_eq!(Grade::from_score(70.0), Grade::BPlus);
        assert_eq!(Grade::from_score(60.0), Grade::B);
        assert_eq!(Grade::from_score(45.0), Grade::C);
        assert_eq!(Grade::from_score(25.0), Grade::D);
        assert_eq!(Grade::from_score(24.99), Grade::F);
        assert_eq!(Grade::from_score(0.0), Grade::F);
    }

    #[test]
    fn stage_order_excludes_sink_states() {
        assert_eq!(LifecycleStage::New.progression_order(), Some(0));
        assert_eq!(LifecycleStage::Evangelist.progression_order(), Some(7));
        assert_eq!(LifecycleStage::Dormant.progression_order(), None);
        assert_eq!(LifecycleStage::Churned.progression_order(), None);
    }

    #[test]
    fn score_never_demotes_customer() {
        let stage = LifecycleStage::for_score(0.0, LifecycleStage::Customer);
        assert_eq!(stage, LifecycleStage::Customer);
        let stage = LifecycleStage::for_score(10.0, LifecycleStage::Evangelist);
        assert_eq!(stage, LifecycleStage::Evangelist);
    }

    #[test]
    fn score_maps_to_stage() {
        assert_eq!(
            LifecycleStage::for_score(95.0, LifecycleStage::Lead),
            LifecycleStage::Evangelist
        );
        assert_eq!(
            LifecycleStage::for_score(44.8, LifecycleStage::Subscriber),
            LifecycleStage::Mql
        );
        assert_eq!(
            LifecycleStage::for_score(5.0, LifecycleStage::New),
            LifecycleStage::Subscriber
        );
    }
}
