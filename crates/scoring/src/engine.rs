//! Core scoring engine — appends ledger events, maintains the materialized
//! contact score, and applies declarative scoring rules.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadflow_core::config::ScoringConfig;
use leadflow_core::event_bus::{make_event, noop_sink, DecisionEventKind, EventSink};
use leadflow_core::types::{
    ContactScore, EventKind, Grade, LifecycleStage, ScoreEvent, ScoringRule,
};
use leadflow_core::{ContactStore, FlowError, FlowResult};

use crate::score;

/// Leaderboard row joining a score with its contact identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub contact_id: Uuid,
    pub email: String,
    pub name: String,
    pub total_score: f64,
    pub engagement_score: f64,
    pub profile_score: f64,
    pub recency_score: f64,
    pub grade: Grade,
    pub lifecycle_stage: LifecycleStage,
    pub last_activity_at: Option<chrono::DateTime<Utc>>,
}

/// Scoring engine: stateless computation over the shared contact store,
/// plus its own registry of scoring rules.
pub struct ScoringEngine {
    store: Arc<ContactStore>,
    config: ScoringConfig,
    rules: DashMap<Uuid, ScoringRule>,
    event_sink: Arc<dyn EventSink>,
}

impl ScoringEngine {
    pub fn new(store: Arc<ContactStore>, config: ScoringConfig) -> Self {
        info!(
            decay_rate = config.recency_decay_rate,
            window_days = config.recency_window_days,
            "Scoring engine initialized"
        );
        Self {
            store,
            config,
            rules: DashMap::new(),
            event_sink: noop_sink(),
        }
    }

    /// Attach an event sink for emitting decision events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    // ─── Rule registry ─────────────────────────────────────────────────────

    pub fn add_rule(&self, rule: ScoringRule) -> Uuid {
        let id = rule.id;
        debug!(rule_id = %id, name = %rule.name, event_type = rule.event_type.as_str(), "Registered scoring rule");
        self.rules.insert(id, rule);
        id
    }

    pub fn get_rule(&self, id: Uuid) -> Option<ScoringRule> {
        self.rules.get(&id).map(|r| r.clone())
    }

    pub fn list_rules(&self) -> Vec<ScoringRule> {
        self.rules.iter().map(|r| r.value().clone()).collect()
    }

    pub fn set_rule_active(&self, id: Uuid, active: bool) -> FlowResult<()> {
        let mut rule = self
            .rules
            .get_mut(&id)
            .ok_or_else(|| FlowError::not_found("scoring rule", id))?;
        rule.active = active;
        rule.updated_at = Utc::now();
        Ok(())
    }

    pub fn delete_rule(&self, id: Uuid) -> FlowResult<()> {
        self.rules
            .remove(&id)
            .ok_or_else(|| FlowError::not_found("scoring rule", id))?;
        Ok(())
    }

    // ─── Event recording ───────────────────────────────────────────────────

    /// Appends a score event to the ledger, then upserts the materialized
    /// score: the event is durably in the ledger before the score row
    /// changes, and the row update runs under the contact's entry lock.
    pub fn record_event(
        &self,
        contact_id: Uuid,
        event_type: EventKind,
        points: f64,
        reason: impl Into<String>,
        rule_id: Option<Uuid>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> FlowResult<ScoreEvent> {
        let contact = self
            .store
            .get_contact(contact_id)
            .ok_or_else(|| FlowError::not_found("contact", contact_id))?;

        let now = Utc::now();
        let event = ScoreEvent {
            id: Uuid::new_v4(),
            contact_id,
            rule_id,
            event_type,
            points,
            reason: reason.into(),
            metadata: metadata.unwrap_or_default(),
            created_at: now,
        };
        self.store.append_event(event.clone());

        let previous_stage = self.store.get_score(contact_id).map(|s| s.lifecycle_stage);
        let profile = score::profile_score(&self.config, &contact);
        let updated = self.store.upsert_score(contact_id, |row| {
            row.engagement_score = (row.engagement_score + points).max(0.0);
            row.last_activity_at = Some(now);
            row.profile_score = profile;
            row.recency_score = score::recency_score(&self.config, Some(now), now);
            row.total_score = row.engagement_score + row.profile_score + row.recency_score;
            row.grade = Grade::from_score(row.total_score);
            row.lifecycle_stage = LifecycleStage::for_score(row.total_score, row.lifecycle_stage);
            row.score_updated_at = now;
        });

        metrics::counter!("scoring.events_recorded").increment(1);
        debug!(
            contact_id = %contact_id,
            event_type = event_type.as_str(),
            points = points,
            total = updated.total_score,
            grade = updated.grade.as_str(),
            "Score event recorded"
        );

        self.event_sink.emit(make_event(
            DecisionEventKind::ScoreChanged,
            contact_id,
            serde_json::json!({
                "total_score": updated.total_score,
                "grade": updated.grade.as_str(),
                "lifecycle_stage": updated.lifecycle_stage.as_str(),
            }),
        ));
        if previous_stage.is_some() && previous_stage != Some(updated.lifecycle_stage) {
            self.event_sink.emit(make_event(
                DecisionEventKind::StageChanged,
                contact_id,
                serde_json::json!({
                    "previous_stage": previous_stage.map(|s| s.as_str()),
                    "new_stage": updated.lifecycle_stage.as_str(),
                }),
            ));
        }

        Ok(event)
    }

    /// Full ground-truth rebuild from the ledger and the current profile
    /// snapshot. The materialized row is only a cached view of this.
    pub fn recalculate(&self, contact_id: Uuid) -> FlowResult<ContactScore> {
        let contact = self
            .store
            .get_contact(contact_id)
            .ok_or_else(|| FlowError::not_found("contact", contact_id))?;

        let events = self.store.events_for(contact_id);
        let now = Utc::now();
        let snapshot = score::recompute(&self.config, &events, &contact, now);

        let updated = self.store.upsert_score(contact_id, |row| {
            row.engagement_score = snapshot.engagement_score;
            row.profile_score = snapshot.profile_score;
            row.recency_score = snapshot.recency_score;
            row.total_score = snapshot.total_score;
            row.grade = snapshot.grade;
            row.lifecycle_stage =
                LifecycleStage::for_score(snapshot.total_score, row.lifecycle_stage);
            row.last_activity_at = snapshot.last_activity_at;
            row.score_updated_at = now;
        });

        metrics::counter!("scoring.recalculations").increment(1);
        Ok(updated)
    }

    // ─── Rule application ──────────────────────────────────────────────────

    /// Applies all active scoring rules matching an event type. Best-effort
    /// per rule: a failing rule is logged and skipped, never aborts the rest.
    pub fn process_rules(
        &self,
        contact_id: Uuid,
        event_type: EventKind,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> FlowResult<Vec<ScoreEvent>> {
        let contact = self
            .store
            .get_contact(contact_id)
            .ok_or_else(|| FlowError::not_found("contact", contact_id))?;

        if self.store.is_suppressed(&contact.email) {
            debug!(contact_id = %contact_id, "Contact suppressed, skipping scoring rules");
            return Ok(Vec::new());
        }

        let metadata = metadata.unwrap_or_default();
        let matching: Vec<ScoringRule> = self
            .rules
            .iter()
            .filter(|r| r.active && r.event_type == event_type)
            .map(|r| r.value().clone())
            .collect();

        let mut events = Vec::new();
        for rule in matching {
            if rule.max_per_contact > 0 {
                let applied = self.store.rule_event_count(contact_id, rule.id);
                if applied >= rule.max_per_contact as usize {
                    debug!(rule_id = %rule.id, contact_id = %contact_id, "Rule cap reached");
                    continue;
                }
            }

            if !condition_matches(&rule, &metadata) {
                continue;
            }

            match self.record_event(
                contact_id,
                event_type,
                rule.points,
                format!("Rule: {}", rule.name),
                Some(rule.id),
                Some(metadata.clone()),
            ) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Scoring rule application failed, skipping");
                }
            }
        }

        Ok(events)
    }

    // ─── Aggregations ──────────────────────────────────────────────────────

    /// Top scored contacts.
    pub fn score_leaderboard(
        &self,
        limit: usize,
        min_score: f64,
        stage: Option<LifecycleStage>,
    ) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .store
            .all_scores()
            .into_iter()
            .filter(|s| s.total_score >= min_score)
            .filter(|s| stage.map_or(true, |want| s.lifecycle_stage == want))
            .filter_map(|s| {
                let contact = self.store.get_contact(s.contact_id)?;
                Some(LeaderboardEntry {
                    contact_id: s.contact_id,
                    email: contact.email.clone(),
                    name: contact.display_name(),
                    total_score: s.total_score,
                    engagement_score: s.engagement_score,
                    profile_score: s.profile_score,
                    recency_score: s.recency_score,
                    grade: s.grade,
                    lifecycle_stage: s.lifecycle_stage,
                    last_activity_at: s.last_activity_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(limit);
        entries
    }

    /// Count of scored contacts per lifecycle stage.
    pub fn lifecycle_distribution(&self) -> HashMap<String, u64> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for row in self.store.all_scores() {
            *counts
                .entry(row.lifecycle_stage.as_str().to_string())
                .or_insert(0) += 1;
        }
        counts
    }

    pub fn store(&self) -> &Arc<ContactStore> {
        &self.store
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }
}

/// Equality filter over event metadata. Stored configuration must never
/// crash evaluation: a malformed condition body downgrades to "no filter"
/// with a logged warning.
fn condition_matches(rule: &ScoringRule, metadata: &HashMap<String, serde_json::Value>) -> bool {
    let condition = match &rule.condition {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => return true,
        serde_json::Value::String(raw) => match serde_json::from_str(raw) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                warn!(rule_id = %rule.id, "Malformed scoring rule condition, treating as no filter");
                return true;
            }
        },
        _ => {
            warn!(rule_id = %rule.id, "Malformed scoring rule condition, treating as no filter");
            return true;
        }
    };

    if condition.is_empty() {
        return true;
    }
    if metadata.is_empty() {
        return false;
    }
    condition
        .iter()
        .all(|(key, want)| metadata.get(key) == Some(want))
}
