//! Lifecycle engine — evaluates dormancy, churn, and progression rules per
//! contact and applies stage transitions in batch sweeps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadflow_core::config::LifecycleConfig;
use leadflow_core::event_bus::{make_event, noop_sink, DecisionEventKind, EventSink};
use leadflow_core::types::{EventKind, LifecycleStage};
use leadflow_core::{ContactStore, FlowError, FlowResult};

use crate::rules::{default_rules, dormancy_rules, validate_rules};
use crate::types::{
    EngagementSummary, LifecycleHealth, LifecycleReport, ReengagementCandidate,
    ReengagementPriority, StageStats, SweepOutcome, TransitionResult, TransitionRule,
};

/// Lifecycle engine: stateless evaluation over the shared contact store with
/// a validated rule configuration.
pub struct LifecycleEngine {
    store: Arc<ContactStore>,
    config: LifecycleConfig,
    progression_rules: Vec<TransitionRule>,
    dormancy_rules: Vec<TransitionRule>,
    event_sink: Arc<dyn EventSink>,
}

impl LifecycleEngine {
    /// Engine with the default rule sets (always valid).
    pub fn new(store: Arc<ContactStore>, config: LifecycleConfig) -> Self {
        info!(
            sweep_limit = config.sweep_limit,
            window_days = config.engagement_window_days,
            "Lifecycle engine initialized"
        );
        Self {
            store,
            config,
            progression_rules: default_rules(),
            dormancy_rules: dormancy_rules(),
            event_sink: noop_sink(),
        }
    }

    /// Replaces the rule configuration. Rejects cyclic/regressive rule sets
    /// before any evaluation can run against them.
    pub fn with_rules(
        mut self,
        progression: Vec<TransitionRule>,
        dormancy: Vec<TransitionRule>,
    ) -> FlowResult<Self> {
        validate_rules(&progression)?;
        validate_rules(&dormancy)?;
        self.progression_rules = progression;
        self.dormancy_rules = dormancy;
        Ok(self)
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    // ─── Engagement window ─────────────────────────────────────────────────

    /// Aggregates a contact's ledger over the trailing window — the shared
    /// input to both dormancy and progression checks.
    pub fn contact_engagement(&self, contact_id: Uuid, days: i64) -> EngagementSummary {
        let now = Utc::now();
        let start = now - Duration::days(days);
        let mut summary = EngagementSummary::default();
        let mut total_events: u64 = 0;

        for event in self.store.events_for(contact_id) {
            if event.created_at < start {
                continue;
            }
            match event.event_type {
                EventKind::Opened => {
                    summary.total_opens += 1;
                    summary.last_open_at = summary.last_open_at.max(Some(event.created_at));
                }
                EventKind::Clicked => {
                    summary.total_clicks += 1;
                    summary.last_click_at = summary.last_click_at.max(Some(event.created_at));
                }
                EventKind::Bounced => summary.total_bounces += 1,
                EventKind::Unsubscribed => summary.total_unsubscribes += 1,
                _ => {}
            }
            total_events += 1;
            summary.last_activity_at = summary.last_activity_at.max(Some(event.created_at));
        }

        if let Some(last) = summary.last_activity_at {
            summary.days_since_last_activity = Some((now - last).num_days());
        }
        let weeks = (days as f64 / 7.0).max(1.0);
        summary.engagement_velocity = ((total_events as f64 / weeks) * 100.0).round() / 100.0;
        summary
    }

    // ─── Evaluation ────────────────────────────────────────────────────────

    /// Evaluates transition rules for one contact without applying anything.
    /// Order: dormancy (highest priority, short-circuits), then churn, then
    /// the first satisfied progression rule. At most one transition results.
    pub fn evaluate(&self, contact_id: Uuid) -> FlowResult<TransitionResult> {
        if self.store.get_contact(contact_id).is_none() {
            return Err(FlowError::not_found("contact", contact_id));
        }
        let (current_stage, score) = match self.store.get_score(contact_id) {
            Some(row) => (row.lifecycle_stage, row.total_score),
            None => (LifecycleStage::New, 0.0),
        };
        let engagement = self.contact_engagement(contact_id, self.config.engagement_window_days);

        // Dormancy first: inactivity overrides any score a contact still has.
        for rule in self.dormancy_rules.iter().filter(|r| r.from_stage == current_stage) {
            let (Some(max_inactive), Some(inactive)) =
                (rule.max_inactive_days, engagement.days_since_last_activity)
            else {
                continue;
            };
            if inactive >= max_inactive {
                return Ok(TransitionResult {
                    contact_id,
                    previous_stage: current_stage,
                    new_stage: rule.to_stage,
                    transitioned: true,
                    rule_description: rule.description.clone(),
                    reason: format!(
                        "Inactive for {inactive} days (threshold: {max_inactive})"
                    ),
                });
            }
        }

        // Churn: an unsubscribe forces the sink state from any stage.
        if engagement.total_unsubscribes > 0 && current_stage != LifecycleStage::Churned {
            return Ok(TransitionResult {
                contact_id,
                previous_stage: current_stage,
                new_stage: LifecycleStage::Churned,
                transitioned: true,
                rule_description: "Auto-churn on unsubscribe".to_string(),
                reason: "Contact unsubscribed".to_string(),
            });
        }

        // Progression: first satisfied rule in configured order wins.
        for rule in self
            .progression_rules
            .iter()
            .filter(|r| r.from_stage == current_stage)
        {
            if score < rule.min_score
                || engagement.total_opens < rule.min_opens
                || engagement.total_clicks < rule.min_clicks
            {
                continue;
            }
            return Ok(TransitionResult {
                contact_id,
                previous_stage: current_stage,
                new_stage: rule.to_stage,
                transitioned: true,
                rule_description: rule.description.clone(),
                reason: format!(
                    "Score={score:.0}, opens={}, clicks={}",
                    engagement.total_opens, engagement.total_clicks
                ),
            });
        }

        Ok(TransitionResult::no_op(
            contact_id,
            current_stage,
            "No matching transition rule",
        ))
    }

    // ─── Batch sweep ───────────────────────────────────────────────────────

    /// Evaluates up to `limit` most recently scored contacts and applies the
    /// first qualifying transition per contact. Best-effort per item and
    /// idempotent: re-running a sweep re-evaluates from current state.
    pub fn process_batch(&self, limit: usize) -> SweepOutcome {
        let rows = self.store.recently_scored(limit);
        let processed = rows.len();
        let mut transitions = Vec::new();

        for row in rows {
            let result = match self.evaluate(row.contact_id) {
                Ok(result) => result,
                Err(e) => {
                    warn!(contact_id = %row.contact_id, error = %e, "Lifecycle evaluation failed, skipping");
                    continue;
                }
            };
            if !result.transitioned {
                continue;
            }

            self.store.upsert_score(row.contact_id, |s| {
                s.lifecycle_stage = result.new_stage;
            });
            metrics::counter!("lifecycle.transitions").increment(1);
            info!(
                contact_id = %result.contact_id,
                from = %result.previous_stage,
                to = %result.new_stage,
                reason = %result.reason,
                "Lifecycle transition"
            );

            self.event_sink.emit(make_event(
                DecisionEventKind::StageChanged,
                result.contact_id,
                serde_json::json!({
                    "previous_stage": result.previous_stage.as_str(),
                    "new_stage": result.new_stage.as_str(),
                    "reason": result.reason,
                }),
            ));
            if result.new_stage.is_promotion_only() {
                self.event_sink.emit(make_event(
                    DecisionEventKind::MilestoneReached,
                    result.contact_id,
                    serde_json::json!({ "milestone": result.new_stage.as_str() }),
                ));
            }

            transitions.push(result);
        }

        debug!(
            processed = processed,
            transitioned = transitions.len(),
            "Lifecycle sweep complete"
        );
        SweepOutcome {
            processed,
            transitioned: transitions.len(),
            transitions,
        }
    }

    // ─── Reporting ─────────────────────────────────────────────────────────

    /// Lifecycle distribution with per-stage stats and overall health rates.
    pub fn lifecycle_report(&self) -> LifecycleReport {
        let rows = self.store.all_scores();
        let total = rows.len() as u64;

        let mut buckets: HashMap<LifecycleStage, (u64, f64, f64)> = HashMap::new();
        for row in &rows {
            let bucket = buckets.entry(row.lifecycle_stage).or_insert((0, 0.0, 0.0));
            bucket.0 += 1;
            bucket.1 += row.total_score;
            bucket.2 += row.engagement_score;
        }

        let mut stages = HashMap::new();
        let mut dormant: u64 = 0;
        let mut churned: u64 = 0;
        for (stage, (count, score_sum, engagement_sum)) in buckets {
            stages.insert(
                stage.as_str().to_string(),
                StageStats {
                    count,
                    pct: pct(count, total),
                    avg_score: round1(score_sum / count as f64),
                    avg_engagement: round1(engagement_sum / count as f64),
                },
            );
            match stage {
                LifecycleStage::Dormant => dormant = count,
                LifecycleStage::Churned => churned = count,
                _ => {}
            }
        }

        let active = total - dormant - churned;
        LifecycleReport {
            total_contacts: total,
            stages,
            health: LifecycleHealth {
                active_rate: pct(active, total),
                dormant_rate: pct(dormant, total),
                churn_rate: pct(churned, total),
            },
        }
    }

    /// Contacts whose last activity falls inside the re-engagement window
    /// and who had meaningful past engagement, most engaged first.
    pub fn reengagement_candidates(
        &self,
        min_inactive_days: i64,
        max_inactive_days: i64,
        limit: usize,
    ) -> Vec<ReengagementCandidate> {
        let now = Utc::now();
        let window_start = now - Duration::days(max_inactive_days);
        let window_end = now - Duration::days(min_inactive_days);

        let mut candidates: Vec<ReengagementCandidate> = self
            .store
            .all_scores()
            .into_iter()
            .filter_map(|row| {
                let last = row.last_activity_at?;
                if last < window_start || last > window_end || row.engagement_score <= 5.0 {
                    return None;
                }
                let contact = self.store.get_contact(row.contact_id)?;
                if !contact.subscribed {
                    return None;
                }
                let priority = if row.engagement_score > 30.0 {
                    ReengagementPriority::High
                } else {
                    ReengagementPriority::Medium
                };
                Some(ReengagementCandidate {
                    contact_id: row.contact_id,
                    email: contact.email.clone(),
                    name: contact.display_name(),
                    lifecycle_stage: row.lifecycle_stage,
                    total_score: round1(row.total_score),
                    engagement_score: round1(row.engagement_score),
                    days_inactive: (now - last).num_days(),
                    priority,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.engagement_score
                .partial_cmp(&a.engagement_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        candidates
    }

    pub fn store(&self) -> &Arc<ContactStore> {
        &self.store
    }
}

fn pct(count: u64, total: u64) -> f64 {
    round1(count as f64 / total.max(1) as f64 * 100.0)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::event_bus::CaptureSink;
    use leadflow_core::types::{Contact, ScoreEvent};
    use std::collections::HashMap as StdHashMap;

    fn engine() -> LifecycleEngine {
        LifecycleEngine::new(Arc::new(ContactStore::new()), LifecycleConfig::default())
    }

    fn seed_contact(engine: &LifecycleEngine, email: &str) -> Uuid {
        engine.store().insert_contact(Contact::new(email)).unwrap()
    }

    fn append_event(
        engine: &LifecycleEngine,
        contact_id: Uuid,
        kind: EventKind,
        days_ago: i64,
    ) {
        engine.store().append_event(ScoreEvent {
            id: Uuid::new_v4(),
            contact_id,
            rule_id: None,
            event_type: kind,
            points: 1.0,
            reason: String::new(),
            metadata: StdHashMap::new(),
            created_at: Utc::now() - Duration::days(days_ago),
        });
    }

    fn set_score(engine: &LifecycleEngine, contact_id: Uuid, stage: LifecycleStage, total: f64) {
        engine.store().upsert_score(contact_id, |s| {
            s.lifecycle_stage = stage;
            s.total_score = total;
        });
    }

    #[test]
    fn customer_with_zero_score_is_never_demoted() {
        let engine = engine();
        let id = seed_contact(&engine, "cust@example.com");
        set_score(&engine, id, LifecycleStage::Customer, 0.0);
        append_event(&engine, id, EventKind::Opened, 1);

        let outcome = engine.process_batch(10);
        assert_eq!(outcome.transitioned, 0);
        assert_eq!(
            engine.store().get_score(id).unwrap().lifecycle_stage,
            LifecycleStage::Customer
        );
    }

    #[test]
    fn dormancy_takes_priority_over_progression() {
        let engine = engine();
        let id = seed_contact(&engine, "quiet@example.com");
        // Score satisfies the SQL -> opportunity rule, but the contact has
        // been silent past the SQL dormancy threshold (21 days).
        set_score(&engine, id, LifecycleStage::Sql, 85.0);
        append_event(&engine, id, EventKind::Clicked, 30);

        let result = engine.evaluate(id).unwrap();
        assert!(result.transitioned);
        assert_eq!(result.new_stage, LifecycleStage::Dormant);
    }

    #[test]
    fn unsubscribe_forces_churn() {
        let engine = engine();
        let id = seed_contact(&engine, "bye@example.com");
        set_score(&engine, id, LifecycleStage::Customer, 95.0);
        append_event(&engine, id, EventKind::Unsubscribed, 1);

        let result = engine.evaluate(id).unwrap();
        assert!(result.transitioned);
        assert_eq!(result.new_stage, LifecycleStage::Churned);
    }

    #[test]
    fn progression_applies_first_matching_rule() {
        let engine = engine();
        let id = seed_contact(&engine, "fresh@example.com");
        set_score(&engine, id, LifecycleStage::New, 12.0);
        append_event(&engine, id, EventKind::Opened, 1);

        let result = engine.evaluate(id).unwrap();
        assert!(result.transitioned);
        assert_eq!(result.new_stage, LifecycleStage::Subscriber);
    }

    #[test]
    fn progression_requires_all_thresholds() {
        let engine = engine();
        let id = seed_contact(&engine, "warm@example.com");
        // Subscriber -> lead needs score >= 15 AND 2+ opens; only one open.
        set_score(&engine, id, LifecycleStage::Subscriber, 50.0);
        append_event(&engine, id, EventKind::Opened, 1);

        let result = engine.evaluate(id).unwrap();
        assert!(!result.transitioned);
    }

    #[test]
    fn sweep_is_idempotent() {
        let engine = engine();
        let id = seed_contact(&engine, "steady@example.com");
        set_score(&engine, id, LifecycleStage::New, 12.0);
        append_event(&engine, id, EventKind::Opened, 1);

        let first = engine.process_batch(10);
        assert_eq!(first.transitioned, 1);
        assert_eq!(
            engine.store().get_score(id).unwrap().lifecycle_stage,
            LifecycleStage::Subscriber
        );

        // Subscriber -> lead needs 2 opens and score 15; the contact
        // qualifies for neither, so a re-run is a no-op.
        let second = engine.process_batch(10);
        assert_eq!(second.transitioned, 0);
    }

    #[test]
    fn evaluate_unknown_contact_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.evaluate(Uuid::new_v4()),
            Err(FlowError::NotFound(_))
        ));
    }

    #[test]
    fn engagement_summary_counts_and_velocity() {
        let engine = engine();
        let id = seed_contact(&engine, "busy@example.com");
        for days_ago in [1, 2, 3] {
            append_event(&engine, id, EventKind::Opened, days_ago);
        }
        append_event(&engine, id, EventKind::Clicked, 1);
        append_event(&engine, id, EventKind::Bounced, 5);
        // Outside the window, ignored.
        append_event(&engine, id, EventKind::Opened, 120);

        let summary = engine.contact_engagement(id, 90);
        assert_eq!(summary.total_opens, 3);
        assert_eq!(summary.total_clicks, 1);
        assert_eq!(summary.total_bounces, 1);
        assert_eq!(summary.days_since_last_activity, Some(1));
        // 5 events over ~12.86 weeks.
        assert!((summary.engagement_velocity - 0.39).abs() < 0.02);
    }

    #[test]
    fn sweep_emits_milestone_on_customer_promotion() {
        let sink = Arc::new(CaptureSink::new());
        let engine = LifecycleEngine::new(Arc::new(ContactStore::new()), LifecycleConfig::default())
            .with_event_sink(sink.clone());
        let id = seed_contact(&engine, "vip@example.com");
        set_score(&engine, id, LifecycleStage::Opportunity, 85.0);
        append_event(&engine, id, EventKind::Clicked, 1);

        let outcome = engine.process_batch(10);
        assert_eq!(outcome.transitioned, 1);
        assert_eq!(sink.count_kind(DecisionEventKind::StageChanged), 1);
        assert_eq!(sink.count_kind(DecisionEventKind::MilestoneReached), 1);
    }

    #[test]
    fn report_health_rates() {
        let engine = engine();
        for (email, stage) in [
            ("a@example.com", LifecycleStage::Lead),
            ("b@example.com", LifecycleStage::Lead),
            ("c@example.com", LifecycleStage::Dormant),
            ("d@example.com", LifecycleStage::Churned),
        ] {
            let id = seed_contact(&engine, email);
            set_score(&engine, id, stage, 10.0);
        }

        let report = engine.lifecycle_report();
        assert_eq!(report.total_contacts, 4);
        assert_eq!(report.stages["lead"].count, 2);
        assert_eq!(report.health.active_rate, 50.0);
        assert_eq!(report.health.dormant_rate, 25.0);
        assert_eq!(report.health.churn_rate, 25.0);
    }

    #[test]
    fn reengagement_candidates_respect_window_and_priority() {
        let engine = engine();

        let high = seed_contact(&engine, "high@example.com");
        engine.store().upsert_score(high, |s| {
            s.engagement_score = 40.0;
            s.total_score = 45.0;
            s.last_activity_at = Some(Utc::now() - Duration::days(40));
        });

        let medium = seed_contact(&engine, "medium@example.com");
        engine.store().upsert_score(medium, |s| {
            s.engagement_score = 10.0;
            s.total_score = 12.0;
            s.last_activity_at = Some(Utc::now() - Duration::days(35));
        });

        // Too recent to count as inactive.
        let recent = seed_contact(&engine, "recent@example.com");
        engine.store().upsert_score(recent, |s| {
            s.engagement_score = 50.0;
            s.last_activity_at = Some(Utc::now() - Duration::days(3));
        });

        let candidates = engine.reengagement_candidates(30, 90, 10);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].contact_id, high);
        assert_eq!(candidates[0].priority, ReengagementPriority::High);
        assert_eq!(candidates[1].priority, ReengagementPriority::Medium);
    }
}
