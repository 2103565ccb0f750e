//! End-to-end flow: events -> scoring -> lifecycle sweep -> audiences ->
//! automation, wired the way the binary wires them.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use leadflow_audience::{AudienceBuilder, AudienceEvaluator};
use leadflow_automation::{
    ActionStep, AutomationEngine, EventSinkAdapter, TriggerKind, Workflow, WorkflowStep,
};
use leadflow_core::config::{LifecycleConfig, ScoringConfig};
use leadflow_core::types::{Contact, EventKind, LifecycleStage, ScoringRule, SuppressionReason};
use leadflow_core::ContactStore;
use leadflow_lifecycle::LifecycleEngine;
use leadflow_scoring::ScoringEngine;

struct Harness {
    store: Arc<ContactStore>,
    scoring: ScoringEngine,
    lifecycle: LifecycleEngine,
    audiences: AudienceEvaluator,
    automation: Arc<AutomationEngine>,
}

fn harness() -> Harness {
    let store = Arc::new(ContactStore::new());
    let automation = Arc::new(AutomationEngine::new(store.clone()));
    let sink = Arc::new(EventSinkAdapter::new(automation.clone()));
    Harness {
        scoring: ScoringEngine::new(store.clone(), ScoringConfig::default())
            .with_event_sink(sink.clone()),
        lifecycle: LifecycleEngine::new(store.clone(), LifecycleConfig::default())
            .with_event_sink(sink),
        audiences: AudienceEvaluator::new(store.clone()),
        automation,
        store,
    }
}

fn seed(h: &Harness, email: &str, country: &str) -> Uuid {
    let mut contact = Contact::new(email);
    contact.first_name = "Test".to_string();
    contact.country = country.to_string();
    h.store.insert_contact(contact).unwrap()
}

#[test]
fn events_flow_through_scoring_to_stage_and_audience() {
    let h = harness();
    let id = seed(&h, "flow@example.com", "US");
    h.scoring.add_rule(ScoringRule::new("Open", EventKind::Opened, 5.0));
    h.scoring.add_rule(ScoringRule::new("Click", EventKind::Clicked, 10.0));

    for _ in 0..4 {
        h.scoring.process_rules(id, EventKind::Opened, None).unwrap();
    }
    for _ in 0..3 {
        h.scoring.process_rules(id, EventKind::Clicked, None).unwrap();
    }

    let score = h.store.get_score(id).unwrap();
    assert_eq!(score.engagement_score, 50.0);
    assert!(score.total_score > 50.0);

    // Lifecycle sweep can promote further but never demotes on re-run.
    let outcome = h.lifecycle.process_batch(10);
    assert_eq!(outcome.processed, 1);
    let stage_after = h.store.get_score(id).unwrap().lifecycle_stage;
    h.lifecycle.process_batch(10);
    assert_eq!(h.store.get_score(id).unwrap().lifecycle_stage, stage_after);

    let engaged = h
        .audiences
        .create(
            AudienceBuilder::new("Engaged US")
                .rule("country", "eq", json!("US"))
                .build(),
        )
        .unwrap();
    assert_eq!(h.audiences.estimate_size(engaged.id).unwrap(), 1);
}

#[test]
fn score_changed_trigger_tags_hot_contacts() {
    let h = harness();
    let id = seed(&h, "hot@example.com", "US");
    h.automation
        .add_workflow(Workflow::new(
            "Tag hot leads",
            TriggerKind::ScoreChanged,
            vec![
                WorkflowStep::Condition {
                    field: "total_score".to_string(),
                    operator: "gte".to_string(),
                    value: json!(60),
                },
                WorkflowStep::Action(ActionStep::Tag {
                    tag_name: "hot".to_string(),
                }),
            ],
        ))
        .unwrap();

    h.scoring
        .record_event(id, EventKind::Clicked, 10.0, "manual", None, None)
        .unwrap();
    assert!(h.store.get_contact(id).unwrap().tags.is_empty());

    h.scoring
        .record_event(id, EventKind::FormSubmitted, 35.0, "manual", None, None)
        .unwrap();
    let tags = h.store.get_contact(id).unwrap().tags;
    assert_eq!(tags, vec!["hot".to_string()]);
}

#[test]
fn suppression_blocks_rules_and_audience_membership() {
    let h = harness();
    let id = seed(&h, "quiet@example.com", "US");
    h.scoring.add_rule(ScoringRule::new("Open", EventKind::Opened, 5.0));
    h.scoring
        .add_to_suppression("quiet@example.com", SuppressionReason::Complaint, "test", "");

    let events = h.scoring.process_rules(id, EventKind::Opened, None).unwrap();
    assert!(events.is_empty());

    let audience = h
        .audiences
        .create(
            AudienceBuilder::new("US")
                .rule("country", "eq", json!("US"))
                .build(),
        )
        .unwrap();
    assert_eq!(h.audiences.estimate_size(audience.id).unwrap(), 0);

    h.scoring.remove_from_suppression("quiet@example.com");
    assert_eq!(h.audiences.estimate_size(audience.id).unwrap(), 1);
}

#[test]
fn unsubscribe_churns_on_next_sweep() {
    let h = harness();
    let id = seed(&h, "leaving@example.com", "US");
    h.scoring
        .record_event(id, EventKind::Opened, 5.0, "open", None, None)
        .unwrap();
    h.scoring
        .record_event(id, EventKind::Unsubscribed, -10.0, "unsubscribe", None, None)
        .unwrap();

    let outcome = h.lifecycle.process_batch(10);
    assert_eq!(outcome.transitioned, 1);
    assert_eq!(
        h.store.get_score(id).unwrap().lifecycle_stage,
        LifecycleStage::Churned
    );
}
