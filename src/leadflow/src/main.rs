//! LeadFlow — contact decision engine for marketing automation.
//!
//! Demo entry point that wires the engines together, seeds a handful of
//! contacts, records engagement, and runs one lifecycle sweep.

use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use leadflow_audience::{AudienceBuilder, AudienceEvaluator};
use leadflow_automation::{
    ActionStep, AutomationEngine, EventSinkAdapter, TriggerKind, Workflow, WorkflowStep,
};
use leadflow_core::config::AppConfig;
use leadflow_core::types::{Contact, EventKind, ScoringRule};
use leadflow_core::ContactStore;
use leadflow_lifecycle::LifecycleEngine;
use leadflow_scoring::ScoringEngine;

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(about = "Contact decision engine: scoring, lifecycle, audiences, automation")]
#[command(version)]
struct Cli {
    /// Lifecycle sweep batch size (overrides config)
    #[arg(long, env = "LEADFLOW__LIFECYCLE__SWEEP_LIMIT")]
    sweep_limit: Option<usize>,

    /// Skip the demo data seed (start empty)
    #[arg(long, default_value_t = false)]
    no_seed: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadflow=info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!("LeadFlow starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(limit) = cli.sweep_limit {
        config.lifecycle.sweep_limit = limit;
    }
    info!(
        sweep_limit = config.lifecycle.sweep_limit,
        recency_window_days = config.scoring.recency_window_days,
        "Configuration loaded"
    );

    let store = Arc::new(ContactStore::new());
    let automation = Arc::new(AutomationEngine::new(store.clone()));
    let sink = Arc::new(EventSinkAdapter::new(automation.clone()));

    let scoring = ScoringEngine::new(store.clone(), config.scoring.clone())
        .with_event_sink(sink.clone());
    let lifecycle = LifecycleEngine::new(store.clone(), config.lifecycle.clone())
        .with_event_sink(sink.clone());
    let audiences = AudienceEvaluator::new(store.clone());

    if !cli.no_seed {
        seed_demo(&scoring, &audiences, &automation)?;
    }

    let outcome = lifecycle.process_batch(config.lifecycle.sweep_limit);
    info!(
        processed = outcome.processed,
        transitioned = outcome.transitioned,
        "Lifecycle sweep complete"
    );

    let report = lifecycle.lifecycle_report();
    info!(
        total_contacts = report.total_contacts,
        active_rate = report.health.active_rate,
        "Lifecycle report"
    );
    let candidates = lifecycle.reengagement_candidates(
        config.lifecycle.reengagement_min_inactive_days,
        config.lifecycle.reengagement_max_inactive_days,
        10,
    );
    info!(count = candidates.len(), "Re-engagement candidates");

    for entry in scoring.score_leaderboard(5, 0.0, None) {
        info!(
            email = %entry.email,
            total = entry.total_score,
            grade = entry.grade.as_str(),
            stage = %entry.lifecycle_stage,
            "Leaderboard"
        );
    }

    Ok(())
}

fn seed_demo(
    scoring: &ScoringEngine,
    audiences: &AudienceEvaluator,
    automation: &AutomationEngine,
) -> anyhow::Result<()> {
    let store = scoring.store();

    let mut alice = Contact::new("alice@example.com");
    alice.first_name = "Alice".to_string();
    alice.last_name = "Nguyen".to_string();
    alice.country = "US".to_string();
    let alice_id = store.insert_contact(alice)?;

    let mut bob = Contact::new("bob@example.com");
    bob.first_name = "Bob".to_string();
    bob.country = "CA".to_string();
    let bob_id = store.insert_contact(bob)?;

    scoring.add_rule(ScoringRule::new("Email open", EventKind::Opened, 5.0));
    scoring.add_rule(ScoringRule::new("Link click", EventKind::Clicked, 10.0));

    automation.add_workflow(Workflow::new(
        "Tag hot leads",
        TriggerKind::ScoreChanged,
        vec![
            WorkflowStep::Condition {
                field: "total_score".to_string(),
                operator: "gte".to_string(),
                value: json!(40),
            },
            WorkflowStep::Action(ActionStep::Tag {
                tag_name: "hot".to_string(),
            }),
        ],
    ))?;

    let us_audience = audiences.create(
        AudienceBuilder::new("US contacts")
            .description("All subscribed US contacts")
            .rule("country", "eq", json!("US"))
            .build(),
    )?;

    for _ in 0..3 {
        scoring.process_rules(alice_id, EventKind::Opened, None)?;
    }
    scoring.process_rules(alice_id, EventKind::Clicked, None)?;
    scoring.process_rules(bob_id, EventKind::Opened, None)?;

    let size = audiences.estimate_size(us_audience.id)?;
    info!(audience = %us_audience.name, size, "Audience estimated");

    Ok(())
}
