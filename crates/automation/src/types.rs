//! Workflow data model — triggers, steps, and execution logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use leadflow_core::event_bus::DecisionEventKind;

/// Events a workflow can subscribe to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    ContactUpdated,
    ScoreChanged,
    StageChanged,
    MilestoneReached,
    EventRecorded,
}

impl TriggerKind {
    pub fn from_decision_event(kind: DecisionEventKind) -> Self {
        match kind {
            DecisionEventKind::ContactUpdated => TriggerKind::ContactUpdated,
            DecisionEventKind::EventRecorded => TriggerKind::EventRecorded,
            DecisionEventKind::ScoreChanged => TriggerKind::ScoreChanged,
            DecisionEventKind::StageChanged => TriggerKind::StageChanged,
            DecisionEventKind::MilestoneReached => TriggerKind::MilestoneReached,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::ContactUpdated => "contact_updated",
            TriggerKind::ScoreChanged => "score_changed",
            TriggerKind::StageChanged => "stage_changed",
            TriggerKind::MilestoneReached => "milestone_reached",
            TriggerKind::EventRecorded => "event_recorded",
        }
    }
}

/// One workflow step, decoded from the stored JSON array. `type` selects the
/// variant; a failed condition skips everything after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowStep {
    Condition {
        field: String,
        operator: String,
        #[serde(default)]
        value: Value,
    },
    Action(ActionStep),
    /// Schedule marker only; execution records the delay and moves on.
    Delay {
        #[serde(default)]
        hours: u32,
    },
}

/// The closed action vocabulary. `action` selects the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionStep {
    Tag {
        tag_name: String,
    },
    RemoveTag {
        tag_name: String,
    },
    UpdateField {
        field: String,
        value: Value,
    },
    /// Records send intent; transport is owned by the delivery layer.
    SendEmail {
        #[serde(default)]
        subject: String,
        #[serde(default)]
        body: String,
    },
    Unsubscribe,
    Subscribe,
}

/// A saved trigger→condition→action definition. Steps are kept as raw JSON;
/// corrupt step arrays decode to no steps at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub trigger: TriggerKind,
    pub steps: Value,
    pub active: bool,
    pub run_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, trigger: TriggerKind, steps: Vec<WorkflowStep>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            trigger,
            steps: serde_json::to_value(steps).unwrap_or(Value::Array(Vec::new())),
            active: true,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

/// Per-step execution result, also persisted as a `WorkflowLog` row.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step_index: usize,
    pub status: StepStatus,
    pub detail: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowLog {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub step_index: usize,
    pub status: StepStatus,
    pub result: Value,
    pub created_at: DateTime<Utc>,
}
