//! Decision event bus — trait for emitting engine events from any module.
//!
//! Engines accept an `Arc<dyn EventSink>` and emit events as contacts are
//! scored and moved between stages; the automation engine consumes them as
//! workflow trigger context.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trigger-context events produced by the decision engines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionEventKind {
    ContactUpdated,
    EventRecorded,
    ScoreChanged,
    StageChanged,
    MilestoneReached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub event_id: Uuid,
    pub kind: DecisionEventKind,
    pub contact_id: Uuid,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Trait for emitting decision events. Implementations route events to the
/// automation engine, an analytics pipeline, or customer webhooks.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DecisionEvent);
}

/// No-op sink for tests and modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: DecisionEvent) {}
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<DecisionEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DecisionEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_kind(&self, kind: DecisionEventKind) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: DecisionEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating `DecisionEvent` with minimal boilerplate.
pub fn make_event(
    kind: DecisionEventKind,
    contact_id: Uuid,
    payload: serde_json::Value,
) -> DecisionEvent {
    DecisionEvent {
        event_id: Uuid::new_v4(),
        kind,
        contact_id,
        payload,
        occurred_at: Utc::now(),
    }
}
