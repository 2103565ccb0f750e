//! Trigger-driven automation workflows — condition/action step chains fired
//! from decision events, sharing the audience rule operator vocabulary.

pub mod engine;
pub mod types;

pub use engine::{AutomationEngine, EventSinkAdapter};
pub use types::{ActionStep, StepOutcome, StepStatus, TriggerKind, Workflow, WorkflowStep};
