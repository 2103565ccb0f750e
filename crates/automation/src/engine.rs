//! Automation engine — matches decision events against workflow triggers and
//! runs the trigger→condition→action step chain per contact.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadflow_audience::rules::ContactField;
use leadflow_core::event_bus::{DecisionEvent, EventSink};
use leadflow_core::predicate::{compare, Operator};
use leadflow_core::types::Contact;
use leadflow_core::{ContactStore, FlowError, FlowResult};

use crate::types::{
    ActionStep, StepOutcome, StepStatus, TriggerKind, Workflow, WorkflowLog, WorkflowStep,
};

/// Registry and executor for automation workflows.
pub struct AutomationEngine {
    store: Arc<ContactStore>,
    workflows: DashMap<Uuid, Workflow>,
    logs: DashMap<Uuid, Vec<WorkflowLog>>,
}

impl AutomationEngine {
    pub fn new(store: Arc<ContactStore>) -> Self {
        Self {
            store,
            workflows: DashMap::new(),
            logs: DashMap::new(),
        }
    }

    // ─── Workflow registry ─────────────────────────────────────────────────

    /// Stores a workflow after strictly validating its step array. Condition
    /// operators outside the shared vocabulary are rejected here.
    pub fn add_workflow(&self, workflow: Workflow) -> FlowResult<Uuid> {
        let steps: Vec<WorkflowStep> = serde_json::from_value(workflow.steps.clone())
            .map_err(|e| FlowError::Validation(format!("Malformed steps array: {e}")))?;
        for step in &steps {
            if let WorkflowStep::Condition { operator, .. } = step {
                Operator::parse(operator)?;
            }
        }
        let id = workflow.id;
        info!(workflow_id = %id, name = %workflow.name, trigger = workflow.trigger.as_str(), steps = steps.len(), "Workflow registered");
        self.workflows.insert(id, workflow);
        Ok(id)
    }

    pub fn get_workflow(&self, workflow_id: Uuid) -> FlowResult<Workflow> {
        self.workflows
            .get(&workflow_id)
            .map(|w| w.clone())
            .ok_or_else(|| FlowError::not_found("workflow", workflow_id))
    }

    pub fn list_workflows(&self) -> Vec<Workflow> {
        let mut all: Vec<Workflow> = self.workflows.iter().map(|w| w.clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub fn set_workflow_active(&self, workflow_id: Uuid, active: bool) -> FlowResult<()> {
        let mut entry = self
            .workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| FlowError::not_found("workflow", workflow_id))?;
        entry.active = active;
        entry.updated_at = Utc::now();
        Ok(())
    }

    pub fn delete_workflow(&self, workflow_id: Uuid) -> FlowResult<()> {
        self.workflows
            .remove(&workflow_id)
            .map(|_| ())
            .ok_or_else(|| FlowError::not_found("workflow", workflow_id))
    }

    pub fn logs_for(&self, workflow_id: Uuid) -> Vec<WorkflowLog> {
        self.logs
            .get(&workflow_id)
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    // ─── Execution ─────────────────────────────────────────────────────────

    /// Fans a decision event out to every active workflow subscribed to its
    /// trigger. Best-effort per workflow; one failing run never blocks the
    /// rest.
    pub fn fire_event(&self, trigger: TriggerKind, contact_id: Uuid, context: &Value) -> usize {
        let matching: Vec<Uuid> = self
            .workflows
            .iter()
            .filter(|w| w.active && w.trigger == trigger)
            .map(|w| w.id)
            .collect();

        let mut fired = 0;
        for workflow_id in matching {
            match self.execute_workflow(workflow_id, Some(contact_id), context) {
                Ok(_) => fired += 1,
                Err(e) => {
                    warn!(workflow_id = %workflow_id, contact_id = %contact_id, error = %e, "Workflow run failed")
                }
            }
        }
        if fired > 0 {
            metrics::counter!("automation.workflow_runs").increment(fired as u64);
            debug!(trigger = trigger.as_str(), contact_id = %contact_id, fired, "Trigger fan-out complete");
        }
        fired
    }

    /// Runs all steps of one workflow. A false condition marks every
    /// remaining step skipped and stops. Steps are decoded permissively:
    /// a corrupt stored array runs as zero steps.
    pub fn execute_workflow(
        &self,
        workflow_id: Uuid,
        contact_id: Option<Uuid>,
        context: &Value,
    ) -> FlowResult<Vec<StepOutcome>> {
        let workflow = self.get_workflow(workflow_id)?;
        let steps: Vec<WorkflowStep> = match serde_json::from_value(workflow.steps.clone()) {
            Ok(steps) => steps,
            Err(e) => {
                warn!(workflow_id = %workflow_id, error = %e, "Stored workflow steps failed to decode, running as empty");
                Vec::new()
            }
        };
        let contact = contact_id.and_then(|id| self.store.get_contact(id));

        let mut outcomes = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            match step {
                WorkflowStep::Condition {
                    field,
                    operator,
                    value,
                } => {
                    let passed = self.evaluate_condition(
                        field,
                        operator,
                        value,
                        contact.as_ref(),
                        context,
                    );
                    let status = if passed {
                        StepStatus::Completed
                    } else {
                        StepStatus::Skipped
                    };
                    outcomes.push(self.log_step(
                        &workflow,
                        contact_id,
                        index,
                        status,
                        json!({"type": "condition", "field": field, "passed": passed}),
                    ));
                    if !passed {
                        for skipped_index in (index + 1)..steps.len() {
                            outcomes.push(self.log_step(
                                &workflow,
                                contact_id,
                                skipped_index,
                                StepStatus::Skipped,
                                json!({"skipped": true}),
                            ));
                        }
                        break;
                    }
                }
                WorkflowStep::Action(action) => {
                    let (status, detail) = self.execute_action(action, contact_id);
                    outcomes.push(self.log_step(&workflow, contact_id, index, status, detail));
                }
                WorkflowStep::Delay { hours } => {
                    outcomes.push(self.log_step(
                        &workflow,
                        contact_id,
                        index,
                        StepStatus::Completed,
                        json!({"type": "delay", "hours": hours, "noted": true}),
                    ));
                }
            }
        }

        if let Some(mut entry) = self.workflows.get_mut(&workflow_id) {
            entry.run_count += 1;
        }
        Ok(outcomes)
    }

    /// Condition input resolves from the contact's fixed fields first, then
    /// from the trigger context object. Unknown operators in stored config
    /// are logged and evaluate false.
    fn evaluate_condition(
        &self,
        field: &str,
        operator: &str,
        value: &Value,
        contact: Option<&Contact>,
        context: &Value,
    ) -> bool {
        let operator = match Operator::parse(operator) {
            Ok(op) => op,
            Err(e) => {
                warn!(error = %e, "Unknown condition operator, evaluating false");
                return false;
            }
        };
        let actual = contact
            .and_then(|c| ContactField::parse(field).ok().map(|f| f.value_of(c)))
            .or_else(|| context.get(field).cloned());
        compare(actual.as_ref(), operator, value)
    }

    fn execute_action(&self, action: &ActionStep, contact_id: Option<Uuid>) -> (StepStatus, Value) {
        let Some(contact_id) = contact_id else {
            if let ActionStep::SendEmail { subject, .. } = action {
                return (
                    StepStatus::Completed,
                    json!({"action": "send_email", "subject": subject, "to": "unknown", "queued": true}),
                );
            }
            return (
                StepStatus::Failed,
                json!({"error": "Action requires a contact"}),
            );
        };

        let result = match action {
            ActionStep::Tag { tag_name } => self
                .store
                .update_contact(contact_id, |c| {
                    if !c.tags.contains(tag_name) {
                        c.tags.push(tag_name.clone());
                    }
                })
                .map(|_| json!({"action": "tag", "tag_name": tag_name})),
            ActionStep::RemoveTag { tag_name } => self
                .store
                .update_contact(contact_id, |c| {
                    c.tags.retain(|t| t != tag_name);
                })
                .map(|_| json!({"action": "remove_tag", "tag_name": tag_name})),
            ActionStep::UpdateField { field, value } => self
                .update_contact_field(contact_id, field, value)
                .map(|_| json!({"action": "update_field", "field": field, "value": value})),
            ActionStep::SendEmail { subject, .. } => {
                match self.store.get_contact(contact_id) {
                    Some(contact) => Ok(json!({
                        "action": "send_email",
                        "subject": subject,
                        "to": contact.email,
                        "queued": true,
                    })),
                    None => Err(FlowError::not_found("contact", contact_id)),
                }
            }
            ActionStep::Unsubscribe => self
                .store
                .update_contact(contact_id, |c| c.subscribed = false)
                .map(|_| json!({"action": "unsubscribe"})),
            ActionStep::Subscribe => self
                .store
                .update_contact(contact_id, |c| c.subscribed = true)
                .map(|_| json!({"action": "subscribe"})),
        };

        match result {
            Ok(detail) => (StepStatus::Completed, detail),
            Err(e) => (StepStatus::Failed, json!({"error": e.to_string()})),
        }
    }

    /// Identity and provenance fields are immutable; unknown field names
    /// land in custom attributes.
    fn update_contact_field(&self, contact_id: Uuid, field: &str, value: &Value) -> FlowResult<()> {
        if matches!(field, "id" | "email" | "created_at") {
            return Err(FlowError::Validation(format!(
                "Field '{field}' cannot be set by an automation action"
            )));
        }
        let field = field.to_string();
        let value = value.clone();
        self.store
            .update_contact(contact_id, move |c| match field.as_str() {
                "first_name" => c.first_name = string_of(&value),
                "last_name" => c.last_name = string_of(&value),
                "phone" => c.phone = string_of(&value),
                "country" => c.country = string_of(&value),
                "language" => c.language = string_of(&value),
                "subscribed" => c.subscribed = value.as_bool().unwrap_or(c.subscribed),
                other => {
                    c.custom_attributes.insert(other.to_string(), value.clone());
                }
            })
            .map(|_| ())
    }

    fn log_step(
        &self,
        workflow: &Workflow,
        contact_id: Option<Uuid>,
        step_index: usize,
        status: StepStatus,
        detail: Value,
    ) -> StepOutcome {
        self.logs.entry(workflow.id).or_default().push(WorkflowLog {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            contact_id,
            step_index,
            status,
            result: detail.clone(),
            created_at: Utc::now(),
        });
        StepOutcome {
            step_index,
            status,
            detail,
        }
    }

    pub fn store(&self) -> &Arc<ContactStore> {
        &self.store
    }
}

fn string_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Adapts the decision event bus to the automation engine, so scoring and
/// lifecycle transitions fire workflows directly.
pub struct EventSinkAdapter {
    engine: Arc<AutomationEngine>,
}

impl EventSinkAdapter {
    pub fn new(engine: Arc<AutomationEngine>) -> Self {
        Self { engine }
    }
}

impl EventSink for EventSinkAdapter {
    fn emit(&self, event: DecisionEvent) {
        let trigger = TriggerKind::from_decision_event(event.kind);
        self.engine
            .fire_event(trigger, event.contact_id, &event.payload);
    }
}
