//! Audience builder — fluent API for constructing audience definitions.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::evaluator::Audience;
use crate::rules::{MatchType, RuleInput};

pub struct AudienceBuilder {
    name: String,
    description: String,
    rules: Vec<RuleInput>,
    match_type: MatchType,
    exclude_unsubscribed: bool,
    exclude_suppressed: bool,
    exclude_bounced: bool,
}

impl AudienceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rules: Vec::new(),
            match_type: MatchType::All,
            exclude_unsubscribed: true,
            exclude_suppressed: true,
            exclude_bounced: true,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn rule(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: Value,
    ) -> Self {
        self.rules.push(RuleInput::new(field, operator, value));
        self
    }

    pub fn match_any(mut self) -> Self {
        self.match_type = MatchType::Any;
        self
    }

    pub fn include_unsubscribed(mut self) -> Self {
        self.exclude_unsubscribed = false;
        self
    }

    pub fn include_suppressed(mut self) -> Self {
        self.exclude_suppressed = false;
        self
    }

    pub fn include_bounced(mut self) -> Self {
        self.exclude_bounced = false;
        self
    }

    /// Produces the unsaved definition. Validation happens when the draft is
    /// handed to `AudienceEvaluator::create`.
    pub fn build(self) -> Audience {
        let now = Utc::now();
        Audience {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            rules: serde_json::to_value(&self.rules).unwrap_or(Value::Array(Vec::new())),
            match_type: self.match_type,
            exclude_unsubscribed: self.exclude_unsubscribed,
            exclude_suppressed: self.exclude_suppressed,
            exclude_bounced: self.exclude_bounced,
            estimated_size: 0,
            last_estimated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
