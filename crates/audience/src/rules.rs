//! Rule compilation — validates the declarative `{field, operator, value}`
//! JSON contract against the closed field and operator vocabularies and
//! turns it into typed, directly evaluable rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use leadflow_core::predicate::{compare, Operator};
use leadflow_core::types::Contact;
use leadflow_core::{FlowError, FlowResult};

/// A rule as it arrives over the wire: untyped strings, validated at
/// audience-creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleInput {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl RuleInput {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }
}

/// The closed set of contact attributes addressable from audience rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Email,
    FirstName,
    LastName,
    Phone,
    Country,
    Language,
    Subscribed,
    CreatedAt,
}

pub const VALID_FIELDS: &[&str] = &[
    "email",
    "first_name",
    "last_name",
    "phone",
    "country",
    "language",
    "subscribed",
    "created_at",
];

impl ContactField {
    pub fn parse(token: &str) -> FlowResult<Self> {
        match token {
            "email" => Ok(ContactField::Email),
            "first_name" => Ok(ContactField::FirstName),
            "last_name" => Ok(ContactField::LastName),
            "phone" => Ok(ContactField::Phone),
            "country" => Ok(ContactField::Country),
            "language" => Ok(ContactField::Language),
            "subscribed" => Ok(ContactField::Subscribed),
            "created_at" => Ok(ContactField::CreatedAt),
            other => Err(FlowError::Validation(format!(
                "Invalid field: {other}. Valid: {}",
                VALID_FIELDS.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContactField::Email => "email",
            ContactField::FirstName => "first_name",
            ContactField::LastName => "last_name",
            ContactField::Phone => "phone",
            ContactField::Country => "country",
            ContactField::Language => "language",
            ContactField::Subscribed => "subscribed",
            ContactField::CreatedAt => "created_at",
        }
    }

    /// Extracts this field from a contact as a JSON value. Timestamps render
    /// as RFC 3339 so the shared comparison path can order them.
    pub fn value_of(&self, contact: &Contact) -> Value {
        match self {
            ContactField::Email => Value::String(contact.email.clone()),
            ContactField::FirstName => Value::String(contact.first_name.clone()),
            ContactField::LastName => Value::String(contact.last_name.clone()),
            ContactField::Phone => Value::String(contact.phone.clone()),
            ContactField::Country => Value::String(contact.country.clone()),
            ContactField::Language => Value::String(contact.language.clone()),
            ContactField::Subscribed => Value::Bool(contact.subscribed),
            ContactField::CreatedAt => Value::String(contact.created_at.to_rfc3339()),
        }
    }
}

/// How a rule list combines into one predicate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    All,
    Any,
}

impl MatchType {
    pub fn parse(token: &str) -> FlowResult<Self> {
        match token {
            "all" => Ok(MatchType::All),
            "any" => Ok(MatchType::Any),
            other => Err(FlowError::Validation(format!(
                "Invalid match_type: {other}. Valid: all, any"
            ))),
        }
    }
}

/// A validated rule ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub field: ContactField,
    pub operator: Operator,
    pub value: Value,
}

impl CompiledRule {
    pub fn matches(&self, contact: &Contact) -> bool {
        let actual = self.field.value_of(contact);
        compare(Some(&actual), self.operator, &self.value)
    }
}

/// Compiles raw rule inputs, rejecting any unknown field or operator with a
/// descriptive error before anything is stored or evaluated.
pub fn compile(rules: &[RuleInput]) -> FlowResult<Vec<CompiledRule>> {
    rules
        .iter()
        .map(|rule| {
            if rule.field.is_empty() {
                return Err(FlowError::Validation("Rule must have a 'field'".to_string()));
            }
            if rule.operator.is_empty() {
                return Err(FlowError::Validation(
                    "Rule must have an 'operator'".to_string(),
                ));
            }
            Ok(CompiledRule {
                field: ContactField::parse(&rule.field)?,
                operator: Operator::parse(&rule.operator)?,
                value: rule.value.clone(),
            })
        })
        .collect()
}

/// Evaluates compiled rules against a contact under the given combinator.
/// An empty rule list matches everything.
pub fn evaluate(rules: &[CompiledRule], match_type: MatchType, contact: &Contact) -> bool {
    if rules.is_empty() {
        return true;
    }
    match match_type {
        MatchType::All => rules.iter().all(|r| r.matches(contact)),
        MatchType::Any => rules.iter().any(|r| r.matches(contact)),
    }
}
