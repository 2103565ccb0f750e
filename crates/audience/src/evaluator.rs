//! Audience evaluator — saved audience definitions with exclusion logic,
//! size estimation, and overlap analysis over the shared contact store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::types::{Contact, EventKind};
use leadflow_core::{ContactStore, FlowError, FlowResult};

use crate::rules::{self, CompiledRule, MatchType, RuleInput};

/// A saved audience definition. Rules are stored as the raw JSON array they
/// arrived as; the typed form is recompiled on every evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audience {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub rules: Value,
    pub match_type: MatchType,
    pub exclude_unsubscribed: bool,
    pub exclude_suppressed: bool,
    pub exclude_bounced: bool,
    /// Cached size, refreshed only by an explicit `estimate_size` call.
    pub estimated_size: u64,
    pub last_estimated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a saved audience. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct AudienceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rules: Option<Vec<RuleInput>>,
    pub match_type: Option<MatchType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudienceSide {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapReport {
    pub audience_a: AudienceSide,
    pub audience_b: AudienceSide,
    pub overlap: u64,
    pub union: u64,
    /// `|A∩B| / |A∪B|`, 0.0 when the union is empty.
    pub jaccard_index: f64,
}

/// Registry and evaluation engine for saved audiences.
pub struct AudienceEvaluator {
    store: Arc<ContactStore>,
    audiences: DashMap<Uuid, Audience>,
}

impl AudienceEvaluator {
    pub fn new(store: Arc<ContactStore>) -> Self {
        Self {
            store,
            audiences: DashMap::new(),
        }
    }

    // ─── CRUD ──────────────────────────────────────────────────────────────

    /// Stores an audience after strictly validating its rule set. Invalid
    /// fields or operators are rejected here, never at evaluation time.
    pub fn create(&self, audience: Audience) -> FlowResult<Audience> {
        let inputs = decode_inputs_strict(&audience.rules)?;
        rules::compile(&inputs)?;
        info!(audience_id = %audience.id, name = %audience.name, rules = inputs.len(), "Audience created");
        self.audiences.insert(audience.id, audience.clone());
        Ok(audience)
    }

    pub fn get(&self, audience_id: Uuid) -> FlowResult<Audience> {
        self.audiences
            .get(&audience_id)
            .map(|a| a.clone())
            .ok_or_else(|| FlowError::not_found("audience", audience_id))
    }

    /// Newest first.
    pub fn list(&self, limit: usize, offset: usize) -> Vec<Audience> {
        let mut all: Vec<Audience> = self.audiences.iter().map(|a| a.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.into_iter().skip(offset).take(limit).collect()
    }

    pub fn update(&self, audience_id: Uuid, update: AudienceUpdate) -> FlowResult<Audience> {
        if let Some(rules) = &update.rules {
            rules::compile(rules)?;
        }
        let mut entry = self
            .audiences
            .get_mut(&audience_id)
            .ok_or_else(|| FlowError::not_found("audience", audience_id))?;
        if let Some(name) = update.name {
            entry.name = name;
        }
        if let Some(description) = update.description {
            entry.description = description;
        }
        if let Some(rules) = update.rules {
            entry.rules = serde_json::to_value(rules)?;
        }
        if let Some(match_type) = update.match_type {
            entry.match_type = match_type;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn delete(&self, audience_id: Uuid) -> FlowResult<()> {
        self.audiences
            .remove(&audience_id)
            .map(|_| ())
            .ok_or_else(|| FlowError::not_found("audience", audience_id))
    }

    // ─── Evaluation ────────────────────────────────────────────────────────

    /// Whether a contact belongs to an audience: rules under the audience's
    /// combinator, then exclusions AND-ed on top regardless of match_type.
    pub fn matches(&self, audience: &Audience, contact: &Contact) -> bool {
        if audience.exclude_unsubscribed && !contact.subscribed {
            return false;
        }
        if audience.exclude_suppressed && self.store.is_suppressed(&contact.email) {
            return false;
        }
        if audience.exclude_bounced && self.has_bounced(contact.id) {
            return false;
        }
        let compiled = decode_rules_permissive(&audience.rules, audience.id);
        rules::evaluate(&compiled, audience.match_type, contact)
    }

    /// Executes the audience predicate as a count, refreshing the cached
    /// estimate. This is the explicit cache refresh; reads of
    /// `estimated_size` elsewhere never trigger it.
    pub fn estimate_size(&self, audience_id: Uuid) -> FlowResult<u64> {
        let audience = self.get(audience_id)?;
        let count = self.member_ids(&audience).len() as u64;
        if let Some(mut entry) = self.audiences.get_mut(&audience_id) {
            entry.estimated_size = count;
            entry.last_estimated_at = Some(Utc::now());
        }
        Ok(count)
    }

    /// Matching contacts, paged.
    pub fn contacts(&self, audience_id: Uuid, limit: usize, offset: usize) -> FlowResult<Vec<Contact>> {
        let audience = self.get(audience_id)?;
        Ok(self
            .store
            .list_contacts()
            .into_iter()
            .filter(|c| self.matches(&audience, c))
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Counts matches for a transient, unsaved rule set. Same evaluation
    /// path as a saved audience with default exclusions, no persistence.
    pub fn preview_rules(&self, inputs: &[RuleInput], match_type: MatchType) -> FlowResult<u64> {
        rules::compile(inputs)?;
        let preview = Audience {
            id: Uuid::new_v4(),
            name: "_preview".to_string(),
            description: String::new(),
            rules: serde_json::to_value(inputs)?,
            match_type,
            exclude_unsubscribed: true,
            exclude_suppressed: true,
            exclude_bounced: true,
            estimated_size: 0,
            last_estimated_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        Ok(self.member_ids(&preview).len() as u64)
    }

    /// Evaluates both audiences independently and reports intersection,
    /// union, and Jaccard similarity.
    pub fn overlap_analysis(&self, a_id: Uuid, b_id: Uuid) -> FlowResult<OverlapReport> {
        let a = self.get(a_id)?;
        let b = self.get(b_id)?;

        let members_a = self.member_ids(&a);
        let members_b = self.member_ids(&b);
        let overlap = members_a.intersection(&members_b).count() as u64;
        let union = members_a.union(&members_b).count() as u64;
        let jaccard = if union == 0 {
            0.0
        } else {
            (overlap as f64 / union as f64 * 10_000.0).round() / 10_000.0
        };

        Ok(OverlapReport {
            audience_a: AudienceSide {
                id: a.id,
                name: a.name,
                size: members_a.len() as u64,
            },
            audience_b: AudienceSide {
                id: b.id,
                name: b.name,
                size: members_b.len() as u64,
            },
            overlap,
            union,
            jaccard_index: jaccard,
        })
    }

    fn member_ids(&self, audience: &Audience) -> HashSet<Uuid> {
        self.store
            .list_contacts()
            .into_iter()
            .filter(|c| self.matches(audience, c))
            .map(|c| c.id)
            .collect()
    }

    fn has_bounced(&self, contact_id: Uuid) -> bool {
        self.store
            .events_for(contact_id)
            .iter()
            .any(|e| e.event_type == EventKind::Bounced)
    }

    pub fn store(&self) -> &Arc<ContactStore> {
        &self.store
    }

    pub fn audience_count(&self) -> usize {
        self.audiences.len()
    }
}

/// Strict decode for the creation path: a malformed rule array is a
/// validation error, not a silent empty match-all.
fn decode_inputs_strict(raw: &Value) -> FlowResult<Vec<RuleInput>> {
    serde_json::from_value(raw.clone())
        .map_err(|e| FlowError::Validation(format!("Malformed rules array: {e}")))
}

/// Permissive decode for the evaluation path: stored definitions that no
/// longer parse are logged and skipped instead of failing the whole query.
fn decode_rules_permissive(raw: &Value, audience_id: Uuid) -> Vec<CompiledRule> {
    let inputs: Vec<RuleInput> = match serde_json::from_value(raw.clone()) {
        Ok(inputs) => inputs,
        Err(e) => {
            warn!(audience_id = %audience_id, error = %e, "Stored audience rules failed to decode, treating as empty");
            return Vec::new();
        }
    };
    inputs
        .iter()
        .filter_map(|input| match rules::compile(std::slice::from_ref(input)) {
            Ok(mut compiled) => compiled.pop(),
            Err(e) => {
                warn!(audience_id = %audience_id, field = %input.field, error = %e, "Skipping unparseable stored rule");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AudienceBuilder;
    use serde_json::json;

    fn setup() -> AudienceEvaluator {
        AudienceEvaluator::new(Arc::new(ContactStore::new()))
    }

    fn seed(evaluator: &AudienceEvaluator, email: &str, country: &str) -> Uuid {
        let mut contact = Contact::new(email);
        contact.country = country.to_string();
        evaluator.store().insert_contact(contact).unwrap()
    }

    fn country_audience(evaluator: &AudienceEvaluator, country: &str) -> Audience {
        let draft = AudienceBuilder::new(format!("{country} contacts"))
            .rule("country", "eq", json!(country))
            .build();
        evaluator.create(draft).unwrap()
    }

    #[test]
    fn create_rejects_invalid_field_before_any_query() {
        let evaluator = setup();
        let draft = AudienceBuilder::new("broken")
            .rule("nonexistent", "eq", json!("x"))
            .build();
        let err = evaluator.create(draft).unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        assert_eq!(evaluator.audience_count(), 0);
    }

    #[test]
    fn create_rejects_invalid_operator() {
        let evaluator = setup();
        let draft = AudienceBuilder::new("broken")
            .rule("email", "like", json!("%a%"))
            .build();
        assert!(matches!(
            evaluator.create(draft),
            Err(FlowError::Validation(_))
        ));
    }

    #[test]
    fn estimate_size_counts_and_caches() {
        let evaluator = setup();
        seed(&evaluator, "a@example.com", "US");
        seed(&evaluator, "b@example.com", "US");
        seed(&evaluator, "c@example.com", "CA");
        let audience = country_audience(&evaluator, "US");

        assert_eq!(evaluator.estimate_size(audience.id).unwrap(), 2);
        let cached = evaluator.get(audience.id).unwrap();
        assert_eq!(cached.estimated_size, 2);
        assert!(cached.last_estimated_at.is_some());
    }

    #[test]
    fn zero_match_audience_estimates_zero() {
        let evaluator = setup();
        seed(&evaluator, "a@example.com", "US");
        let audience = country_audience(&evaluator, "ZZ");
        assert_eq!(evaluator.estimate_size(audience.id).unwrap(), 0);
    }

    #[test]
    fn exclusions_apply_on_top_of_any_match() {
        let evaluator = setup();
        let id = seed(&evaluator, "a@example.com", "US");
        evaluator
            .store()
            .update_contact(id, |c| c.subscribed = false)
            .unwrap();
        let audience = country_audience(&evaluator, "US");
        assert_eq!(evaluator.estimate_size(audience.id).unwrap(), 0);
    }

    #[test]
    fn bounced_contacts_are_excluded() {
        let evaluator = setup();
        let id = seed(&evaluator, "a@example.com", "US");
        evaluator.store().append_event(leadflow_core::types::ScoreEvent {
            id: Uuid::new_v4(),
            contact_id: id,
            rule_id: None,
            event_type: EventKind::Bounced,
            points: -5.0,
            reason: String::new(),
            metadata: Default::default(),
            created_at: Utc::now(),
        });
        let audience = country_audience(&evaluator, "US");
        assert_eq!(evaluator.estimate_size(audience.id).unwrap(), 0);
    }

    #[test]
    fn overlap_of_disjoint_audiences_is_zero_jaccard() {
        let evaluator = setup();
        seed(&evaluator, "a@example.com", "US");
        seed(&evaluator, "b@example.com", "CA");
        let us = country_audience(&evaluator, "US");
        let ca = country_audience(&evaluator, "CA");

        let report = evaluator.overlap_analysis(us.id, ca.id).unwrap();
        assert_eq!(report.audience_a.size, 1);
        assert_eq!(report.audience_b.size, 1);
        assert_eq!(report.overlap, 0);
        assert_eq!(report.union, 2);
        assert_eq!(report.jaccard_index, 0.0);
    }

    #[test]
    fn overlap_of_identical_audiences_is_jaccard_one() {
        let evaluator = setup();
        seed(&evaluator, "a@example.com", "US");
        seed(&evaluator, "b@example.com", "US");
        let first = country_audience(&evaluator, "US");
        let second = country_audience(&evaluator, "US");

        let report = evaluator.overlap_analysis(first.id, second.id).unwrap();
        assert_eq!(report.overlap, 2);
        assert_eq!(report.union, 2);
        assert_eq!(report.jaccard_index, 1.0);
    }

    #[test]
    fn overlap_of_two_empty_audiences_is_zero_not_nan() {
        let evaluator = setup();
        let a = country_audience(&evaluator, "ZZ");
        let b = country_audience(&evaluator, "YY");
        let report = evaluator.overlap_analysis(a.id, b.id).unwrap();
        assert_eq!(report.union, 0);
        assert_eq!(report.jaccard_index, 0.0);
    }

    #[test]
    fn preview_rules_counts_without_saving() {
        let evaluator = setup();
        seed(&evaluator, "a@example.com", "US");
        seed(&evaluator, "b@example.com", "CA");

        let count = evaluator
            .preview_rules(
                &[RuleInput::new("country", "in", json!(["us", "ca"]))],
                MatchType::All,
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(evaluator.audience_count(), 0);
    }

    #[test]
    fn update_revalidates_rules() {
        let evaluator = setup();
        let audience = country_audience(&evaluator, "US");
        let err = evaluator
            .update(
                audience.id,
                AudienceUpdate {
                    rules: Some(vec![RuleInput::new("bogus", "eq", json!(1))]),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
        // Stored definition untouched.
        let kept = evaluator.get(audience.id).unwrap();
        assert_eq!(kept.rules, audience.rules);
    }

    #[test]
    fn corrupt_stored_rules_evaluate_as_match_all() {
        let evaluator = setup();
        seed(&evaluator, "a@example.com", "US");
        let mut audience = country_audience(&evaluator, "US");
        // Simulate a corrupted stored definition.
        audience.rules = json!({"not": "an array"});
        let contact = evaluator.store().list_contacts().pop().unwrap();
        assert!(evaluator.matches(&audience, &contact));
    }

    #[test]
    fn delete_unknown_audience_is_not_found() {
        let evaluator = setup();
        assert!(matches!(
            evaluator.delete(Uuid::new_v4()),
            Err(FlowError::NotFound(_))
        ));
    }
}
