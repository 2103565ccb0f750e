//! In-memory contact store backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store. This
//! provides the same API surface for development and testing: set-based
//! reads plus transactional read-modify-write per row, which the scoring
//! engine relies on for its upsert-then-recompute sequence. DashMap entry
//! locks serialize concurrent writers on the same contact id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::{FlowError, FlowResult};
use crate::types::{Contact, ContactScore, ScoreEvent, SuppressionEntry, SuppressionReason};

/// Thread-safe store for contacts, the append-only score-event ledger,
/// materialized scores, and the suppression list.
pub struct ContactStore {
    contacts: DashMap<Uuid, Contact>,
    email_index: DashMap<String, Uuid>,
    /// Append-only per-contact ledger, ordered by arrival.
    events: DashMap<Uuid, Vec<ScoreEvent>>,
    scores: DashMap<Uuid, ContactScore>,
    suppression: DashMap<String, SuppressionEntry>,
}

impl ContactStore {
    pub fn new() -> Self {
        info!("Contact store initialized (in-memory, development mode)");
        Self {
            contacts: DashMap::new(),
            email_index: DashMap::new(),
            events: DashMap::new(),
            scores: DashMap::new(),
            suppression: DashMap::new(),
        }
    }

    // ─── Contacts ──────────────────────────────────────────────────────────

    pub fn insert_contact(&self, contact: Contact) -> FlowResult<Uuid> {
        let email_key = contact.email.to_lowercase();
        if self.email_index.contains_key(&email_key) {
            return Err(FlowError::Validation(format!(
                "Email already exists: {}",
                contact.email
            )));
        }
        let id = contact.id;
        self.email_index.insert(email_key, id);
        self.contacts.insert(id, contact);
        Ok(id)
    }

    pub fn get_contact(&self, id: Uuid) -> Option<Contact> {
        self.contacts.get(&id).map(|r| r.clone())
    }

    pub fn get_contact_by_email(&self, email: &str) -> Option<Contact> {
        let id = *self.email_index.get(&email.to_lowercase())?;
        self.get_contact(id)
    }

    /// Applies a mutation to a contact under its entry lock and bumps
    /// `updated_at`. Returns the updated contact.
    pub fn update_contact(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut Contact),
    ) -> FlowResult<Contact> {
        let mut entry = self
            .contacts
            .get_mut(&id)
            .ok_or_else(|| FlowError::not_found("contact", id))?;
        mutate(&mut entry);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn list_contacts(&self) -> Vec<Contact> {
        self.contacts.iter().map(|r| r.value().clone()).collect()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Deletes a contact and cascades to its ledger and score row, so no
    /// dangling references survive.
    pub fn delete_contact(&self, id: Uuid) -> FlowResult<()> {
        let (_, contact) = self
            .contacts
            .remove(&id)
            .ok_or_else(|| FlowError::not_found("contact", id))?;
        self.email_index.remove(&contact.email.to_lowercase());
        self.events.remove(&id);
        self.scores.remove(&id);
        info!(contact_id = %id, "Deleted contact (cascaded ledger + score)");
        Ok(())
    }

    // ─── Event ledger ──────────────────────────────────────────────────────

    pub fn append_event(&self, event: ScoreEvent) {
        self.events
            .entry(event.contact_id)
            .or_default()
            .push(event);
    }

    pub fn events_for(&self, contact_id: Uuid) -> Vec<ScoreEvent> {
        self.events
            .get(&contact_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn last_event_at(&self, contact_id: Uuid) -> Option<DateTime<Utc>> {
        self.events
            .get(&contact_id)?
            .iter()
            .map(|e| e.created_at)
            .max()
    }

    /// Ledger events a given rule has already produced for a contact; used
    /// to enforce per-contact rule caps.
    pub fn rule_event_count(&self, contact_id: Uuid, rule_id: Uuid) -> usize {
        self.events
            .get(&contact_id)
            .map(|v| v.iter().filter(|e| e.rule_id == Some(rule_id)).count())
            .unwrap_or(0)
    }

    // ─── Materialized scores ───────────────────────────────────────────────

    /// Read-modify-write on a contact's score row under its entry lock,
    /// creating the row on first use. Returns the updated snapshot.
    pub fn upsert_score(
        &self,
        contact_id: Uuid,
        mutate: impl FnOnce(&mut ContactScore),
    ) -> ContactScore {
        let mut entry = self
            .scores
            .entry(contact_id)
            .or_insert_with(|| ContactScore::new(contact_id));
        mutate(&mut entry);
        entry.clone()
    }

    pub fn get_score(&self, contact_id: Uuid) -> Option<ContactScore> {
        self.scores.get(&contact_id).map(|r| r.clone())
    }

    pub fn all_scores(&self) -> Vec<ContactScore> {
        self.scores.iter().map(|r| r.value().clone()).collect()
    }

    /// Up to `limit` score rows, most recently updated first — the sweep
    /// order for lifecycle batches.
    pub fn recently_scored(&self, limit: usize) -> Vec<ContactScore> {
        let mut rows = self.all_scores();
        rows.sort_by(|a, b| b.score_updated_at.cmp(&a.score_updated_at));
        rows.truncate(limit);
        rows
    }

    // ─── Suppression list ──────────────────────────────────────────────────

    /// Adds or updates a suppression entry. Emails are keyed lower-cased.
    pub fn suppress(&self, entry: SuppressionEntry) -> SuppressionEntry {
        let key = entry.email.to_lowercase();
        let entry = SuppressionEntry {
            email: key.clone(),
            ..entry
        };
        self.suppression.insert(key, entry.clone());
        entry
    }

    pub fn suppression_for(&self, email: &str) -> Option<SuppressionEntry> {
        self.suppression
            .get(&email.to_lowercase())
            .map(|r| r.clone())
    }

    pub fn is_suppressed(&self, email: &str) -> bool {
        self.suppression.contains_key(&email.to_lowercase())
    }

    pub fn remove_suppression(&self, email: &str) -> bool {
        self.suppression.remove(&email.to_lowercase()).is_some()
    }

    pub fn list_suppression(
        &self,
        reason: Option<SuppressionReason>,
        skip: usize,
        limit: usize,
    ) -> Vec<SuppressionEntry> {
        let mut entries: Vec<SuppressionEntry> = self
            .suppression
            .iter()
            .map(|r| r.value().clone())
            .filter(|e| reason.map_or(true, |want| e.reason == want))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.into_iter().skip(skip).take(limit).collect()
    }
}

impl Default for ContactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use std::collections::HashMap;

    fn make_event(contact_id: Uuid, points: f64) -> ScoreEvent {
        ScoreEvent {
            id: Uuid::new_v4(),
            contact_id,
            rule_id: None,
            event_type: EventKind::Opened,
            points,
            reason: String::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let store = ContactStore::new();
        store.insert_contact(Contact::new("a@example.com")).unwrap();
        let err = store
            .insert_contact(Contact::new("A@Example.com"))
            .unwrap_err();
        assert!(matches!(err, FlowError::Validation(_)));
    }

    #[test]
    fn delete_cascades_to_ledger_and_score() {
        let store = ContactStore::new();
        let id = store.insert_contact(Contact::new("b@example.com")).unwrap();
        store.append_event(make_event(id, 5.0));
        store.upsert_score(id, |s| s.engagement_score = 5.0);

        store.delete_contact(id).unwrap();
        assert!(store.get_contact(id).is_none());
        assert!(store.events_for(id).is_empty());
        assert!(store.get_score(id).is_none());
        // Email is free again.
        assert!(store.insert_contact(Contact::new("b@example.com")).is_ok());
    }

    #[test]
    fn delete_unknown_contact_is_not_found() {
        let store = ContactStore::new();
        let err = store.delete_contact(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
    }

    #[test]
    fn suppression_is_keyed_case_insensitively() {
        let store = ContactStore::new();
        store.suppress(SuppressionEntry {
            email: "VIP@Example.COM".to_string(),
            reason: SuppressionReason::Manual,
            source: String::new(),
            notes: String::new(),
            created_at: Utc::now(),
        });
        assert!(store.is_suppressed("vip@example.com"));
        assert!(store.remove_suppression("Vip@Example.Com"));
        assert!(!store.is_suppressed("vip@example.com"));
    }

    #[test]
    fn recently_scored_orders_by_update_time() {
        let store = ContactStore::new();
        let a = store.insert_contact(Contact::new("x@example.com")).unwrap();
        let b = store.insert_contact(Contact::new("y@example.com")).unwrap();
        store.upsert_score(a, |s| {
            s.score_updated_at = Utc::now() - chrono::Duration::hours(1)
        });
        store.upsert_score(b, |s| s.score_updated_at = Utc::now());

        let rows = store.recently_scored(10);
        assert_eq!(rows[0].contact_id, b);
        assert_eq!(rows[1].contact_id, a);

        assert_eq!(store.recently_scored(1).len(), 1);
    }
}
