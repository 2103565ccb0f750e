//! Suppression list management — permanent send exclusions consulted by the
//! audience evaluator and the scoring rule pipeline.

use chrono::Utc;
use tracing::info;

use leadflow_core::types::{SuppressionEntry, SuppressionReason};

use crate::engine::ScoringEngine;

impl ScoringEngine {
    /// Adds an email to the global suppression list. Re-adding an existing
    /// email updates the entry in place rather than duplicating it.
    pub fn add_to_suppression(
        &self,
        email: &str,
        reason: SuppressionReason,
        source: impl Into<String>,
        notes: impl Into<String>,
    ) -> SuppressionEntry {
        let entry = self.store().suppress(SuppressionEntry {
            email: email.to_string(),
            reason,
            source: source.into(),
            notes: notes.into(),
            created_at: Utc::now(),
        });
        metrics::counter!("scoring.suppressions_added").increment(1);
        info!(email = %entry.email, reason = ?reason, "Email suppressed");
        entry
    }

    pub fn check_suppression(&self, email: &str) -> Option<SuppressionEntry> {
        self.store().suppression_for(email)
    }

    pub fn remove_from_suppression(&self, email: &str) -> bool {
        let removed = self.store().remove_suppression(email);
        if removed {
            info!(email = %email.to_lowercase(), "Suppression removed");
        }
        removed
    }

    pub fn list_suppression(
        &self,
        reason: Option<SuppressionReason>,
        skip: usize,
        limit: usize,
    ) -> Vec<SuppressionEntry> {
        self.store().list_suppression(reason, skip, limit)
    }
}
