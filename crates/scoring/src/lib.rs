//! Lead scoring — event ledger ingestion, composite score computation
//! (engagement + profile completeness + recency decay), scoring rules, and
//! suppression list management.

pub mod engine;
pub mod score;
pub mod suppression;

pub use engine::{LeaderboardEntry, ScoringEngine};
pub use score::{profile_score, recency_score, recompute, ScoreSnapshot};
