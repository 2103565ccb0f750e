//! Rule-based dynamic audiences — declarative rule compilation, exclusion
//! logic, size estimation, and overlap analysis.

pub mod builder;
pub mod evaluator;
pub mod rules;

pub use builder::AudienceBuilder;
pub use evaluator::{Audience, AudienceEvaluator, AudienceUpdate, OverlapReport};
pub use rules::{MatchType, RuleInput};
