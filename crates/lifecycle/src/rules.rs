//! Default transition rule sets and load-time validation.

use leadflow_core::types::LifecycleStage;
use leadflow_core::{FlowError, FlowResult};

use crate::types::TransitionRule;

/// Default forward-progression rules, evaluated in order; the first rule
/// whose thresholds are all satisfied wins.
pub fn default_rules() -> Vec<TransitionRule> {
    vec![
        TransitionRule {
            min_score: 5.0,
            description: "Confirmed signup or first page view".to_string(),
            ..TransitionRule::new(LifecycleStage::New, LifecycleStage::Subscriber)
        },
        TransitionRule {
            min_opens: 2,
            min_score: 15.0,
            description: "Opened 2+ emails, showing interest".to_string(),
            ..TransitionRule::new(LifecycleStage::Subscriber, LifecycleStage::Lead)
        },
        TransitionRule {
            min_clicks: 3,
            min_score: 35.0,
            min_days_in_stage: 3,
            description: "Clicked 3+ links, score above 35".to_string(),
            ..TransitionRule::new(LifecycleStage::Lead, LifecycleStage::Mql)
        },
        TransitionRule {
            min_score: 55.0,
            min_clicks: 5,
            min_days_in_stage: 5,
            description: "High engagement, ready for sales".to_string(),
            ..TransitionRule::new(LifecycleStage::Mql, LifecycleStage::Sql)
        },
        TransitionRule {
            min_score: 70.0,
            min_days_in_stage: 3,
            description: "Very high engagement, active opportunity".to_string(),
            ..TransitionRule::new(LifecycleStage::Sql, LifecycleStage::Opportunity)
        },
        TransitionRule {
            min_score: 80.0,
            description: "Converted — marked as customer".to_string(),
            ..TransitionRule::new(LifecycleStage::Opportunity, LifecycleStage::Customer)
        },
        TransitionRule {
            min_score: 90.0,
            min_clicks: 10,
            description: "Top advocate with highest engagement".to_string(),
            ..TransitionRule::new(LifecycleStage::Customer, LifecycleStage::Evangelist)
        },
    ]
}

/// Dormancy rules: the longer a contact has progressed, the shorter the
/// tolerated silence.
pub fn dormancy_rules() -> Vec<TransitionRule> {
    vec![
        TransitionRule {
            max_inactive_days: Some(60),
            description: "No engagement for 60 days".to_string(),
            ..TransitionRule::new(LifecycleStage::Subscriber, LifecycleStage::Dormant)
        },
        TransitionRule {
            max_inactive_days: Some(45),
            description: "No engagement for 45 days".to_string(),
            ..TransitionRule::new(LifecycleStage::Lead, LifecycleStage::Dormant)
        },
        TransitionRule {
            max_inactive_days: Some(30),
            description: "No engagement for 30 days".to_string(),
            ..TransitionRule::new(LifecycleStage::Mql, LifecycleStage::Dormant)
        },
        TransitionRule {
            max_inactive_days: Some(21),
            description: "No engagement for 21 days".to_string(),
            ..TransitionRule::new(LifecycleStage::Sql, LifecycleStage::Dormant)
        },
    ]
}

/// Rejects cyclic or regressive rule configuration at load time, before any
/// evaluation runs: a progression rule must move strictly forward, and a
/// dormancy rule must target a sink state.
pub fn validate_rules(rules: &[TransitionRule]) -> FlowResult<()> {
    for rule in rules {
        if rule.is_dormancy() {
            if rule.to_stage.is_active() {
                return Err(FlowError::InvariantViolation(format!(
                    "Dormancy rule {} -> {} must target dormant or churned",
                    rule.from_stage, rule.to_stage
                )));
            }
            continue;
        }

        let (Some(from), Some(to)) = (
            rule.from_stage.progression_order(),
            rule.to_stage.progression_order(),
        ) else {
            return Err(FlowError::InvariantViolation(format!(
                "Progression rule {} -> {} references a non-progression stage",
                rule.from_stage, rule.to_stage
            )));
        };
        if to <= from {
            return Err(FlowError::InvariantViolation(format!(
                "Progression rule {} -> {} is regressive or cyclic",
                rule.from_stage, rule.to_stage
            )));
        }
    }
    Ok(())
}
