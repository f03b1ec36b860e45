use kindred_core::DeliveryAction;
use kindred_reason::RequirementsChecklist;

use crate::types::{FailedCheck, ProcessorPlan};

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn hard_gate_segments(segments: &[String], requirements: &RequirementsChecklist) -> Vec<FailedCheck> {
    let mut fails = Vec::new();
    if segments.is_empty() {
        fails.push(FailedCheck {
            id: "empty".to_string(),
            reason: "final segments is empty".to_string(),
            evidence: String::new(),
        });
        return fails;
    }

    if segments.len() > requirements.max_messages {
        fails.push(FailedCheck {
            id: "too_many_messages".to_string(),
            reason: format!("message count over limit ({}>{})", segments.len(), requirements.max_messages),
            evidence: String::new(),
        });
    }

    let first = segments[0].trim();
    if first.len() < requirements.min_first_len {
        fails.push(FailedCheck {
            id: "first_too_short".to_string(),
            reason: format!("first message too short ({}<{})", first.len(), requirements.min_first_len),
            evidence: first.to_string(),
        });
    }

    for (i, s) in segments.iter().enumerate() {
        let t = s.trim();
        if t.is_empty() {
            fails.push(FailedCheck {
                id: "empty_message".to_string(),
                reason: format!("message {} is empty", i + 1),
                evidence: String::new(),
            });
        }
        if t.len() > requirements.max_message_len {
            fails.push(FailedCheck {
                id: "message_too_long".to_string(),
                reason: format!("message {} too long ({}>{})", i + 1, t.len(), requirements.max_message_len),
                evidence: t.chars().take(120).collect(),
            });
        }
    }

    fails
}

/// One-shot minimal patch (C17): merge/trim only, never re-enters search.
/// If the first message is too short it is merged into the second; if there
/// are too many messages, merges proceed from the tail inward.
fn minimal_patch(plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> ProcessorPlan {
    let mut messages = plan.messages.clone();
    let mut delays = plan.delays.clone();
    let mut actions = plan.actions.clone();

    if messages.len() >= 2 && messages[0].trim().len() < requirements.min_first_len {
        let merged = format!("{} {}", messages[0].trim(), messages[1].trim()).trim().to_string();
        messages[0] = merged;
        messages.remove(1);
        if delays.len() >= 2 {
            delays[0] = delays[0].max(delays[1]);
            delays.remove(1);
        }
        if actions.len() >= 2 {
            let merged_action = if actions[0] == DeliveryAction::Idle || actions[1] == DeliveryAction::Idle {
                DeliveryAction::Idle
            } else {
                DeliveryAction::Typing
            };
            actions[0] = merged_action;
            actions.remove(1);
        }
    }

    while messages.len() > requirements.max_messages && messages.len() >= 2 {
        let last = messages.pop().unwrap();
        let idx = messages.len() - 1;
        messages[idx] = format!("{} {}", messages[idx].trim(), last.trim()).trim().to_string();
        if delays.len() > messages.len() {
            delays.pop();
        }
        if actions.len() > messages.len() {
            actions.pop();
        }
    }

    delays.resize(messages.len(), 0.6);
    actions.resize(messages.len(), DeliveryAction::Typing);
    for d in &mut delays {
        *d = (clamp(*d, 0.0, 86400.0) * 100.0).round() / 100.0;
    }

    let mut meta = plan.meta.clone();
    if let Some(obj) = meta.as_object_mut() {
        obj.insert("minimal_patch_applied".to_string(), serde_json::json!(true));
    }

    ProcessorPlan {
        messages,
        delays,
        actions,
        meta,
    }
}

/// Final validator (C17): the last structural check before send. Runs the
/// same hard-gate family as the evaluator (minus forbidden-term/assistant-like,
/// which the evaluator already screened during search) directly on the
/// chosen plan's messages, and patches in place rather than re-running search.
pub fn validate_and_patch(plan: ProcessorPlan, requirements: &RequirementsChecklist) -> ProcessorPlan {
    let fails = hard_gate_segments(&plan.messages, requirements);
    if fails.is_empty() {
        return plan;
    }
    minimal_patch(&plan, requirements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_reason::{MustHavePolicy, PlanGoals, StageTargets, StyleTargets};

    fn sample_requirements() -> RequirementsChecklist {
        RequirementsChecklist {
            must_have: Vec::new(),
            forbidden: Vec::new(),
            safety_notes: Vec::new(),
            mode_critic_criteria: Vec::new(),
            first_message_rule: String::new(),
            max_messages: 2,
            min_first_len: 10,
            max_message_len: 220,
            stage_pacing_notes: Vec::new(),
            must_have_policy: MustHavePolicy::None,
            must_have_min_coverage: 0.0,
            allow_short_reply: false,
            allow_empty_reply: false,
            plan_goals: PlanGoals::default(),
            style_targets: StyleTargets::default(),
            stage_targets: StageTargets {
                stage: kindred_core::KnappStage::Initiating,
                pacing_notes: Vec::new(),
                violation_sensitivity: 0.3,
                allowed_acts: Vec::new(),
                forbidden_acts: Vec::new(),
            },
            mode_behavior_targets: Vec::new(),
            tasks_for_lats: Vec::new(),
            task_budget_max: 1,
            word_budget: 60,
            user_asks_advice: false,
            latest_user_text: String::new(),
        }
    }

    fn plan(messages: Vec<&str>) -> ProcessorPlan {
        let n = messages.len();
        ProcessorPlan {
            messages: messages.into_iter().map(String::from).collect(),
            delays: vec![0.6; n],
            actions: vec![DeliveryAction::Typing; n],
            meta: serde_json::json!({}),
        }
    }

    #[test]
    fn short_first_message_is_merged() {
        let patched = validate_and_patch(plan(vec!["hey", "that sounds rough, are you okay"]), &sample_requirements());
        assert_eq!(patched.messages.len(), 1);
        assert!(patched.messages[0].starts_with("hey"));
    }

    #[test]
    fn too_many_messages_merges_from_tail() {
        let patched = validate_and_patch(
            plan(vec!["well that's a lot to take in honestly", "one", "two", "three"]),
            &sample_requirements(),
        );
        assert!(patched.messages.len() <= 2);
        assert_eq!(patched.delays.len(), patched.messages.len());
        assert_eq!(patched.actions.len(), patched.messages.len());
    }

    #[test]
    fn clean_plan_passes_through_unchanged() {
        let original = plan(vec!["oh that sounds like a lot honestly"]);
        let patched = validate_and_patch(original.clone(), &sample_requirements());
        assert_eq!(patched.messages, original.messages);
    }
}
