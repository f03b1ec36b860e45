use kindred_core::{ConversationMode, KnappStage};
use kindred_store::RelationshipDimensions;

use crate::types::{
    MustHavePolicy, PlanGoals, RequirementsChecklist, ResponsePlan, StageTargets, StyleTargets,
};

const IMMERSION_BREAKING_WORDS: &[&str] = &[
    "设定", "人设", "虚拟", "虚构", "角色", "剧本", "配置", "模型", "系统", "作为一个",
];

const ADVICE_CUES: &[&str] = &["should i", "what should", "any advice", "what do you think i should"];

struct ModePolicy {
    max_messages: usize,
    min_first_len: usize,
    max_message_len: usize,
    must_have_policy: MustHavePolicy,
    allow_short_reply: bool,
    allow_empty_reply: bool,
    word_budget: usize,
}

fn policy_for(mode: ConversationMode) -> ModePolicy {
    match mode {
        ConversationMode::Normal => ModePolicy {
            max_messages: 3,
            min_first_len: 10,
            max_message_len: 220,
            must_have_policy: MustHavePolicy::Soft,
            allow_short_reply: false,
            allow_empty_reply: false,
            word_budget: 60,
        },
        ConversationMode::Cold => ModePolicy {
            max_messages: 2,
            min_first_len: 5,
            max_message_len: 140,
            must_have_policy: MustHavePolicy::None,
            allow_short_reply: true,
            allow_empty_reply: false,
            word_budget: 30,
        },
        ConversationMode::Mute => ModePolicy {
            max_messages: 1,
            min_first_len: 0,
            max_message_len: 40,
            must_have_policy: MustHavePolicy::None,
            allow_short_reply: true,
            allow_empty_reply: true,
            word_budget: 0,
        },
    }
}

fn stage_acts(stage: KnappStage) -> (Vec<&'static str>, Vec<&'static str>) {
    use KnappStage::*;
    match stage {
        Initiating => (
            vec!["answer", "clarify", "question", "light_tease", "small_talk"],
            vec!["deep_probe", "commitment_push", "intimacy_escalate"],
        ),
        Experimenting => (
            vec!["answer", "clarify", "question", "light_tease", "small_talk", "self_disclosure_light"],
            vec!["commitment_push", "intimacy_escalate"],
        ),
        Intensifying => (
            vec!["answer", "question", "self_disclosure", "light_tease", "affection"],
            vec!["commitment_push"],
        ),
        Integrating | Bonding => (
            vec!["answer", "question", "self_disclosure", "affection", "co_create", "commitment_talk"],
            vec![],
        ),
        Differentiating => (
            vec!["answer", "question", "boundary_assert", "clarify"],
            vec!["intimacy_escalate"],
        ),
        Circumscribing | Stagnating => (
            vec!["answer", "clarify", "small_talk"],
            vec!["self_disclosure", "affection", "intimacy_escalate"],
        ),
        Avoiding | Terminating => (
            vec!["answer", "clarify"],
            vec!["self_disclosure", "affection", "intimacy_escalate", "commitment_push"],
        ),
    }
}

fn detects_advice_request(user_text: &str, plan: &ResponsePlan) -> bool {
    let lower = user_text.to_lowercase();
    ADVICE_CUES.iter().any(|cue| lower.contains(cue)) || plan.speech_act.to_lowercase().contains("advice")
}

/// Requirements compiler (C11): fuses mode policy, stage, style, and the
/// reasoner's plan into the single checklist every downstream stage reads.
pub fn compile(
    mode: ConversationMode,
    dims: &RelationshipDimensions,
    stage: KnappStage,
    plan: &ResponsePlan,
    style: StyleTargets,
    tasks_for_lats: Vec<String>,
    task_budget_max: usize,
    user_text: &str,
    stage_violation: f64,
) -> RequirementsChecklist {
    let policy = policy_for(mode);
    let primary = plan.primary();

    let mut forbidden: Vec<String> = IMMERSION_BREAKING_WORDS.iter().map(|w| w.to_string()).collect();
    forbidden.extend(primary.evaluation_rubric.failure_modes.clone());

    let (allowed_acts, forbidden_acts) = stage_acts(stage);
    let violation_sensitivity = (0.3 + stage_violation * 0.7).clamp(0.0, 1.0);

    let mut max_messages = policy.max_messages;
    if policy.word_budget > 40 {
        max_messages = (max_messages + 2).min(5);
    }

    RequirementsChecklist {
        must_have: primary.core_points.clone(),
        forbidden,
        safety_notes: Vec::new(),
        mode_critic_criteria: match mode {
            ConversationMode::Mute => vec!["reply must read as near-silent".to_string()],
            ConversationMode::Cold => vec!["reply must read as distant, low-effort".to_string()],
            ConversationMode::Normal => Vec::new(),
        },
        first_message_rule: "first message must carry a stance or answer, never pure filler".to_string(),
        max_messages,
        min_first_len: policy.min_first_len,
        max_message_len: policy.max_message_len,
        stage_pacing_notes: vec![format!("stage is {stage}; pace accordingly")],
        must_have_policy: policy.must_have_policy,
        must_have_min_coverage: match policy.must_have_policy {
            MustHavePolicy::Soft => 0.6,
            MustHavePolicy::None => 0.0,
        },
        allow_short_reply: policy.allow_short_reply,
        allow_empty_reply: policy.allow_empty_reply,
        plan_goals: PlanGoals {
            must_cover_points: primary.core_points.clone(),
            avoid_points: primary.evaluation_rubric.failure_modes.clone(),
        },
        style_targets: style,
        stage_targets: StageTargets {
            stage,
            pacing_notes: vec![format!("stage is {stage}")],
            violation_sensitivity,
            allowed_acts: allowed_acts.into_iter().map(|s| s.to_string()).collect(),
            forbidden_acts: forbidden_acts.into_iter().map(|s| s.to_string()).collect(),
        },
        mode_behavior_targets: Vec::new(),
        tasks_for_lats,
        task_budget_max,
        word_budget: policy.word_budget,
        user_asks_advice: detects_advice_request(user_text, plan),
        latest_user_text: user_text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlanAlternative;

    fn sample_plan() -> ResponsePlan {
        ResponsePlan {
            user_intent: "chat".to_string(),
            speech_act: "answer".to_string(),
            plans: vec![PlanAlternative {
                id: "p1".to_string(),
                weight: 1.0,
                action: "reply".to_string(),
                information_needs: Vec::new(),
                core_points: vec!["acknowledge their day".to_string()],
                search_spec: Default::default(),
                evaluation_rubric: Default::default(),
                stop_conditions: Vec::new(),
                fallback_conditions: Vec::new(),
            }],
        }
    }

    #[test]
    fn mute_mode_allows_empty_reply() {
        let checklist = compile(
            ConversationMode::Mute,
            &RelationshipDimensions::default(),
            KnappStage::Initiating,
            &sample_plan(),
            StyleTargets::default(),
            Vec::new(),
            0,
            "whatever",
            0.0,
        );
        assert!(checklist.allow_empty_reply);
        assert_eq!(checklist.word_budget, 0);
    }

    #[test]
    fn advice_request_is_detected() {
        let checklist = compile(
            ConversationMode::Normal,
            &RelationshipDimensions::default(),
            KnappStage::Initiating,
            &sample_plan(),
            StyleTargets::default(),
            Vec::new(),
            2,
            "what should I do about my job",
            0.0,
        );
        assert!(checklist.user_asks_advice);
    }

    #[test]
    fn initiating_stage_forbids_intimacy_escalation() {
        let checklist = compile(
            ConversationMode::Normal,
            &RelationshipDimensions::default(),
            KnappStage::Initiating,
            &sample_plan(),
            StyleTargets::default(),
            Vec::new(),
            2,
            "hi",
            0.0,
        );
        assert!(checklist
            .stage_targets
            .forbidden_acts
            .contains(&"intimacy_escalate".to_string()));
    }
}
