use kindred_core::ConversationMode;
use kindred_llm::{ChatRequest, Invoker, Message, Role};
use kindred_reason::{MustHavePolicy, RequirementsChecklist};

use crate::types::{FailedCheck, LlmStatus, ProcessorPlan, SimReport};

fn clamp01(x: f64) -> f64 {
    x.max(0.0).min(1.0)
}

/// Hard gate (C14, structural half): only structural constraints and the
/// hard-banned term/phrase lists. `must_have` coverage is intentionally a
/// soft score, not a hard failure, so one missed nuance doesn't nuke an
/// otherwise-good candidate.
pub fn hard_gate(processor_plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> Vec<FailedCheck> {
    let mut fails = Vec::new();
    let msgs = &processor_plan.messages;

    if msgs.is_empty() {
        if requirements.allow_empty_reply {
            return fails;
        }
        fails.push(FailedCheck {
            id: "empty".to_string(),
            reason: "messages is empty".to_string(),
            evidence: String::new(),
        });
        return fails;
    }

    if msgs.len() > requirements.max_messages {
        fails.push(FailedCheck {
            id: "too_many_messages".to_string(),
            reason: format!("message count over limit ({}>{})", msgs.len(), requirements.max_messages),
            evidence: String::new(),
        });
    }

    for (i, m) in msgs.iter().enumerate() {
        let t = m.trim();
        if t.is_empty() && !requirements.allow_empty_reply {
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

    if !requirements.allow_short_reply {
        let first = msgs[0].trim();
        if first.len() < requirements.min_first_len {
            fails.push(FailedCheck {
                id: "first_too_short".to_string(),
                reason: format!(
                    "first message too short ({}<{}), reads like filler",
                    first.len(),
                    requirements.min_first_len
                ),
                evidence: first.to_string(),
            });
        }
    }

    let all_text = msgs.join("\n");
    let all_text_lower = all_text.to_lowercase();

    for term in &requirements.forbidden {
        let t = term.trim();
        if t.is_empty() {
            continue;
        }
        if all_text_lower.contains(&t.to_lowercase()) {
            fails.push(FailedCheck {
                id: "forbidden_term".to_string(),
                reason: format!("hit forbidden term '{t}' (high immersion-break/template risk)"),
                evidence: all_text.chars().take(240).collect(),
            });
            break;
        }
    }

    const IDENTITY_MARKERS: &[&str] = &[
        "i'm an ai",
        "i am an ai",
        "as an ai",
        "i'm a chatbot",
        "i am a chatbot",
        "i'm an assistant",
        "i am an assistant",
        "as your assistant",
        "i'm a language model",
        "i am a language model",
    ];
    const SERVICE_MARKERS: &[&str] = &[
        "how can i help you",
        "what can i help you with",
        "is there anything else i can help",
        "i'm here to help you with",
        "what can i do for you",
        "how may i assist you",
    ];

    if fails.is_empty() {
        if let Some(hit) = IDENTITY_MARKERS.iter().find(|p| all_text_lower.contains(**p)) {
            fails.push(FailedCheck {
                id: "assistant_like_response".to_string(),
                reason: format!("identity marker detected: '{hit}' (self-identifies as AI/assistant)"),
                evidence: all_text.chars().take(200).collect(),
            });
        }
    }

    if fails.is_empty() {
        if let Some(hit) = SERVICE_MARKERS.iter().find(|p| all_text_lower.contains(**p)) {
            fails.push(FailedCheck {
                id: "assistant_like_response".to_string(),
                reason: format!("service-script phrasing detected: '{hit}'"),
                evidence: all_text.chars().take(200).collect(),
            });
        }
    }

    if fails.is_empty() {
        const ADVICE_MARKERS: &[&str] = &[
            "i suggest",
            "i'd suggest",
            "you should",
            "here's what you should do",
            "steps:",
            "first, ",
            "to summarize",
            "a few tips",
        ];
        if !requirements.user_asks_advice {
            if let Some(hit) = ADVICE_MARKERS.iter().find(|p| all_text_lower.contains(**p)) {
                fails.push(FailedCheck {
                    id: "unsolicited_advice".to_string(),
                    reason: format!("advice/tutorial tone with no request for it: '{hit}'"),
                    evidence: all_text.chars().take(220).collect(),
                });
            }
        }
    }

    const TEMPLATE_ENDINGS: &[&str] = &[
        "thank you for using",
        "have a great day using",
        "feel free to reach out anytime",
        "let us know if you have any questions",
    ];
    if let Some(hit) = TEMPLATE_ENDINGS.iter().find(|p| all_text_lower.contains(**p)) {
        fails.push(FailedCheck {
            id: "assistant_like_response".to_string(),
            reason: format!("templated sign-off detected: '{hit}'"),
            evidence: all_text.chars().take(200).collect(),
        });
    }

    fails
}

fn mode_consistency(mode: ConversationMode, processor_plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> f64 {
    let msgs = &processor_plan.messages;
    let msg_count = msgs.len();
    let first_len = msgs.first().map(|m| m.trim().len()).unwrap_or(0);
    let max_messages = requirements.max_messages.max(1);
    let max_len = requirements.max_message_len.max(1);

    match mode {
        ConversationMode::Mute => {
            if msg_count == 0 {
                1.0
            } else if msg_count == 1 && first_len <= 3 {
                0.9
            } else {
                clamp01(0.5 - (first_len as f64) / 100.0)
            }
        }
        ConversationMode::Cold => {
            let total_len: usize = msgs.iter().map(|m| m.len()).sum();
            if msg_count == 1 && (1..=80).contains(&first_len) {
                1.0
            } else if msg_count == 1 && first_len > 80 {
                clamp01(1.0 - (first_len as f64 - 80.0) / 200.0)
            } else if msg_count > 1 {
                clamp01(0.3 - (msg_count as f64 - 1.0) * 0.1)
            } else if total_len > 150 {
                clamp01(0.5 - (total_len as f64 - 150.0) / 300.0)
            } else {
                0.8
            }
        }
        ConversationMode::Normal => {
            if (8..=max_len).contains(&first_len) && msg_count <= max_messages {
                1.0
            } else if first_len < 8 {
                clamp01(first_len as f64 / 8.0)
            } else if first_len > max_len {
                clamp01(1.0 - (first_len as f64 - max_len as f64) / max_len as f64)
            } else if msg_count > max_messages {
                clamp01(1.0 - (msg_count as f64 - max_messages as f64) / max_messages as f64)
            } else {
                0.7
            }
        }
    }
}

fn must_have_coverage(processor_plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> f64 {
    if requirements.must_have_policy != MustHavePolicy::Soft || requirements.must_have.is_empty() {
        return 1.0;
    }
    let joined = processor_plan.messages.join("\n").to_lowercase();
    let total = requirements.must_have.len();
    let covered = requirements
        .must_have
        .iter()
        .filter(|need| {
            let keywords: Vec<&str> = need.split_whitespace().filter(|w| w.len() >= 3).take(4).collect();
            if keywords.is_empty() {
                return joined.contains(&need.to_lowercase());
            }
            let matched = keywords.iter().filter(|k| joined.contains(&k.to_lowercase())).count();
            matched >= (keywords.len() / 2).max(1)
        })
        .count();
    clamp01(covered as f64 / total as f64)
}

fn plan_coverage(processor_plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> f64 {
    let points = &requirements.plan_goals.must_cover_points;
    if points.is_empty() {
        return 1.0;
    }
    let joined = processor_plan.messages.join("\n").to_lowercase();
    let covered = points
        .iter()
        .filter(|p| {
            let first_word = p.split_whitespace().next().unwrap_or("");
            !first_word.is_empty() && joined.contains(&first_word.to_lowercase())
        })
        .count();
    clamp01(covered as f64 / points.len() as f64)
}

fn stage_fit_heur(processor_plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> f64 {
    let joined = processor_plan.messages.join(" ").to_lowercase();
    let forbidden_hit = requirements
        .stage_targets
        .forbidden_acts
        .iter()
        .any(|act| joined.contains(&act.replace('_', " ")));
    if forbidden_hit {
        0.3
    } else {
        1.0
    }
}

/// Heuristic soft score (C14): cheap first-pass signal used before (or
/// instead of) an LLM choreography judge. Weighted toward structural fit
/// (mode_consistency, stage_fit_heur) over keyword-based coverage proxies,
/// which are easy to game.
pub fn soft_score_heuristic(
    mode: ConversationMode,
    processor_plan: &ProcessorPlan,
    requirements: &RequirementsChecklist,
) -> (f64, serde_json::Value) {
    let mode_c = clamp01(mode_consistency(mode, processor_plan, requirements));
    let must_c = clamp01(must_have_coverage(processor_plan, requirements));
    let plan_c = clamp01(plan_coverage(processor_plan, requirements));
    let style_d = 1.0;
    let stage_c = clamp01(stage_fit_heur(processor_plan, requirements));

    let overall = 0.45 * mode_c + 0.05 * must_c + 0.05 * plan_c + 0.15 * style_d + 0.30 * stage_c;

    (
        overall,
        serde_json::json!({
            "mode_consistency": mode_c,
            "must_have_coverage": must_c,
            "plan_coverage": plan_c,
            "style_distance": style_d,
            "stage_fit_heur": stage_c,
        }),
    )
}

#[derive(serde::Deserialize)]
struct JudgeResponse {
    #[serde(default)]
    overall_score: f64,
    #[serde(default)]
    assistantiness: f64,
    #[serde(default)]
    improvement_notes: Vec<String>,
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        rest.trim_end_matches("```").trim()
    } else if let Some(rest) = text.strip_prefix("```") {
        rest.trim_end_matches("```").trim()
    } else {
        text
    }
}

fn build_judge_prompt(processor_plan: &ProcessorPlan, requirements: &RequirementsChecklist) -> String {
    format!(
        "You are a choreography judge. Score this set of outgoing messages against the hard \
         targets below. assistantiness = 0 means it reads like a real friend, 1 means it reads \
         like an AI assistant or customer service. If assistantiness > 0.5, overall_score must \
         be < 0.3.\n\n\
         Messages:\n{messages}\n\n\
         Targets: max_messages={max_messages}, must_cover_points={must_cover:?}, stage={stage}.\n\n\
         Respond as JSON: {{\"overall_score\": 0.0, \"assistantiness\": 0.0, \"improvement_notes\": []}}",
        messages = processor_plan.messages.join("\n"),
        max_messages = requirements.max_messages,
        must_cover = requirements.plan_goals.must_cover_points,
        stage = requirements.stage_targets.stage,
    )
}

/// Optional LLM choreography judge. On any failure this contributes nothing;
/// the caller falls back to the heuristic score alone.
pub async fn soft_score_via_llm(
    invoker: &dyn Invoker,
    model: &str,
    processor_plan: &ProcessorPlan,
    requirements: &RequirementsChecklist,
) -> Option<(f64, f64, Vec<String>)> {
    let prompt = build_judge_prompt(processor_plan, requirements);
    let req = ChatRequest::new(
        model,
        "You judge reply choreography quality. Respond with JSON only.",
        vec![Message {
            role: Role::User,
            content: prompt,
        }],
    );
    let response = invoker.invoke(&req).await.ok()?;
    let parsed: JudgeResponse = serde_json::from_str(strip_code_fence(&response.content)).ok()?;
    Some((clamp01(parsed.overall_score), clamp01(parsed.assistantiness), parsed.improvement_notes))
}

fn assistantiness_weight(mode: ConversationMode) -> f64 {
    match mode {
        ConversationMode::Normal => 1.0,
        ConversationMode::Cold => 0.5,
        ConversationMode::Mute => 0.0,
    }
}

/// Combines the hard gate and soft score into one verdict (C14). A hard-gate
/// failure doesn't discard the candidate outright (the search loop wants the
/// gradient), it just crushes its score by 80%.
pub async fn evaluate_candidate(
    invoker: Option<(&dyn Invoker, &str)>,
    mode: ConversationMode,
    processor_plan: &ProcessorPlan,
    requirements: &RequirementsChecklist,
    quality_threshold: f64,
) -> SimReport {
    let failures = hard_gate(processor_plan, requirements);
    let hard_pass = failures.is_empty();

    let (heur_overall, heur_breakdown) = soft_score_heuristic(mode, processor_plan, requirements);
    let mut overall = heur_overall;
    let mut notes = Vec::new();
    let mut llm_status = LlmStatus::Skipped;
    let mut llm_details = serde_json::json!({});

    if let Some((invoker, model)) = invoker {
        match soft_score_via_llm(invoker, model, processor_plan, requirements).await {
            Some((llm_overall, assistantiness, llm_notes)) => {
                llm_status = LlmStatus::Ok;
                overall = 0.75 * llm_overall + 0.25 * heur_overall;

                let weight = assistantiness_weight(mode);
                if weight > 0.0 && assistantiness > 0.0 {
                    let penalty = weight * 0.25 * assistantiness;
                    overall = (overall - penalty).max(0.0);
                    notes.push(format!(
                        "assistant-like tone detected: assistantiness={assistantiness:.2}, penalty={penalty:.4}"
                    ));
                }
                notes.extend(llm_notes);
                llm_details = serde_json::json!({ "assistantiness": assistantiness });
            }
            None => {
                llm_status = LlmStatus::ParseError;
            }
        }
    }

    if !hard_pass {
        overall *= 0.2;
    }

    SimReport {
        found_solution: hard_pass && overall >= quality_threshold,
        eval_score: clamp01(overall),
        failed_checks: failures,
        score_breakdown: heur_breakdown,
        improvement_notes: notes,
        llm_status,
        llm_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_reason::{PlanGoals, StageTargets, StyleTargets};

    fn sample_requirements() -> RequirementsChecklist {
        RequirementsChecklist {
            must_have: Vec::new(),
            forbidden: vec!["persona".to_string()],
            safety_notes: Vec::new(),
            mode_critic_criteria: Vec::new(),
            first_message_rule: String::new(),
            max_messages: 3,
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
                allowed_acts: vec!["answer".to_string()],
                forbidden_acts: vec!["deep_probe".to_string()],
            },
            mode_behavior_targets: Vec::new(),
            tasks_for_lats: Vec::new(),
            task_budget_max: 1,
            word_budget: 60,
            user_asks_advice: false,
            latest_user_text: "hey what's up".to_string(),
        }
    }

    fn plan(messages: Vec<&str>) -> ProcessorPlan {
        ProcessorPlan {
            messages: messages.into_iter().map(String::from).collect(),
            delays: Vec::new(),
            actions: Vec::new(),
            meta: serde_json::json!({}),
        }
    }

    #[test]
    fn empty_messages_fail_when_not_allowed() {
        let fails = hard_gate(&plan(vec![]), &sample_requirements());
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].id, "empty");
    }

    #[test]
    fn forbidden_term_is_caught() {
        let fails = hard_gate(&plan(vec!["this is my persona talking"]), &sample_requirements());
        assert!(fails.iter().any(|f| f.id == "forbidden_term"));
    }

    #[test]
    fn identity_marker_is_caught() {
        let fails = hard_gate(&plan(vec!["honestly, I'm an AI and I'm here to chat"]), &sample_requirements());
        assert!(fails.iter().any(|f| f.id == "assistant_like_response"));
    }

    #[test]
    fn clean_reply_passes_hard_gate() {
        let fails = hard_gate(&plan(vec!["oh no, that sounds rough, you okay?"]), &sample_requirements());
        assert!(fails.is_empty());
    }

    #[test]
    fn empty_reply_scores_high_in_mute_mode() {
        let (score, _) = soft_score_heuristic(ConversationMode::Mute, &plan(vec![]), &sample_requirements());
        assert!(score > 0.9);
    }
}
