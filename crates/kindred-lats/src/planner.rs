use kindred_llm::{ChatRequest, Invoker, Message, Role};
use kindred_reason::RequirementsChecklist;
use kindred_store::State;

use crate::types::ReplyPlan;

const STRATEGY_TAGS: &[&str] = &[
    "direct_answer",
    "empathy_reflect",
    "self_disclosure",
    "light_tease",
    "ask_back",
    "co_create",
];

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

fn build_prompt(
    state: &State,
    requirements: &RequirementsChecklist,
    guidance: Option<&str>,
    strategy_tag: Option<&str>,
) -> String {
    let history: String = state
        .recent_messages
        .iter()
        .rev()
        .take(20)
        .rev()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let tag_instruction = strategy_tag
        .map(|t| format!("\nThis particular variant must lean into the strategy tag \"{t}\"."))
        .unwrap_or_default();
    let guidance_block = guidance
        .map(|g| format!("\n\nLessons from earlier attempts this turn:\n{g}"))
        .unwrap_or_default();

    format!(
        "You are the scene choreographer for {bot_name}. Produce an executable multi-message \
         ReplyPlan for this turn: how a real person would split this reply across messages, not \
         just chopping up one long paragraph.\n\n\
         Never claim to be an AI, assistant, model, or chatbot. Never use customer-service \
         phrasing (\"how can I help you\", \"what can I do for you\").\n\n\
         Recent conversation:\n{history}\n\n\
         Hard targets:\n\
         - max_messages: {max_messages}\n\
         - must_cover_points: {must_cover:?}\n\
         - style_targets: {style:?}\n\
         - stage: {stage}, allowed_acts: {allowed:?}, forbidden_acts: {forbidden:?}\n\
         - min_first_len: {min_first_len}, max_message_len: {max_message_len}\n\
         {tag_instruction}{guidance_block}\n\n\
         Respond as JSON:\n\
         {{\"intent\": \"...\", \"speech_act\": \"...\", \"stakes\": \"low|medium|high\", \
         \"first_message_role\": \"...\", \"pacing_strategy\": \"...\", \"messages_count\": 1, \
         \"messages\": [{{\"id\": \"m1\", \"function\": \"answer\", \"content\": \"...\", \
         \"key_points\": [], \"target_length\": 40, \"info_density\": \"medium\", \
         \"pause_after\": \"none\", \"delay_bucket\": \"short\"}}], \
         \"must_cover_map\": {{}}, \"justification\": \"...\"}}",
        bot_name = state.bot.name,
        history = if history.is_empty() { "(no history)" } else { &history },
        max_messages = requirements.max_messages,
        must_cover = requirements.plan_goals.must_cover_points,
        style = requirements.style_targets,
        stage = requirements.stage_targets.stage,
        allowed = requirements.stage_targets.allowed_acts,
        forbidden = requirements.stage_targets.forbidden_acts,
        min_first_len = requirements.min_first_len,
        max_message_len = requirements.max_message_len,
        tag_instruction = tag_instruction,
        guidance_block = guidance_block,
    )
}

fn fallback_plan(requirements: &RequirementsChecklist) -> ReplyPlan {
    ReplyPlan {
        intent: "respond".to_string(),
        speech_act: "answer".to_string(),
        stakes: "low".to_string(),
        first_message_role: "answer".to_string(),
        pacing_strategy: "single short reply".to_string(),
        messages_count: 1,
        messages: vec![crate::types::ReplyMessage {
            id: "m1".to_string(),
            function: "answer".to_string(),
            content: "reply naturally".to_string(),
            key_points: Vec::new(),
            target_length: 30,
            info_density: "medium".to_string(),
            pause_after: Default::default(),
            delay_bucket: Default::default(),
        }],
        must_cover_map: Default::default(),
        justification: "fallback plan: planner invoker unavailable or unparseable".to_string(),
        strategy_tag: None,
        attempted_task_ids: Vec::new(),
        completed_task_ids: Vec::new(),
    }
}

/// Reply planner (C12): asks the model for one choreographed multi-message
/// plan satisfying the checklist's hard targets. Truncates to `max_messages`
/// and repairs `messages_count` rather than trusting the model's count.
pub async fn plan_reply(
    invoker: &dyn Invoker,
    model: &str,
    state: &State,
    requirements: &RequirementsChecklist,
    guidance: Option<&str>,
    strategy_tag: Option<&str>,
) -> ReplyPlan {
    let prompt = build_prompt(state, requirements, guidance, strategy_tag);
    let req = ChatRequest::new(
        model,
        "You choreograph multi-message replies. Respond with JSON only.",
        vec![Message {
            role: Role::User,
            content: prompt,
        }],
    );

    let response = match invoker.invoke(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(err = %e, "reply planner invoker failed, using fallback plan");
            return fallback_plan(requirements);
        }
    };

    match serde_json::from_str::<ReplyPlan>(strip_code_fence(&response.content)) {
        Ok(mut plan) => {
            if plan.messages.len() > requirements.max_messages {
                plan.messages.truncate(requirements.max_messages);
            }
            plan.fix_count();
            if plan.messages.is_empty() {
                return fallback_plan(requirements);
            }
            plan.strategy_tag = strategy_tag.map(|s| s.to_string());
            plan
        }
        Err(e) => {
            tracing::warn!(err = %e, "reply plan did not parse, using fallback plan");
            fallback_plan(requirements)
        }
    }
}

/// Variant expander used by the LATS loop (C12 continued): produces `k`
/// plans tagged with distinct strategies, MMR-diversified by dropping
/// candidates too textually similar to one already kept (similarity >= 0.88,
/// approximated by token-overlap Jaccard since no embedding model is wired
/// in at this layer).
pub async fn expand_variants(
    invoker: &dyn Invoker,
    model: &str,
    state: &State,
    requirements: &RequirementsChecklist,
    guidance: Option<&str>,
    k: usize,
) -> Vec<ReplyPlan> {
    let mut variants = Vec::with_capacity(k);
    for i in 0..k {
        let tag = STRATEGY_TAGS[i % STRATEGY_TAGS.len()];
        let plan = plan_reply(invoker, model, state, requirements, guidance, Some(tag)).await;
        if !too_similar(&plan, &variants) {
            variants.push(plan);
        }
    }
    if variants.is_empty() {
        variants.push(fallback_plan(requirements));
    }
    variants
}

fn jaccard(a: &str, b: &str) -> f64 {
    let sa: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let sb: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let inter = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    inter / union
}

fn too_similar(candidate: &ReplyPlan, kept: &[ReplyPlan]) -> bool {
    let text = candidate.plain_text();
    kept.iter().any(|k| jaccard(&text, &k.plain_text()) >= 0.88)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_identical_text_is_one() {
        assert!((jaccard("hello there friend", "hello there friend") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_disjoint_text_is_zero() {
        assert_eq!(jaccard("hello there", "goodbye now"), 0.0);
    }
}
