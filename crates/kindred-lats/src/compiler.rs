use kindred_core::{DeliveryAction, KnappStage};
use kindred_store::State;

use crate::types::{ProcessorPlan, ReplyPlan};

fn stage_delay_factor(stage: KnappStage) -> f64 {
    use KnappStage::*;
    match stage {
        Initiating => 1.1,
        Experimenting => 1.0,
        Intensifying => 0.8,
        Integrating => 0.9,
        Bonding => 0.9,
        Differentiating => 1.1,
        Circumscribing => 1.2,
        Stagnating => 1.6,
        Avoiding => 2.0,
        Terminating => 1.8,
    }
}

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

/// Reply compiler (C15): deterministic, no LLM call. Turns a `ReplyPlan`
/// into the actual send schedule, with the first message's delay modeling
/// "read + think + type" and later messages driven by their delay bucket
/// plus pause bonus, both scaled by stage pace and current busyness.
pub fn compile(reply_plan: &ReplyPlan, state: &State, max_messages: usize, user_text: &str) -> ProcessorPlan {
    let stage = state.user.current_stage;
    let busyness = state.user.mood_state.busyness;
    let stage_factor = stage_delay_factor(stage);
    let busy_factor = 1.0 + busyness;

    let mut messages: Vec<String> = Vec::new();
    let mut pause_after = Vec::new();
    let mut delay_bucket = Vec::new();

    for m in reply_plan.messages.iter().take(max_messages) {
        let content = m.content.trim();
        if content.is_empty() {
            continue;
        }
        messages.push(content.to_string());
        pause_after.push(m.pause_after);
        delay_bucket.push(m.delay_bucket);
    }

    if messages.is_empty() {
        messages.push(
            "(that didn't come through right, give me a sec and ask again)".to_string(),
        );
        pause_after.push(kindred_core::PauseAfter::None);
        delay_bucket.push(kindred_core::DelayBucket::Short);
    }

    let base_first = 0.6 + (user_text.len() as f64 * 0.03).min(1.8);
    let total_len: usize = messages.iter().map(|m| m.len()).sum();
    let think = 0.5 + (total_len as f64 * 0.01).min(2.0);
    let first_delay = clamp((base_first + think) * stage_factor * busy_factor, 0.4, 6.0);

    let mut delays = Vec::with_capacity(messages.len());
    let mut actions = Vec::with_capacity(messages.len());

    for (i, (bucket, pause)) in delay_bucket.iter().zip(pause_after.iter()).enumerate() {
        let bucket_sec = bucket.base_seconds();
        let pause_sec = pause.bonus_seconds();
        let (d, action) = if i == 0 {
            let d = first_delay + bucket_sec * 0.3;
            let action = if *bucket == kindred_core::DelayBucket::Offline {
                DeliveryAction::Idle
            } else {
                DeliveryAction::Typing
            };
            (d, action)
        } else {
            let d = clamp((bucket_sec + pause_sec) * stage_factor * busy_factor, 0.05, 60.0);
            let action = if *bucket == kindred_core::DelayBucket::Offline {
                DeliveryAction::Idle
            } else {
                DeliveryAction::Typing
            };
            (d, action)
        };
        delays.push((d * 100.0).round() / 100.0);
        actions.push(action);
    }

    ProcessorPlan {
        messages,
        delays,
        actions,
        meta: serde_json::json!({
            "source": "reply_plan_compiler",
            "stage": stage.to_string(),
            "busyness": busyness,
            "reply_plan_justification": reply_plan.justification,
            "reply_plan_first_message_role": reply_plan.first_message_role,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReplyMessage;
    use kindred_store::{Assets, Bot, MoodState, RelationshipDimensions, SptInfo, User};

    fn sample_state() -> State {
        State {
            bot: Bot {
                id: "bot-1".into(),
                name: "Aria".to_string(),
                basic_info: serde_json::json!({}),
                big_five: [0.5; 5],
                persona: serde_json::json!({}),
                character_sidewrite: String::new(),
                backlog_tasks: Vec::new(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
            },
            user: User {
                id: "user-1".into(),
                bot_id: "bot-1".into(),
                external_id: "ext-1".to_string(),
                basic_info: serde_json::json!({}),
                current_stage: KnappStage::Initiating,
                dimensions: RelationshipDimensions::default(),
                mood_state: MoodState::default(),
                inferred_profile: serde_json::json!({}),
                assets: Assets::default(),
                spt_info: SptInfo::default(),
                conversation_summary: String::new(),
                created_at: "2026-01-01T00:00:00Z".to_string(),
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
            recent_messages: Vec::new(),
        }
    }

    fn sample_reply_plan() -> ReplyPlan {
        ReplyPlan {
            intent: "chat".to_string(),
            speech_act: "answer".to_string(),
            stakes: "low".to_string(),
            first_message_role: "answer".to_string(),
            pacing_strategy: "quick reply".to_string(),
            messages_count: 1,
            messages: vec![ReplyMessage {
                id: "m1".to_string(),
                function: "answer".to_string(),
                content: "hey, that sounds rough".to_string(),
                key_points: Vec::new(),
                target_length: 30,
                info_density: "medium".to_string(),
                pause_after: kindred_core::PauseAfter::None,
                delay_bucket: kindred_core::DelayBucket::Short,
            }],
            must_cover_map: Default::default(),
            justification: "test".to_string(),
            strategy_tag: None,
            attempted_task_ids: Vec::new(),
            completed_task_ids: Vec::new(),
        }
    }

    #[test]
    fn arrays_have_equal_length() {
        let state = sample_state();
        let plan = sample_reply_plan();
        let processor = compile(&plan, &state, 3, "hi");
        assert_eq!(processor.messages.len(), processor.delays.len());
        assert_eq!(processor.messages.len(), processor.actions.len());
    }

    #[test]
    fn empty_messages_fall_back_to_placeholder() {
        let mut plan = sample_reply_plan();
        plan.messages[0].content = "   ".to_string();
        let state = sample_state();
        let processor = compile(&plan, &state, 3, "hi");
        assert_eq!(processor.messages.len(), 1);
        assert!(!processor.messages[0].is_empty());
    }
}
