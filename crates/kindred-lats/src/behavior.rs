use kindred_core::KnappStage;
use kindred_core::DeliveryAction;
use kindred_store::State;

use crate::types::ProcessorPlan;

fn clamp(x: f64, lo: f64, hi: f64) -> f64 {
    x.max(lo).min(hi)
}

fn stage_delay_factor(stage: KnappStage) -> f64 {
    use KnappStage::*;
    match stage {
        Initiating => 1.2,
        Experimenting => 1.0,
        Intensifying => 0.6,
        Integrating => 0.8,
        Bonding => 0.9,
        Differentiating => 1.1,
        Circumscribing => 1.3,
        Stagnating => 2.5,
        Avoiding => 3.0,
        Terminating => 2.0,
    }
}

struct HumanDynamics {
    speed_factor: f64,
    fragmentation_tendency: f64,
}

fn human_dynamics(state: &State) -> HumanDynamics {
    let big5 = state.bot.big_five;
    let extraversion = big5[2];
    let conscientiousness = big5[1];

    let mood = state.user.mood_state;
    let p_speed = 1.0 - extraversion * 0.2;
    let p_caution = 1.0 + conscientiousness * 0.3;
    let m_arousal_boost = 1.0 - mood.arousal * 0.3;
    let m_busyness_drag = 1.0 + clamp(mood.busyness, 0.0, 1.0) * 1.5;
    let r_intimacy_frag = state.user.dimensions.closeness;
    let r_stage_factor = stage_delay_factor(state.user.current_stage);

    let speed_factor = p_speed * p_caution * m_arousal_boost * m_busyness_drag * r_stage_factor;
    let fragmentation_tendency = extraversion * 0.5 + r_intimacy_frag * 0.5 + mood.arousal * 0.3;

    HumanDynamics {
        speed_factor: clamp(speed_factor, 0.2, 5.0),
        fragmentation_tendency,
    }
}

/// Splits already-compiled plain text into bubble-sized fragments the way a
/// real typist would, using the bot's extraversion/closeness/arousal mix to
/// decide how chopped-up the delivery feels. This is the fallback path used
/// when no `ReplyPlan` exists at all (e.g. a canned safety response) — the
/// planner+compiler path already segments on purpose, this one segments by
/// punctuation.
fn segment_text(text: &str, dynamics: &HumanDynamics) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let split_threshold = clamp(20.0 - dynamics.fragmentation_tendency * 15.0, 5.0, 30.0) as usize;

    let mut bubbles = Vec::new();
    let mut buf = String::new();
    for ch in text.chars() {
        buf.push(ch);
        let is_boundary = matches!(ch, '.' | '!' | '?' | '\n');
        if is_boundary && (buf.chars().count() > split_threshold || ch == '\n') {
            let trimmed = buf.trim().to_string();
            if !trimmed.is_empty() {
                bubbles.push(trimmed);
            }
            buf.clear();
        }
    }
    let trimmed = buf.trim().to_string();
    if !trimmed.is_empty() {
        bubbles.push(trimmed);
    }
    bubbles
}

/// Humanized fallback path (C16): used when there is no reply plan to compile
/// (canned safety responses, degenerate empty-plan recovery). Builds a
/// `ProcessorPlan` directly from plain text using typing-speed and
/// fragmentation modeling instead of delay buckets.
pub fn humanize_plain_text(state: &State, text: &str, user_text: &str) -> ProcessorPlan {
    let dynamics = human_dynamics(state);
    let t_read = 0.5 + user_text.len() as f64 * 0.05;
    let cognitive_load = text.len() as f64 * 0.02;
    let t_cog = (1.0 + cognitive_load) * dynamics.speed_factor;

    let typing_speed_char_per_sec = 5.0 / dynamics.speed_factor;
    let bubbles = segment_text(text.trim(), &dynamics);

    if bubbles.is_empty() {
        return ProcessorPlan {
            messages: Vec::new(),
            delays: Vec::new(),
            actions: Vec::new(),
            meta: serde_json::json!({ "source": "behavior_humanizer", "empty": true }),
        };
    }

    let mut delays = Vec::with_capacity(bubbles.len());
    let mut actions = Vec::with_capacity(bubbles.len());
    let mut accumulated = t_read + t_cog;

    for bub in &bubbles {
        delays.push((accumulated * 100.0).round() / 100.0);
        actions.push(DeliveryAction::Typing);
        let t_type = bub.len() as f64 / typing_speed_char_per_sec;
        accumulated = clamp(t_type, 0.05, 30.0);
    }

    ProcessorPlan {
        messages: bubbles,
        delays,
        actions,
        meta: serde_json::json!({
            "source": "behavior_humanizer",
            "t_read": t_read,
            "t_cog": t_cog,
            "speed_factor": dynamics.speed_factor,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_store::{Assets, Bot, MoodState, RelationshipDimensions, SptInfo, User};

    fn sample_state() -> State {
        State {
            bot: Bot {
                id: "bot-1".into(),
                name: "Aria".to_string(),
                basic_info: serde_json::json!({}),
                big_five: [0.5, 0.5, 0.8, 0.5, 0.3],
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
                current_stage: KnappStage::Experimenting,
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

    #[test]
    fn empty_text_produces_empty_plan() {
        let plan = humanize_plain_text(&sample_state(), "", "hi");
        assert!(plan.messages.is_empty());
    }

    #[test]
    fn long_text_splits_into_multiple_bubbles() {
        let text = "Oh no. That sounds rough! Are you doing okay? I'm here if you want to talk.";
        let plan = humanize_plain_text(&sample_state(), text, "ugh long day");
        assert!(plan.messages.len() >= 2);
        assert_eq!(plan.messages.len(), plan.delays.len());
    }
}
