use kindred_core::{BotId, KnappStage, UserId};
use kindred_store::{Assets, Bot, MoodState, RelationshipDimensions, SptInfo, State, User};

/// A minimal, fully-populated `State` shared by this crate's unit tests.
pub fn sample_state() -> State {
    let bot_id = BotId::from("bot-1");
    State {
        bot: Bot {
            id: bot_id.clone(),
            name: "Aria".to_string(),
            basic_info: serde_json::json!({"age": 24}),
            big_five: [0.1, 0.2, 0.3, 0.4, 0.5],
            persona: serde_json::json!({"voice": "warm"}),
            character_sidewrite: String::new(),
            backlog_tasks: Vec::new(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        },
        user: User {
            id: UserId::from("user-1"),
            bot_id,
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
