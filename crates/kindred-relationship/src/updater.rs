use kindred_store::Assets;

use crate::types::AssetDelta;

/// Updates the monotonic asset fields on `Assets` from this turn's
/// topic/depth signals and reports what changed (C18, asset half).
/// `current_session_tasks` is carried through untouched — task bookkeeping
/// is [`crate::tasks::record_task_outcomes`]'s job. `spt_level` is clamped
/// to the depth scale `[1,4]`.
pub fn update_assets(current: &Assets, topic_category: &str, spt_level: u8, is_intellectually_deep: bool) -> (Assets, AssetDelta) {
    let spt_level = spt_level.clamp(1, 4);

    let mut topics: Vec<String> = current.topic_history.clone();
    let is_new_topic = !topic_category.is_empty() && !topics.iter().any(|t| t == topic_category);
    if is_new_topic {
        topics.push(topic_category.to_string());
        topics.sort();
    }

    let old_max = current.max_spt_depth.clamp(1, 4);
    let new_max = old_max.max(spt_level);
    let is_spt_breakthrough = new_max > old_max;

    let new_capital = current.intellectual_capital + u32::from(is_intellectually_deep);

    let updated = Assets {
        current_session_tasks: current.current_session_tasks.clone(),
        breadth_score: topics.len(),
        topic_history: topics,
        max_spt_depth: new_max,
        intellectual_capital: new_capital,
        active_reflection_patch: current.active_reflection_patch.clone(),
    };

    let delta = AssetDelta {
        is_new_topic,
        is_spt_breakthrough,
        is_intellectually_deep,
    };

    (updated, delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_topic_is_flagged_and_recorded() {
        let (updated, delta) = update_assets(&Assets::default(), "music", 1, false);
        assert!(delta.is_new_topic);
        assert_eq!(updated.breadth_score, 1);
        assert_eq!(updated.topic_history, vec!["music".to_string()]);
    }

    #[test]
    fn max_depth_is_a_high_water_mark() {
        let current = Assets {
            max_spt_depth: 3,
            ..Default::default()
        };
        let (updated, delta) = update_assets(&current, "music", 2, false);
        assert_eq!(updated.max_spt_depth, 3);
        assert!(!delta.is_spt_breakthrough);
    }

    #[test]
    fn deeper_turn_breaks_through() {
        let current = Assets {
            max_spt_depth: 2,
            ..Default::default()
        };
        let (updated, delta) = update_assets(&current, "music", 4, true);
        assert_eq!(updated.max_spt_depth, 4);
        assert!(delta.is_spt_breakthrough);
        assert_eq!(updated.intellectual_capital, 1);
    }

    #[test]
    fn session_tasks_are_carried_through_untouched() {
        let current = Assets {
            current_session_tasks: vec![kindred_store::BotTask {
                id: "t1".to_string(),
                description: "ask about their day".to_string(),
                category: kindred_store::TaskCategory::B2,
                importance: 0.5,
                task_type: "ask".to_string(),
                last_attempt_at: None,
                attempt_count: 0,
            }],
            ..Default::default()
        };
        let (updated, _) = update_assets(&current, "music", 1, false);
        assert_eq!(updated.current_session_tasks.len(), 1);
    }
}
