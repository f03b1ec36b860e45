use kindred_store::{Assets, BotTask};

const MAX_SESSION_TASKS: usize = 20;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Bumps `attempt_count`/`last_attempt_at` on every session task the reply
/// plan says it attempted, drops the ones it says it completed, and caps
/// the pool at `MAX_SESSION_TASKS` by evicting the lowest-importance
/// untouched tasks first.
pub fn record_task_outcomes(assets: &Assets, attempted_ids: &[String], completed_ids: &[String]) -> Assets {
    let stamp = now_rfc3339();

    let mut tasks: Vec<BotTask> = assets
        .current_session_tasks
        .iter()
        .filter(|t| !completed_ids.iter().any(|id| id == &t.id))
        .cloned()
        .collect();

    for task in &mut tasks {
        if attempted_ids.iter().any(|id| id == &task.id) {
            task.attempt_count += 1;
            task.last_attempt_at = Some(stamp.clone());
        }
    }

    if tasks.len() > MAX_SESSION_TASKS {
        tasks.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
        tasks.truncate(MAX_SESSION_TASKS);
    }

    Assets {
        current_session_tasks: tasks,
        ..assets.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_store::TaskCategory;

    fn task(id: &str, importance: f64) -> BotTask {
        BotTask {
            id: id.to_string(),
            description: "do something".to_string(),
            category: TaskCategory::B1,
            importance,
            task_type: "ask".to_string(),
            last_attempt_at: None,
            attempt_count: 0,
        }
    }

    #[test]
    fn attempted_task_gets_bumped() {
        let assets = Assets {
            current_session_tasks: vec![task("t1", 0.5)],
            ..Default::default()
        };
        let updated = record_task_outcomes(&assets, &["t1".to_string()], &[]);
        assert_eq!(updated.current_session_tasks[0].attempt_count, 1);
        assert!(updated.current_session_tasks[0].last_attempt_at.is_some());
    }

    #[test]
    fn completed_task_is_dropped() {
        let assets = Assets {
            current_session_tasks: vec![task("t1", 0.5), task("t2", 0.5)],
            ..Default::default()
        };
        let updated = record_task_outcomes(&assets, &[], &["t1".to_string()]);
        assert_eq!(updated.current_session_tasks.len(), 1);
        assert_eq!(updated.current_session_tasks[0].id, "t2");
    }

    #[test]
    fn pool_is_capped_preferring_higher_importance() {
        let tasks: Vec<BotTask> = (0..25).map(|i| task(&format!("t{i}"), i as f64)).collect();
        let assets = Assets {
            current_session_tasks: tasks,
            ..Default::default()
        };
        let updated = record_task_outcomes(&assets, &[], &[]);
        assert_eq!(updated.current_session_tasks.len(), MAX_SESSION_TASKS);
        assert!(updated.current_session_tasks.iter().all(|t| t.importance >= 5.0));
    }
}
