use kindred_llm::{ChatRequest, Invoker, Message, Role};
use kindred_store::{BotTask, State};
use rand::Rng;

const UNDERSTANDING_TYPES: &[&str] = &["clarify", "ask_scope", "ask_example", "confirm_gap"];
const SYSTEMIC_MARKERS: &[&str] = &[
    "write to memory",
    "summary",
    "record",
    "database",
    "i'll remember",
];
const SESSION_POOL_CAP: usize = 20;
const MAX_DAILY_SAMPLE: usize = 2;
const BACKLOG_SEED_CAP: usize = 3;

fn daily_pool() -> Vec<BotTask> {
    vec![
        BotTask {
            id: "daily_echo".to_string(),
            description: "Pick up on something they just said, with or without a question."
                .to_string(),
            category: kindred_store::TaskCategory::B4,
            importance: 0.4,
            task_type: "daily".to_string(),
            last_attempt_at: None,
            attempt_count: 0,
        },
        BotTask {
            id: "daily_close".to_string(),
            description: "Close this turn with a line that leaves a small hook.".to_string(),
            category: kindred_store::TaskCategory::B4,
            importance: 0.4,
            task_type: "daily".to_string(),
            last_attempt_at: None,
            attempt_count: 0,
        },
    ]
}

fn is_systemic(description: &str) -> bool {
    let lower = description.to_lowercase();
    SYSTEMIC_MARKERS.iter().any(|m| lower.contains(m))
}

/// Seed the session pool from backlog only when it currently holds none, so
/// the pool doesn't grow monotonically turn over turn (§4.9).
fn seed_session_pool(backlog: &[BotTask], current_pool: &mut Vec<BotTask>) {
    let has_backlog_already = current_pool
        .iter()
        .any(|t| backlog.iter().any(|b| b.id == t.id));
    if has_backlog_already {
        return;
    }
    let mut ranked: Vec<&BotTask> = backlog.iter().collect();
    ranked.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
    for t in ranked.into_iter().take(BACKLOG_SEED_CAP) {
        current_pool.push(t.clone());
    }
    if current_pool.len() > SESSION_POOL_CAP {
        current_pool.truncate(SESSION_POOL_CAP);
    }
}

fn sample_daily(session: &[BotTask]) -> Vec<BotTask> {
    daily_pool()
        .into_iter()
        .filter(|d| !session.iter().any(|t| t.id == d.id))
        .take(MAX_DAILY_SAMPLE)
        .collect()
}

fn dedupe_understanding(pool: Vec<BotTask>) -> Vec<BotTask> {
    let mut seen_understanding = false;
    pool.into_iter()
        .filter(|t| {
            if UNDERSTANDING_TYPES.contains(&t.task_type.as_str()) {
                if seen_understanding {
                    return false;
                }
                seen_understanding = true;
            }
            true
        })
        .collect()
}

fn build_scoring_prompt(candidates: &[BotTask], user_text: &str) -> String {
    let listed: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{i}: {} (importance {:.2})", t.description, t.importance))
        .collect();
    format!(
        "Score how well each candidate task fits the current turn, on a 0-1 scale. \
         The user just said: \"{user_text}\"\n\n\
         Candidates:\n{}\n\n\
         Respond as JSON: {{\"scores\": [floats in order, one per candidate]}}",
        listed.join("\n"),
    )
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

#[derive(serde::Deserialize)]
struct ScoreResponse {
    scores: Vec<f64>,
}

async fn score_candidates(invoker: &dyn Invoker, model: &str, candidates: &[BotTask], user_text: &str) -> Vec<f64> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let req = ChatRequest::new(
        model,
        "You are a precise scorer. Respond with JSON only.",
        vec![Message {
            role: Role::User,
            content: build_scoring_prompt(candidates, user_text),
        }],
    );
    match invoker.invoke(&req).await {
        Ok(resp) => match serde_json::from_str::<ScoreResponse>(strip_code_fence(&resp.content)) {
            Ok(parsed) if parsed.scores.len() == candidates.len() => parsed.scores,
            _ => candidates.iter().map(|t| t.importance).collect(),
        },
        Err(e) => {
            tracing::warn!(err = %e, "task scoring invoker failed, falling back to importance");
            candidates.iter().map(|t| t.importance).collect()
        }
    }
}

/// Task planner (C10). Returns the tasks selected for this turn (at most 3)
/// and the session pool as it should be persisted (seeded, capped, with the
/// selected tasks' `last_attempt_at`/`attempt_count` left to the evolver).
pub async fn plan_tasks(
    invoker: &dyn Invoker,
    model: &str,
    state: &State,
    immediate_from_detection: Vec<BotTask>,
    word_budget: usize,
    user_text: &str,
) -> (Vec<BotTask>, Vec<BotTask>) {
    let mut session_pool = state.user.assets.current_session_tasks.clone();
    if word_budget == 0 {
        return (Vec::new(), session_pool);
    }

    seed_session_pool(&state.bot.backlog_tasks, &mut session_pool);

    let mut candidates: Vec<BotTask> = session_pool.clone();
    candidates.extend(sample_daily(&session_pool));
    candidates.extend(immediate_from_detection);
    candidates.retain(|t| !is_systemic(&t.description));
    candidates = dedupe_understanding(candidates);

    if candidates.is_empty() {
        return (Vec::new(), session_pool);
    }

    let scores = score_candidates(invoker, model, &candidates, user_text).await;
    let mut scored: Vec<(BotTask, f64)> = candidates.into_iter().zip(scores).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<BotTask> = scored.iter().take(2).map(|(t, _)| t.clone()).collect();

    if scored.len() > 2 {
        let remainder = &scored[2..];
        let total: f64 = remainder.iter().map(|(_, s)| s.max(0.0001)).sum();
        let mut roll = rand::thread_rng().gen_range(0.0..total);
        for (task, score) in remainder {
            roll -= score.max(0.0001);
            if roll <= 0.0 {
                selected.push(task.clone());
                break;
            }
        }
        if selected.len() < 3 {
            if let Some((task, _)) = remainder.last() {
                selected.push(task.clone());
            }
        }
    }

    selected.truncate(3);
    if session_pool.len() > SESSION_POOL_CAP {
        session_pool.truncate(SESSION_POOL_CAP);
    }
    (selected, session_pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_word_budget_skips_task_selection() {
        let state = crate::test_support::sample_state();
        let invoker = kindred_llm::fixed_response("{}");
        let (selected, _) = plan_tasks(&invoker, "model", &state, Vec::new(), 0, "hi").await;
        assert!(selected.is_empty());
    }

    #[test]
    fn systemic_descriptions_are_filtered() {
        assert!(is_systemic("write to memory that they like cats"));
        assert!(!is_systemic("ask them about their weekend"));
    }

    #[test]
    fn understanding_tasks_dedupe_to_one() {
        let pool = vec![
            BotTask {
                id: "a".into(),
                description: "clarify".into(),
                category: kindred_store::TaskCategory::B1,
                importance: 0.5,
                task_type: "clarify".into(),
                last_attempt_at: None,
                attempt_count: 0,
            },
            BotTask {
                id: "b".into(),
                description: "confirm gap".into(),
                category: kindred_store::TaskCategory::B1,
                importance: 0.5,
                task_type: "confirm_gap".into(),
                last_attempt_at: None,
                attempt_count: 0,
            },
        ];
        let deduped = dedupe_understanding(pool);
        assert_eq!(deduped.len(), 1);
    }
}
