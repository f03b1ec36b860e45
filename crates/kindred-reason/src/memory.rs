use kindred_core::{ConversationMode, UserId};
use kindred_store::{State, Store};

use crate::types::{MemoryHit, MemorySource, ResponsePlan};

const DEFAULT_SCAN_LIMIT: usize = 200;

fn top_k_for(mode: ConversationMode) -> usize {
    match mode {
        ConversationMode::Mute => 0,
        ConversationMode::Cold => 3,
        ConversationMode::Normal => 8,
    }
}

/// Seeds come only from the reasoner's declared `search_spec.query_seeds`;
/// automatic query expansion is forbidden (§4.8). With no plan, or when the
/// plan didn't ask for search, fall back to a minimum-configuration seed set
/// built from the raw text and coarse state.
fn seed_queries(state: &State, plan: Option<&ResponsePlan>, user_text: &str) -> Vec<String> {
    if let Some(plan) = plan {
        let seeds: Vec<String> = plan
            .plans
            .iter()
            .filter(|p| p.search_spec.enabled)
            .flat_map(|p| p.search_spec.query_seeds.clone())
            .collect();
        if !seeds.is_empty() {
            return seeds;
        }
    }

    let mut fallback: Vec<String> = user_text
        .split_whitespace()
        .filter(|w| w.len() >= 2)
        .take(6)
        .map(|w| w.to_string())
        .collect();
    fallback.push(state.user.current_stage.to_string());
    for (name, value) in state.user.dimensions.normalized().as_pairs() {
        if value >= 0.65 {
            fallback.push(format!("high_{name}"));
        } else if value <= 0.35 {
            fallback.push(format!("low_{name}"));
        }
    }
    for m in state.recent_messages.iter().rev().take(2) {
        fallback.extend(m.content.split_whitespace().take(4).map(|w| w.to_string()));
    }
    fallback
}

/// Memory retriever (C9): mode-gated term-match over recent transcripts and
/// notes. Returns at most `top_k_for(mode)` hits, deduplicated and sorted by
/// score descending.
pub async fn retrieve(
    store: &dyn Store,
    user_id: &UserId,
    state: &State,
    plan: Option<&ResponsePlan>,
    mode: ConversationMode,
    user_text: &str,
) -> Vec<MemoryHit> {
    let top_k = top_k_for(mode);
    if top_k == 0 {
        return Vec::new();
    }

    let seeds = seed_queries(state, plan, user_text);
    let mut hits: Vec<MemoryHit> = Vec::new();

    for seed in &seeds {
        if let Ok(found) = store
            .search_transcripts(user_id, seed, top_k, DEFAULT_SCAN_LIMIT)
            .await
        {
            hits.extend(found.into_iter().map(|h| MemoryHit {
                text: format!("{} -> {}", h.item.user_text, h.item.bot_text),
                score: h.score,
                source: MemorySource::Transcript,
            }));
        }
        if let Ok(found) = store
            .search_notes(user_id, seed, top_k, DEFAULT_SCAN_LIMIT * 2)
            .await
        {
            hits.extend(found.into_iter().map(|h| MemoryHit {
                text: h.item.content,
                score: h.score,
                source: MemorySource::Note,
            }));
        }
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let mut seen = std::collections::HashSet::new();
    hits.retain(|h| seen.insert(h.text.clone()));
    hits.truncate(top_k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_mode_skips_retrieval_entirely() {
        assert_eq!(top_k_for(ConversationMode::Mute), 0);
    }

    #[test]
    fn cold_mode_caps_at_three() {
        assert_eq!(top_k_for(ConversationMode::Cold), 3);
    }

    #[test]
    fn fallback_seeds_include_stage_and_text_tokens() {
        let state = crate::test_support::sample_state();
        let seeds = seed_queries(&state, None, "tell me about your weekend plans");
        assert!(seeds.iter().any(|s| s == "initiating"));
        assert!(seeds.iter().any(|s| s == "tell"));
    }
}
