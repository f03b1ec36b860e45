use std::collections::HashMap;

use crate::types::{FailedCheck, ReflectionPatch, SimReport};

/// Turns the top few failed checks into concrete, actionable instructions
/// rather than restating "you were wrong" — each hint is something the next
/// generation pass can directly act on.
pub fn failures_to_actionable_hints(failed_checks: &[FailedCheck], improvement_notes: &[String], top_k: usize) -> String {
    let mut hints: Vec<String> = Vec::new();
    let mut push = |s: String| {
        if !s.is_empty() && !hints.contains(&s) {
            hints.push(s);
        }
    };

    for f in failed_checks.iter().take(top_k.max(1)) {
        match f.id.as_str() {
            "first_too_short" => push(
                "the first message must directly answer or take a stance on what the user said, not just warm up."
                    .to_string(),
            ),
            "too_many_messages" => push(
                "keep the message count within the limit; merge adjacent fragments instead of splitting further."
                    .to_string(),
            ),
            "message_too_long" => push(
                "keep each message under the length limit; lead with the stance, then add detail in a second message."
                    .to_string(),
            ),
            "empty_message" => push("never emit an empty message; every message must be a complete thought.".to_string()),
            "forbidden_term" | "assistant_like_response" => {
                push("drop any phrasing that reads like an AI assistant or customer service script.".to_string())
            }
            "unsolicited_advice" => push(
                "do not offer advice or a how-to unless the user explicitly asked for it.".to_string(),
            ),
            _ => {
                if !f.reason.is_empty() {
                    push(format!("avoid triggering this failure again: {}", f.reason));
                }
            }
        }
    }

    for note in improvement_notes.iter().take(2) {
        if !note.is_empty() {
            push(format!("improvement note: {note}"));
        }
    }

    hints.into_iter().map(|h| format!("- {h}")).collect::<Vec<_>>().join("\n")
}

/// Tallies failure ids across recent rollout reports (rolling window
/// supplied by the caller) so the search loop can detect a pattern instead
/// of reacting to a single unlucky sample.
pub fn count_failures<'a>(reports: impl Iterator<Item = &'a SimReport>) -> HashMap<String, u32> {
    let mut counter = HashMap::new();
    for report in reports {
        for f in &report.failed_checks {
            *counter.entry(f.id.clone()).or_insert(0) += 1;
        }
    }
    counter
}

/// A failure id repeating at least `min_count` times across the recent
/// window is considered a pattern worth patching against.
pub fn repeated_failures(counter: &HashMap<String, u32>, min_count: u32) -> Vec<(String, u32)> {
    let mut items: Vec<(String, u32)> = counter
        .iter()
        .filter(|(_, &count)| count >= min_count)
        .map(|(id, &count)| (id.clone(), count))
        .collect();
    items.sort_by(|a, b| b.1.cmp(&a.1));
    items.truncate(2);
    items
}

/// Builds a `ReflectionPatch` from a detected repeated-failure pattern. No
/// LLM call: the hints are a deterministic lookup, same as
/// `failures_to_actionable_hints`, just keyed by failure id instead of a
/// fresh `SimReport`.
pub fn build_reflection_patch(repeated: &[(String, u32)], ttl_turns: u32) -> Option<ReflectionPatch> {
    if repeated.is_empty() {
        return None;
    }
    let synthetic: Vec<FailedCheck> = repeated
        .iter()
        .map(|(id, _)| FailedCheck {
            id: id.clone(),
            reason: String::new(),
            evidence: String::new(),
        })
        .collect();
    let guidance = failures_to_actionable_hints(&synthetic, &[], synthetic.len());
    if guidance.is_empty() {
        return None;
    }
    Some(ReflectionPatch {
        guidance,
        add_search_seeds: Vec::new(),
        remove_search_seeds: Vec::new(),
        ttl_turns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_too_short_maps_to_concrete_hint() {
        let fails = vec![FailedCheck {
            id: "first_too_short".to_string(),
            reason: "too short".to_string(),
            evidence: String::new(),
        }];
        let hint = failures_to_actionable_hints(&fails, &[], 2);
        assert!(hint.contains("directly answer"));
    }

    #[test]
    fn repeated_failures_requires_min_count() {
        let mut counter = HashMap::new();
        counter.insert("too_many_messages".to_string(), 2);
        counter.insert("forbidden_term".to_string(), 1);
        let repeated = repeated_failures(&counter, 2);
        assert_eq!(repeated.len(), 1);
        assert_eq!(repeated[0].0, "too_many_messages");
    }

    #[test]
    fn patch_expires_after_ttl_turns() {
        let mut patch = ReflectionPatch {
            guidance: "x".to_string(),
            add_search_seeds: Vec::new(),
            remove_search_seeds: Vec::new(),
            ttl_turns: 1,
        };
        assert!(!patch.expired());
        patch.age_one_turn();
        assert!(patch.expired());
    }
}
