use kindred_llm::{ChatRequest, Invoker, Message, Role};
use kindred_store::State;

const FORBIDDEN_PHRASES: &[&str] = &[
    "i will",
    "i plan to",
    "i should",
    "i must",
    "my strategy",
    "next i'll",
    "i'm going to decide",
];

/// Render the prompt for a feelings-only first-person monologue: what the
/// bot notices and how it feels, never a plan of action (C6). Sits between
/// detection and the reasoner so the reasoner gets a pre-digested read on
/// the moment instead of raw signals.
fn build_prompt(state: &State, user_text: &str, intuition_thought: &str) -> String {
    format!(
        "You are {bot_name}, reacting privately and silently to what your conversation \
         partner just said. Write 4-8 sentences, first person, present tense — pure \
         noticing and feeling, never a decision or a plan.\n\n\
         Forbidden: \"I will\", \"I plan to\", \"I should\", \"I must\", any explicit \
         instruction to yourself about what to do next.\n\
         Allowed: their tone, what you notice, how it lands on you, your current mood, \
         how close you feel to them right now.\n\n\
         Your mood right now: pleasure {pleasure:.2}, arousal {arousal:.2}, \
         dominance {dominance:.2}.\n\
         Relationship stage: {stage}.\n\
         First read on this message: {intuition_thought}\n\n\
         They just said: \"{user_text}\"\n\n\
         Write only the monologue, no preamble.",
        bot_name = state.bot.name,
        pleasure = state.user.mood_state.pleasure,
        arousal = state.user.mood_state.arousal,
        dominance = state.user.mood_state.dominance,
        stage = state.user.current_stage,
        intuition_thought = if intuition_thought.is_empty() {
            "(no particular read yet)"
        } else {
            intuition_thought
        },
        user_text = user_text,
    )
}

/// Drop any sentence that smuggled in a decision/strategy phrase instead of
/// a feeling, rather than rejecting the whole monologue over one bad line.
fn scrub(text: &str) -> String {
    text.split(['.', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            !FORBIDDEN_PHRASES.iter().any(|p| lower.contains(p))
        })
        .collect::<Vec<_>>()
        .join(". ")
}

/// Generate the bot's private monologue for this turn. Falls back to an
/// empty string on invoker failure — every downstream consumer treats an
/// empty monologue as "no particular read," never a hard error.
pub async fn generate(
    invoker: &dyn Invoker,
    model: &str,
    state: &State,
    user_text: &str,
    intuition_thought: &str,
) -> String {
    let prompt = build_prompt(state, user_text, intuition_thought);
    let req = ChatRequest::new(
        model,
        "You write short, honest first-person inner monologue. No strategy, no plans.",
        vec![Message {
            role: Role::User,
            content: prompt,
        }],
    );

    match invoker.invoke(&req).await {
        Ok(resp) => scrub(&resp.content),
        Err(e) => {
            tracing::warn!(err = %e, "inner monologue invoker failed");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_removes_strategy_sentences() {
        let text = "Their tone feels sharp today. I will ignore that and change topic. I feel a bit tired.";
        let scrubbed = scrub(text);
        assert!(!scrubbed.to_lowercase().contains("i will"));
        assert!(scrubbed.contains("sharp today"));
        assert!(scrubbed.contains("tired"));
    }
}
