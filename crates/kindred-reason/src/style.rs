use kindred_llm::{ChatRequest, Invoker, Message, Role};
use kindred_store::RelationshipDimensions;

use crate::types::StyleTargets;

fn build_prompt(dims: &RelationshipDimensions, speech_act: &str) -> String {
    let d = dims.normalized();
    format!(
        "Translate these relationship dimensions (0=low, 1=high) and the current speech act \
         into twelve style dials, each a float in [0,1].\n\n\
         closeness={closeness:.2} trust={trust:.2} liking={liking:.2} respect={respect:.2} \
         warmth={warmth:.2} power={power:.2}\n\
         speech_act={speech_act}\n\n\
         Dials: verbal_length, social_distance, tone_temperature, emotional_display, \
         wit_and_humor, non_verbal_cues, self_disclosure, topic_adherence, initiative, \
         advice_style, subjectivity, memory_hook.\n\n\
         Guidance: closeness+warmth drive verbal_length and non_verbal_cues up; low trust \
         pulls self_disclosure and emotional_display down; liking+warmth drive \
         tone_temperature up; power drives initiative and advice_style up and social_distance \
         down when closeness is also high; respect drives topic_adherence up.\n\n\
         Respond as JSON with exactly these twelve keys, each mapped to a float in [0,1].",
        closeness = d.closeness,
        trust = d.trust,
        liking = d.liking,
        respect = d.respect,
        warmth = d.warmth,
        power = d.power,
        speech_act = speech_act,
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

fn clamp01(targets: &mut StyleTargets) {
    targets.verbal_length = targets.verbal_length.clamp(0.0, 1.0);
    targets.social_distance = targets.social_distance.clamp(0.0, 1.0);
    targets.tone_temperature = targets.tone_temperature.clamp(0.0, 1.0);
    targets.emotional_display = targets.emotional_display.clamp(0.0, 1.0);
    targets.wit_and_humor = targets.wit_and_humor.clamp(0.0, 1.0);
    targets.non_verbal_cues = targets.non_verbal_cues.clamp(0.0, 1.0);
    targets.self_disclosure = targets.self_disclosure.clamp(0.0, 1.0);
    targets.topic_adherence = targets.topic_adherence.clamp(0.0, 1.0);
    targets.initiative = targets.initiative.clamp(0.0, 1.0);
    targets.advice_style = targets.advice_style.clamp(0.0, 1.0);
    targets.subjectivity = targets.subjectivity.clamp(0.0, 1.0);
    targets.memory_hook = targets.memory_hook.clamp(0.0, 1.0);
}

/// Style mixer (C8): maps the six relationship dimensions plus the
/// reasoner's speech act onto a twelve-dial style target. On any invoker or
/// parse failure, falls back to the neutral all-0.5 vector (§8).
pub async fn mix(
    invoker: &dyn Invoker,
    model: &str,
    dims: &RelationshipDimensions,
    speech_act: &str,
) -> StyleTargets {
    let prompt = build_prompt(dims, speech_act);
    let req = ChatRequest::new(
        model,
        "You are a precise style-parameter mixer. Respond with JSON only.",
        vec![Message {
            role: Role::User,
            content: prompt,
        }],
    );

    let response = match invoker.invoke(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(err = %e, "style mixer invoker failed, using neutral style");
            return StyleTargets::default();
        }
    };

    match serde_json::from_str::<StyleTargets>(strip_code_fence(&response.content)) {
        Ok(mut targets) => {
            clamp01(&mut targets);
            targets
        }
        Err(e) => {
            tracing::warn!(err = %e, "style mixer response did not parse, using neutral style");
            StyleTargets::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoker_failure_gives_neutral_style() {
        let invoker = kindred_llm::StubInvoker::new("broken", |_req| {
            Err(kindred_llm::InvokerError::Unavailable("down".into()))
        });
        let dims = RelationshipDimensions::default();
        let targets = mix(&invoker, "model", &dims, "answer").await;
        assert!((targets.verbal_length - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn out_of_range_values_are_clamped() {
        let body = r#"{"verbal_length":1.4,"social_distance":-0.2,"tone_temperature":0.5,
            "emotional_display":0.5,"wit_and_humor":0.5,"non_verbal_cues":0.5,
            "self_disclosure":0.5,"topic_adherence":0.5,"initiative":0.5,
            "advice_style":0.5,"subjectivity":0.5,"memory_hook":0.5}"#;
        let invoker = kindred_llm::fixed_response(body);
        let dims = RelationshipDimensions::default();
        let targets = mix(&invoker, "model", &dims, "answer").await;
        assert_eq!(targets.verbal_length, 1.0);
        assert_eq!(targets.social_distance, 0.0);
    }
}
