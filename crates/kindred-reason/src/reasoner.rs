use kindred_llm::{ChatRequest, Invoker, Message, Role};
use kindred_perception::DetectionSignals;
use kindred_store::State;

use crate::types::{PlanAlternative, ResponsePlan};

/// Two plans are only worth asking for when the turn is genuinely
/// ambiguous; one clean reading is the common case (§4.6).
fn wants_two_plans(signals: &DetectionSignals, user_text: &str) -> bool {
    let multi_intent = user_text.matches('?').count() >= 2 || user_text.contains(" and ");
    signals.confusion > 0.55 || multi_intent
}

fn build_prompt(state: &State, monologue: &str, user_text: &str, two_plans: bool) -> String {
    let plan_count_instruction = if two_plans {
        "This message is ambiguous enough that you should propose exactly two alternative \
         plans, each with its own weight."
    } else {
        "Propose exactly one plan."
    };

    format!(
        "You are the cognitive core for {bot_name}. You were just handed this private read \
         on the moment:\n\"{monologue}\"\n\n\
         The user said: \"{user_text}\"\n\n\
         {plan_count_instruction}\n\n\
         For each plan, decide: what this message is really about (user_intent), the speech \
         act you'll perform (e.g. answer, empathize, tease, deflect, ask_back), core points to \
         hit, whether you need to search memory for anything (only list concrete query seeds, \
         never vague topics), and what would make the response succeed or fail.\n\n\
         Respond as JSON:\n\
         {{\"user_intent\": \"...\", \"speech_act\": \"...\", \"plans\": [{{\"id\": \"p1\", \
         \"weight\": 1.0, \"action\": \"...\", \"information_needs\": [], \"core_points\": [], \
         \"search_spec\": {{\"enabled\": false, \"query_seeds\": [], \"must_cover\": [], \
         \"optional_topics\": []}}, \"evaluation_rubric\": {{\"success_criteria\": [], \
         \"failure_modes\": [], \"quality_threshold\": 0.6}}, \"stop_conditions\": [], \
         \"fallback_conditions\": []}}]}}",
        bot_name = state.bot.name,
        monologue = if monologue.is_empty() { "(nothing in particular)" } else { monologue },
        user_text = user_text,
        plan_count_instruction = plan_count_instruction,
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

fn fallback_plan(user_text: &str) -> ResponsePlan {
    ResponsePlan {
        user_intent: "general chat".to_string(),
        speech_act: "answer".to_string(),
        plans: vec![PlanAlternative {
            id: "fallback".to_string(),
            weight: 1.0,
            action: "reply naturally and politely".to_string(),
            information_needs: Vec::new(),
            core_points: Vec::new(),
            search_spec: Default::default(),
            evaluation_rubric: Default::default(),
            stop_conditions: Vec::new(),
            fallback_conditions: vec![format!("original message: {user_text}")],
        }],
    }
}

/// Reasoner (C7): consumes the inner monologue plus state, emits a
/// structured `ResponsePlan`. Falls back to a single neutral plan on any
/// invoker or parse failure, same fail-soft posture as perception.
pub async fn reason(
    invoker: &dyn Invoker,
    model: &str,
    state: &State,
    monologue: &str,
    signals: &DetectionSignals,
    user_text: &str,
) -> ResponsePlan {
    let two_plans = wants_two_plans(signals, user_text);
    let prompt = build_prompt(state, monologue, user_text, two_plans);
    let req = ChatRequest::new(
        model,
        "You are a precise planner. Respond with JSON only.",
        vec![Message {
            role: Role::User,
            content: prompt,
        }],
    );

    let response = match invoker.invoke(&req).await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(err = %e, "reasoner invoker failed, falling back to default plan");
            return fallback_plan(user_text);
        }
    };

    match serde_json::from_str::<ResponsePlan>(strip_code_fence(&response.content)) {
        Ok(mut plan) => {
            if plan.plans.is_empty() {
                return fallback_plan(user_text);
            }
            plan.normalize_weights();
            plan
        }
        Err(e) => {
            tracing::warn!(err = %e, "reasoner response did not parse, falling back to default plan");
            fallback_plan(user_text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_llm::stub::fixed_response;

    #[tokio::test]
    async fn invoker_failure_falls_back_to_single_plan() {
        let invoker = kindred_llm::StubInvoker::new("broken", |_req| {
            Err(kindred_llm::InvokerError::Unavailable("down".into()))
        });
        let state = crate::test_support::sample_state();
        let signals = DetectionSignals::default();
        let plan = reason(&invoker, "model", &state, "", &signals, "hi there").await;
        assert_eq!(plan.plans.len(), 1);
        assert!((plan.plans[0].weight - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn valid_json_normalizes_weights() {
        let body = r#"{"user_intent":"chat","speech_act":"answer","plans":[
            {"id":"a","weight":3.0,"action":"x"},
            {"id":"b","weight":1.0,"action":"y"}
        ]}"#;
        let invoker = fixed_response(body);
        let state = crate::test_support::sample_state();
        let signals = DetectionSignals::default();
        let plan = reason(&invoker, "model", &state, "", &signals, "hi").await;
        assert_eq!(plan.plans.len(), 2);
        assert!((plan.plans[0].weight - 0.75).abs() < 1e-9);
    }
}
