use std::collections::HashMap;

use kindred_core::{DelayBucket, DeliveryAction, PauseAfter};
use serde::{Deserialize, Serialize};

/// One message inside a `ReplyPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub id: String,
    pub function: String,
    pub content: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub target_length: usize,
    #[serde(default = "default_info_density")]
    pub info_density: String,
    #[serde(default)]
    pub pause_after: PauseAfter,
    #[serde(default)]
    pub delay_bucket: DelayBucket,
}

fn default_info_density() -> String {
    "medium".to_string()
}

/// Reply planner output (C12): a segmented, pacing-aware multi-message plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPlan {
    pub intent: String,
    pub speech_act: String,
    pub stakes: String,
    pub first_message_role: String,
    pub pacing_strategy: String,
    pub messages_count: usize,
    pub messages: Vec<ReplyMessage>,
    #[serde(default)]
    pub must_cover_map: HashMap<String, String>,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub strategy_tag: Option<String>,
    #[serde(default)]
    pub attempted_task_ids: Vec<String>,
    #[serde(default)]
    pub completed_task_ids: Vec<String>,
}

impl ReplyPlan {
    /// Repairs the invariant `messages_count == messages.len()` after any
    /// mutation (truncation, merge) — never trust an LLM-reported count.
    pub fn fix_count(&mut self) {
        self.messages_count = self.messages.len();
    }

    pub fn plain_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Deterministic compilation target (C15): what actually gets sent, with
/// per-message delay and typing/idle action. Arrays are always equal length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorPlan {
    pub messages: Vec<String>,
    pub delays: Vec<f64>,
    pub actions: Vec<DeliveryAction>,
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedCheck {
    pub id: String,
    pub reason: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmStatus {
    #[default]
    Skipped,
    Ok,
    Timeout,
    ParseError,
}

/// Evaluator output (C14): the hard-gate/soft-score verdict for one
/// `ProcessorPlan`, consumed by the search loop and the final validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimReport {
    pub found_solution: bool,
    pub eval_score: f64,
    pub failed_checks: Vec<FailedCheck>,
    pub score_breakdown: serde_json::Value,
    pub improvement_notes: Vec<String>,
    pub llm_status: LlmStatus,
    pub llm_details: serde_json::Value,
}

/// A rollout-carried correction, applied to future variant generation within
/// the same turn's search. Expires after `ttl_turns` turns (§ reflection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionPatch {
    pub guidance: String,
    pub add_search_seeds: Vec<String>,
    pub remove_search_seeds: Vec<String>,
    pub ttl_turns: u32,
}

impl ReflectionPatch {
    pub fn expired(&self) -> bool {
        self.ttl_turns == 0
    }

    pub fn age_one_turn(&mut self) {
        self.ttl_turns = self.ttl_turns.saturating_sub(1);
    }
}
