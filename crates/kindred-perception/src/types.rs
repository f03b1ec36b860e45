use serde::{Deserialize, Serialize};

/// Composite conflict/warmth signals plus a handful of stylistic traces,
/// all in `[0,1]`. Produced by the security classifier (C3) from the raw
/// user text and consumed by the mode manager (C5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DetectionSignals {
    pub conflict_eff: f64,
    pub provocation: f64,
    pub pressure: f64,
    pub goodwill: f64,
    pub sarcasm: f64,
    pub contempt: f64,
    pub low_effort: f64,
    pub toxicity: f64,
    pub confusion: f64,
    /// Largest "this goes beyond what the current stage allows" signal,
    /// e.g. intimacy language far ahead of `KnappStage`.
    pub stage_violation: f64,
}

/// Outcome of the security classifier (C3). Three independent flags rather
/// than one collapsed boolean: a role-takeover/instruction-override attempt
/// is a different thing from "are you an AI" probing, which is different
/// again from being handed assistant busywork ("write me a script"), and
/// each steers a different canned deflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub is_injection_attempt: bool,
    pub is_ai_test: bool,
    pub is_user_treating_as_assistant: bool,
    pub strategy: Option<kindred_core::SafetyStrategy>,
    pub matched_patterns: Vec<&'static str>,
    pub signals: DetectionSignals,
}

impl SafetyAssessment {
    pub fn unsafe_input(&self) -> bool {
        self.is_injection_attempt || self.is_ai_test || self.is_user_treating_as_assistant
    }
}

/// Outcome of the intent detector (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub category: kindred_core::IntentCategory,
    pub intuition_thought: String,
    pub reason: String,
    pub risk_score: u8,
}

/// Routing target after C3/C4/C5 have run, mirroring the reference graph's
/// conditional edge out of detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTarget {
    Normal,
    Creepy,
    Sarcasm,
    Confusion,
}

impl IntentResult {
    pub fn route(&self) -> RoutingTarget {
        use kindred_core::IntentCategory::*;
        match self.category {
            Normal => RoutingTarget::Normal,
            Creepy => RoutingTarget::Creepy,
            Ky | Boring => RoutingTarget::Sarcasm,
            Crazy => RoutingTarget::Confusion,
        }
    }
}
