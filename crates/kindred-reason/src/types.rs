use kindred_core::KnappStage;
use serde::{Deserialize, Serialize};

/// What the reasoner wants the retriever and planner to go look for, scoped
/// tightly: only these seeds may be used, no automatic query expansion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub query_seeds: Vec<String>,
    #[serde(default)]
    pub must_cover: Vec<String>,
    #[serde(default)]
    pub optional_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationRubric {
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_modes: Vec<String>,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
}

fn default_quality_threshold() -> f64 {
    0.6
}

/// One candidate reading of the user's message and how to respond to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanAlternative {
    pub id: String,
    pub weight: f64,
    pub action: String,
    #[serde(default)]
    pub information_needs: Vec<String>,
    #[serde(default)]
    pub core_points: Vec<String>,
    #[serde(default)]
    pub search_spec: SearchSpec,
    #[serde(default)]
    pub evaluation_rubric: EvaluationRubric,
    #[serde(default)]
    pub stop_conditions: Vec<String>,
    #[serde(default)]
    pub fallback_conditions: Vec<String>,
}

/// Reasoner output (C7): one or two alternative readings of the turn, with
/// weights normalized to sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePlan {
    pub user_intent: String,
    pub speech_act: String,
    pub plans: Vec<PlanAlternative>,
}

impl ResponsePlan {
    /// The highest-weighted alternative; `plans` is never empty in a
    /// well-formed plan (callers that hit the fallback path construct one).
    pub fn primary(&self) -> &PlanAlternative {
        self.plans
            .iter()
            .max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal))
            .expect("response plan always carries at least one alternative")
    }

    pub fn normalize_weights(&mut self) {
        let total: f64 = self.plans.iter().map(|p| p.weight).sum();
        if total > 0.0 {
            for p in &mut self.plans {
                p.weight /= total;
            }
        } else if !self.plans.is_empty() {
            let even = 1.0 / self.plans.len() as f64;
            for p in &mut self.plans {
                p.weight = even;
            }
        }
    }
}

/// Style mixer output (C8): twelve dials in `[0,1]` the planner and
/// evaluator treat as targets, not literal wording constraints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StyleTargets {
    pub verbal_length: f64,
    pub social_distance: f64,
    pub tone_temperature: f64,
    pub emotional_display: f64,
    pub wit_and_humor: f64,
    pub non_verbal_cues: f64,
    pub self_disclosure: f64,
    pub topic_adherence: f64,
    pub initiative: f64,
    pub advice_style: f64,
    pub subjectivity: f64,
    pub memory_hook: f64,
}

impl Default for StyleTargets {
    fn default() -> Self {
        Self {
            verbal_length: 0.5,
            social_distance: 0.5,
            tone_temperature: 0.5,
            emotional_display: 0.5,
            wit_and_humor: 0.5,
            non_verbal_cues: 0.5,
            self_disclosure: 0.5,
            topic_adherence: 0.5,
            initiative: 0.5,
            advice_style: 0.5,
            subjectivity: 0.5,
            memory_hook: 0.5,
        }
    }
}

/// A retrieved transcript/note hit, flattened for the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub text: String,
    pub score: f64,
    pub source: MemorySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    Transcript,
    Note,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanGoals {
    pub must_cover_points: Vec<String>,
    pub avoid_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTargets {
    pub stage: KnappStage,
    pub pacing_notes: Vec<String>,
    pub violation_sensitivity: f64,
    pub allowed_acts: Vec<String>,
    pub forbidden_acts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MustHavePolicy {
    None,
    Soft,
}

/// Fused output of the requirements compiler (C11): the single checklist the
/// reply planner, LATS evaluator, and final validator all read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementsChecklist {
    pub must_have: Vec<String>,
    pub forbidden: Vec<String>,
    pub safety_notes: Vec<String>,
    pub mode_critic_criteria: Vec<String>,
    pub first_message_rule: String,
    pub max_messages: usize,
    pub min_first_len: usize,
    pub max_message_len: usize,
    pub stage_pacing_notes: Vec<String>,
    pub must_have_policy: MustHavePolicy,
    pub must_have_min_coverage: f64,
    pub allow_short_reply: bool,
    pub allow_empty_reply: bool,
    pub plan_goals: PlanGoals,
    pub style_targets: StyleTargets,
    pub stage_targets: StageTargets,
    pub mode_behavior_targets: Vec<String>,
    pub tasks_for_lats: Vec<String>,
    pub task_budget_max: usize,
    pub word_budget: usize,
    pub user_asks_advice: bool,
    pub latest_user_text: String,
}
