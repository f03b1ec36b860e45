use kindred_llm::Invoker;

/// The model id to pass on every `ChatRequest` for a given role, decoupled
/// from which concrete invoker backs it (the caller may point `fast` and
/// `main` at the same invoker and just vary the model string).
#[derive(Debug, Clone)]
pub struct ModelIds {
    pub main: String,
    pub fast: String,
    pub judge: String,
}

/// Everything `handle_turn` needs from the outside world for one turn.
/// Borrowed, not owned — the caller is expected to hold these across many
/// turns (connection-pooled store, long-lived invokers).
pub struct TurnDeps<'a> {
    pub store: &'a dyn kindred_store::Store,
    pub main_invoker: &'a dyn Invoker,
    pub fast_invoker: &'a dyn Invoker,
    /// `None` disables the LATS LLM soft-scorer; heuristic scoring still runs.
    pub judge_invoker: Option<&'a dyn Invoker>,
    pub models: ModelIds,
    /// LATS search budget/gating, loaded from `kindred.toml`/`LATS_*` env
    /// overrides (§6 backpressure) and threaded straight into `SearchConfig`.
    pub lats: kindred_core::LatsConfig,
}

/// The `handle_turn` result: the final text, its segmented delivery, and
/// timing/action hints for the caller to actually send it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnOutcome {
    pub final_response: String,
    pub final_segments: Vec<String>,
    pub delays: Vec<f64>,
    pub actions: Vec<kindred_core::DeliveryAction>,
    pub meta: serde_json::Value,
}
