use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (kindred.toml + KINDRED_* env overrides, plus the
/// documented bare-named LATS_*/TURN_TIMEOUT/ADMIN_TOKEN overrides that are
/// the pipeline's own public configuration surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindredConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub lats: LatsConfig,
    /// Per-turn wall clock budget. `TURN_TIMEOUT` env var overrides this.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: f64,
    /// Enables the admin-gated log endpoint, if a transport layer exists.
    /// `ADMIN_TOKEN` env var overrides this.
    pub admin_token: Option<String>,
}

impl Default for KindredConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            lats: LatsConfig::default(),
            turn_timeout_secs: default_turn_timeout_secs(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path. Falls back to a filesystem store rooted at the
    /// parent directory if the database cannot be opened (§4.1 Errors).
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Early-exit thresholds for LATS root-level termination (§4.14, §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EarlyExitThresholds {
    pub root_score: f64,
    pub plan_alignment_min: f64,
    pub assistantiness_max: f64,
    pub mode_fit_min: f64,
}

impl Default for EarlyExitThresholds {
    fn default() -> Self {
        Self {
            root_score: 0.85,
            plan_alignment_min: 0.6,
            assistantiness_max: 0.3,
            mode_fit_min: 0.5,
        }
    }
}

/// LATS search budget and gating configuration (§5, §6).
///
/// `rollouts`/`expand_k` are `None` by default so that stage-aware defaults
/// (owned by `kindred-lats`, which knows the per-stage table) apply; setting
/// `LATS_ROLLOUTS`/`LATS_EXPAND_K` pins a single value for every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatsConfig {
    pub rollouts: Option<u32>,
    pub expand_k: Option<u32>,
    #[serde(default)]
    pub disable_early_exit: bool,
    #[serde(default = "default_min_rollouts_before_early_exit")]
    pub min_rollouts_before_early_exit: u32,
    #[serde(default = "default_llm_soft_top_n")]
    pub llm_soft_top_n: u32,
    #[serde(default = "default_llm_soft_max_concurrency")]
    pub llm_soft_max_concurrency: usize,
    #[serde(default)]
    pub early_exit: EarlyExitThresholds,
    #[serde(default = "default_patch_ttl_turns")]
    pub patch_ttl_turns: u32,
    #[serde(default)]
    pub skip_low_risk: bool,
}

impl Default for LatsConfig {
    fn default() -> Self {
        Self {
            rollouts: None,
            expand_k: None,
            disable_early_exit: false,
            min_rollouts_before_early_exit: default_min_rollouts_before_early_exit(),
            llm_soft_top_n: default_llm_soft_top_n(),
            llm_soft_max_concurrency: default_llm_soft_max_concurrency(),
            early_exit: EarlyExitThresholds::default(),
            patch_ttl_turns: default_patch_ttl_turns(),
            skip_low_risk: false,
        }
    }
}

fn default_turn_timeout_secs() -> f64 {
    180.0
}
fn default_min_rollouts_before_early_exit() -> u32 {
    1
}
fn default_llm_soft_top_n() -> u32 {
    1
}
fn default_llm_soft_max_concurrency() -> usize {
    2
}
fn default_patch_ttl_turns() -> u32 {
    3
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kindred/kindred.db", home)
}
fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.kindred/kindred.toml", home)
}

impl KindredConfig {
    /// Load config from a TOML file, `KINDRED_*`-prefixed env overrides for
    /// the general surface, then the pipeline's own bare-named env vars
    /// (`LATS_*`, `TURN_TIMEOUT`, `ADMIN_TOKEN`) which are documented as a
    /// public surface and therefore not re-prefixed.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let mut config: KindredConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("KINDRED_").split("_"))
            .extract()
            .map_err(|e| crate::error::KindredError::Config(e.to_string()))?;

        config.apply_bare_env_overrides();
        Ok(config)
    }

    fn apply_bare_env_overrides(&mut self) {
        if let Some(v) = env_u32("LATS_ROLLOUTS") {
            self.lats.rollouts = Some(v);
        }
        if let Some(v) = env_u32("LATS_EXPAND_K") {
            self.lats.expand_k = Some(v);
        }
        if let Some(v) = env_bool("LATS_DISABLE_EARLY_EXIT") {
            self.lats.disable_early_exit = v;
        }
        if let Some(v) = env_u32("LATS_MIN_ROLLOUTS_BEFORE_EARLY_EXIT") {
            self.lats.min_rollouts_before_early_exit = v;
        }
        if let Some(v) = env_u32("LATS_LLM_SOFT_TOP_N") {
            self.lats.llm_soft_top_n = v;
        }
        if let Some(v) = env_u32("LATS_LLM_SOFT_MAX_CONCURRENCY") {
            self.lats.llm_soft_max_concurrency = v as usize;
        }
        if let Some(v) = env_f64("LATS_EARLY_EXIT_ROOT_SCORE") {
            self.lats.early_exit.root_score = v;
        }
        if let Some(v) = env_f64("LATS_EARLY_EXIT_PLAN_ALIGNMENT_MIN") {
            self.lats.early_exit.plan_alignment_min = v;
        }
        if let Some(v) = env_f64("LATS_EARLY_EXIT_ASSISTANTINESS_MAX") {
            self.lats.early_exit.assistantiness_max = v;
        }
        if let Some(v) = env_f64("LATS_EARLY_EXIT_MODE_FIT_MIN") {
            self.lats.early_exit.mode_fit_min = v;
        }
        if let Some(v) = env_u32("LATS_PATCH_TTL_TURNS") {
            self.lats.patch_ttl_turns = v;
        }
        if let Some(v) = env_bool("LATS_SKIP_LOW_RISK") {
            self.lats.skip_low_risk = v;
        }
        if let Some(v) = env_f64("TURN_TIMEOUT") {
            self.turn_timeout_secs = v;
        }
        if let Ok(v) = std::env::var("ADMIN_TOKEN") {
            self.admin_token = Some(v);
        }
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
