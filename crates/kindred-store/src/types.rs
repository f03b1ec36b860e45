use kindred_core::{BotId, KnappStage, MessageRole, UserId};
use serde::{Deserialize, Serialize};

/// Six relationship dimensions, each in `[0,1]`. Defaults: five at `0.3`,
/// `power` at `0.5` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDimensions {
    pub closeness: f64,
    pub trust: f64,
    pub liking: f64,
    pub respect: f64,
    pub warmth: f64,
    pub power: f64,
}

impl Default for RelationshipDimensions {
    fn default() -> Self {
        Self {
            closeness: 0.3,
            trust: 0.3,
            liking: 0.3,
            respect: 0.3,
            warmth: 0.3,
            power: 0.5,
        }
    }
}

impl RelationshipDimensions {
    /// Normalize a raw stored value: values in `(1,100]` are legacy
    /// 0-100-scale and get divided by 100; everything else is clamped to
    /// `[0,1]` (§4.1, invariant 5).
    pub fn normalize_value(raw: f64) -> f64 {
        let v = if raw > 1.0 && raw <= 100.0 {
            raw / 100.0
        } else {
            raw
        };
        v.clamp(0.0, 1.0)
    }

    /// Apply `Self::normalize_value` to all six fields.
    pub fn normalized(&self) -> Self {
        Self {
            closeness: Self::normalize_value(self.closeness),
            trust: Self::normalize_value(self.trust),
            liking: Self::normalize_value(self.liking),
            respect: Self::normalize_value(self.respect),
            warmth: Self::normalize_value(self.warmth),
            power: Self::normalize_value(self.power),
        }
    }

    pub fn as_pairs(&self) -> [(&'static str, f64); 6] {
        [
            ("closeness", self.closeness),
            ("trust", self.trust),
            ("liking", self.liking),
            ("respect", self.respect),
            ("warmth", self.warmth),
            ("power", self.power),
        ]
    }

    pub fn from_pairs(pairs: [(&'static str, f64); 6]) -> Self {
        let mut out = Self::default();
        for (name, v) in pairs {
            match name {
                "closeness" => out.closeness = v,
                "trust" => out.trust = v,
                "liking" => out.liking = v,
                "respect" => out.respect = v,
                "warmth" => out.warmth = v,
                "power" => out.power = v,
                _ => {}
            }
        }
        out
    }
}

/// PAD mood model plus a conversational busyness signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoodState {
    pub pleasure: f64,
    pub arousal: f64,
    pub dominance: f64,
    pub busyness: f64,
}

impl Default for MoodState {
    fn default() -> Self {
        Self {
            pleasure: 0.0,
            arousal: 0.0,
            dominance: 0.0,
            busyness: 0.2,
        }
    }
}

/// Stage-progress tracker ("SPT depth"): how deep this pair has gone on
/// substantive topics, 1 (shallow) to 4 (deep).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SptInfo {
    pub depth: u8,
    pub previous_depth: u8,
}

impl Default for SptInfo {
    fn default() -> Self {
        Self {
            depth: 1,
            previous_depth: 1,
        }
    }
}

impl SptInfo {
    pub fn is_decreasing(&self) -> bool {
        self.depth < self.previous_depth
    }
}

/// Category of a `BotTask` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskCategory {
    B1,
    B2,
    B3,
    B4,
    B5,
    B6,
}

/// A backlog task carried on the bot (seeded into the per-user session pool)
/// or surfaced ad hoc by detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotTask {
    pub id: String,
    pub description: String,
    pub category: TaskCategory,
    pub importance: f64,
    pub task_type: String,
    pub last_attempt_at: Option<String>,
    pub attempt_count: u32,
}

/// Stable bot identity, immutable after creation except via admin flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub name: String,
    pub basic_info: serde_json::Value,
    pub big_five: [f64; 5],
    pub persona: serde_json::Value,
    pub character_sidewrite: String,
    pub backlog_tasks: Vec<BotTask>,
    pub created_at: String,
}

/// Per-(bot,user) relationship state. Created on first load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub bot_id: BotId,
    pub external_id: String,
    pub basic_info: serde_json::Value,
    pub current_stage: KnappStage,
    pub dimensions: RelationshipDimensions,
    pub mood_state: MoodState,
    pub inferred_profile: serde_json::Value,
    pub assets: Assets,
    pub spt_info: SptInfo,
    pub conversation_summary: String,
    pub created_at: String,
    pub updated_at: String,
}

/// The evolver-owned session task pool plus the monotonic relationship
/// assets (topic breadth, SPT depth high-water mark, intellectual capital)
/// tracked by the relationship updater. Unlike `RelationshipDimensions`,
/// these never regress on a bad turn — a topic covered or a depth reached
/// stays covered/reached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Assets {
    /// Bounded (cap 20) list of tasks carried across turns.
    pub current_session_tasks: Vec<BotTask>,
    #[serde(default)]
    pub topic_history: Vec<String>,
    #[serde(default)]
    pub breadth_score: usize,
    #[serde(default)]
    pub max_spt_depth: u8,
    #[serde(default)]
    pub intellectual_capital: u32,
    /// Opaque carrier for the LATS search loop's cross-turn reflection
    /// patch — `kindred-store` doesn't depend on `kindred-lats`, so this is
    /// just the serialized `ReflectionPatch`, round-tripped at that
    /// boundary.
    #[serde(default)]
    pub active_reflection_patch: Option<serde_json::Value>,
}

/// A stored chat message (§3). `meta` carries business timestamps and any
/// per-message delay/action metadata produced by the reply compiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub user_id: UserId,
    pub role: MessageRole,
    pub content: String,
    pub meta: serde_json::Value,
    pub created_at: String,
}

/// One completed turn, Store A (raw transcripts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: i64,
    pub user_id: UserId,
    pub session_id: Option<String>,
    pub thread_id: Option<String>,
    pub turn_index: Option<i64>,
    pub user_text: String,
    pub bot_text: String,
    pub entities: serde_json::Value,
    pub topic: Option<String>,
    pub importance: Option<f64>,
    pub short_context: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Fact,
    Preference,
    Activity,
    Decision,
    Other,
}

/// Store B — a derived note linked back to the transcript it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedNote {
    pub id: i64,
    pub user_id: UserId,
    pub transcript_id: i64,
    pub note_type: NoteType,
    pub content: String,
    pub importance: Option<f64>,
    pub source_pointer: String,
    pub created_at: String,
}

/// Aggregate state returned by `load_state` and consumed/mutated across the
/// whole turn pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub bot: Bot,
    pub user: User,
    /// Most recent messages, capped at 20, chronological (§4.1).
    pub recent_messages: Vec<StoredMessage>,
}

/// A single-dimension clamp audit record, logged for all six dims on every
/// `save_turn` (§4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionAudit {
    pub old: f64,
    pub new: f64,
    pub delta: f64,
}

/// Result of a scored term-match search row (`search_transcripts`/`search_notes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredHit<T> {
    pub item: T,
    pub score: f64,
}

/// Input to `append_transcript` (the id and `created_at` are assigned by the store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTranscript {
    pub user_id: UserId,
    pub session_id: Option<String>,
    pub thread_id: Option<String>,
    pub turn_index: Option<i64>,
    pub user_text: String,
    pub bot_text: String,
    pub entities: serde_json::Value,
    pub topic: Option<String>,
    pub importance: Option<f64>,
    pub short_context: Option<String>,
}

/// Input to `append_notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNote {
    pub note_type: NoteType,
    pub content: String,
    pub importance: Option<f64>,
    pub source_pointer: String,
}

/// Row counts cleared by `clear_all_memory_for`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ClearCounts {
    pub messages: usize,
    pub memories: usize,
    pub transcripts: usize,
    pub derived_notes: usize,
}
