use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a bot (persona). UUIDv7 — time-sortable for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotId(pub String);

impl BotId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BotId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Stable identity of a user, scoped to a bot by `(bot_id, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The external-facing identifier a caller supplies for a user (opaque to us,
/// unique only in combination with a `BotId`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalUserId(pub String);

impl ExternalUserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExternalUserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Knapp's ten-stage relational development model. Default `Initiating`.
///
/// Ordered roughly by increasing closeness for `Growth` stages and decreasing
/// for `Decay` stages; the stage manager (kindred-relationship) owns the
/// transition table, this is just the tagged-variant enum it operates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KnappStage {
    #[default]
    Initiating,
    Experimenting,
    Intensifying,
    Integrating,
    Bonding,
    Differentiating,
    Circumscribing,
    Stagnating,
    Avoiding,
    Terminating,
}

impl fmt::Display for KnappStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KnappStage::Initiating => "initiating",
            KnappStage::Experimenting => "experimenting",
            KnappStage::Intensifying => "intensifying",
            KnappStage::Integrating => "integrating",
            KnappStage::Bonding => "bonding",
            KnappStage::Differentiating => "differentiating",
            KnappStage::Circumscribing => "circumscribing",
            KnappStage::Stagnating => "stagnating",
            KnappStage::Avoiding => "avoiding",
            KnappStage::Terminating => "terminating",
        };
        write!(f, "{}", s)
    }
}

/// Role of a message sender, mirrors `messages.role` in the persisted schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
    System,
}

impl MessageRole {
    /// Tiebreak ordinal used so `user` sorts before `ai` at identical timestamps.
    pub fn order(&self) -> i32 {
        match self {
            MessageRole::User => 0,
            MessageRole::Ai => 1,
            MessageRole::System => 2,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Ai => write!(f, "ai"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "ai" => Ok(MessageRole::Ai),
            "system" => Ok(MessageRole::System),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

/// Delay bucket for a single compiled message (reply compiler, §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DelayBucket {
    Instant,
    #[default]
    Short,
    Medium,
    Long,
    Offline,
}

impl DelayBucket {
    pub fn base_seconds(&self) -> f64 {
        match self {
            DelayBucket::Instant => 0.2,
            DelayBucket::Short => 0.6,
            DelayBucket::Medium => 1.2,
            DelayBucket::Long => 2.5,
            DelayBucket::Offline => 900.0,
        }
    }
}

/// Pause bonus after a message (reply compiler, §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PauseAfter {
    #[default]
    None,
    Beat,
    Polite,
    Thinking,
    Long,
}

impl PauseAfter {
    pub fn bonus_seconds(&self) -> f64 {
        match self {
            PauseAfter::None => 0.0,
            PauseAfter::Beat => 0.3,
            PauseAfter::Polite => 0.6,
            PauseAfter::Thinking => 1.0,
            PauseAfter::Long => 3.0,
        }
    }
}

/// Delivery action for a compiled message (idle while "offline", else typing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryAction {
    Typing,
    Idle,
}

impl fmt::Display for DeliveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryAction::Typing => write!(f, "typing"),
            DeliveryAction::Idle => write!(f, "idle"),
        }
    }
}

/// Conversation mode, the output of the mode manager (C5, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    Normal,
    Cold,
    Mute,
}

/// 5-way intent category from the intent detector (C4, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentCategory {
    Normal,
    Creepy,
    Ky,
    Boring,
    Crazy,
}

/// One of the five canned safety-responder strategies (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStrategy {
    QuestionMarks,
    QuestionAi,
    QuestionUser,
    QuestionRole,
    Neutral,
}
