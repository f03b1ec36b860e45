pub mod config;
pub mod error;
pub mod types;

pub use config::{EarlyExitThresholds, KindredConfig, LatsConfig};
pub use error::{KindredError, Result};
pub use types::{
    BotId, ConversationMode, DelayBucket, DeliveryAction, ExternalUserId, IntentCategory,
    KnappStage, MessageRole, PauseAfter, SafetyStrategy, UserId,
};
