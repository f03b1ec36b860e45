use serde::{Deserialize, Serialize};

/// Per-turn transient flags derived from comparing this turn's assets to
/// the prior turn's, consumed by the evolver as bonus triggers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssetDelta {
    pub is_new_topic: bool,
    pub is_spt_breakthrough: bool,
    pub is_intellectually_deep: bool,
}

/// Recorded stage change, `None` when the stage held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: kindred_core::KnappStage,
    pub to: kindred_core::KnappStage,
}
