use kindred_core::ConversationMode;

use crate::types::DetectionSignals;

/// Deterministic conversation-mode gate (C5), grounded directly in the
/// reference mode manager's threshold table. Runs after C3/C4 and before
/// the reasoner — whatever mode it returns, downstream nodes just change
/// *how* they respond, never whether a turn happens at all.
pub fn decide(signals: &DetectionSignals, busyness: f64) -> ConversationMode {
    if signals.conflict_eff >= 0.75 || signals.provocation >= 0.85 || signals.pressure >= 0.80 {
        return ConversationMode::Mute;
    }

    let worst_tone = signals.sarcasm.max(signals.contempt).max(signals.low_effort);
    if (worst_tone >= 0.60 && signals.goodwill < 0.45)
        || (signals.toxicity >= 0.55 && signals.goodwill < 0.50)
        || (signals.stage_violation >= 0.70 && signals.goodwill < 0.60)
        || (busyness >= 0.80 && signals.goodwill < 0.50)
        || signals.confusion >= 0.70
    {
        return ConversationMode::Cold;
    }

    ConversationMode::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_provocation_mutes() {
        let signals = DetectionSignals {
            provocation: 0.9,
            ..Default::default()
        };
        assert_eq!(decide(&signals, 0.1), ConversationMode::Mute);
    }

    #[test]
    fn low_goodwill_contempt_goes_cold() {
        let signals = DetectionSignals {
            contempt: 0.7,
            goodwill: 0.2,
            ..Default::default()
        };
        assert_eq!(decide(&signals, 0.1), ConversationMode::Cold);
    }

    #[test]
    fn ordinary_signals_stay_normal() {
        let signals = DetectionSignals {
            goodwill: 0.8,
            ..Default::default()
        };
        assert_eq!(decide(&signals, 0.2), ConversationMode::Normal);
    }
}
