use kindred_perception::DetectionSignals;
use kindred_store::{DimensionAudit, MoodState, RelationshipDimensions};

use crate::types::AssetDelta;

const BETA_PLEASURE: f64 = 0.18;
const BETA_AROUSAL: f64 = 0.12;
const BETA_DOMINANCE: f64 = 0.15;

/// Raw per-dimension nudges before clamping, in the same `[-1,1]`-ish scale
/// as `RelationshipDimensions`. Positive is growth, negative is decay.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionNudge {
    pub closeness: f64,
    pub trust: f64,
    pub liking: f64,
    pub respect: f64,
    pub warmth: f64,
    pub power: f64,
}

/// Computes the six dimension nudges for this turn from the conflict/warmth
/// signals and the monotonic-asset bonuses, then applies and clamps them
/// (C18). Mirrors the reference updater's per-dimension reward/penalty shape:
/// goodwill and new-ground bonuses push dimensions up, conflict/contempt push
/// them down, with `liking`/`respect` the most sensitive to contempt and
/// `closeness` the most sensitive to raw conflict.
pub fn dimension_nudges(signals: &DetectionSignals, assets: &AssetDelta) -> DimensionNudge {
    let bonus = 0.02 * f64::from(assets.is_new_topic)
        + 0.03 * f64::from(assets.is_spt_breakthrough)
        + 0.02 * f64::from(assets.is_intellectually_deep);

    DimensionNudge {
        closeness: bonus + 0.05 * signals.goodwill - 0.08 * signals.conflict_eff,
        trust: bonus * 0.5 + 0.04 * signals.goodwill - 0.10 * signals.provocation - 0.05 * signals.sarcasm,
        liking: bonus * 0.5 + 0.05 * signals.goodwill - 0.12 * signals.contempt,
        respect: bonus * 0.25 - 0.10 * signals.contempt - 0.04 * signals.low_effort,
        warmth: bonus * 0.5 + 0.05 * signals.goodwill - 0.06 * signals.pressure,
        power: 0.02 * signals.pressure - 0.02 * signals.provocation,
    }
}

/// Applies nudges to the current dimensions, clamping each to `[0,1]` and
/// recording a before/after/delta audit row per dimension, in fixed
/// `closeness, trust, liking, respect, warmth, power` order.
pub fn apply_nudges(
    current: &RelationshipDimensions,
    nudge: DimensionNudge,
) -> (RelationshipDimensions, [DimensionAudit; 6]) {
    let pairs = [
        (current.closeness, nudge.closeness),
        (current.trust, nudge.trust),
        (current.liking, nudge.liking),
        (current.respect, nudge.respect),
        (current.warmth, nudge.warmth),
        (current.power, nudge.power),
    ];

    let mut audits = [DimensionAudit { old: 0.0, new: 0.0, delta: 0.0 }; 6];
    let mut out = [0.0_f64; 6];
    for (i, (old, delta)) in pairs.into_iter().enumerate() {
        let new = (old + delta).clamp(0.0, 1.0);
        audits[i] = DimensionAudit {
            old,
            new,
            delta: new - old,
        };
        out[i] = new;
    }

    let updated = RelationshipDimensions {
        closeness: out[0],
        trust: out[1],
        liking: out[2],
        respect: out[3],
        warmth: out[4],
        power: out[5],
    };
    (updated, audits)
}

/// Reactivity gate for mood regression: how strongly this turn's target mood
/// pulls current mood toward it. Conflict and stage-boundary pressure both
/// widen the gate (a turn that provokes or oversteps moves mood faster than
/// a quiet one).
fn reactivity(signals: &DetectionSignals) -> f64 {
    (0.6 + 0.6 * signals.conflict_eff + 0.3 * signals.stage_violation).clamp(0.0, 1.0)
}

/// Derives this turn's target PAD point from the conflict/warmth signals.
/// Goodwill and low conflict pull pleasure and dominance up; provocation,
/// contempt and pressure pull them down; arousal tracks pressure and
/// confusion.
fn target_mood(signals: &DetectionSignals) -> (f64, f64, f64) {
    let pleasure = (signals.goodwill - signals.contempt - 0.5 * signals.conflict_eff).clamp(-1.0, 1.0);
    let arousal = (signals.pressure + signals.confusion - 0.3).clamp(-1.0, 1.0);
    let dominance = (0.3 - signals.provocation - 0.2 * signals.pressure).clamp(-1.0, 1.0);
    (pleasure, arousal, dominance)
}

/// PAD mood regression: `x <- x + beta * k * (target - x)` per axis, `k`
/// shared across axes via `reactivity`. Busyness is left untouched here —
/// it is a perception-layer signal, not something the evolver moves.
pub fn regress_mood(current: &MoodState, signals: &DetectionSignals) -> MoodState {
    let k = reactivity(signals);
    let (p_target, a_target, d_target) = target_mood(signals);

    MoodState {
        pleasure: (current.pleasure + BETA_PLEASURE * k * (p_target - current.pleasure)).clamp(-1.0, 1.0),
        arousal: (current.arousal + BETA_AROUSAL * k * (a_target - current.arousal)).clamp(-1.0, 1.0),
        dominance: (current.dominance + BETA_DOMINANCE * k * (d_target - current.dominance)).clamp(-1.0, 1.0),
        busyness: current.busyness,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_signals() -> DetectionSignals {
        DetectionSignals {
            goodwill: 0.8,
            ..Default::default()
        }
    }

    fn hostile_signals() -> DetectionSignals {
        DetectionSignals {
            conflict_eff: 0.9,
            provocation: 0.8,
            contempt: 0.7,
            ..Default::default()
        }
    }

    #[test]
    fn goodwill_nudges_dimensions_up() {
        let nudge = dimension_nudges(&calm_signals(), &AssetDelta::default());
        assert!(nudge.closeness > 0.0);
        assert!(nudge.liking > 0.0);
    }

    #[test]
    fn conflict_nudges_dimensions_down() {
        let nudge = dimension_nudges(&hostile_signals(), &AssetDelta::default());
        assert!(nudge.closeness < 0.0);
        assert!(nudge.liking < 0.0);
    }

    #[test]
    fn apply_nudges_clamps_to_unit_range() {
        let current = RelationshipDimensions {
            closeness: 0.99,
            ..RelationshipDimensions::default()
        };
        let nudge = DimensionNudge {
            closeness: 0.5,
            ..Default::default()
        };
        let (updated, audits) = apply_nudges(&current, nudge);
        assert_eq!(updated.closeness, 1.0);
        assert_eq!(audits[0].old, 0.99);
        assert_eq!(audits[0].new, 1.0);
    }

    #[test]
    fn mood_regresses_toward_goodwill_target() {
        let current = MoodState {
            pleasure: -0.5,
            arousal: 0.0,
            dominance: 0.0,
            busyness: 0.2,
        };
        let updated = regress_mood(&current, &calm_signals());
        assert!(updated.pleasure > current.pleasure);
        assert_eq!(updated.busyness, current.busyness);
    }

    #[test]
    fn stage_violation_increases_reactivity() {
        let calm = reactivity(&DetectionSignals::default());
        let violating = reactivity(&DetectionSignals {
            stage_violation: 1.0,
            ..Default::default()
        });
        assert!(violating > calm);
    }
}
