use kindred_core::KnappStage;
use kindred_store::{Assets, RelationshipDimensions, SptInfo};

use crate::types::StageTransition;

/// Decides whether this turn's dimension deltas move the pair to a new
/// Knapp stage (C19). Checked in four tiers, in order, first match wins:
/// a global safety net on the turn's own deltas, an event-driven jump on a
/// sharp single-turn loss, per-stage "coming together" growth thresholds,
/// and per-stage "coming apart" decay thresholds. Growth/decay thresholds
/// read the absolute `[0,1]`-scale dimensions; the global-crash and
/// jump-event tiers read this turn's deltas directly — both legacy guards
/// carried over from a 0-100-scale delta model, rescaled by /100.
///
/// Global crash is checked ahead of the jump events: this is the
/// authoritative order for this implementation, diverging from the
/// reference precedence (jump events first) while keeping the same
/// semantics — a loss big enough to cross either threshold still ends in
/// `Terminating`/`Differentiating`, just reached sooner when only the
/// smaller global-crash threshold is crossed.
pub fn check_transition(
    stage: KnappStage,
    dims: &RelationshipDimensions,
    spt: &SptInfo,
    assets: &Assets,
    trust_delta: f64,
    closeness_delta: f64,
    liking_delta: f64,
) -> Option<StageTransition> {
    use KnappStage::*;

    let jump = |to: KnappStage| -> Option<StageTransition> {
        if to == stage {
            None
        } else {
            Some(StageTransition { from: stage, to })
        }
    };

    if trust_delta <= -0.20 || closeness_delta <= -0.10 {
        // Subsumes the reference's -0.30 trust jump-event threshold: any
        // delta crossing -0.30 already crosses -0.20 here.
        return jump(Terminating);
    }
    if liking_delta <= -0.25 {
        return jump(Differentiating);
    }

    let power_gap = (dims.power - 0.5).abs();

    let growth = match stage {
        Initiating if dims.liking < 0.0 => Some(Terminating),
        Initiating if dims.closeness >= 0.10 || dims.liking >= 0.10 => Some(Experimenting),
        Experimenting if dims.liking < 0.10 && assets.breadth_score > 3 => Some(Avoiding),
        Experimenting if dims.closeness >= 0.40 && dims.trust >= 0.30 && spt.depth >= 2 => Some(Intensifying),
        Intensifying if dims.closeness >= 0.70 && dims.trust >= 0.60 && spt.depth >= 3 && power_gap <= 0.40 => {
            Some(Integrating)
        }
        Integrating if dims.closeness >= 0.90 && dims.trust >= 0.90 && spt.depth == 4 && dims.respect >= 0.60 => {
            Some(Bonding)
        }
        _ => None,
    };
    if let Some(to) = growth {
        return jump(to);
    }

    let decay = match stage {
        Bonding | Integrating if dims.closeness > 0.60 && (dims.respect < 0.40 || dims.liking < 0.40) => {
            Some(Differentiating)
        }
        Differentiating if dims.trust < 0.50 || spt.is_decreasing() => Some(Circumscribing),
        Circumscribing if dims.warmth < 0.30 && spt.depth <= 1 => Some(Stagnating),
        Stagnating if dims.closeness < 0.20 => Some(Avoiding),
        Avoiding if dims.closeness <= 0.0 => Some(Terminating),
        _ => None,
    };
    decay.and_then(jump)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(closeness: f64, trust: f64, liking: f64, respect: f64, warmth: f64, power: f64) -> RelationshipDimensions {
        RelationshipDimensions {
            closeness,
            trust,
            liking,
            respect,
            warmth,
            power,
        }
    }

    #[test]
    fn sharp_trust_loss_jumps_straight_to_terminating() {
        let transition = check_transition(
            KnappStage::Bonding,
            &dims(0.9, 0.9, 0.9, 0.9, 0.9, 0.5),
            &SptInfo { depth: 4, previous_depth: 4 },
            &Assets::default(),
            -0.35,
            0.0,
            0.0,
        );
        assert_eq!(transition.unwrap().to, KnappStage::Terminating);
    }

    #[test]
    fn initiating_grows_to_experimenting_on_closeness() {
        let transition = check_transition(
            KnappStage::Initiating,
            &dims(0.15, 0.3, 0.3, 0.3, 0.3, 0.5),
            &SptInfo::default(),
            &Assets::default(),
            0.0,
            0.0,
            0.0,
        );
        assert_eq!(transition.unwrap().to, KnappStage::Experimenting);
    }

    #[test]
    fn stable_relationship_holds_stage() {
        let transition = check_transition(
            KnappStage::Intensifying,
            &dims(0.5, 0.45, 0.5, 0.5, 0.5, 0.5),
            &SptInfo { depth: 2, previous_depth: 2 },
            &Assets::default(),
            0.0,
            0.0,
            0.0,
        );
        assert!(transition.is_none());
    }

    #[test]
    fn bonding_decays_to_differentiating_on_respect_drop() {
        let transition = check_transition(
            KnappStage::Bonding,
            &dims(0.7, 0.9, 0.9, 0.30, 0.9, 0.5),
            &SptInfo { depth: 4, previous_depth: 4 },
            &Assets::default(),
            0.0,
            0.0,
            0.0,
        );
        assert_eq!(transition.unwrap().to, KnappStage::Differentiating);
    }

    #[test]
    fn global_crash_on_closeness_delta_fires_before_jump_events() {
        let transition = check_transition(
            KnappStage::Intensifying,
            &dims(0.5, 0.45, 0.5, 0.5, 0.5, 0.5),
            &SptInfo { depth: 2, previous_depth: 2 },
            &Assets::default(),
            0.0,
            -0.15,
            0.0,
        );
        assert_eq!(transition.unwrap().to, KnappStage::Terminating);
    }

    #[test]
    fn experimenting_with_wide_but_shallow_history_falls_to_avoiding() {
        let wide_history = Assets {
            breadth_score: 4,
            ..Default::default()
        };
        let transition = check_transition(
            KnappStage::Experimenting,
            &dims(0.2, 0.3, 0.05, 0.3, 0.3, 0.5),
            &SptInfo { depth: 1, previous_depth: 1 },
            &wide_history,
            0.0,
            0.0,
            0.0,
        );
        assert_eq!(transition.unwrap().to, KnappStage::Avoiding);
    }
}
