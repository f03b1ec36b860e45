use kindred_core::config::LatsConfig;
use kindred_core::{ConversationMode, KnappStage};
use kindred_llm::Invoker;
use kindred_reason::RequirementsChecklist;
use kindred_store::State;

use crate::compiler;
use crate::evaluator;
use crate::planner;
use crate::reflection;
use crate::types::{ProcessorPlan, ReflectionPatch, ReplyPlan, SimReport};

/// Search knobs (C13): rollouts/expand_k default by stage (2-6 / 1-2), then
/// get overridden by any explicitly configured `LatsConfig` field. The
/// initiating stage keeps a stricter early-exit bar since a generic opener
/// is more likely to look plausible without actually fitting this person.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    pub rollouts: usize,
    pub expand_k: usize,
    pub max_messages: usize,
    pub min_rollouts_before_early_exit: usize,
    pub disable_early_exit: bool,
    pub early_exit_root_score: f64,
    pub patch_ttl_turns: u32,
}

impl SearchConfig {
    pub fn for_stage(stage: KnappStage, max_messages: usize, lats: &LatsConfig) -> Self {
        let (default_rollouts, default_expand_k) = stage_budget(stage);
        Self {
            rollouts: lats.rollouts.map(|v| v as usize).unwrap_or(default_rollouts),
            expand_k: lats.expand_k.map(|v| v as usize).unwrap_or(default_expand_k),
            max_messages,
            min_rollouts_before_early_exit: lats.min_rollouts_before_early_exit as usize,
            disable_early_exit: lats.disable_early_exit,
            early_exit_root_score: stage_early_exit_root_score(stage, lats.early_exit.root_score),
            patch_ttl_turns: lats.patch_ttl_turns,
        }
    }

    fn early_exit_score(&self) -> f64 {
        if self.disable_early_exit {
            f64::INFINITY
        } else {
            self.early_exit_root_score
        }
    }
}

/// Per-stage rollout budget (rollouts 2-6, expand_k 1-2). Stakes rise with
/// relationship investment through Intensifying/Bonding, then taper as the
/// pair winds down.
fn stage_budget(stage: KnappStage) -> (usize, usize) {
    use KnappStage::*;
    match stage {
        Initiating => (2, 1),
        Experimenting => (3, 1),
        Intensifying => (4, 2),
        Integrating => (5, 2),
        Bonding => (6, 2),
        Differentiating => (4, 2),
        Circumscribing => (3, 1),
        Stagnating => (2, 1),
        Avoiding => (2, 1),
        Terminating => (2, 1),
    }
}

/// Initiating/Experimenting keep a higher early-exit bar so a generic
/// opener doesn't win before the tree has had a chance to explore.
fn stage_early_exit_root_score(stage: KnappStage, configured: f64) -> f64 {
    match stage {
        KnappStage::Initiating | KnappStage::Experimenting => configured,
        _ => (configured - 0.20).max(0.0),
    }
}

fn ucb1(value_sum: f64, visits: u32, parent_visits: u32, c: f64) -> f64 {
    if visits == 0 {
        return f64::INFINITY;
    }
    let exploit = value_sum / visits as f64;
    let explore = c * ((parent_visits.max(1) as f64).ln() / visits as f64).sqrt();
    exploit + explore
}

struct Node {
    parent: Option<usize>,
    children: Vec<usize>,
    visits: u32,
    value_sum: f64,
    reply_plan: ReplyPlan,
    processor_plan: ProcessorPlan,
    sim_report: SimReport,
}

fn select_leaf(nodes: &[Node]) -> usize {
    let mut current = 0usize;
    loop {
        let node = &nodes[current];
        if node.children.is_empty() {
            return current;
        }
        let parent_visits = node.visits;
        current = *node
            .children
            .iter()
            .max_by(|a, b| {
                let sa = ucb1(nodes[**a].value_sum, nodes[**a].visits, parent_visits, 1.2);
                let sb = ucb1(nodes[**b].value_sum, nodes[**b].visits, parent_visits, 1.2);
                sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("children is non-empty");
    }
}

fn backpropagate(nodes: &mut [Node], mut node_id: usize, score: f64) {
    loop {
        let parent = match nodes[node_id].parent {
            Some(p) => p,
            None => {
                nodes[node_id].visits += 1;
                nodes[node_id].value_sum += score;
                break;
            }
        };
        nodes[parent].visits += 1;
        nodes[parent].value_sum += score;
        node_id = parent;
    }
}

/// LATS search (C13): a small MCTS-like loop over `ReplyPlan` variants. Each
/// rollout walks the tree by UCB1, expands the selected leaf into up to
/// `expand_k` diversified variants, compiles and evaluates each, then
/// backpropagates the score. Returns the best-scoring compiled candidate
/// plus whichever `ReflectionPatch` should carry into the next turn.
///
/// `active_patch` is whatever patch survived from a prior turn (already
/// filtered to non-expired by the caller is not required — this function
/// checks `.expired()` itself). While it's alive, no new patch is built;
/// once it expires, a fresh one may be installed from this turn's own
/// repeated-failure pattern across rollouts (Testable Property 9).
pub async fn search_best_plan(
    planner_invoker: &dyn Invoker,
    planner_model: &str,
    judge: Option<(&dyn Invoker, &str)>,
    state: &State,
    requirements: &RequirementsChecklist,
    mode: ConversationMode,
    guidance: Option<&str>,
    quality_threshold: f64,
    config: SearchConfig,
    active_patch: Option<ReflectionPatch>,
) -> (ReplyPlan, ProcessorPlan, SimReport, Option<ReflectionPatch>) {
    let carried_guidance = active_patch.as_ref().filter(|p| !p.expired()).map(|p| p.guidance.clone());
    let mut effective_guidance = combine_guidance(guidance, carried_guidance.as_deref());

    let root_plan =
        planner::plan_reply(planner_invoker, planner_model, state, requirements, effective_guidance.as_deref(), None).await;
    let root_proc = compiler::compile(&root_plan, state, config.max_messages, &requirements.latest_user_text);
    let root_report = evaluator::evaluate_candidate(judge, mode, &root_proc, requirements, quality_threshold).await;
    let root_score = root_report.eval_score;

    let mut collected_reports: Vec<SimReport> = vec![root_report.clone()];

    let mut nodes = vec![Node {
        parent: None,
        children: Vec::new(),
        visits: 1,
        value_sum: root_score,
        reply_plan: root_plan,
        processor_plan: root_proc,
        sim_report: root_report,
    }];

    let mut best_id = 0usize;
    let mut best_score = root_score;

    let early_exit_ok = nodes[0].sim_report.found_solution
        && best_score >= config.early_exit_score()
        && config.min_rollouts_before_early_exit == 0;
    if early_exit_ok {
        let node = nodes.swap_remove(best_id);
        return (node.reply_plan, node.processor_plan, node.sim_report, age_or_drop(active_patch));
    }

    let rollouts = config.rollouts.max(config.min_rollouts_before_early_exit);
    let mut new_patch: Option<ReflectionPatch> = None;
    let patch_slot_open = active_patch.as_ref().map(|p| p.expired()).unwrap_or(true);

    for rollout_idx in 0..rollouts {
        let leaf_id = select_leaf(&nodes);
        let variants = planner::expand_variants(
            planner_invoker,
            planner_model,
            state,
            requirements,
            effective_guidance.as_deref(),
            config.expand_k,
        )
        .await;

        for variant in variants {
            let proc = compiler::compile(&variant, state, config.max_messages, &requirements.latest_user_text);
            let report = evaluator::evaluate_candidate(judge, mode, &proc, requirements, quality_threshold).await;
            let score = report.eval_score;
            collected_reports.push(report.clone());

            let child_id = nodes.len();
            nodes.push(Node {
                parent: Some(leaf_id),
                children: Vec::new(),
                visits: 1,
                value_sum: score,
                reply_plan: variant,
                processor_plan: proc,
                sim_report: report,
            });
            nodes[leaf_id].children.push(child_id);
            backpropagate(&mut nodes, leaf_id, score);

            if score > best_score {
                best_score = score;
                best_id = child_id;
            }
        }

        // Cross-rollout reflection (Testable Property 9): once the floor of
        // min_rollouts_before_early_exit has been crossed, look for a
        // failure id repeating across rollouts and fold the resulting
        // guidance into every later generation call this turn. At most one
        // new patch is installed per turn, and never while one is active.
        if patch_slot_open && new_patch.is_none() && rollout_idx + 1 >= config.min_rollouts_before_early_exit.max(1) {
            let counts = reflection::count_failures(collected_reports.iter());
            let repeated = reflection::repeated_failures(&counts, 2);
            if let Some(patch) = reflection::build_reflection_patch(&repeated, config.patch_ttl_turns) {
                tracing::debug!(guidance = %patch.guidance, "installing cross-rollout reflection patch");
                effective_guidance = combine_guidance(guidance, Some(&patch.guidance));
                new_patch = Some(patch);
            }
        }

        if nodes[best_id].sim_report.found_solution && best_score >= config.early_exit_score() {
            break;
        }
    }

    let node = nodes.swap_remove(best_id);
    let outgoing_patch = new_patch.or_else(|| age_or_drop(active_patch));
    (node.reply_plan, node.processor_plan, node.sim_report, outgoing_patch)
}

fn combine_guidance(base: Option<&str>, patch: Option<&str>) -> Option<String> {
    match (base, patch) {
        (Some(b), Some(p)) => Some(format!("{b}\n{p}")),
        (Some(b), None) => Some(b.to_string()),
        (None, Some(p)) => Some(p.to_string()),
        (None, None) => None,
    }
}

/// Decrements a carried-over patch's TTL by one turn, dropping it once it
/// expires.
fn age_or_drop(patch: Option<ReflectionPatch>) -> Option<ReflectionPatch> {
    patch.and_then(|mut p| {
        p.age_one_turn();
        if p.expired() {
            None
        } else {
            Some(p)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ucb1_prefers_unvisited_child() {
        assert_eq!(ucb1(0.0, 0, 5, 1.2), f64::INFINITY);
    }

    #[test]
    fn ucb1_increases_with_value() {
        let low = ucb1(1.0, 4, 10, 1.2);
        let high = ucb1(3.0, 4, 10, 1.2);
        assert!(high > low);
    }

    #[test]
    fn early_exit_threshold_is_stricter_in_initiating() {
        let lats = LatsConfig::default();
        let cfg = SearchConfig::for_stage(KnappStage::Initiating, 3, &lats);
        let other = SearchConfig::for_stage(KnappStage::Intensifying, 3, &lats);
        assert!(cfg.early_exit_score() > other.early_exit_score());
    }

    #[test]
    fn rollouts_and_expand_k_scale_up_toward_bonding() {
        let lats = LatsConfig::default();
        let initiating = SearchConfig::for_stage(KnappStage::Initiating, 3, &lats);
        let bonding = SearchConfig::for_stage(KnappStage::Bonding, 3, &lats);
        assert!(bonding.rollouts > initiating.rollouts);
        assert!(bonding.expand_k >= initiating.expand_k);
        assert!((2..=6).contains(&initiating.rollouts));
        assert!((1..=2).contains(&initiating.expand_k));
    }

    #[test]
    fn explicit_lats_overrides_pin_a_single_value_for_every_stage() {
        let lats = LatsConfig {
            rollouts: Some(5),
            expand_k: Some(2),
            ..LatsConfig::default()
        };
        let cfg = SearchConfig::for_stage(KnappStage::Initiating, 3, &lats);
        assert_eq!(cfg.rollouts, 5);
        assert_eq!(cfg.expand_k, 2);
    }

    #[test]
    fn disable_early_exit_makes_the_threshold_unreachable() {
        let lats = LatsConfig {
            disable_early_exit: true,
            ..LatsConfig::default()
        };
        let cfg = SearchConfig::for_stage(KnappStage::Bonding, 3, &lats);
        assert_eq!(cfg.early_exit_score(), f64::INFINITY);
    }
}
