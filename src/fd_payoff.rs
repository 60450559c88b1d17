// role-specific, neighbor-coordination-dependent payoff computation

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::fd_interface::{Choice, NodeId, Role};
use crate::fd_network::NetworkSpec;

/// Fixed experiment reward parameters.
///
/// Defaults reproduce the deployed session: the unpopular norm (everyone
/// Blue) is a Pareto-suboptimal equilibrium because the coordination rewards
/// saturate with rates lambda1 > lambda2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardParams {
    /// Fixed reward for a majority player picking their own color (Red)
    pub s: f64,

    /// Fixed reward for a minority player picking their own color (Blue)
    pub e: f64,

    /// Coordination bound when siding with the minority (Blue)
    pub z: f64,

    /// Coordination bound when siding with the majority (Red)
    pub w: f64,

    /// Diminishing-returns rate for Blue coordination
    pub lambda1: f64,

    /// Diminishing-returns rate for Red coordination
    pub lambda2: f64,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            s: 15.0,
            e: 10.0,
            z: 50.0,
            w: 40.0,
            lambda1: 4.3,
            lambda2: 1.8,
        }
    }
}

impl RewardParams {
    /// Saturating coordination reward for siding with the minority, at a
    /// fraction `p` of same-choice neighbors. Reaches exactly `z` at p = 1.
    pub fn adopt_reward(&self, p: f64) -> f64 {
        self.z * (1.0 - (-self.lambda1 * p).exp()) / (1.0 - (-self.lambda1).exp())
    }

    /// Saturating coordination reward for siding with the majority
    pub fn resist_reward(&self, p: f64) -> f64 {
        self.w * (1.0 - (-self.lambda2 * p).exp()) / (1.0 - (-self.lambda2).exp())
    }

    /// The single utility function of the experiment. Everything that shows
    /// a payoff - round earnings, the illustrative table, the comprehension
    /// answer key - derives from this one place.
    ///
    /// `degree` counts active neighbors only; `blue`/`red` count the active
    /// neighbors wearing each color.
    pub fn utility(&self, role: Role, choice: Choice, blue: usize, red: usize, degree: usize) -> f64 {
        let utility = match role {
            // minority payoff is choice-only, independent of neighbors
            Role::Minority => match choice {
                Choice::Blue => self.e,
                Choice::Red => 0.0,
            },
            Role::Majority if degree > 0 => match choice {
                Choice::Blue => self.adopt_reward(blue as f64 / degree as f64),
                Choice::Red => self.s + self.resist_reward(red as f64 / degree as f64),
            },
            // isolated majority: connectivity should rule this out, but the
            // formula must still be total
            Role::Majority => match choice {
                Choice::Blue => 0.0,
                Choice::Red => self.s,
            },
        };

        utility.max(0.0)
    }
}

/// One row of the in-page illustrative payoff table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoffRow {
    /// Number of coordinating neighbors
    pub coordinating: usize,

    /// Truncated reward for siding with the minority at this coordination level
    pub adopt: i64,

    /// Truncated reward for siding with the majority at this coordination level
    pub resist: i64,
}

/// Answer key for the four comprehension questions: payoff for each own
/// choice against an all-blue and a half-half neighborhood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComprehensionKey {
    pub red_all_blue: i64,
    pub blue_all_blue: i64,
    pub red_half: i64,
    pub blue_half: i64,
}

/// Per-node payoffs for one resolved round
pub type RoundPayoffs = HashMap<NodeId, f64>;

/// Computes per-round utilities over the fixed network topology.
///
/// A pure function of (spec, choice vector, active set): identical inputs
/// always produce identical payoffs.
pub struct PayoffEngine {
    spec: Arc<NetworkSpec>,
    params: RewardParams,
}

impl PayoffEngine {
    pub fn new(spec: Arc<NetworkSpec>, params: RewardParams) -> Self {
        Self { spec, params }
    }

    pub fn params(&self) -> &RewardParams {
        &self.params
    }

    /// Compute every node's payoff for one round.
    ///
    /// `choices` maps nodes to submitted choices (absent = never submitted);
    /// `active` is the set of non-dropout placed nodes. Dropouts receive 0
    /// and are invisible to everyone else's coordination counts - they are
    /// excluded from neighbor sets rather than treated as a fixed color.
    pub fn compute_round_payoffs(
        &self,
        choices: &HashMap<NodeId, Choice>,
        active: &HashSet<NodeId>,
    ) -> RoundPayoffs {
        let mut payoffs = RoundPayoffs::with_capacity(self.spec.len());

        for node in 0..self.spec.len() {
            if !active.contains(&node) {
                payoffs.insert(node, 0.0);
                continue;
            }

            let own_choice = match choices.get(&node) {
                Some(c) => *c,
                // active but never submitted; nothing to reward
                None => {
                    payoffs.insert(node, 0.0);
                    continue;
                }
            };

            let mut degree = 0;
            let mut blue = 0;
            let mut red = 0;
            for neighbor in self.spec.neighbors(node) {
                if !active.contains(&neighbor) {
                    continue;
                }
                degree += 1;
                match choices.get(&neighbor) {
                    Some(Choice::Blue) => blue += 1,
                    Some(Choice::Red) => red += 1,
                    None => {}
                }
            }

            let utility = self
                .params
                .utility(self.spec.role(node), own_choice, blue, red, degree);
            payoffs.insert(node, utility);
        }

        payoffs
    }

    /// Illustrative table shown next to the decision form: for each possible
    /// number of coordinating neighbors, the (truncated) coordination reward
    /// for adopting and resisting. A degenerate degree yields the single
    /// zero-coordination row.
    pub fn payoff_table(&self, degree: usize) -> Vec<PayoffRow> {
        payoff_table(&self.params, degree)
    }

    /// Comprehension-check answer key for a player of `role` with `degree`
    /// neighbors. Shares the utility derivation with round payoffs so the
    /// quiz can never drift from the real rules.
    pub fn comprehension_key(&self, role: Role, degree: usize) -> ComprehensionKey {
        comprehension_key(&self.params, role, degree)
    }
}

/// Free-standing variant of [`PayoffEngine::payoff_table`] for pages that
/// render before any network exists (the instruction stage assumes a fixed
/// illustrative degree).
pub fn payoff_table(params: &RewardParams, degree: usize) -> Vec<PayoffRow> {
    let denominator = degree.max(1) as f64;
    (0..=degree)
        .map(|n| {
            let p = n as f64 / denominator;
            PayoffRow {
                coordinating: n,
                adopt: params.adopt_reward(p).trunc() as i64,
                resist: params.resist_reward(p).trunc() as i64,
            }
        })
        .collect()
}

/// Free-standing variant of [`PayoffEngine::comprehension_key`].
///
/// The two quizzed neighborhoods are all-blue (blue = degree) and half-half
/// (blue = degree / 2, red = the rest). Answers are rounded, matching what
/// participants are asked to type.
pub fn comprehension_key(params: &RewardParams, role: Role, degree: usize) -> ComprehensionKey {
    let blue_half = degree / 2;
    let red_half = degree - blue_half;

    ComprehensionKey {
        red_all_blue: params.utility(role, Choice::Red, degree, 0, degree).round() as i64,
        blue_all_blue: params.utility(role, Choice::Blue, degree, 0, degree).round() as i64,
        red_half: params.utility(role, Choice::Red, blue_half, red_half, degree).round() as i64,
        blue_half: params.utility(role, Choice::Blue, blue_half, red_half, degree).round() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd_network::NetworkSpec;
    use crate::fd_interface::Role;

    const EPS: f64 = 1e-9;

    /// 4-node ring, node 0 minority
    fn ring4() -> Arc<NetworkSpec> {
        let mut adj = vec![vec![false; 4]; 4];
        for i in 0..4 {
            let j = (i + 1) % 4;
            adj[i][j] = true;
            adj[j][i] = true;
        }
        let roles = vec![Role::Minority, Role::Majority, Role::Majority, Role::Majority];
        Arc::new(NetworkSpec::new(adj, roles).unwrap())
    }

    fn all_active() -> HashSet<NodeId> {
        (0..4).collect()
    }

    fn engine() -> PayoffEngine {
        PayoffEngine::new(ring4(), RewardParams::default())
    }

    #[test]
    fn full_blue_coordination_hits_the_bound() {
        // majority node 2 wears Blue between two Blue neighbors: p = 1, so
        // the saturating reward collapses to exactly z = 50
        let engine = engine();
        let choices: HashMap<NodeId, Choice> = [
            (0, Choice::Blue),
            (1, Choice::Blue),
            (2, Choice::Blue),
            (3, Choice::Blue),
        ]
        .into_iter()
        .collect();

        let payoffs = engine.compute_round_payoffs(&choices, &all_active());
        assert!((payoffs[&2] - 50.0).abs() < EPS);
        // minority payoff is its fixed reward, neighbors notwithstanding
        assert!((payoffs[&0] - 10.0).abs() < EPS);
    }

    #[test]
    fn conforming_majority_gets_base_plus_coordination() {
        let engine = engine();
        let params = RewardParams::default();
        // node 2 wears Red; neighbors 1 and 3 wear Red too
        let choices: HashMap<NodeId, Choice> = [
            (0, Choice::Blue),
            (1, Choice::Red),
            (2, Choice::Red),
            (3, Choice::Red),
        ]
        .into_iter()
        .collect();

        let payoffs = engine.compute_round_payoffs(&choices, &all_active());
        assert!((payoffs[&2] - (params.s + params.w)).abs() < EPS);
        // minority wearing Blue still earns e regardless of the red wave
        assert!((payoffs[&0] - params.e).abs() < EPS);
    }

    #[test]
    fn minority_wearing_red_earns_nothing() {
        let engine = engine();
        let choices: HashMap<NodeId, Choice> =
            (0..4).map(|n| (n, Choice::Red)).collect();
        let payoffs = engine.compute_round_payoffs(&choices, &all_active());
        assert_eq!(payoffs[&0], 0.0);
    }

    #[test]
    fn idempotent_for_identical_inputs() {
        let engine = engine();
        let choices: HashMap<NodeId, Choice> = [
            (0, Choice::Blue),
            (1, Choice::Red),
            (2, Choice::Blue),
            (3, Choice::Red),
        ]
        .into_iter()
        .collect();
        let active = all_active();

        let first = engine.compute_round_payoffs(&choices, &active);
        let second = engine.compute_round_payoffs(&choices, &active);
        assert_eq!(first, second);
    }

    #[test]
    fn dropouts_earn_zero_and_vanish_from_neighborhoods() {
        let engine = engine();
        let params = RewardParams::default();
        let choices: HashMap<NodeId, Choice> = [
            (0, Choice::Blue),
            (1, Choice::Red),
            (2, Choice::Red),
            (3, Choice::Red),
        ]
        .into_iter()
        .collect();

        // node 3 drops out; node 2's neighborhood shrinks to {1}
        let active: HashSet<NodeId> = [0, 1, 2].into_iter().collect();
        let payoffs = engine.compute_round_payoffs(&choices, &active);

        assert_eq!(payoffs[&3], 0.0);
        // node 2 conforms with its single remaining (Red) neighbor: p = 1
        assert!((payoffs[&2] - (params.s + params.w)).abs() < EPS);
    }

    #[test]
    fn coordination_rewards_are_monotone_in_the_matching_share() {
        let params = RewardParams::default();
        let mut last_adopt = f64::NEG_INFINITY;
        let mut last_resist = f64::NEG_INFINITY;
        for n in 0..=10 {
            let p = n as f64 / 10.0;
            let adopt = params.adopt_reward(p);
            let resist = params.resist_reward(p);
            assert!(adopt > last_adopt);
            assert!(resist > last_resist);
            last_adopt = adopt;
            last_resist = resist;
        }
        // bounded above by z and w
        assert!((params.adopt_reward(1.0) - params.z).abs() < EPS);
        assert!((params.resist_reward(1.0) - params.w).abs() < EPS);
    }

    #[test]
    fn table_and_key_share_the_utility_derivation() {
        let params = RewardParams::default();
        let table = payoff_table(&params, 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0].coordinating, 0);
        assert_eq!(table[2].adopt, 50);
        assert_eq!(table[2].resist, 40);

        let key = comprehension_key(&params, Role::Majority, 2);
        // all-blue neighborhood: Blue earns the full bound, Red only s
        assert_eq!(key.blue_all_blue, 50);
        assert_eq!(key.red_all_blue, params.s.round() as i64);
        // half-half: both formulas at p = 1/2
        assert_eq!(
            key.blue_half,
            params.utility(Role::Majority, Choice::Blue, 1, 1, 2).round() as i64
        );

        // minority answers ignore the neighborhood entirely
        let key = comprehension_key(&params, Role::Minority, 2);
        assert_eq!(key.blue_all_blue, 10);
        assert_eq!(key.blue_half, 10);
        assert_eq!(key.red_all_blue, 0);
        assert_eq!(key.red_half, 0);
    }

    #[test]
    fn degenerate_degree_has_a_single_row_and_total_answers() {
        let params = RewardParams::default();
        let table = payoff_table(&params, 0);
        assert_eq!(table, vec![PayoffRow { coordinating: 0, adopt: 0, resist: 0 }]);

        let key = comprehension_key(&params, Role::Majority, 0);
        assert_eq!(key.red_all_blue, params.s.round() as i64);
        assert_eq!(key.blue_all_blue, 0);
    }
}
