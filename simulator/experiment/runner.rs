// Experiment Simulator Runner - drives a whole session without a page server

use std::fmt;
use std::path::PathBuf;

use fd_core::{
    Choice, GroupPhase, NodeId, RoundProgress, Session, SessionConfig, SessionError,
};
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::experiment::config::{ChoiceBehavior, ExperimentConfig};
use crate::experiment::stats::{ExperimentOutcome, PayoutLine};

#[derive(Debug)]
pub enum ExperimentError {
    /// Session setup failed (typically a bad network condition)
    Setup(SessionError),

    /// The lobby emptied before the group could form
    LobbyDrained { arrivals: usize },
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentError::Setup(e) => write!(f, "session setup failed: {}", e),
            ExperimentError::LobbyDrained { arrivals } => {
                write!(f, "group never formed within {} arrivals", arrivals)
            }
        }
    }
}

impl std::error::Error for ExperimentError {}

pub struct ExperimentRunner {
    config: ExperimentConfig,
}

impl ExperimentRunner {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Run the whole session: lobby, rounds, payout.
    pub fn run(&self, seed: u64) -> Result<ExperimentOutcome, ExperimentError> {
        let mut rng = StdRng::seed_from_u64(seed);

        let session_config = SessionConfig {
            group_size: self.config.group_size,
            num_rounds: self.config.num_rounds,
            network_condition: self.config.network_condition.clone(),
            networks_dir: PathBuf::from(&self.config.networks_dir),
            edge_probability: self.config.edge_probability,
            minority_fraction: self.config.minority_fraction,
            rewards: self.config.rewards,
            dropout_policy: self.config.dropout_policy,
            ..SessionConfig::default()
        };
        let mut session =
            Session::new(session_config, &mut rng).map_err(ExperimentError::Setup)?;

        let (formed_after, exited_early) = self.run_lobby(&mut session, &mut rng)?;
        let adoption_per_round = self.run_rounds(&mut session, &mut rng);

        // collect payouts in network-slot order
        let mut payouts = IndexMap::new();
        let mut dropouts = 0;
        for node in 0..session.spec().len() {
            if let Some(p) = session.participant_at(node) {
                let (id, role, dropped_out) = (p.id, p.role, p.is_dropout);
                if dropped_out {
                    dropouts += 1;
                }
                if let Ok(payout) = session.payout(id) {
                    payouts.insert(
                        id,
                        PayoutLine {
                            role,
                            points: payout.points,
                            euros: payout.euros,
                            bonus: payout.bonus,
                            dropped_out,
                        },
                    );
                }
            }
        }

        Ok(ExperimentOutcome {
            seed_used: seed,
            formed_after,
            exited_early,
            rounds_played: session.rounds_played(),
            failed: session.failed(),
            dropouts,
            adoption_per_round,
            payouts,
        })
    }

    /// Pump arrivals through consent and grouping. Everyone the lobby admits
    /// arrives, so surplus arrivals exercise the overflow path.
    fn run_lobby(
        &self,
        session: &mut Session,
        rng: &mut StdRng,
    ) -> Result<(usize, usize), ExperimentError> {
        let mut formed_after = None;

        for i in 0..self.config.lobby_size {
            let _ = session.arrive(&format!("sim-{}", i + 1), rng);
            if session.phase() == GroupPhase::Formed && formed_after.is_none() {
                formed_after = Some(i + 1);
            }
        }

        // stranded pool members are only flagged at formation time, after
        // their own arrival returned Waiting, so count exits at the end
        let exited_early = (1..=self.config.lobby_size as u64)
            .filter(|id| session.participant(*id).map_or(false, |p| p.exit_early))
            .count();

        match formed_after {
            Some(n) => Ok((n, exited_early)),
            None => Err(ExperimentError::LobbyDrained { arrivals: self.config.lobby_size }),
        }
    }

    fn run_rounds(&self, session: &mut Session, rng: &mut StdRng) -> Vec<f64> {
        let mut adoption = Vec::new();

        for _ in 0..self.config.num_rounds {
            let round = match session.begin_round() {
                Ok(n) => n,
                Err(_) => break,
            };

            let nodes: Vec<NodeId> = (0..session.spec().len()).collect();
            for node in nodes {
                let participant = match session.participant_at(node) {
                    Some(p) if !p.is_dropout => p.clone(),
                    _ => continue,
                };

                let silent = self
                    .config
                    .timeouts
                    .iter()
                    .any(|t| t.round == round && t.node == node);

                let progress = if silent {
                    session.note_timeout(participant.id, rng)
                } else {
                    let choice = self.pick_choice(session, node, round, rng);
                    session.submit_choice(participant.id, choice)
                };

                match progress {
                    Ok(RoundProgress::Aborted { .. }) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }

            // a resolved round leaves its record in the history
            match session.history().iter().find(|r| r.number == round) {
                Some(record) => {
                    let blue = record.choices.values().filter(|c| c.is_blue()).count();
                    let total = record.choices.len().max(1);
                    adoption.push(blue as f64 / total as f64);
                }
                None => break, // aborted mid-round
            }
        }

        adoption
    }

    fn pick_choice(
        &self,
        session: &Session,
        node: NodeId,
        round: u32,
        rng: &mut StdRng,
    ) -> Choice {
        let role = session.spec().role(node);
        let preferred = role.preferred_choice();

        match self.config.behavior {
            ChoiceBehavior::Preference => preferred,
            ChoiceBehavior::Random => {
                if rng.gen_bool(0.5) {
                    Choice::Blue
                } else {
                    Choice::Red
                }
            }
            ChoiceBehavior::Conform { explore } => {
                if role == fd_core::Role::Minority {
                    return preferred;
                }
                if rng.gen_bool(explore.clamp(0.0, 1.0)) {
                    return Choice::Blue;
                }
                match session.neighbor_colors_in_round(round.saturating_sub(1), node) {
                    Some((blue, red)) if blue > red => Choice::Blue,
                    Some(_) => Choice::Red,
                    None => preferred, // first round: no history yet
                }
            }
        }
    }
}
