// run-scoped shared context: one session, one network, one group

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fd_dropout::{DropoutPolicy, DropoutTracker, TimeoutOutcome};
use crate::fd_generator;
use crate::fd_grouper::{ArrivalGrouper, ArrivalOutcome, GroupPhase, RoleAssigner};
use crate::fd_interface::{
    Choice, Event, EventSink, NoOpSink, NodeId, Participant, ParticipantId, Role, RoundNumber,
};
use crate::fd_network::{NetworkLoadError, NetworkSpec};
use crate::fd_payoff::{PayoffEngine, RewardParams, RoundPayoffs};

// ============================================================================
// Configuration
// ============================================================================

/// Page deadlines, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Introduction stage (default: 420)
    pub introduction_secs: u64,

    /// Comprehension test (default: 180)
    pub comprehension_secs: u64,

    /// Decision and results pages (default: 120)
    pub decision_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            introduction_secs: 420,
            comprehension_secs: 180,
            decision_secs: 120,
        }
    }
}

/// Point-to-currency conversion for the final payout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Points per euro for majority players (default: 85)
    pub points_per_euro_majority: f64,

    /// Points per euro for minority players (default: 22)
    pub points_per_euro_minority: f64,

    /// Show-up fee in euros; also the payout floor (default: 2.50)
    pub base_payment: f64,

    /// Payout ceiling in euros (default: 5.50)
    pub max_payment: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            points_per_euro_majority: 85.0,
            points_per_euro_minority: 22.0,
            base_payment: 2.5,
            max_payment: 5.5,
        }
    }
}

/// Configuration for one experimental run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Number of participants needed to populate the network (default: 10).
    /// When a predefined condition is loaded, its size is ground truth.
    pub group_size: usize,

    /// Number of decision rounds (default: 12)
    pub num_rounds: RoundNumber,

    /// Named predefined network; `None` generates one at formation time
    pub network_condition: Option<String>,

    /// Directory holding `network_<condition>.json` files
    pub networks_dir: PathBuf,

    /// Target edge density for generated networks (default: 0.30)
    pub edge_probability: f64,

    /// Target minority share (default: 0.30)
    pub minority_fraction: f64,

    pub rewards: RewardParams,

    pub dropout_policy: DropoutPolicy,

    pub timeouts: TimeoutConfig,

    pub conversion: ConversionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            group_size: 10,
            num_rounds: 12,
            network_condition: None,
            networks_dir: PathBuf::from("networks"),
            edge_probability: 0.30,
            minority_fraction: 0.30,
            rewards: RewardParams::default(),
            dropout_policy: DropoutPolicy::FailGroup { min_participation: 0.5 },
            timeouts: TimeoutConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

// ============================================================================
// Errors and Results
// ============================================================================

#[derive(Debug)]
pub enum SessionError {
    /// Named network condition missing or malformed: fatal, never defaulted
    Network(NetworkLoadError),

    /// Round operations require a formed group
    GroupNotFormed,

    /// The group-failure gate has tripped; no further rounds
    GroupFailed,

    /// All configured rounds have been played
    RoundsExhausted,

    /// A round is already collecting choices
    RoundAlreadyOpen,

    /// No round is currently collecting choices
    NoActiveRound,

    UnknownParticipant(ParticipantId),

    /// Participant never received a network slot
    NotPlaced(ParticipantId),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Network(e) => write!(f, "network configuration error: {}", e),
            SessionError::GroupNotFormed => write!(f, "group has not formed yet"),
            SessionError::GroupFailed => write!(f, "group has failed"),
            SessionError::RoundsExhausted => write!(f, "all rounds have been played"),
            SessionError::RoundAlreadyOpen => write!(f, "a round is already open"),
            SessionError::NoActiveRound => write!(f, "no round is open"),
            SessionError::UnknownParticipant(id) => write!(f, "unknown participant {}", id),
            SessionError::NotPlaced(id) => write!(f, "participant {} holds no network slot", id),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NetworkLoadError> for SessionError {
    fn from(e: NetworkLoadError) -> Self {
        SessionError::Network(e)
    }
}

/// Where an arrival ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalDisposition {
    /// Pooled; waiting for the group to complete
    Waiting,

    /// This arrival completed the group
    GroupFormedNow,

    /// Excess arrival, routed to the exit path
    Overflow,
}

/// Outcome of processing one arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrival {
    pub participant: ParticipantId,
    pub role: Role,
    pub disposition: ArrivalDisposition,
}

/// Barrier state of the open round after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundProgress {
    /// Still waiting on this many active participants
    Pending { awaiting: usize },

    /// Every active participant resolved; payoffs are in the history
    Resolved { round: RoundNumber },

    /// The group failed mid-round; the round computes no payoffs
    Aborted { round: RoundNumber },
}

/// Resolved round: the choice vector that was in force and the payoffs it
/// produced. Derived data - recomputable from the spec and choices.
#[derive(Debug, Clone)]
pub struct RoundRecord {
    pub number: RoundNumber,
    pub choices: HashMap<NodeId, Choice>,
    pub payoffs: RoundPayoffs,
}

/// Final payment for one participant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payout {
    pub points: f64,
    pub euros: f64,
    pub bonus: f64,
}

struct RoundState {
    number: RoundNumber,
    choices: HashMap<NodeId, Choice>,
}

// ============================================================================
// Session
// ============================================================================

/// The single shared context of one experimental run.
///
/// Owns the immutable [`NetworkSpec`], the grouping state machine, the
/// dropout tracker and the payoff engine, and exposes an event-driven API:
/// every external happening (an arrival, a choice submission, a timeout) is
/// one synchronous `&mut self` call. Callers serving concurrent requests
/// wrap the session in a mutex; each call is then an atomic evaluation, which
/// is exactly the single-writer critical section group formation requires.
pub struct Session {
    config: SessionConfig,
    spec: Arc<NetworkSpec>,
    engine: PayoffEngine,
    grouper: ArrivalGrouper,
    tracker: DropoutTracker,
    assigner: RoleAssigner,
    participants: HashMap<ParticipantId, Participant>,
    /// node -> participant, built once at formation
    by_node: HashMap<NodeId, ParticipantId>,
    next_position: u64,
    current: Option<RoundState>,
    history: Vec<RoundRecord>,
    events: Box<dyn EventSink>,
}

impl Session {
    /// Set up a run: load the named network condition, or generate a network
    /// for the configured group size. A missing or malformed condition is a
    /// fatal configuration error - there is no silent default network.
    pub fn new<R: Rng>(config: SessionConfig, rng: &mut R) -> Result<Self, SessionError> {
        Self::with_sink(config, rng, Box::new(NoOpSink))
    }

    pub fn with_sink<R: Rng>(
        config: SessionConfig,
        rng: &mut R,
        events: Box<dyn EventSink>,
    ) -> Result<Self, SessionError> {
        let spec = match &config.network_condition {
            Some(condition) => {
                Arc::new(NetworkSpec::load_condition(&config.networks_dir, condition)?)
            }
            None => {
                info!(
                    "no network condition specified; generating a connected graph for {} players",
                    config.group_size
                );
                Arc::new(fd_generator::generate(
                    config.group_size,
                    config.edge_probability,
                    config.minority_fraction,
                    rng,
                ))
            }
        };

        let engine = PayoffEngine::new(Arc::clone(&spec), config.rewards);
        let grouper = ArrivalGrouper::new(Arc::clone(&spec), config.group_size);
        // the spec, not the configured size, is ground truth for the gate too
        let tracker = DropoutTracker::new(config.dropout_policy, spec.len());
        let assigner = RoleAssigner::new(config.minority_fraction);

        Ok(Self {
            config,
            spec,
            engine,
            grouper,
            tracker,
            assigner,
            participants: HashMap::new(),
            by_node: HashMap::new(),
            next_position: 0,
            current: None,
            history: Vec::new(),
            events,
        })
    }

    // ===== Arrival handling =====

    /// A consenting participant arrives: assign a role (minority
    /// oversampling), then evaluate grouping.
    pub fn arrive<R: Rng>(&mut self, label: &str, rng: &mut R) -> Arrival {
        let position = self.next_position + 1;
        let role = self.assigner.assign(position, rng);
        self.arrive_with_role(label, role)
    }

    /// Arrival with a role already assigned upstream (e.g. by the consent
    /// stage of a different deployment)
    pub fn arrive_with_role(&mut self, label: &str, role: Role) -> Arrival {
        self.next_position += 1;
        let id = self.next_position;
        self.events.log(0, Event::RoleAssigned { participant: id, role });

        self.participants.insert(id, Participant::new(id, label, role));

        let disposition = match self.grouper.arrive(id, role) {
            ArrivalOutcome::Waiting => {
                let (majority, minority) = self.grouper.waiting_counts();
                self.events.log(
                    0,
                    Event::ParticipantPooled { participant: id, role, waiting: majority + minority },
                );
                ArrivalDisposition::Waiting
            }
            ArrivalOutcome::Overflow => {
                self.route_to_exit(id);
                self.events.log(0, Event::OverflowRouted { participant: id });
                ArrivalDisposition::Overflow
            }
            ArrivalOutcome::Formed { placements, stranded } => {
                for placement in &placements {
                    if let Some(p) = self.participants.get_mut(&placement.participant) {
                        p.node = Some(placement.node);
                    }
                    self.by_node.insert(placement.node, placement.participant);
                }
                // pooled but unselected participants can never be placed now
                for straggler in stranded {
                    self.route_to_exit(straggler);
                    self.events.log(0, Event::StrandedExited { participant: straggler });
                }
                self.events.log(0, Event::GroupFormed { size: placements.len() });
                ArrivalDisposition::GroupFormedNow
            }
        };

        Arrival { participant: id, role, disposition }
    }

    fn route_to_exit(&mut self, id: ParticipantId) {
        if let Some(p) = self.participants.get_mut(&id) {
            p.exit_early = true;
            p.is_dropout = true;
        }
    }

    // ===== Round flow =====

    /// Open the next round's choice collection
    pub fn begin_round(&mut self) -> Result<RoundNumber, SessionError> {
        if self.grouper.phase() != GroupPhase::Formed {
            return Err(SessionError::GroupNotFormed);
        }
        if self.tracker.failed() {
            return Err(SessionError::GroupFailed);
        }
        if self.current.is_some() {
            return Err(SessionError::RoundAlreadyOpen);
        }

        let number = self.history.len() as RoundNumber + 1;
        if number > self.config.num_rounds {
            return Err(SessionError::RoundsExhausted);
        }

        self.current = Some(RoundState { number, choices: HashMap::new() });
        Ok(number)
    }

    /// Record a choice submission and advance the round barrier.
    ///
    /// Submissions from dropouts are absorbed without effect: per-participant
    /// failures never disturb other participants' progress.
    pub fn submit_choice(
        &mut self,
        participant: ParticipantId,
        choice: Choice,
    ) -> Result<RoundProgress, SessionError> {
        if self.current.is_none() {
            return Err(SessionError::NoActiveRound);
        }
        let p = self
            .participants
            .get(&participant)
            .ok_or(SessionError::UnknownParticipant(participant))?;
        let node = p.node.ok_or(SessionError::NotPlaced(participant))?;

        if !p.is_dropout {
            if let Some(round) = self.current.as_mut() {
                round.choices.insert(node, choice);
            }
        }

        Ok(self.advance_barrier())
    }

    /// A response deadline expired for this participant. Resolution follows
    /// the run's dropout policy; the event is absorbed, never an error.
    pub fn note_timeout<R: Rng>(
        &mut self,
        participant: ParticipantId,
        rng: &mut R,
    ) -> Result<RoundProgress, SessionError> {
        let round_number = self.current.as_ref().map(|r| r.number).unwrap_or(0);
        let p = self
            .participants
            .get(&participant)
            .ok_or(SessionError::UnknownParticipant(participant))?;
        let node = p.node.ok_or(SessionError::NotPlaced(participant))?;
        let role = p.role;
        let already_dropout = p.is_dropout;

        let was_failed = self.tracker.failed();
        match self.tracker.note_timeout(role, already_dropout, rng) {
            TimeoutOutcome::MarkedDropout { .. } => {
                if let Some(p) = self.participants.get_mut(&participant) {
                    p.is_dropout = true;
                }
                self.events.log(
                    round_number,
                    Event::DropoutMarked {
                        participant,
                        inactive: self.tracker.inactive_count(),
                    },
                );
            }
            TimeoutOutcome::AlreadyDropout { .. } => {}
            TimeoutOutcome::AutoFilled { choice } => {
                if let Some(round) = self.current.as_mut() {
                    round.choices.insert(node, choice);
                    self.events
                        .log(round_number, Event::ChoiceAutoFilled { participant, choice });
                }
            }
        }

        if !was_failed && self.tracker.failed() {
            self.events.log(
                round_number,
                Event::GroupFailed {
                    active: self.tracker.active_count(),
                    minimum: self.failure_minimum(),
                },
            );
            // a failed group computes no further payoffs
            if let Some(round) = self.current.take() {
                return Ok(RoundProgress::Aborted { round: round.number });
            }
        }

        Ok(self.advance_barrier())
    }

    /// Join barrier: the round resolves only once every active participant
    /// has submitted (or been timed out). Payoffs are computed exactly once.
    fn advance_barrier(&mut self) -> RoundProgress {
        let round = match &self.current {
            Some(r) => r,
            None => return RoundProgress::Pending { awaiting: 0 },
        };

        let active: HashSet<NodeId> = self
            .participants
            .values()
            .filter(|p| p.is_active())
            .filter_map(|p| p.node)
            .collect();

        let awaiting = active
            .iter()
            .filter(|node| !round.choices.contains_key(*node))
            .count();
        if awaiting > 0 {
            return RoundProgress::Pending { awaiting };
        }

        // barrier down: compute payoffs over the fixed topology
        let payoffs = self.engine.compute_round_payoffs(&round.choices, &active);
        for (node, payoff) in &payoffs {
            if let Some(id) = self.by_node.get(node) {
                if let Some(p) = self.participants.get_mut(id) {
                    p.points += payoff;
                }
            }
        }

        let blue = active
            .iter()
            .filter(|n| round.choices.get(*n).is_some_and(|c| c.is_blue()))
            .count();
        let red = active.len() - blue;
        let number = round.number;
        self.events.log(number, Event::RoundResolved { round: number, blue, red });

        let record = RoundRecord {
            number,
            choices: self.current.take().map(|r| r.choices).unwrap_or_default(),
            payoffs,
        };
        self.history.push(record);

        RoundProgress::Resolved { round: number }
    }

    fn failure_minimum(&self) -> usize {
        let fraction = match self.tracker.policy() {
            DropoutPolicy::FailGroup { min_participation } => min_participation,
            DropoutPolicy::AutoFill { .. } => 0.0,
        };
        (self.spec.len() as f64 * fraction).round() as usize
    }

    // ===== Queries =====

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn spec(&self) -> &Arc<NetworkSpec> {
        &self.spec
    }

    pub fn engine(&self) -> &PayoffEngine {
        &self.engine
    }

    pub fn phase(&self) -> GroupPhase {
        self.grouper.phase()
    }

    pub fn failed(&self) -> bool {
        self.tracker.failed()
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participant_at(&self, node: NodeId) -> Option<&Participant> {
        self.by_node.get(&node).and_then(|id| self.participants.get(id))
    }

    /// Placed, non-dropout participants
    pub fn active_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_active()).count()
    }

    pub fn current_round(&self) -> Option<RoundNumber> {
        self.current.as_ref().map(|r| r.number)
    }

    pub fn rounds_played(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Blue/red counts among a node's currently-active neighbors in a past
    /// round, for the "what your neighbors wore last time" display
    pub fn neighbor_colors_in_round(
        &self,
        round: RoundNumber,
        node: NodeId,
    ) -> Option<(usize, usize)> {
        let record = self
            .history
            .iter()
            .find(|r| r.number == round)?;

        let mut blue = 0;
        let mut red = 0;
        for neighbor in self.spec.neighbors(node) {
            let active = self
                .participant_at(neighbor)
                .map_or(false, |p| !p.is_dropout);
            if !active {
                continue;
            }
            match record.choices.get(&neighbor) {
                Some(Choice::Blue) => blue += 1,
                Some(Choice::Red) => red += 1,
                None => {}
            }
        }
        Some((blue, red))
    }

    /// Page deadline for a participant; dropouts and failed groups get the
    /// instant timeout so they click through without holding anyone up
    pub fn timeout_seconds(&self, participant: ParticipantId, normal_secs: u64) -> u64 {
        let is_dropout = self
            .participants
            .get(&participant)
            .map_or(true, |p| p.is_dropout);
        self.tracker.timeout_seconds(is_dropout, normal_secs)
    }

    /// Final payment: convert accumulated points at the role-specific rate,
    /// clamp between the base and maximum payment, and pay the excess over
    /// the base as a bonus.
    pub fn payout(&self, participant: ParticipantId) -> Result<Payout, SessionError> {
        let p = self
            .participants
            .get(&participant)
            .ok_or(SessionError::UnknownParticipant(participant))?;

        let rate = match p.role {
            Role::Majority => self.config.conversion.points_per_euro_majority,
            Role::Minority => self.config.conversion.points_per_euro_minority,
        };

        let euros = (p.points / rate)
            .min(self.config.conversion.max_payment)
            .max(self.config.conversion.base_payment);
        let bonus = (euros - self.config.conversion.base_payment).max(0.0);

        Ok(Payout { points: p.points, euros, bonus })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const EPS: f64 = 1e-9;

    fn small_config() -> SessionConfig {
        SessionConfig {
            group_size: 4,
            num_rounds: 3,
            minority_fraction: 0.25,
            ..SessionConfig::default()
        }
    }

    /// Build a formed group of 1 minority + 3 majority; returns the session
    /// and the participant ids in arrival order.
    fn formed_session(rng: &mut StdRng) -> (Session, Vec<ParticipantId>) {
        let mut session = Session::new(small_config(), rng).unwrap();
        assert_eq!(session.spec().minority_count(), 1);

        let mut ids = Vec::new();
        let a = session.arrive_with_role("p-min", Role::Minority);
        ids.push(a.participant);
        assert_eq!(a.disposition, ArrivalDisposition::Waiting);

        for label in ["p-maj-1", "p-maj-2"] {
            let a = session.arrive_with_role(label, Role::Majority);
            assert_eq!(a.disposition, ArrivalDisposition::Waiting);
            ids.push(a.participant);
        }
        let a = session.arrive_with_role("p-maj-3", Role::Majority);
        assert_eq!(a.disposition, ArrivalDisposition::GroupFormedNow);
        ids.push(a.participant);

        assert_eq!(session.phase(), GroupPhase::Formed);
        (session, ids)
    }

    fn submit_preferred(session: &mut Session, id: ParticipantId) -> RoundProgress {
        let role = session.participant(id).unwrap().role;
        session.submit_choice(id, role.preferred_choice()).unwrap()
    }

    #[test]
    fn group_forms_only_when_roles_are_covered() {
        let mut rng = StdRng::seed_from_u64(42);
        let (session, ids) = formed_session(&mut rng);

        // every participant holds a slot matching their role
        for id in &ids {
            let p = session.participant(*id).unwrap();
            let node = p.node.expect("placed");
            assert_eq!(session.spec().role(node), p.role);
        }
    }

    #[test]
    fn post_formation_arrivals_overflow_to_exit() {
        let mut rng = StdRng::seed_from_u64(42);
        let (mut session, _) = formed_session(&mut rng);

        let late = session.arrive_with_role("p-late", Role::Majority);
        assert_eq!(late.disposition, ArrivalDisposition::Overflow);

        let p = session.participant(late.participant).unwrap();
        assert!(p.exit_early);
        assert!(p.is_dropout);
        assert!(p.node.is_none());

        // exits still get the base payment, nothing more
        let payout = session.payout(late.participant).unwrap();
        assert!((payout.euros - 2.5).abs() < EPS);
        assert_eq!(payout.bonus, 0.0);
    }

    #[test]
    fn round_barrier_waits_for_every_active_participant() {
        let mut rng = StdRng::seed_from_u64(7);
        let (mut session, ids) = formed_session(&mut rng);

        assert_eq!(session.begin_round().unwrap(), 1);

        assert_eq!(submit_preferred(&mut session, ids[0]), RoundProgress::Pending { awaiting: 3 });
        assert_eq!(submit_preferred(&mut session, ids[1]), RoundProgress::Pending { awaiting: 2 });
        assert_eq!(submit_preferred(&mut session, ids[2]), RoundProgress::Pending { awaiting: 1 });
        assert_eq!(submit_preferred(&mut session, ids[3]), RoundProgress::Resolved { round: 1 });

        assert_eq!(session.rounds_played(), 1);
        // minority following its preference earns e = 10 points
        assert!((session.participant(ids[0]).unwrap().points - 10.0).abs() < EPS);
        // everyone earned something this round
        for id in &ids {
            assert!(session.participant(*id).unwrap().points > 0.0);
        }
    }

    #[test]
    fn payoffs_are_recorded_per_round() {
        let mut rng = StdRng::seed_from_u64(7);
        let (mut session, ids) = formed_session(&mut rng);

        session.begin_round().unwrap();
        for id in &ids {
            submit_preferred(&mut session, *id);
        }

        let record = &session.history()[0];
        assert_eq!(record.number, 1);
        assert_eq!(record.choices.len(), 4);
        assert_eq!(record.payoffs.len(), 4);

        let minority_node = session.participant(ids[0]).unwrap().node.unwrap();
        assert!((record.payoffs[&minority_node] - 10.0).abs() < EPS);

        // previous-round neighbor colors are available for the next page
        let (blue, red) = session.neighbor_colors_in_round(1, minority_node).unwrap();
        assert_eq!(blue + red, session.spec().degree(minority_node));
    }

    #[test]
    fn timeout_marks_dropout_and_releases_the_barrier() {
        let mut rng = StdRng::seed_from_u64(9);
        let (mut session, ids) = formed_session(&mut rng);

        session.begin_round().unwrap();
        submit_preferred(&mut session, ids[0]);
        submit_preferred(&mut session, ids[1]);
        submit_preferred(&mut session, ids[2]);

        // the last participant times out instead of submitting; the barrier
        // must come down without them
        let progress = session.note_timeout(ids[3], &mut rng).unwrap();
        assert_eq!(progress, RoundProgress::Resolved { round: 1 });

        let p = session.participant(ids[3]).unwrap();
        assert!(p.is_dropout);
        assert_eq!(p.points, 0.0);
        assert_eq!(session.timeout_seconds(ids[3], 120), 1);
        assert!(!session.failed());
    }

    #[test]
    fn group_failure_is_terminal_and_gates_rounds() {
        let mut rng = StdRng::seed_from_u64(13);
        let (mut session, ids) = formed_session(&mut rng);

        // minimum = round(4 * 0.5) = 2; failing needs active < 2
        session.begin_round().unwrap();
        session.note_timeout(ids[1], &mut rng).unwrap();
        session.note_timeout(ids[2], &mut rng).unwrap();
        assert!(!session.failed());

        let progress = session.note_timeout(ids[3], &mut rng).unwrap();
        assert_eq!(progress, RoundProgress::Aborted { round: 1 });
        assert!(session.failed());

        // the aborted round computed no payoffs
        assert_eq!(session.rounds_played(), 0);
        assert!(matches!(session.begin_round(), Err(SessionError::GroupFailed)));

        // a "returning" dropout does not clear the failure
        let _ = session.submit_choice(ids[1], Choice::Red);
        assert!(session.failed());
    }

    #[test]
    fn dropout_submissions_are_absorbed() {
        let mut rng = StdRng::seed_from_u64(17);
        let (mut session, ids) = formed_session(&mut rng);

        session.begin_round().unwrap();
        session.note_timeout(ids[0], &mut rng).unwrap();

        // the dropout "returns" and submits; the round must not count it
        let progress = session.submit_choice(ids[0], Choice::Blue).unwrap();
        assert_eq!(progress, RoundProgress::Pending { awaiting: 3 });
        assert!(session.participant(ids[0]).unwrap().is_dropout);
    }

    #[test]
    fn auto_fill_policy_completes_rounds_without_failing() {
        let mut rng = StdRng::seed_from_u64(21);
        let config = SessionConfig {
            dropout_policy: DropoutPolicy::AutoFill { minority_fraction: 0.25 },
            ..small_config()
        };
        let mut session = Session::new(config, &mut rng).unwrap();

        session.arrive_with_role("m", Role::Minority);
        session.arrive_with_role("a", Role::Majority);
        session.arrive_with_role("b", Role::Majority);
        session.arrive_with_role("c", Role::Majority);
        assert_eq!(session.phase(), GroupPhase::Formed);

        session.begin_round().unwrap();
        // nobody submits; every deadline expires
        let mut progress = RoundProgress::Pending { awaiting: 4 };
        for id in 1..=4 {
            progress = session.note_timeout(id, &mut rng).unwrap();
        }
        assert_eq!(progress, RoundProgress::Resolved { round: 1 });
        assert!(!session.failed());
        // auto-filled participants are still in the game
        assert_eq!(session.active_count(), 4);
        // the minority's filled choice is its preferred color
        let minority_node = session.participant(1).unwrap().node.unwrap();
        assert_eq!(session.history()[0].choices[&minority_node], Choice::Blue);
    }

    #[test]
    fn payout_converts_clamps_and_pays_bonus() {
        let mut rng = StdRng::seed_from_u64(25);
        let (mut session, ids) = formed_session(&mut rng);

        // three full-preference rounds
        for _ in 0..3 {
            session.begin_round().unwrap();
            for id in &ids {
                submit_preferred(&mut session, *id);
            }
        }
        assert!(matches!(session.begin_round(), Err(SessionError::RoundsExhausted)));

        // minority: 30 points at 22 pts/euro = 1.36 euros, floored to base
        let minority = session.payout(ids[0]).unwrap();
        assert!((minority.points - 30.0).abs() < EPS);
        assert!((minority.euros - 2.5).abs() < EPS);
        assert_eq!(minority.bonus, 0.0);

        // a majority conformist collects at least s = 15 per round
        let majority = session.payout(ids[1]).unwrap();
        assert!(majority.points >= 45.0 - EPS);
        assert!(majority.euros >= 2.5 && majority.euros <= 5.5);
        assert!((majority.bonus - (majority.euros - 2.5)).abs() < EPS);
    }
}
