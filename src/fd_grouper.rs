// assembling one experimental group from asynchronous, unreliable arrivals

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;

use log::{info, warn};
use rand::Rng;

use crate::fd_interface::{NodeId, ParticipantId, Role};
use crate::fd_network::NetworkSpec;

/// Reserved session positions that are always assigned the minority role
/// (used to top up lacking minority slots with bots on short notice)
pub const RESERVED_MINORITY_POSITIONS: RangeInclusive<u64> = 200..=250;

/// Pre-grouping role assignment at consent time.
///
/// Entrants become minority with a probability of twice the target minority
/// share (oversampling, so the minority slots fill about as fast as the more
/// numerous majority slots), except for the reserved position band which is
/// always minority.
#[derive(Debug, Clone)]
pub struct RoleAssigner {
    p_assign_minority: f64,
}

impl RoleAssigner {
    pub fn new(minority_fraction: f64) -> Self {
        Self {
            p_assign_minority: (2.0 * minority_fraction).clamp(0.0, 1.0),
        }
    }

    pub fn assign<R: Rng>(&self, session_position: u64, rng: &mut R) -> Role {
        if RESERVED_MINORITY_POSITIONS.contains(&session_position) {
            Role::Minority
        } else if rng.gen_bool(self.p_assign_minority) {
            Role::Minority
        } else {
            Role::Majority
        }
    }
}

// ============================================================================
// Grouping State Machine
// ============================================================================

/// Where the run stands with respect to its single group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    /// Group not yet formed; arrivals pool up by role
    Waiting,

    /// Group complete and slot-assigned; any further arrival is excess
    Formed,
}

/// One participant's slot assignment at formation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub participant: ParticipantId,
    pub node: NodeId,
}

/// What happened to a single arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// Pooled; the group still lacks at least one role
    Waiting,

    /// This arrival completed the group. Carries the full slot assignment,
    /// in slot order, plus the pooled participants that were left over.
    Formed {
        placements: Vec<Placement>,
        stranded: Vec<ParticipantId>,
    },

    /// Formation already happened before this arrival; route to the exit path
    Overflow,
}

/// Consumes a stream of arriving, role-tagged participants and assembles
/// exactly one group matching the [`NetworkSpec`]'s role multiset.
///
/// Slot assignment is FIFO within role: slots are filled in index order, each
/// pulling the longest-waiting pooled participant of the role that slot
/// requires. The `Waiting -> Formed` transition happens inside a single
/// `&mut self` call; the caller owning the grouper (or the session wrapping
/// it) is the single-writer critical section the formation rule needs.
pub struct ArrivalGrouper {
    spec: Arc<NetworkSpec>,
    phase: GroupPhase,
    waiting_majority: VecDeque<ParticipantId>,
    waiting_minority: VecDeque<ParticipantId>,
}

impl ArrivalGrouper {
    /// `configured_group_size` is the session operator's expectation; when it
    /// disagrees with the spec, the spec's length is ground truth and the
    /// mismatch is logged rather than silently ignored.
    pub fn new(spec: Arc<NetworkSpec>, configured_group_size: usize) -> Self {
        if spec.len() != configured_group_size {
            warn!(
                "configured group size {} != network size {}; using the network as ground truth",
                configured_group_size,
                spec.len()
            );
        }

        Self {
            spec,
            phase: GroupPhase::Waiting,
            waiting_majority: VecDeque::new(),
            waiting_minority: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> GroupPhase {
        self.phase
    }

    pub fn spec(&self) -> &Arc<NetworkSpec> {
        &self.spec
    }

    /// Pooled participants of each role, (majority, minority)
    pub fn waiting_counts(&self) -> (usize, usize) {
        (self.waiting_majority.len(), self.waiting_minority.len())
    }

    /// Evaluate one arrival against the pool.
    ///
    /// Either pools the participant, completes the group (once, ever), or
    /// routes the arrival to overflow because the group already exists.
    pub fn arrive(&mut self, participant: ParticipantId, role: Role) -> ArrivalOutcome {
        if self.phase == GroupPhase::Formed {
            return ArrivalOutcome::Overflow;
        }

        match role {
            Role::Majority => self.waiting_majority.push_back(participant),
            Role::Minority => self.waiting_minority.push_back(participant),
        }

        self.try_form()
    }

    /// Form the group if and only if every role's requirement is covered.
    /// No partial group ever begins.
    fn try_form(&mut self) -> ArrivalOutcome {
        let need_minority = self.spec.minority_count();
        let need_majority = self.spec.majority_count();

        if self.waiting_minority.len() < need_minority
            || self.waiting_majority.len() < need_majority
        {
            return ArrivalOutcome::Waiting;
        }

        let mut placements = Vec::with_capacity(self.spec.len());
        for slot in 0..self.spec.len() {
            let pool = match self.spec.role(slot) {
                Role::Majority => &mut self.waiting_majority,
                Role::Minority => &mut self.waiting_minority,
            };
            // the requirement check above covers every slot of this role
            let participant = pool.pop_front().unwrap();
            placements.push(Placement { participant, node: slot });
        }

        let stranded: Vec<ParticipantId> = self
            .waiting_majority
            .drain(..)
            .chain(self.waiting_minority.drain(..))
            .collect();

        self.phase = GroupPhase::Formed;
        info!(
            "group formed: {} slots filled, {} pooled participant(s) left over",
            placements.len(),
            stranded.len()
        );

        ArrivalOutcome::Formed { placements, stranded }
    }
}
