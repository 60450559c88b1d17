// core experiment types shared by every module

use serde::{Deserialize, Serialize};

// all indices into the network adjacency matrix use this type
pub type NodeId = usize;

// session-scoped participant identity (arrival order, starting at 1)
pub type ParticipantId = u64;

pub type RoundNumber = u32;

/// Fixed, pre-assigned participant attribute determining which utility
/// formula applies. Assigned at consent time, before network placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// "Red" players: rewarded for conforming with their neighborhood
    Majority,
    /// "Blue" players: rewarded for sticking to their own color
    Minority,
}

impl Role {
    /// The shirt color this role privately prefers
    pub fn preferred_choice(&self) -> Choice {
        match self {
            Role::Majority => Choice::Red,
            Role::Minority => Choice::Blue,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Majority => "Red",
            Role::Minority => "Blue",
        }
    }
}

/// The repeated binary decision: which shirt color to wear this round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
    /// Majority-preferred color
    Red,
    /// Minority-preferred color ("adopting the unpopular norm")
    Blue,
}

impl Choice {
    pub fn is_blue(&self) -> bool {
        matches!(self, Choice::Blue)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Choice::Red => "Red",
            Choice::Blue => "Blue",
        }
    }
}

/// One participant of the experimental run.
///
/// Created at session start; `role` is fixed before network placement and
/// `node` stays unset until grouping completes. `is_dropout` is monotonic:
/// once set it is never cleared within a run.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,

    /// External identifier (e.g. the recruitment platform id)
    pub label: String,

    pub role: Role,

    /// Slot in the shared network, assigned at group formation
    pub node: Option<NodeId>,

    pub is_dropout: bool,

    /// Arrived after (or surplus to) group formation and was routed to the
    /// exit path without playing
    pub exit_early: bool,

    /// Accumulated per-round payoffs, in points
    pub points: f64,
}

impl Participant {
    pub fn new(id: ParticipantId, label: &str, role: Role) -> Self {
        Self {
            id,
            label: label.to_string(),
            role,
            node: None,
            is_dropout: false,
            exit_early: false,
            points: 0.0,
        }
    }

    /// Placed in the network and still playing
    pub fn is_active(&self) -> bool {
        self.node.is_some() && !self.is_dropout
    }
}

// ============================================================================
// Event Logging System
// ============================================================================

/// Events emitted by the experiment core for debugging and analysis
#[derive(Debug, Clone)]
pub enum Event {
    /// Role assigned to a consenting arrival
    RoleAssigned {
        participant: ParticipantId,
        role: Role,
    },
    /// Arrival pooled, group not complete yet
    ParticipantPooled {
        participant: ParticipantId,
        role: Role,
        waiting: usize,
    },
    /// The one group of the run is complete and slot-assigned
    GroupFormed { size: usize },
    /// Arrival after formation, routed to the exit path
    OverflowRouted { participant: ParticipantId },
    /// Waiting participant left stranded by formation, routed to the exit path
    StrandedExited { participant: ParticipantId },
    /// Response timeout converted a participant into a dropout
    DropoutMarked {
        participant: ParticipantId,
        inactive: usize,
    },
    /// Auto-fill policy substituted a default choice for a timeout
    ChoiceAutoFilled {
        participant: ParticipantId,
        choice: Choice,
    },
    /// Active participation dropped below the minimum; terminal
    GroupFailed { active: usize, minimum: usize },
    /// All active participants resolved; payoffs computed
    RoundResolved {
        round: RoundNumber,
        blue: usize,
        red: usize,
    },
}

/// Trait for consuming events from the experiment core
pub trait EventSink {
    fn log(&mut self, round: RoundNumber, event: Event);
}

/// No-op event sink for production use (zero overhead)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _round: RoundNumber, _event: Event) {
        // Intentionally empty - compiler should optimize this away
    }
}

/// Event sink that keeps everything in memory, for tests and analysis
#[derive(Default)]
pub struct VecSink {
    pub events: Vec<(RoundNumber, Event)>,
}

impl EventSink for VecSink {
    fn log(&mut self, round: RoundNumber, event: Event) {
        self.events.push((round, event));
    }
}
