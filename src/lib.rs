//! # fd_core - "Fashion Dilemma" experiment core
//!
//! A Rust implementation of the grouping and payoff machinery behind a
//! networked social-science experiment: participants arrive asynchronously,
//! are assigned majority/minority roles, get slotted into a fixed social
//! network, and are paid each round by a neighbor-coordination-dependent
//! utility function.
//!
//! ## Core Components
//!
//! - **NetworkSpec**: immutable adjacency + role-vector description of the
//!   social network, loaded from a condition file or generated
//! - **ArrivalGrouper**: state machine assembling exactly one group from
//!   unreliable arrivals (waiting pool, formation, overflow)
//! - **PayoffEngine**: per-round utilities over the fixed topology, plus the
//!   shared derivation behind the payoff table and comprehension quiz
//! - **DropoutTracker**: timeout bookkeeping, group-failure gate or
//!   auto-fill fallback
//! - **Session**: the run-scoped shared context tying it all together
//!
//! ## Usage with a Page Server
//!
//! This library is transport-agnostic. The hosting page server owns the
//! request/response cycle and feeds each external event into the session:
//!
//! ```no_run
//! use fd_core::{Session, SessionConfig};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let mut session = Session::new(SessionConfig::default(), &mut rng)?;
//!
//! // On each consenting arrival:
//! let arrival = session.arrive("prolific-123", &mut rng);
//!
//! // Once formed, per round:
//! // - session.begin_round()
//! // - session.submit_choice(id, choice) per submission
//! // - session.note_timeout(id, &mut rng) per expired deadline
//! // The round resolves itself when the last active participant is in.
//! # Ok::<(), fd_core::SessionError>(())
//! ```
//!
//! ## Testing and Simulation
//!
//! For driving whole sessions without a page server, see the separate
//! simulator in `simulator/`: a YAML-scenario runner that schedules
//! arrivals, choices and timeouts against a session.

// Core experiment modules
pub mod fd_interface;
pub mod fd_network;
pub mod fd_generator;
pub mod fd_grouper;
pub mod fd_payoff;
pub mod fd_dropout;
pub mod fd_session;

// Re-export commonly used types
pub use fd_interface::{
    Choice, Event, EventSink, NoOpSink, NodeId, Participant, ParticipantId, Role, RoundNumber,
};
pub use fd_network::{NetworkError, NetworkLoadError, NetworkSpec};
pub use fd_grouper::{ArrivalGrouper, ArrivalOutcome, GroupPhase, Placement, RoleAssigner};
pub use fd_payoff::{ComprehensionKey, PayoffEngine, PayoffRow, RewardParams};
pub use fd_dropout::{DropoutPolicy, DropoutTracker, TimeoutOutcome};
pub use fd_session::{
    Arrival, ArrivalDisposition, Payout, RoundProgress, RoundRecord, Session, SessionConfig,
    SessionError,
};
