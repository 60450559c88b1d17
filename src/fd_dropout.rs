// per-round timeout bookkeeping and the group-failure gate

use log::{info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fd_interface::{Choice, Role};

/// Seconds granted to a page when the participant is already out of the run;
/// keeps dropouts clicking through instantly instead of holding the barrier
pub const INSTANT_TIMEOUT_SECS: u64 = 1;

/// How the run resolves a missing response.
///
/// A run picks exactly one policy at construction and applies it throughout;
/// mixing the two within one run produces ambiguous payoff semantics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropoutPolicy {
    /// Timeouts mark dropouts; once the active count falls below
    /// `round(group_size * min_participation)` the whole group fails,
    /// terminally.
    FailGroup { min_participation: f64 },

    /// No group-failure gate: a timed-out choice is auto-filled so the round
    /// always completes. Minorities default to their preferred color;
    /// majorities default to Blue with probability `minority_fraction`,
    /// else Red.
    AutoFill { minority_fraction: f64 },
}

/// What a single timeout did to the run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeoutOutcome {
    /// Participant newly marked as dropout (fail-group policy)
    MarkedDropout { group_failed: bool },

    /// Already a dropout; counters untouched, gate re-checked
    AlreadyDropout { group_failed: bool },

    /// Auto-fill policy substituted this choice; the participant stays in
    AutoFilled { choice: Choice },
}

/// Tracks inactivity over the run.
///
/// `inactive_count` only ever grows and `failed` is terminal: a group that
/// fails stays failed even if a dropout later "returns".
pub struct DropoutTracker {
    policy: DropoutPolicy,
    group_size: usize,
    inactive_count: usize,
    failed: bool,
}

impl DropoutTracker {
    pub fn new(policy: DropoutPolicy, group_size: usize) -> Self {
        Self {
            policy,
            group_size,
            inactive_count: 0,
            failed: false,
        }
    }

    pub fn policy(&self) -> DropoutPolicy {
        self.policy
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn inactive_count(&self) -> usize {
        self.inactive_count
    }

    pub fn active_count(&self) -> usize {
        self.group_size - self.inactive_count
    }

    /// Resolve one response timeout.
    ///
    /// `already_dropout` is the participant's current flag; the caller owns
    /// the flag itself (it lives on the participant record) and sets it when
    /// this returns `MarkedDropout`.
    pub fn note_timeout<R: Rng>(
        &mut self,
        role: Role,
        already_dropout: bool,
        rng: &mut R,
    ) -> TimeoutOutcome {
        match self.policy {
            DropoutPolicy::FailGroup { min_participation } => {
                let newly_marked = !already_dropout;
                if newly_marked {
                    self.inactive_count += 1;
                    info!(
                        "participant timed out; {} of {} now inactive",
                        self.inactive_count, self.group_size
                    );
                }

                // the gate is re-evaluated on every timeout event
                let minimum = (self.group_size as f64 * min_participation).round() as usize;
                if self.active_count() < minimum && !self.failed {
                    self.failed = true;
                    warn!(
                        "group failed: {} active < minimum {}",
                        self.active_count(),
                        minimum
                    );
                }

                if newly_marked {
                    TimeoutOutcome::MarkedDropout { group_failed: self.failed }
                } else {
                    TimeoutOutcome::AlreadyDropout { group_failed: self.failed }
                }
            }
            DropoutPolicy::AutoFill { minority_fraction } => {
                let choice = match role {
                    Role::Minority => Choice::Blue,
                    Role::Majority => {
                        if rng.gen_bool(minority_fraction.clamp(0.0, 1.0)) {
                            Choice::Blue
                        } else {
                            Choice::Red
                        }
                    }
                };
                TimeoutOutcome::AutoFilled { choice }
            }
        }
    }

    /// Page timeout for a participant: instant when they are already out of
    /// the run (dropout or failed group), the normal duration otherwise.
    pub fn timeout_seconds(&self, is_dropout: bool, normal_secs: u64) -> u64 {
        if is_dropout || self.failed {
            INSTANT_TIMEOUT_SECS
        } else {
            normal_secs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn failure_gate_trips_when_active_falls_below_half() {
        // group of 4, minimum = round(4 * 0.5) = 2 active
        let mut tracker =
            DropoutTracker::new(DropoutPolicy::FailGroup { min_participation: 0.5 }, 4);
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(
            tracker.note_timeout(Role::Majority, false, &mut rng),
            TimeoutOutcome::MarkedDropout { group_failed: false }
        );
        assert_eq!(
            tracker.note_timeout(Role::Majority, false, &mut rng),
            TimeoutOutcome::MarkedDropout { group_failed: false }
        );
        assert!(!tracker.failed());

        // third dropout leaves 1 active < 2
        assert_eq!(
            tracker.note_timeout(Role::Minority, false, &mut rng),
            TimeoutOutcome::MarkedDropout { group_failed: true }
        );
        assert!(tracker.failed());
        assert_eq!(tracker.inactive_count(), 3);
    }

    #[test]
    fn failure_is_terminal_and_counters_are_monotone() {
        let mut tracker =
            DropoutTracker::new(DropoutPolicy::FailGroup { min_participation: 0.5 }, 4);
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..3 {
            tracker.note_timeout(Role::Majority, false, &mut rng);
        }
        assert!(tracker.failed());

        // an already-marked dropout timing out again changes nothing
        let outcome = tracker.note_timeout(Role::Majority, true, &mut rng);
        assert_eq!(outcome, TimeoutOutcome::AlreadyDropout { group_failed: true });
        assert_eq!(tracker.inactive_count(), 3);
        assert!(tracker.failed());
    }

    #[test]
    fn auto_fill_defaults_follow_the_role() {
        let mut tracker =
            DropoutTracker::new(DropoutPolicy::AutoFill { minority_fraction: 0.3 }, 4);
        let mut rng = StdRng::seed_from_u64(3);

        // minorities always default to their preferred color
        for _ in 0..20 {
            assert_eq!(
                tracker.note_timeout(Role::Minority, false, &mut rng),
                TimeoutOutcome::AutoFilled { choice: Choice::Blue }
            );
        }

        // majorities default to Blue at roughly the minority population rate
        let n = 10_000;
        let blue = (0..n)
            .filter(|_| {
                matches!(
                    tracker.note_timeout(Role::Majority, false, &mut rng),
                    TimeoutOutcome::AutoFilled { choice: Choice::Blue }
                )
            })
            .count();
        let share = blue as f64 / n as f64;
        assert!((share - 0.3).abs() < 0.05, "blue share {}", share);

        // no gate under this policy
        assert!(!tracker.failed());
    }

    #[test]
    fn dropouts_and_failed_groups_time_out_instantly() {
        let mut tracker =
            DropoutTracker::new(DropoutPolicy::FailGroup { min_participation: 0.5 }, 2);
        let mut rng = StdRng::seed_from_u64(4);

        assert_eq!(tracker.timeout_seconds(false, 120), 120);
        assert_eq!(tracker.timeout_seconds(true, 120), INSTANT_TIMEOUT_SECS);

        // fail the group of two with one dropout: minimum = 1, active 1 is
        // not below it - need both out
        tracker.note_timeout(Role::Majority, false, &mut rng);
        assert!(!tracker.failed());
        tracker.note_timeout(Role::Majority, false, &mut rng);
        assert!(tracker.failed());
        assert_eq!(tracker.timeout_seconds(false, 120), INSTANT_TIMEOUT_SECS);
    }
}
