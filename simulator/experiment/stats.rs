// Experiment Simulator Statistics

use fd_core::{ParticipantId, Role};
use indexmap::IndexMap;

/// Final payment line for one group member
#[derive(Debug, Clone, Copy)]
pub struct PayoutLine {
    pub role: Role,
    pub points: f64,
    pub euros: f64,
    pub bonus: f64,
    pub dropped_out: bool,
}

/// Complete result of one simulated session
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    /// Seed the run was driven with
    pub seed_used: u64,

    /// Arrivals consumed before the group formed
    pub formed_after: usize,

    /// Arrivals routed to the exit path (overflow + stranded)
    pub exited_early: usize,

    pub rounds_played: usize,

    /// Whether the group-failure gate tripped
    pub failed: bool,

    /// Group members flagged as dropouts by the end
    pub dropouts: usize,

    /// Share of active players wearing Blue, per resolved round
    pub adoption_per_round: Vec<f64>,

    /// Payouts in network-slot order
    pub payouts: IndexMap<ParticipantId, PayoutLine>,
}

impl ExperimentOutcome {
    pub fn print_summary(&self) {
        println!("  seed:            {:#x}", self.seed_used);
        println!("  group formed:    after {} arrivals", self.formed_after);
        println!("  exited early:    {}", self.exited_early);
        println!(
            "  rounds played:   {}{}",
            self.rounds_played,
            if self.failed { "  (GROUP FAILED)" } else { "" }
        );
        println!("  dropouts:        {}", self.dropouts);

        if !self.adoption_per_round.is_empty() {
            let curve: Vec<String> = self
                .adoption_per_round
                .iter()
                .map(|a| format!("{:.0}%", a * 100.0))
                .collect();
            println!("  blue adoption:   {}", curve.join(" -> "));
        }

        println!("  payouts:");
        for (id, line) in &self.payouts {
            println!(
                "    P{:<3} [{:<4}] {:>6.1} pts -> {:.2} EUR (bonus {:.2}){}",
                id,
                line.role.label(),
                line.points,
                line.euros,
                line.bonus,
                if line.dropped_out { "  [dropout]" } else { "" }
            );
        }
    }
}
