// Experiment Simulator Configuration

use fd_core::{DropoutPolicy, RewardParams, RoundNumber};
use serde::Deserialize;

// ============================================================================
// Main Configuration
// ============================================================================

/// Configuration for one simulated experimental session
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentConfig {
    /// Number of participants the network needs
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Number of decision rounds
    #[serde(default = "default_num_rounds")]
    pub num_rounds: RoundNumber,

    /// Named predefined network condition; generated when absent
    #[serde(default)]
    pub network_condition: Option<String>,

    /// Directory holding network condition files
    #[serde(default = "default_networks_dir")]
    pub networks_dir: String,

    /// Edge density target for generated networks
    #[serde(default = "default_edge_probability")]
    pub edge_probability: f64,

    /// Minority share target for generated networks
    #[serde(default = "default_minority_fraction")]
    pub minority_fraction: f64,

    #[serde(default = "default_dropout_policy")]
    pub dropout_policy: DropoutPolicy,

    #[serde(default)]
    pub rewards: RewardParams,

    /// How many people are allowed into the lobby; arrivals beyond group
    /// formation exercise the overflow path
    #[serde(default = "default_lobby_size")]
    pub lobby_size: usize,

    /// How simulated players pick their color each round
    #[serde(default)]
    pub behavior: ChoiceBehavior,

    /// Scheduled silences: (round, node) pairs that time out instead of
    /// submitting
    #[serde(default)]
    pub timeouts: Vec<TimeoutEvent>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            num_rounds: default_num_rounds(),
            network_condition: None,
            networks_dir: default_networks_dir(),
            edge_probability: default_edge_probability(),
            minority_fraction: default_minority_fraction(),
            dropout_policy: default_dropout_policy(),
            rewards: RewardParams::default(),
            lobby_size: default_lobby_size(),
            behavior: ChoiceBehavior::default(),
            timeouts: Vec::new(),
        }
    }
}

fn default_group_size() -> usize {
    10
}

fn default_num_rounds() -> RoundNumber {
    12
}

fn default_networks_dir() -> String {
    "networks".to_string()
}

fn default_edge_probability() -> f64 {
    0.30
}

fn default_minority_fraction() -> f64 {
    0.30
}

fn default_dropout_policy() -> DropoutPolicy {
    DropoutPolicy::FailGroup { min_participation: 0.5 }
}

fn default_lobby_size() -> usize {
    50
}

// ============================================================================
// Player Behavior
// ============================================================================

/// Choice strategies for simulated players. Minorities always follow their
/// preference; the strategy governs the majority.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceBehavior {
    /// Everyone wears their role's preferred color
    Preference,

    /// Majority players copy last round's local majority color, wearing
    /// Blue out of curiosity with probability `explore`
    Conform { explore: f64 },

    /// Uniform coin flips
    Random,
}

impl Default for ChoiceBehavior {
    fn default() -> Self {
        ChoiceBehavior::Preference
    }
}

/// One scheduled response timeout
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimeoutEvent {
    /// Round in which the player goes silent
    pub round: RoundNumber,

    /// Network slot of the silent player
    pub node: usize,
}
