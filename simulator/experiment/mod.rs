// Experiment Simulator Module

pub mod config;
pub mod stats;
pub mod runner;

// Re-export commonly used types
pub use config::{
    ExperimentConfig,
    ChoiceBehavior,
    TimeoutEvent,
};

pub use stats::{
    ExperimentOutcome,
    PayoutLine,
};

pub use runner::{ExperimentRunner, ExperimentError};
