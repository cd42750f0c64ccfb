pub mod block;
pub mod config;
pub mod env;
pub mod monitor;
pub mod state;
pub mod trial;

pub use block::{BlockRunner, Factors};
pub use config::{ConfigError, DisplayConfig, ExperimentConfig, SessionConfig, TimingConfig};
pub use env::{
    ErrorSink, EyeEvent, GazeOracle, ResponseCollector, ResponseKey, ResponseKeys, ResponsePoll,
    TrialEnvironment,
};
pub use monitor::{Conformance, TrialState, monitor};
pub use state::{Tick, TrialAborted, TrialMachine, TrialOutcome};
pub use trial::{Trial, TrialDurations};
