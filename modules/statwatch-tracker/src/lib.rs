pub mod anomaly;
pub mod diff;
pub mod notify;
pub mod rollback;
pub mod runner;
pub mod scheduler;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tracker;
pub mod traits;
pub mod types;

pub use runner::{spawn, TrackerHandle};
pub use tracker::{CycleOutcome, Tracker, TrackerDeps, TrackerError, TrackerSettings, UpdateOutcome};
