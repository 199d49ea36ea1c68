//! # nvsync Harness
//!
//! String-in, JSON-out command surface over the reconciler and the in-memory
//! engine, plus a script runner used by the `nvsync-harness` binary.

pub mod settings;
pub mod harness;
pub mod script;

pub use harness::{Harness, PassSummary};
pub use script::{parse_script, replay, Step, StepOutcome};
pub use settings::{FailingLoad, HarnessSettings, SettingsError};
