//! # nvsync Sim
//!
//! An in-memory stand-in for the viewer engine. It keeps live volumes,
//! meshes and options the way the real engine would, records every call in a
//! journal, and can be scripted to fail loads or hold them in flight.
//!
//! Live state is exposed as JSON-serializable snapshots, the same shape the
//! browser harness reads back from the page.

pub mod journal;
pub mod gate;
pub mod snapshot;
pub mod engine;

pub use engine::MemoryEngine;
pub use gate::LoadGate;
pub use journal::EngineCall;
pub use snapshot::{LayerSnapshot, MeshSnapshot, SetterSnapshot, VolumeSnapshot};
