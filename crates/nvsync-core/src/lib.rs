//! # nvsync Core
//!
//! Declarative configuration schema for a NiiVue-style viewer (volumes, meshes,
//! mesh overlay layers, viewer options) and the reconciler that converges the
//! engine's live resources onto a submitted configuration with the fewest
//! imperative calls.
//!
//! The engine itself is external and reached only through the [`Engine`] trait.

pub mod locator;
pub mod volume;
pub mod mesh;
pub mod options;
pub mod config;
pub mod engine;
pub mod strategy;
pub mod state;
pub mod live;
pub mod report;
pub mod reconciler;

pub use config::{ConfigIssue, SchemaError, ViewerConfig};
pub use engine::{Engine, EngineError, HandleId};
pub use locator::{display_name, Located, ResourceKind};
pub use mesh::{LayerField, MeshField, MeshLayerSpec, MeshLoadOptions, MeshSpec};
pub use options::ViewerOptions;
pub use reconciler::Reconciler;
pub use report::{PassOutcome, PassReport, PassStats, ReconcileError, ReportSink, Severity};
pub use state::{ResourceKey, ResourceState};
pub use volume::{LoadableVolumeOptions, VolumeField, VolumeSpec};
