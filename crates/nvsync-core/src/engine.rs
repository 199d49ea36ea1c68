use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::mesh::{LayerField, MeshField, MeshLayerSpec, MeshLoadOptions};
use crate::volume::{LoadableVolumeOptions, VolumeField};

/// Opaque identifier of a live engine resource.
pub type HandleId = Uuid;

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum EngineError {
    #[error("failed to load '{locator}': {reason}")]
    Load { locator: String, reason: String },

    #[error("no live resource with handle {handle}")]
    UnknownHandle { handle: HandleId },

    #[error("engine rejected the call: {reason}")]
    Rejected { reason: String },
}

/// The capabilities the reconciler needs from the visualization engine.
///
/// Loads are asynchronous (network fetch and decode); everything else is an
/// immediate write to live engine state.
#[async_trait]
pub trait Engine: Send + Sync {
    // ── Volumes ──────────────────────────────────────────────────────

    /// Load a volume with its loadable attributes. The new volume is appended
    /// to the end of the engine's volume list.
    async fn load_volume(
        &self,
        locator: &str,
        options: &LoadableVolumeOptions,
    ) -> Result<HandleId, EngineError>;

    /// Release a live volume. Called at most once per handle.
    fn unload_volume(&self, handle: HandleId) -> Result<(), EngineError>;

    fn set_volume_field(&self, handle: HandleId, field: &VolumeField) -> Result<(), EngineError>;

    /// Make `modulator` modulate `target`, or clear the relationship with `None`.
    fn set_modulation(&self, target: HandleId, modulator: Option<HandleId>) -> Result<(), EngineError>;

    /// Put the engine's volume list in the given order (first = bottom).
    fn reorder_volumes(&self, order: &[HandleId]) -> Result<(), EngineError>;

    // ── Meshes ───────────────────────────────────────────────────────

    async fn load_mesh(&self, locator: &str, options: &MeshLoadOptions) -> Result<HandleId, EngineError>;

    fn unload_mesh(&self, handle: HandleId) -> Result<(), EngineError>;

    fn set_mesh_field(&self, handle: HandleId, field: &MeshField) -> Result<(), EngineError>;

    async fn load_mesh_layer(&self, mesh: HandleId, layer: &MeshLayerSpec) -> Result<HandleId, EngineError>;

    fn unload_mesh_layer(&self, mesh: HandleId, layer: HandleId) -> Result<(), EngineError>;

    fn set_mesh_layer_field(
        &self,
        mesh: HandleId,
        layer: HandleId,
        field: &LayerField,
    ) -> Result<(), EngineError>;

    // ── Options ──────────────────────────────────────────────────────

    /// Shallow-merge entries into the options record the engine reads passively.
    fn merge_options(&self, patch: &Map<String, Value>) -> Result<(), EngineError>;

    fn set_crosshair_color(&self, rgba: [f32; 4]) -> Result<(), EngineError>;

    fn set_crosshair_width(&self, width: f32) -> Result<(), EngineError>;

    fn set_vol_scale_multiplier(&self, multiplier: f32) -> Result<(), EngineError>;

    fn set_overlay_outline_width(&self, width: f32) -> Result<(), EngineError>;
}
