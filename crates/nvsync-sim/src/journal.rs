use serde::Serialize;

use nvsync_core::{LayerField, MeshField, VolumeField};

/// One call the engine received. Handles are recorded by locator so tests
/// can assert on them without knowing handle values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EngineCall {
    LoadVolume { locator: String },
    UnloadVolume { locator: String },
    SetVolumeField { locator: String, field: VolumeField },
    SetModulation { target: String, modulator: Option<String> },
    ReorderVolumes { order: Vec<String> },
    LoadMesh { locator: String },
    UnloadMesh { locator: String },
    SetMeshField { locator: String, field: MeshField },
    LoadMeshLayer { mesh: String, locator: String },
    UnloadMeshLayer { mesh: String, locator: String },
    SetMeshLayerField { mesh: String, locator: String, field: LayerField },
    MergeOptions { keys: Vec<String> },
    SetCrosshairColor { rgba: [f32; 4] },
    SetCrosshairWidth { width: f32 },
    SetVolScaleMultiplier { multiplier: f32 },
    SetOverlayOutlineWidth { width: f32 },
}

impl EngineCall {
    pub fn is_load(&self) -> bool {
        matches!(
            self,
            EngineCall::LoadVolume { .. } | EngineCall::LoadMesh { .. } | EngineCall::LoadMeshLayer { .. }
        )
    }

    pub fn is_unload(&self) -> bool {
        matches!(
            self,
            EngineCall::UnloadVolume { .. } | EngineCall::UnloadMesh { .. } | EngineCall::UnloadMeshLayer { .. }
        )
    }

    pub fn is_field_mutation(&self) -> bool {
        matches!(
            self,
            EngineCall::SetVolumeField { .. }
                | EngineCall::SetMeshField { .. }
                | EngineCall::SetMeshLayerField { .. }
        )
    }

    pub fn is_setter(&self) -> bool {
        matches!(
            self,
            EngineCall::SetCrosshairColor { .. }
                | EngineCall::SetCrosshairWidth { .. }
                | EngineCall::SetVolScaleMultiplier { .. }
                | EngineCall::SetOverlayOutlineWidth { .. }
        )
    }
}
