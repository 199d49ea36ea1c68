use serde_json::{Map, Value};

use crate::engine::HandleId;
use crate::mesh::{MeshLayerSpec, MeshSpec};
use crate::volume::VolumeSpec;

/// A volume the engine currently holds.
#[derive(Debug, Clone)]
pub struct LiveVolume {
    pub handle: HandleId,
    /// What the engine was last told, field by field.
    pub applied: VolumeSpec,
    /// Modulation currently set on the engine: (modulator locator, handle).
    pub modulation: Option<(String, HandleId)>,
}

#[derive(Debug, Clone)]
pub struct LiveLayer {
    pub handle: HandleId,
    pub applied: MeshLayerSpec,
}

#[derive(Debug, Clone)]
pub struct LiveMesh {
    pub handle: HandleId,
    /// Applied mesh attributes; `applied.layers` is always empty.
    pub applied: MeshSpec,
    pub layers: Vec<LiveLayer>,
}

impl LiveVolume {
    pub fn locator(&self) -> &str {
        &self.applied.url
    }
}

impl LiveLayer {
    pub fn locator(&self) -> &str {
        &self.applied.url
    }
}

impl LiveMesh {
    pub fn locator(&self) -> &str {
        &self.applied.url
    }

    pub fn layer_index(&self, locator: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.locator() == locator)
    }
}

/// The reconciler's view of live engine state. Volume order matches the
/// engine's volume list.
#[derive(Debug, Default)]
pub struct LiveTable {
    pub volumes: Vec<LiveVolume>,
    pub meshes: Vec<LiveMesh>,
    /// Option entries last applied to the engine.
    pub options: Map<String, Value>,
}

impl LiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume_index(&self, locator: &str) -> Option<usize> {
        self.volumes.iter().position(|v| v.locator() == locator)
    }

    pub fn volume_handle(&self, locator: &str) -> Option<HandleId> {
        self.volumes.iter().find(|v| v.locator() == locator).map(|v| v.handle)
    }

    pub fn mesh_index(&self, locator: &str) -> Option<usize> {
        self.meshes.iter().position(|m| m.locator() == locator)
    }

    pub fn volume_locators(&self) -> Vec<&str> {
        self.volumes.iter().map(|v| v.locator()).collect()
    }

    pub fn mesh_locators(&self) -> Vec<&str> {
        self.meshes.iter().map(|m| m.locator()).collect()
    }
}
