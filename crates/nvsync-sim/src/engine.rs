use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use nvsync_core::{
    display_name, Engine, EngineError, HandleId, LayerField, LoadableVolumeOptions, MeshField, MeshLayerSpec,
    MeshLoadOptions, VolumeField,
};

use crate::gate::LoadGate;
use crate::journal::EngineCall;
use crate::snapshot::{LayerSnapshot, MeshSnapshot, SetterSnapshot, VolumeSnapshot};

/// Everything live in the engine.
#[derive(Debug, Default)]
struct Scene {
    volumes: Vec<VolumeSnapshot>,
    meshes: Vec<MeshSnapshot>,
    options: Map<String, Value>,
    setters: SetterSnapshot,
}

impl Scene {
    fn volume_mut(&mut self, handle: HandleId) -> Result<&mut VolumeSnapshot, EngineError> {
        self.volumes
            .iter_mut()
            .find(|v| v.id == handle)
            .ok_or(EngineError::UnknownHandle { handle })
    }

    fn volume_url(&self, handle: HandleId) -> Result<String, EngineError> {
        self.volumes
            .iter()
            .find(|v| v.id == handle)
            .map(|v| v.url.clone())
            .ok_or(EngineError::UnknownHandle { handle })
    }

    fn mesh_mut(&mut self, handle: HandleId) -> Result<&mut MeshSnapshot, EngineError> {
        self.meshes
            .iter_mut()
            .find(|m| m.id == handle)
            .ok_or(EngineError::UnknownHandle { handle })
    }

    fn layer_mut(&mut self, mesh: HandleId, layer: HandleId) -> Result<(&str, &mut LayerSnapshot), EngineError> {
        let mesh = self.mesh_mut(mesh)?;
        let layer = mesh
            .layers
            .iter_mut()
            .find(|l| l.id == layer)
            .ok_or(EngineError::UnknownHandle { handle: layer })?;
        Ok((mesh.url.as_str(), layer))
    }
}

/// Scripted misbehaviour, keyed by locator.
#[derive(Debug, Default)]
struct Faults {
    loads: HashMap<String, String>,
    updates: HashMap<String, String>,
    gates: HashMap<String, Arc<LoadGate>>,
    latency: Option<Duration>,
}

/// An engine that keeps its scene in memory.
///
/// Every call is appended to a journal. Loads can be made to fail, to take a
/// fixed latency, or to wait on a [`LoadGate`] so tests can interleave
/// submissions with in-flight loads.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    scene: Mutex<Scene>,
    journal: Mutex<Vec<EngineCall>>,
    faults: Mutex<Faults>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load takes at least `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.faults().latency = Some(latency);
        self
    }

    // ── Fault injection ──────────────────────────────────────────────

    /// Make every load of `locator` fail until cleared.
    pub fn fail_loads(&self, locator: &str, reason: &str) {
        self.faults().loads.insert(locator.to_string(), reason.to_string());
    }

    /// Make field writes on the resource at `locator` fail until cleared.
    pub fn fail_updates(&self, locator: &str, reason: &str) {
        self.faults().updates.insert(locator.to_string(), reason.to_string());
    }

    pub fn clear_faults(&self) {
        let mut faults = self.faults();
        faults.loads.clear();
        faults.updates.clear();
    }

    /// Hold the next load of `locator` in flight until the returned gate is
    /// released.
    pub fn hold_load(&self, locator: &str) -> Arc<LoadGate> {
        let gate = Arc::new(LoadGate::new());
        self.faults().gates.insert(locator.to_string(), Arc::clone(&gate));
        gate
    }

    // ── Journal ──────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<EngineCall> {
        self.journal().clone()
    }

    /// Take the journal, leaving it empty.
    pub fn drain_calls(&self) -> Vec<EngineCall> {
        std::mem::take(&mut *self.journal())
    }

    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.journal().iter().filter(|c| predicate(c)).count()
    }

    // ── Snapshots ────────────────────────────────────────────────────

    /// Live volumes in engine order (first = bottom).
    pub fn volumes(&self) -> Vec<VolumeSnapshot> {
        self.scene().volumes.clone()
    }

    /// Find a live volume by its display name.
    pub fn volume(&self, name: &str) -> Option<VolumeSnapshot> {
        self.scene().volumes.iter().find(|v| v.name == name).cloned()
    }

    pub fn volume_urls(&self) -> Vec<String> {
        self.scene().volumes.iter().map(|v| v.url.clone()).collect()
    }

    pub fn meshes(&self) -> Vec<MeshSnapshot> {
        self.scene().meshes.clone()
    }

    pub fn mesh(&self, name: &str) -> Option<MeshSnapshot> {
        self.scene().meshes.iter().find(|m| m.name == name).cloned()
    }

    /// The options record the engine reads passively.
    pub fn options(&self) -> Map<String, Value> {
        self.scene().options.clone()
    }

    pub fn setters(&self) -> SetterSnapshot {
        self.scene().setters.clone()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn scene(&self) -> MutexGuard<'_, Scene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn journal(&self) -> MutexGuard<'_, Vec<EngineCall>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: EngineCall) {
        log::trace!("engine call {:?}", call);
        self.journal().push(call);
    }

    /// Simulated fetch and decode: wait on any gate and latency, then apply
    /// scripted failures.
    async fn fetch(&self, locator: &str) -> Result<(), EngineError> {
        let (gate, latency) = {
            let mut faults = self.faults();
            (faults.gates.remove(locator), faults.latency)
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match self.faults().loads.get(locator) {
            Some(reason) => Err(EngineError::Load {
                locator: locator.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn check_update(&self, locator: &str) -> Result<(), EngineError> {
        match self.faults().updates.get(locator) {
            Some(reason) => Err(EngineError::Rejected { reason: reason.clone() }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn load_volume(
        &self,
        locator: &str,
        options: &LoadableVolumeOptions,
    ) -> Result<HandleId, EngineError> {
        self.record(EngineCall::LoadVolume {
            locator: locator.to_string(),
        });
        self.fetch(locator).await?;

        let handle = Uuid::new_v4();
        self.scene()
            .volumes
            .push(VolumeSnapshot::loaded(handle, locator, options));
        log::debug!("volume '{}' live", display_name(locator));
        Ok(handle)
    }

    fn unload_volume(&self, handle: HandleId) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let url = scene.volume_url(handle)?;
        self.record(EngineCall::UnloadVolume { locator: url.clone() });
        scene.volumes.retain(|v| v.id != handle);
        for volume in scene.volumes.iter_mut() {
            if volume.modulation_image.as_deref() == Some(url.as_str()) {
                volume.modulation_image = None;
            }
        }
        Ok(())
    }

    fn set_volume_field(&self, handle: HandleId, field: &VolumeField) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let volume = scene.volume_mut(handle)?;
        self.record(EngineCall::SetVolumeField {
            locator: volume.url.clone(),
            field: field.clone(),
        });
        self.check_update(&volume.url)?;
        volume.apply(field);
        Ok(())
    }

    fn set_modulation(&self, target: HandleId, modulator: Option<HandleId>) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let modulator_url = modulator.map(|h| scene.volume_url(h)).transpose()?;
        let volume = scene.volume_mut(target)?;
        self.record(EngineCall::SetModulation {
            target: volume.url.clone(),
            modulator: modulator_url.clone(),
        });
        volume.modulation_image = modulator_url;
        Ok(())
    }

    fn reorder_volumes(&self, order: &[HandleId]) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let mut reordered = Vec::with_capacity(order.len());
        for handle in order {
            let volume = scene
                .volumes
                .iter()
                .find(|v| v.id == *handle)
                .ok_or(EngineError::UnknownHandle { handle: *handle })?;
            reordered.push(volume.clone());
        }
        if reordered.len() != scene.volumes.len() {
            return Err(EngineError::Rejected {
                reason: format!(
                    "order names {} of {} volumes",
                    reordered.len(),
                    scene.volumes.len()
                ),
            });
        }
        self.record(EngineCall::ReorderVolumes {
            order: reordered.iter().map(|v| v.url.clone()).collect(),
        });
        scene.volumes = reordered;
        Ok(())
    }

    async fn load_mesh(&self, locator: &str, options: &MeshLoadOptions) -> Result<HandleId, EngineError> {
        self.record(EngineCall::LoadMesh {
            locator: locator.to_string(),
        });
        self.fetch(locator).await?;

        let handle = Uuid::new_v4();
        self.scene()
            .meshes
            .push(MeshSnapshot::loaded(handle, locator, options));
        Ok(handle)
    }

    fn unload_mesh(&self, handle: HandleId) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let url = scene.mesh_mut(handle)?.url.clone();
        self.record(EngineCall::UnloadMesh { locator: url });
        scene.meshes.retain(|m| m.id != handle);
        Ok(())
    }

    fn set_mesh_field(&self, handle: HandleId, field: &MeshField) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let mesh = scene.mesh_mut(handle)?;
        self.record(EngineCall::SetMeshField {
            locator: mesh.url.clone(),
            field: field.clone(),
        });
        self.check_update(&mesh.url)?;
        mesh.apply(field);
        Ok(())
    }

    async fn load_mesh_layer(&self, mesh: HandleId, layer: &MeshLayerSpec) -> Result<HandleId, EngineError> {
        let mesh_url = self.scene().mesh_mut(mesh)?.url.clone();
        self.record(EngineCall::LoadMeshLayer {
            mesh: mesh_url,
            locator: layer.url.clone(),
        });
        self.fetch(&layer.url).await?;

        let handle = Uuid::new_v4();
        // The mesh may have been unloaded while the layer was fetched.
        self.scene()
            .mesh_mut(mesh)?
            .layers
            .push(LayerSnapshot::loaded(handle, layer));
        Ok(handle)
    }

    fn unload_mesh_layer(&self, mesh: HandleId, layer: HandleId) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let (mesh_url, snapshot) = scene.layer_mut(mesh, layer)?;
        self.record(EngineCall::UnloadMeshLayer {
            mesh: mesh_url.to_string(),
            locator: snapshot.url.clone(),
        });
        scene.mesh_mut(mesh)?.layers.retain(|l| l.id != layer);
        Ok(())
    }

    fn set_mesh_layer_field(&self, mesh: HandleId, layer: HandleId, field: &LayerField) -> Result<(), EngineError> {
        let mut scene = self.scene();
        let (mesh_url, snapshot) = scene.layer_mut(mesh, layer)?;
        self.record(EngineCall::SetMeshLayerField {
            mesh: mesh_url.to_string(),
            locator: snapshot.url.clone(),
            field: field.clone(),
        });
        self.check_update(&snapshot.url)?;
        snapshot.apply(field);
        Ok(())
    }

    fn merge_options(&self, patch: &Map<String, Value>) -> Result<(), EngineError> {
        self.record(EngineCall::MergeOptions {
            keys: patch.keys().cloned().collect(),
        });
        self.scene()
            .options
            .extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn set_crosshair_color(&self, rgba: [f32; 4]) -> Result<(), EngineError> {
        self.record(EngineCall::SetCrosshairColor { rgba });
        self.scene().setters.crosshair_color = rgba;
        Ok(())
    }

    fn set_crosshair_width(&self, width: f32) -> Result<(), EngineError> {
        if !width.is_finite() || width < 0.0 {
            return Err(EngineError::Rejected {
                reason: format!("crosshair width {}", width),
            });
        }
        self.record(EngineCall::SetCrosshairWidth { width });
        self.scene().setters.crosshair_width = width;
        Ok(())
    }

    fn set_vol_scale_multiplier(&self, multiplier: f32) -> Result<(), EngineError> {
        self.record(EngineCall::SetVolScaleMultiplier { multiplier });
        self.scene().setters.vol_scale_multiplier = multiplier;
        Ok(())
    }

    fn set_overlay_outline_width(&self, width: f32) -> Result<(), EngineError> {
        self.record(EngineCall::SetOverlayOutlineWidth { width });
        self.scene().setters.overlay_outline_width = width;
        Ok(())
    }
}
