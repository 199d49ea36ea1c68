use std::collections::HashSet;
use std::sync::Arc;

use super::{Landing, Pass, Superseded};
use crate::engine::{Engine, HandleId};
use crate::live::{LiveLayer, LiveMesh};
use crate::locator::{dedup_by_locator, ResourceKind};
use crate::mesh::{LayerField, MeshField, MeshLayerSpec, MeshSpec};
use crate::report::ReconcileError;
use crate::state::{ResourceKey, ResourceState};

impl<E: Engine + ?Sized> Pass<'_, E> {
    /// Meshes converge like volumes; each mesh that is live afterwards then
    /// has its layer list converged the same way.
    pub(super) async fn converge_meshes(&mut self) -> Result<(), Superseded> {
        let config = Arc::clone(&self.config);
        let (desired, _) = dedup_by_locator(&config.meshes);
        let wanted: HashSet<&str> = desired.iter().map(|m| m.url.as_str()).collect();

        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.live.meshes)
            .into_iter()
            .partition(|m| wanted.contains(m.locator()));
        self.live.meshes = kept;
        for mesh in dropped {
            self.unload_mesh(mesh);
        }

        for spec in desired {
            let index = match self.live.mesh_index(&spec.url) {
                Some(index) => {
                    self.update_mesh(index, spec);
                    index
                }
                None => match self.load_mesh(spec).await? {
                    Some(index) => index,
                    None => continue,
                },
            };
            self.converge_layers(index, spec).await?;
        }
        Ok(())
    }

    fn unload_mesh(&mut self, mesh: LiveMesh) {
        // Layers go away with their mesh.
        for layer in &mesh.layers {
            let key = ResourceKey::mesh_layer(mesh.locator(), layer.locator());
            self.advance(&key, ResourceState::Unloading);
            self.advance(&key, ResourceState::Absent);
        }
        let key = ResourceKey::mesh(mesh.locator());
        self.release(&key, |engine| engine.unload_mesh(mesh.handle));
    }

    /// Load a mesh without its layers. Returns the live index, or `None` if
    /// the load failed.
    async fn load_mesh(&mut self, spec: &MeshSpec) -> Result<Option<usize>, Superseded> {
        let key = ResourceKey::mesh(&spec.url);
        self.advance(&key, ResourceState::Loading);
        self.report.stats.loads += 1;
        log::debug!("loading mesh '{}'", spec.url);

        let handle = match self.engine().load_mesh(&spec.url, &spec.load_options()).await {
            Ok(handle) => handle,
            Err(cause) => {
                self.load_failed(&key, cause);
                return self.check_generation().map(|()| None);
            }
        };
        self.advance(&key, ResourceState::Loaded);

        let landing = self.landing(&key);
        if let Landing::Discard = landing {
            self.discard(&key, |engine| engine.unload_mesh(handle));
            return Err(Superseded);
        }
        self.live.meshes.push(LiveMesh {
            handle,
            applied: spec.without_layers(),
            layers: Vec::new(),
        });
        match landing {
            Landing::Commit => Ok(Some(self.live.meshes.len() - 1)),
            _ => Err(Superseded),
        }
    }

    fn update_mesh(&mut self, index: usize, spec: &MeshSpec) {
        let fields = spec.changed_fields(&self.live.meshes[index].applied);
        if fields.is_empty() {
            return;
        }
        let key = ResourceKey::mesh(&spec.url);
        let handle = self.live.meshes[index].handle;
        self.advance(&key, ResourceState::Updating);
        for field in fields {
            if self.mutate_mesh(handle, &spec.url, &field) {
                field.apply_to(&mut self.live.meshes[index].applied);
            }
        }
        self.advance(&key, ResourceState::Loaded);
    }

    fn mutate_mesh(&mut self, handle: HandleId, locator: &str, field: &MeshField) -> bool {
        self.report.stats.field_mutations += 1;
        match self.engine().set_mesh_field(handle, field) {
            Ok(()) => {
                log::debug!("mesh '{}': {} = {:?}", locator, field.name(), field);
                true
            }
            Err(cause) => {
                self.record(ReconcileError::FieldMutation {
                    resource: ResourceKind::Mesh,
                    locator: locator.to_string(),
                    field: field.name().to_string(),
                    cause,
                });
                false
            }
        }
    }

    // ── Layers ───────────────────────────────────────────────────────

    async fn converge_layers(&mut self, mesh_index: usize, spec: &MeshSpec) -> Result<(), Superseded> {
        let (desired, _) = dedup_by_locator(&spec.layers);
        let wanted: HashSet<&str> = desired.iter().map(|l| l.url.as_str()).collect();
        let mesh_handle = self.live.meshes[mesh_index].handle;

        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.live.meshes[mesh_index].layers)
            .into_iter()
            .partition(|l| wanted.contains(l.locator()));
        self.live.meshes[mesh_index].layers = kept;
        for layer in dropped {
            let key = ResourceKey::mesh_layer(&spec.url, layer.locator());
            self.release(&key, |engine| engine.unload_mesh_layer(mesh_handle, layer.handle));
        }

        for layer in desired {
            match self.live.meshes[mesh_index].layer_index(&layer.url) {
                Some(layer_index) => self.update_layer(mesh_index, layer_index, &spec.url, layer),
                None => self.load_layer(mesh_index, &spec.url, layer).await?,
            }
        }
        Ok(())
    }

    async fn load_layer(
        &mut self,
        mesh_index: usize,
        mesh_locator: &str,
        spec: &MeshLayerSpec,
    ) -> Result<(), Superseded> {
        let key = ResourceKey::mesh_layer(mesh_locator, &spec.url);
        let mesh_handle = self.live.meshes[mesh_index].handle;
        self.advance(&key, ResourceState::Loading);
        self.report.stats.loads += 1;
        log::debug!("loading layer '{}' on mesh '{}'", spec.url, mesh_locator);

        let handle = match self.engine().load_mesh_layer(mesh_handle, spec).await {
            Ok(handle) => handle,
            Err(cause) => {
                self.load_failed(&key, cause);
                return self.check_generation();
            }
        };
        self.advance(&key, ResourceState::Loaded);

        let landing = self.landing(&key);
        if let Landing::Discard = landing {
            self.discard(&key, |engine| engine.unload_mesh_layer(mesh_handle, handle));
            return Err(Superseded);
        }
        self.live.meshes[mesh_index].layers.push(LiveLayer {
            handle,
            applied: spec.clone(),
        });
        match landing {
            Landing::Commit => Ok(()),
            _ => Err(Superseded),
        }
    }

    fn update_layer(&mut self, mesh_index: usize, layer_index: usize, mesh_locator: &str, spec: &MeshLayerSpec) {
        let live = &self.live.meshes[mesh_index];
        let fields = spec.changed_fields(&live.layers[layer_index].applied);
        if fields.is_empty() {
            return;
        }
        let key = ResourceKey::mesh_layer(mesh_locator, &spec.url);
        let mesh_handle = live.handle;
        let handle = live.layers[layer_index].handle;
        self.advance(&key, ResourceState::Updating);
        for field in fields {
            if self.mutate_layer(mesh_handle, handle, &spec.url, &field) {
                field.apply_to(&mut self.live.meshes[mesh_index].layers[layer_index].applied);
            }
        }
        self.advance(&key, ResourceState::Loaded);
    }

    fn mutate_layer(&mut self, mesh: HandleId, layer: HandleId, locator: &str, field: &LayerField) -> bool {
        self.report.stats.field_mutations += 1;
        match self.engine().set_mesh_layer_field(mesh, layer, field) {
            Ok(()) => {
                log::debug!("layer '{}': {} = {:?}", locator, field.name(), field);
                true
            }
            Err(cause) => {
                self.record(ReconcileError::FieldMutation {
                    resource: ResourceKind::MeshLayer,
                    locator: locator.to_string(),
                    field: field.name().to_string(),
                    cause,
                });
                false
            }
        }
    }
}
