use std::collections::HashSet;
use std::sync::Arc;

use super::{Landing, Pass, Superseded};
use crate::engine::{Engine, HandleId};
use crate::live::LiveVolume;
use crate::locator::{dedup_by_locator, ResourceKind};
use crate::report::ReconcileError;
use crate::state::{ResourceKey, ResourceState};
use crate::volume::{VolumeField, VolumeSpec};

impl<E: Engine + ?Sized> Pass<'_, E> {
    /// Phase 1 for volumes: unload, then load or update in desired order,
    /// then fix the engine's volume order.
    pub(super) async fn converge_volumes(&mut self) -> Result<(), Superseded> {
        let config = Arc::clone(&self.config);
        let (desired, _) = dedup_by_locator(&config.volumes);
        let wanted: HashSet<&str> = desired.iter().map(|v| v.url.as_str()).collect();

        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.live.volumes)
            .into_iter()
            .partition(|v| wanted.contains(v.locator()));
        self.live.volumes = kept;
        for volume in dropped {
            self.unload_volume(volume);
        }

        for spec in &desired {
            match self.live.volume_index(&spec.url) {
                Some(index) => self.update_volume(index, spec),
                None => self.load_volume(spec).await?,
            }
        }

        self.reorder_volumes(&desired);
        Ok(())
    }

    fn unload_volume(&mut self, volume: LiveVolume) {
        let key = ResourceKey::volume(volume.locator());
        self.release(&key, |engine| engine.unload_volume(volume.handle));
    }

    async fn load_volume(&mut self, spec: &VolumeSpec) -> Result<(), Superseded> {
        let key = ResourceKey::volume(&spec.url);
        self.advance(&key, ResourceState::Loading);
        self.report.stats.loads += 1;
        log::debug!("loading volume '{}'", spec.url);

        let handle = match self.engine().load_volume(&spec.url, &spec.loadable()).await {
            Ok(handle) => handle,
            Err(cause) => {
                self.load_failed(&key, cause);
                return self.check_generation();
            }
        };
        self.advance(&key, ResourceState::Loaded);

        // Only the loadable subset is on the engine so far.
        let mut applied = VolumeSpec {
            modulate_alpha: None,
            modulation_image_url: None,
            ..spec.clone()
        };

        match self.landing(&key) {
            Landing::Discard => {
                self.discard(&key, |engine| engine.unload_volume(handle));
                return Err(Superseded);
            }
            Landing::CommitAndStop => {
                self.live.volumes.push(LiveVolume {
                    handle,
                    applied,
                    modulation: None,
                });
                return Err(Superseded);
            }
            Landing::Commit => {}
        }

        for field in spec.post_load_fields() {
            if self.mutate_volume(handle, &spec.url, &field) {
                field.apply_to(&mut applied);
            }
        }
        self.live.volumes.push(LiveVolume {
            handle,
            applied,
            modulation: None,
        });
        Ok(())
    }

    fn update_volume(&mut self, index: usize, spec: &VolumeSpec) {
        let fields = spec.changed_fields(&self.live.volumes[index].applied);
        if fields.is_empty() {
            return;
        }
        let key = ResourceKey::volume(&spec.url);
        let handle = self.live.volumes[index].handle;
        self.advance(&key, ResourceState::Updating);
        for field in fields {
            if self.mutate_volume(handle, &spec.url, &field) {
                field.apply_to(&mut self.live.volumes[index].applied);
            }
        }
        self.advance(&key, ResourceState::Loaded);
    }

    /// Write one field on a live volume. Returns whether the engine took it.
    fn mutate_volume(&mut self, handle: HandleId, locator: &str, field: &VolumeField) -> bool {
        self.report.stats.field_mutations += 1;
        match self.engine().set_volume_field(handle, field) {
            Ok(()) => {
                log::debug!("volume '{}': {} = {:?}", locator, field.name(), field);
                true
            }
            Err(cause) => {
                self.record(ReconcileError::FieldMutation {
                    resource: ResourceKind::Volume,
                    locator: locator.to_string(),
                    field: field.name().to_string(),
                    cause,
                });
                false
            }
        }
    }

    fn reorder_volumes(&mut self, desired: &[&VolumeSpec]) {
        let order: Vec<HandleId> = desired
            .iter()
            .filter_map(|spec| self.live.volume_handle(&spec.url))
            .collect();
        let current: Vec<HandleId> = self.live.volumes.iter().map(|v| v.handle).collect();
        if order == current {
            return;
        }

        self.report.stats.reorders += 1;
        match self.engine().reorder_volumes(&order) {
            Ok(()) => {
                log::debug!("reordered {} volumes", order.len());
                self.live
                    .volumes
                    .sort_by_key(|v| order.iter().position(|h| *h == v.handle));
            }
            Err(cause) => self.record(ReconcileError::EngineCall {
                operation: "reorder_volumes".to_string(),
                cause,
            }),
        }
    }

    /// Phase 2: resolve modulation references against the live table.
    pub(super) fn resolve_modulation(&mut self) {
        let config = Arc::clone(&self.config);
        let (desired, _) = dedup_by_locator(&config.volumes);

        for spec in desired {
            let Some(index) = self.live.volume_index(&spec.url) else {
                continue;
            };

            let wanted = match spec.modulation_image_url.as_deref() {
                None => None,
                Some(modulator) => {
                    let resolved = self
                        .live
                        .volume_handle(modulator)
                        .filter(|_| modulator != spec.url);
                    match resolved {
                        Some(handle) => Some((modulator.to_string(), handle)),
                        None => {
                            self.record(ReconcileError::ModulationResolution {
                                target: spec.url.clone(),
                                modulator: modulator.to_string(),
                            });
                            None
                        }
                    }
                }
            };

            let current = self.live.volumes[index].modulation.as_ref().map(|(_, h)| *h);
            let modulator = wanted.as_ref().map(|(_, h)| *h);
            if current == modulator {
                continue;
            }

            let target = self.live.volumes[index].handle;
            self.report.stats.modulation_calls += 1;
            match self.engine().set_modulation(target, modulator) {
                Ok(()) => {
                    log::debug!(
                        "volume '{}' modulated by {:?}",
                        spec.url,
                        wanted.as_ref().map(|(locator, _)| locator)
                    );
                    self.live.volumes[index].modulation = wanted;
                }
                Err(cause) => self.record(ReconcileError::EngineCall {
                    operation: format!("set_modulation('{}')", spec.url),
                    cause,
                }),
            }
        }
    }
}
