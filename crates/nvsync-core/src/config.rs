use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locator::{dedup_by_locator, ResourceKind};
use crate::mesh::MeshSpec;
use crate::options::ViewerOptions;
use crate::volume::VolumeSpec;

/// Malformed configuration input.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A problem found while validating a configuration. None of these stop a
/// reconciliation pass; they are reported alongside it.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ConfigIssue {
    #[error("{resource} '{locator}' appears more than once; only the first entry is used")]
    DuplicateLocator { resource: ResourceKind, locator: String },

    #[error("{resource} '{locator}' has opacity {opacity} outside 0..=1")]
    OpacityOutOfRange {
        resource: ResourceKind,
        locator: String,
        opacity: f32,
    },

    #[error("volume '{locator}' names itself as its modulation image")]
    SelfModulation { locator: String },

    #[error("volume '{target}' is modulated by '{modulator}', which is not in the configuration")]
    UnknownModulationSource { target: String, modulator: String },
}

impl ConfigIssue {
    /// Broken modulation references. A pass reports these once, as
    /// unresolved modulation, when it resolves references against the live
    /// volumes.
    pub fn is_modulation(&self) -> bool {
        matches!(
            self,
            ConfigIssue::SelfModulation { .. } | ConfigIssue::UnknownModulationSource { .. }
        )
    }
}

/// The complete desired state submitted on each update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerConfig {
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub meshes: Vec<MeshSpec>,
    #[serde(default)]
    pub options: ViewerOptions,
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_volumes(volumes: Vec<VolumeSpec>) -> Self {
        Self {
            volumes,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn has_volume(&self, locator: &str) -> bool {
        self.volumes.iter().any(|v| v.url == locator)
    }

    pub fn mesh(&self, locator: &str) -> Option<&MeshSpec> {
        self.meshes.iter().find(|m| m.url == locator)
    }

    /// Check the configuration's invariants.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        let (volumes, duplicates) = dedup_by_locator(&self.volumes);
        issues.extend(duplicates.into_iter().map(|locator| ConfigIssue::DuplicateLocator {
            resource: ResourceKind::Volume,
            locator,
        }));

        let known: HashSet<&str> = volumes.iter().map(|v| v.url.as_str()).collect();
        for volume in &volumes {
            check_opacity(&mut issues, ResourceKind::Volume, &volume.url, volume.opacity);
            match volume.modulation_image_url.as_deref() {
                Some(modulator) if modulator == volume.url => {
                    issues.push(ConfigIssue::SelfModulation {
                        locator: volume.url.clone(),
                    });
                }
                Some(modulator) if !known.contains(modulator) => {
                    issues.push(ConfigIssue::UnknownModulationSource {
                        target: volume.url.clone(),
                        modulator: modulator.to_string(),
                    });
                }
                _ => {}
            }
        }

        let (meshes, duplicates) = dedup_by_locator(&self.meshes);
        issues.extend(duplicates.into_iter().map(|locator| ConfigIssue::DuplicateLocator {
            resource: ResourceKind::Mesh,
            locator,
        }));
        for mesh in meshes {
            check_opacity(&mut issues, ResourceKind::Mesh, &mesh.url, mesh.opacity);
            let (layers, duplicates) = dedup_by_locator(&mesh.layers);
            issues.extend(duplicates.into_iter().map(|locator| ConfigIssue::DuplicateLocator {
                resource: ResourceKind::MeshLayer,
                locator,
            }));
            for layer in layers {
                check_opacity(&mut issues, ResourceKind::MeshLayer, &layer.url, layer.opacity);
            }
        }

        issues
    }
}

fn check_opacity(issues: &mut Vec<ConfigIssue>, resource: ResourceKind, locator: &str, opacity: Option<f32>) {
    if let Some(opacity) = opacity {
        if !(0.0..=1.0).contains(&opacity) {
            issues.push(ConfigIssue::OpacityOutOfRange {
                resource,
                locator: locator.to_string(),
                opacity,
            });
        }
    }
}
