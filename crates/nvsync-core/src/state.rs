use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locator::ResourceKind;

/// Lifecycle of one resource as seen by the reconciler.
///
/// `Absent -> Loading -> Loaded -> (Updating)* -> Unloading -> Absent`, with
/// `Loading -> LoadFailed`. A failed load counts as absent for future passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Absent,
    Loading,
    Loaded,
    Updating,
    Unloading,
    LoadFailed,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid transition {from:?} -> {to:?}")]
pub struct StateError {
    pub from: ResourceState,
    pub to: ResourceState,
}

impl ResourceState {
    pub fn can_transition(self, to: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, to),
            (Absent, Loading)
                | (LoadFailed, Loading)
                | (Loading, Loaded)
                | (Loading, LoadFailed)
                | (Loaded, Updating)
                | (Updating, Loaded)
                | (Loaded, Unloading)
                | (Updating, Unloading)
                | (Unloading, Absent)
        )
    }

    pub fn transition(self, to: ResourceState) -> Result<ResourceState, StateError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(StateError { from: self, to })
        }
    }

    /// Whether the resource should be treated as missing when diffing.
    pub fn is_absent(self) -> bool {
        matches!(self, ResourceState::Absent | ResourceState::LoadFailed)
    }
}

/// Identifies a resource across passes. Mesh layers are scoped by their mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub locator: String,
    pub parent: Option<String>,
}

impl ResourceKey {
    pub fn volume(locator: &str) -> Self {
        Self {
            kind: ResourceKind::Volume,
            locator: locator.to_string(),
            parent: None,
        }
    }

    pub fn mesh(locator: &str) -> Self {
        Self {
            kind: ResourceKind::Mesh,
            locator: locator.to_string(),
            parent: None,
        }
    }

    pub fn mesh_layer(mesh: &str, locator: &str) -> Self {
        Self {
            kind: ResourceKind::MeshLayer,
            locator: locator.to_string(),
            parent: Some(mesh.to_string()),
        }
    }
}

/// Current lifecycle state of every resource the reconciler has touched.
#[derive(Debug, Default)]
pub struct Lifecycle {
    states: HashMap<ResourceKey, ResourceState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResourceKey) -> ResourceState {
        self.states.get(key).copied().unwrap_or(ResourceState::Absent)
    }

    /// Move a resource to its next state. Invalid transitions are logged and
    /// leave the state unchanged.
    pub fn advance(&mut self, key: &ResourceKey, to: ResourceState) -> Result<(), StateError> {
        let from = self.get(key);
        let next = from.transition(to).inspect_err(|e| {
            log::warn!("{} '{}': {}", key.kind, key.locator, e);
        })?;
        log::debug!("{} '{}': {:?} -> {:?}", key.kind, key.locator, from, next);
        if next == ResourceState::Absent {
            self.states.remove(key);
        } else {
            self.states.insert(key.clone(), next);
        }
        Ok(())
    }

    /// Step through a sequence of states.
    pub fn advance_all(&mut self, key: &ResourceKey, path: &[ResourceState]) -> Result<(), StateError> {
        for to in path {
            self.advance(key, *to)?;
        }
        Ok(())
    }
}
