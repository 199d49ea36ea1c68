use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use nvsync_core::{MeshSpec, PassOutcome, PassReport, Reconciler, ViewerConfig, ViewerOptions, VolumeSpec};
use nvsync_sim::MemoryEngine;

use crate::settings::HarnessSettings;

/// The reconciler and engine behind one viewer, driven by string commands.
///
/// Each `set_*` command replaces one part of the current configuration and
/// submits the whole of it. Commands return `Result<_, String>` so callers
/// can forward them over any text channel.
pub struct Harness {
    engine: Arc<MemoryEngine>,
    reconciler: Reconciler<MemoryEngine>,
    config: Mutex<ViewerConfig>,
    last_report: Mutex<Option<PassReport>>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(MemoryEngine::new())
    }
}

/// What a `set_*` command reports back.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub generation: u64,
    pub outcome: PassOutcome,
    pub engine_calls: usize,
    pub errors: Vec<String>,
}

impl From<&PassReport> for PassSummary {
    fn from(report: &PassReport) -> Self {
        Self {
            generation: report.generation,
            outcome: report.outcome,
            engine_calls: report.stats.engine_calls(),
            errors: report.errors.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Harness {
    pub fn new(engine: MemoryEngine) -> Self {
        let engine = Arc::new(engine);
        Self {
            reconciler: Reconciler::new(Arc::clone(&engine)),
            engine,
            config: Mutex::new(ViewerConfig::new()),
            last_report: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &HarnessSettings) -> Self {
        Self::new(settings.engine())
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the volume list and wait for the pass to finish.
    pub async fn set_volumes(&self, volumes: &str) -> Result<PassSummary, String> {
        let volumes = VolumeSpec::list_from_json(volumes).map_err(|e| format!("Invalid volumes: {}", e))?;
        self.apply(|config| config.volumes = volumes).await
    }

    pub async fn set_meshes(&self, meshes: &str) -> Result<PassSummary, String> {
        let meshes = MeshSpec::list_from_json(meshes).map_err(|e| format!("Invalid meshes: {}", e))?;
        self.apply(|config| config.meshes = meshes).await
    }

    pub async fn set_options(&self, options: &str) -> Result<PassSummary, String> {
        let options = ViewerOptions::from_json(options).map_err(|e| format!("Invalid options: {}", e))?;
        self.apply(|config| config.options = options).await
    }

    /// Live state of the volume with this display name, as JSON.
    pub fn get_volume(&self, name: &str) -> Result<Value, String> {
        let volume = self
            .engine
            .volume(name)
            .ok_or_else(|| format!("Volume not found: {}", name))?;
        serde_json::to_value(&volume).map_err(|e| e.to_string())
    }

    pub fn get_mesh(&self, name: &str) -> Result<Value, String> {
        let mesh = self
            .engine
            .mesh(name)
            .ok_or_else(|| format!("Mesh not found: {}", name))?;
        serde_json::to_value(&mesh).map_err(|e| e.to_string())
    }

    /// Display names of the live volumes, bottom first.
    pub fn loaded_volume_names(&self) -> Vec<String> {
        self.engine.volumes().into_iter().map(|v| v.name).collect()
    }

    /// Full report of the most recent pass that ran.
    pub fn last_report(&self) -> Result<Value, String> {
        let last = self.last_report.lock().map_err(|e| e.to_string())?;
        match last.as_ref() {
            Some(report) => serde_json::to_value(report).map_err(|e| e.to_string()),
            None => Ok(Value::Null),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Update the current configuration and queue it while the config lock
    /// is held, so submissions reach the reconciler in update order.
    async fn apply(&self, update: impl FnOnce(&mut ViewerConfig)) -> Result<PassSummary, String> {
        let pass = {
            let mut config = self.config.lock().map_err(|e| e.to_string())?;
            update(&mut config);
            self.reconciler.submit(config.clone())
        };
        let report = pass.await;
        let summary = PassSummary::from(&report);
        if report.outcome != PassOutcome::Coalesced {
            let mut last = self.last_report.lock().map_err(|e| e.to_string())?;
            *last = Some(report);
        }
        Ok(summary)
    }
}
