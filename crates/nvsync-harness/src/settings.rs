use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use nvsync_sim::MemoryEngine;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// A load the simulated engine should reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailingLoad {
    pub locator: String,
    pub reason: String,
}

/// Harness settings, read from a JSON file next to the script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Simulated fetch-and-decode time for every load.
    pub load_latency_ms: u64,
    pub failing_loads: Vec<FailingLoad>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            load_latency_ms: 0,
            failing_loads: Vec::new(),
        }
    }
}

impl HarnessSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Build the simulated engine these settings describe.
    pub fn engine(&self) -> MemoryEngine {
        let engine = if self.load_latency_ms > 0 {
            MemoryEngine::new().with_latency(Duration::from_millis(self.load_latency_ms))
        } else {
            MemoryEngine::new()
        };
        for failing in &self.failing_loads {
            engine.fail_loads(&failing.locator, &failing.reason);
        }
        engine
    }
}
