//! Replayable command scripts: a JSON array of harness commands run in order.
//!
//! ```json
//! [
//!   { "command": "set_volumes", "volumes": [{ "url": "/images/mni152.nii.gz" }] },
//!   { "command": "get_volume", "name": "mni152.nii.gz" }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::harness::Harness;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Step {
    SetVolumes { volumes: Value },
    SetMeshes { meshes: Value },
    SetOptions { options: Value },
    GetVolume { name: String },
    GetMesh { name: String },
    LoadedVolumes,
    LastReport,
}

/// Result of one replayed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub fn parse_script(json: &str) -> Result<Vec<Step>, serde_json::Error> {
    serde_json::from_str(json)
}

impl Step {
    pub fn command(&self) -> &'static str {
        match self {
            Step::SetVolumes { .. } => "set_volumes",
            Step::SetMeshes { .. } => "set_meshes",
            Step::SetOptions { .. } => "set_options",
            Step::GetVolume { .. } => "get_volume",
            Step::GetMesh { .. } => "get_mesh",
            Step::LoadedVolumes => "loaded_volumes",
            Step::LastReport => "last_report",
        }
    }

    pub async fn run(&self, harness: &Harness) -> Result<Value, String> {
        match self {
            Step::SetVolumes { volumes } => {
                let summary = harness.set_volumes(&volumes.to_string()).await?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            Step::SetMeshes { meshes } => {
                let summary = harness.set_meshes(&meshes.to_string()).await?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            Step::SetOptions { options } => {
                let summary = harness.set_options(&options.to_string()).await?;
                serde_json::to_value(summary).map_err(|e| e.to_string())
            }
            Step::GetVolume { name } => harness.get_volume(name),
            Step::GetMesh { name } => harness.get_mesh(name),
            Step::LoadedVolumes => Ok(Value::from(harness.loaded_volume_names())),
            Step::LastReport => harness.last_report(),
        }
    }
}

/// Run every step in order. A failing step does not stop the replay.
pub async fn replay(harness: &Harness, steps: &[Step]) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        let (result, error) = match step.run(harness).await {
            Ok(value) => (Some(value), None),
            Err(e) => {
                log::warn!("step {} ({}) failed: {}", index, step.command(), e);
                (None, Some(e))
            }
        };
        outcomes.push(StepOutcome {
            step: index,
            command: step.command(),
            result,
            error,
        });
    }
    outcomes
}
