use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::ConfigIssue;
use crate::engine::EngineError;
use crate::locator::ResourceKind;

/// Severity level of a reported condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Conditions reported during a reconciliation pass. None of them abort the
/// pass, and none affect resources other than the one named.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileError {
    #[error("failed to load {resource} '{locator}'")]
    ResourceLoad {
        resource: ResourceKind,
        locator: String,
        #[source]
        cause: EngineError,
    },

    #[error("failed to unload {resource} '{locator}'")]
    ResourceUnload {
        resource: ResourceKind,
        locator: String,
        #[source]
        cause: EngineError,
    },

    #[error("modulation image '{modulator}' for volume '{target}' is not loaded; no modulation applied")]
    ModulationResolution { target: String, modulator: String },

    #[error("{resource} '{locator}' finished loading after a newer configuration dropped it; discarded")]
    ConfigurationRaceDiscarded { resource: ResourceKind, locator: String },

    #[error("failed to set {field} on {resource} '{locator}'")]
    FieldMutation {
        resource: ResourceKind,
        locator: String,
        field: String,
        #[source]
        cause: EngineError,
    },

    #[error("engine call {operation} failed")]
    EngineCall {
        operation: String,
        #[source]
        cause: EngineError,
    },

    #[error("option '{key}' not applied: {reason}")]
    InvalidOption { key: String, reason: String },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigIssue),
}

impl ReconcileError {
    pub fn severity(&self) -> Severity {
        match self {
            ReconcileError::ResourceLoad { .. }
            | ReconcileError::ResourceUnload { .. }
            | ReconcileError::FieldMutation { .. }
            | ReconcileError::EngineCall { .. } => Severity::Error,
            ReconcileError::ModulationResolution { .. }
            | ReconcileError::InvalidOption { .. }
            | ReconcileError::InvalidConfig(_) => Severity::Warning,
            ReconcileError::ConfigurationRaceDiscarded { .. } => Severity::Info,
        }
    }

    /// Locator of the resource this report is about, if any.
    pub fn locator(&self) -> Option<&str> {
        match self {
            ReconcileError::ResourceLoad { locator, .. }
            | ReconcileError::ResourceUnload { locator, .. }
            | ReconcileError::ConfigurationRaceDiscarded { locator, .. }
            | ReconcileError::FieldMutation { locator, .. } => Some(locator),
            ReconcileError::ModulationResolution { target, .. } => Some(target),
            ReconcileError::EngineCall { .. }
            | ReconcileError::InvalidOption { .. }
            | ReconcileError::InvalidConfig(_) => None,
        }
    }
}

/// Receives every reported condition as it happens.
pub trait ReportSink: Send + Sync {
    fn report(&self, error: &ReconcileError);
}

impl ReportSink for UnboundedSender<ReconcileError> {
    fn report(&self, error: &ReconcileError) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(error.clone());
    }
}

/// How a submission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// The pass converged the engine onto its configuration.
    Completed,
    /// A newer configuration arrived mid-pass; the pass stopped early and
    /// a follow-up pass took over.
    Superseded,
    /// A newer configuration arrived before this one started; another
    /// submission's pass handled it.
    Coalesced,
}

/// Engine calls made during one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    pub loads: usize,
    pub unloads: usize,
    pub field_mutations: usize,
    pub modulation_calls: usize,
    pub reorders: usize,
    pub option_merges: usize,
    pub setter_calls: usize,
}

impl PassStats {
    fn absorb(&mut self, other: &PassStats) {
        self.loads += other.loads;
        self.unloads += other.unloads;
        self.field_mutations += other.field_mutations;
        self.modulation_calls += other.modulation_calls;
        self.reorders += other.reorders;
        self.option_merges += other.option_merges;
        self.setter_calls += other.setter_calls;
    }

    pub fn engine_calls(&self) -> usize {
        self.loads
            + self.unloads
            + self.field_mutations
            + self.modulation_calls
            + self.reorders
            + self.option_merges
            + self.setter_calls
    }
}

/// Result of one submission.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Generation of the configuration the engine was last converged onto.
    pub generation: u64,
    pub outcome: PassOutcome,
    pub stats: PassStats,
    pub errors: Vec<ReconcileError>,
    /// Generations whose passes were cut short and continued by this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<u64>,
}

impl PassReport {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            outcome: PassOutcome::Completed,
            stats: PassStats::default(),
            errors: Vec::new(),
            superseded: Vec::new(),
        }
    }

    pub fn coalesced(generation: u64) -> Self {
        Self {
            outcome: PassOutcome::Coalesced,
            ..Self::new(generation)
        }
    }

    /// Fold an earlier pass that this one took over from. Its calls and
    /// reports come first.
    pub fn continue_from(&mut self, earlier: PassReport) {
        self.stats.absorb(&earlier.stats);
        let mut errors = earlier.errors;
        errors.append(&mut self.errors);
        self.errors = errors;
        let mut superseded = earlier.superseded;
        superseded.push(earlier.generation);
        superseded.append(&mut self.superseded);
        self.superseded = superseded;
    }

    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity() == Severity::Error)
    }

    pub fn errors_with(&self, severity: Severity) -> impl Iterator<Item = &ReconcileError> {
        self.errors.iter().filter(move |e| e.severity() == severity)
    }

    pub fn errors_for<'a>(&'a self, locator: &'a str) -> impl Iterator<Item = &'a ReconcileError> {
        self.errors.iter().filter(move |e| e.locator() == Some(locator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_failure(locator: &str) -> ReconcileError {
        ReconcileError::ResourceLoad {
            resource: ResourceKind::Volume,
            locator: locator.to_string(),
            cause: EngineError::Load {
                locator: locator.to_string(),
                reason: "404".to_string(),
            },
        }
    }

    #[test]
    fn test_severity_and_locator() {
        let err = load_failure("x.nii");
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.locator(), Some("x.nii"));
        assert_eq!(err.to_string(), "failed to load volume 'x.nii'");

        let raced = ReconcileError::ConfigurationRaceDiscarded {
            resource: ResourceKind::Volume,
            locator: "y.nii".to_string(),
        };
        assert_eq!(raced.severity(), Severity::Info);
    }

    #[test]
    fn test_report_queries() {
        let mut report = PassReport::new(3);
        assert!(!report.has_errors());
        report.errors.push(load_failure("x.nii"));
        report.errors.push(ReconcileError::InvalidOption {
            key: "crosshairColor".to_string(),
            reason: "expected 4 components, got 3".to_string(),
        });
        assert!(report.has_errors());
        assert_eq!(report.errors_with(Severity::Warning).count(), 1);
        assert_eq!(report.errors_for("x.nii").count(), 1);
    }

    #[test]
    fn test_continue_from_superseded_pass() {
        let mut first = PassReport::new(1);
        first.outcome = PassOutcome::Superseded;
        first.stats.loads = 1;
        first.stats.unloads = 1;
        first.errors.push(ReconcileError::ConfigurationRaceDiscarded {
            resource: ResourceKind::Volume,
            locator: "x.nii".to_string(),
        });

        let mut second = PassReport::new(2);
        second.stats.loads = 1;
        second.errors.push(load_failure("y.nii"));
        second.continue_from(first);

        assert_eq!(second.generation, 2);
        assert_eq!(second.outcome, PassOutcome::Completed);
        assert_eq!(second.stats.loads, 2);
        assert_eq!(second.stats.engine_calls(), 3);
        assert_eq!(second.superseded, vec![1]);
        assert_eq!(second.errors[0].locator(), Some("x.nii"));
        assert_eq!(second.errors[1].locator(), Some("y.nii"));
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.report(&load_failure("x.nii"));
        assert_eq!(rx.try_recv().unwrap(), load_failure("x.nii"));
    }

    #[test]
    fn test_serialize_report() {
        let mut report = PassReport::new(1);
        report.errors.push(load_failure("x.nii"));
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["errors"][0]["kind"], "resource_load");
        assert_eq!(value["errors"][0]["cause"]["error"], "load");
    }

    #[test]
    fn test_serialize_config_issue_keeps_tag() {
        let mut report = PassReport::new(1);
        report.errors.push(
            ConfigIssue::DuplicateLocator {
                resource: ResourceKind::Volume,
                locator: "a.nii".to_string(),
            }
            .into(),
        );
        report.errors.push(
            ConfigIssue::OpacityOutOfRange {
                resource: ResourceKind::Mesh,
                locator: "lh.pial".to_string(),
                opacity: 1.5,
            }
            .into(),
        );

        let value = serde_json::to_value(&report).unwrap();
        for error in value["errors"].as_array().unwrap() {
            assert_eq!(error["kind"], "invalid_config");
        }
        assert_eq!(value["errors"][0]["issue"], "duplicate_locator");
        assert_eq!(value["errors"][0]["resource"], "volume");
        assert_eq!(value["errors"][1]["resource"], "mesh");

        let json = serde_json::to_string(&report.errors[0]).unwrap();
        assert_eq!(json.matches("\"kind\"").count(), 1);
    }
}
