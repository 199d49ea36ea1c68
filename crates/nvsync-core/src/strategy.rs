//! How each viewer option reaches the engine.
//!
//! Most options are plain entries in the options record the engine reads on
//! its next draw. A few feed state the engine derives and caches, so writing
//! the record is not enough: they go through a dedicated setter.

use serde_json::Value;

use crate::engine::{Engine, EngineError};

/// Application strategy for a single option key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStrategy {
    /// Shallow-merged into the engine's options record.
    Passive,
    /// Applied through a dedicated engine call.
    Setter(OptionSetter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionSetter {
    CrosshairColor,
    CrosshairWidth,
    VolScaleMultiplier,
    OverlayOutlineWidth,
}

/// Option keys that must not be merged into the options record.
const SETTER_TABLE: &[(&str, OptionSetter)] = &[
    ("crosshairColor", OptionSetter::CrosshairColor),
    ("crosshairWidth", OptionSetter::CrosshairWidth),
    ("volScaleMultiplier", OptionSetter::VolScaleMultiplier),
    ("overlayOutlineWidth", OptionSetter::OverlayOutlineWidth),
];

/// Look up the strategy for an option key. Keys not in the table are passive.
pub fn strategy_for(key: &str) -> ApplyStrategy {
    SETTER_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, setter)| ApplyStrategy::Setter(*setter))
        .unwrap_or(ApplyStrategy::Passive)
}

/// A decoded setter invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetterCall {
    CrosshairColor([f32; 4]),
    CrosshairWidth(f32),
    VolScaleMultiplier(f32),
    OverlayOutlineWidth(f32),
}

impl OptionSetter {
    pub fn key(&self) -> &'static str {
        match self {
            OptionSetter::CrosshairColor => "crosshairColor",
            OptionSetter::CrosshairWidth => "crosshairWidth",
            OptionSetter::VolScaleMultiplier => "volScaleMultiplier",
            OptionSetter::OverlayOutlineWidth => "overlayOutlineWidth",
        }
    }

    /// Decode an option value into the call this setter makes.
    pub fn decode(&self, value: &Value) -> Result<SetterCall, String> {
        match self {
            OptionSetter::CrosshairColor => {
                let components: Vec<f32> = serde_json::from_value(value.clone())
                    .map_err(|e| format!("expected an RGBA array: {}", e))?;
                let rgba: [f32; 4] = components
                    .try_into()
                    .map_err(|c: Vec<f32>| format!("expected 4 components, got {}", c.len()))?;
                Ok(SetterCall::CrosshairColor(rgba))
            }
            OptionSetter::CrosshairWidth => decode_number(value).map(SetterCall::CrosshairWidth),
            OptionSetter::VolScaleMultiplier => decode_number(value).map(SetterCall::VolScaleMultiplier),
            OptionSetter::OverlayOutlineWidth => decode_number(value).map(SetterCall::OverlayOutlineWidth),
        }
    }
}

fn decode_number(value: &Value) -> Result<f32, String> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| format!("expected a number, got {}", value))
}

impl SetterCall {
    pub fn invoke<E: Engine + ?Sized>(&self, engine: &E) -> Result<(), EngineError> {
        match *self {
            SetterCall::CrosshairColor(rgba) => engine.set_crosshair_color(rgba),
            SetterCall::CrosshairWidth(width) => engine.set_crosshair_width(width),
            SetterCall::VolScaleMultiplier(m) => engine.set_vol_scale_multiplier(m),
            SetterCall::OverlayOutlineWidth(width) => engine.set_overlay_outline_width(width),
        }
    }
}
