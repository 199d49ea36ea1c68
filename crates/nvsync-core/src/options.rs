use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Global viewer configuration.
///
/// Engine-native options are kept as an open map and written straight into
/// the engine's options record. The named fields are wrapper conveniences;
/// some of them can only be applied through dedicated engine setters (see
/// [`crate::strategy`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorbar_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_outline_width: Option<f32>,
    /// RGBA components in 0-1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crosshair_color: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crosshair_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vol_scale_multiplier: Option<f32>,
    /// Engine-native options passed through untouched.
    #[serde(flatten)]
    pub native: Map<String, Value>,
}

impl ViewerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native(mut self, key: &str, value: Value) -> Self {
        self.native.insert(key.to_string(), value);
        self
    }

    pub fn with_crosshair_color(mut self, rgba: [f32; 4]) -> Self {
        self.crosshair_color = Some(rgba.to_vec());
        self
    }

    pub fn with_crosshair_width(mut self, width: f32) -> Self {
        self.crosshair_width = Some(width);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Every set option keyed by its wire name, wrapper fields and native
    /// options alike.
    pub fn entries(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}
