use serde::{Deserialize, Serialize};

use crate::locator::{changed, Located};

/// A volume (e.g. a T2 MRI) the viewer should display.
///
/// Every attribute other than `url` is optional. An unset attribute is not
/// managed: the engine keeps whatever value it currently has.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap_negative: Option<String>,
    #[serde(rename = "cal_min", default, skip_serializing_if = "Option::is_none")]
    pub cal_min: Option<f64>,
    #[serde(rename = "cal_max", default, skip_serializing_if = "Option::is_none")]
    pub cal_max: Option<f64>,
    /// Use `cal_min`/`cal_max` as given instead of the engine's auto range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_cal_min_max: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorbar_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulate_alpha: Option<bool>,
    /// Locator of another volume in the same configuration that modulates
    /// this one. `null` and absent both mean no modulation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulation_image_url: Option<String>,
}

/// The subset of volume attributes the engine accepts at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadableVolumeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap_negative: Option<String>,
    #[serde(rename = "cal_min", default, skip_serializing_if = "Option::is_none")]
    pub cal_min: Option<f64>,
    #[serde(rename = "cal_max", default, skip_serializing_if = "Option::is_none")]
    pub cal_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_cal_min_max: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorbar_visible: Option<bool>,
}

/// A single directly-mutable field on a live volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum VolumeField {
    Opacity(f32),
    Colormap(String),
    ColormapNegative(String),
    CalMin(f64),
    CalMax(f64),
    TrustCalMinMax(bool),
    Visible(bool),
    ColorbarVisible(bool),
    ModulateAlpha(bool),
}

impl VolumeField {
    /// Wire name of the engine field.
    pub fn name(&self) -> &'static str {
        match self {
            VolumeField::Opacity(_) => "opacity",
            VolumeField::Colormap(_) => "colormap",
            VolumeField::ColormapNegative(_) => "colormapNegative",
            VolumeField::CalMin(_) => "cal_min",
            VolumeField::CalMax(_) => "cal_max",
            VolumeField::TrustCalMinMax(_) => "trustCalMinMax",
            VolumeField::Visible(_) => "visible",
            VolumeField::ColorbarVisible(_) => "colorbarVisible",
            VolumeField::ModulateAlpha(_) => "modulateAlpha",
        }
    }

    /// Record this field's value on an applied spec.
    pub fn apply_to(&self, spec: &mut VolumeSpec) {
        match self {
            VolumeField::Opacity(v) => spec.opacity = Some(*v),
            VolumeField::Colormap(v) => spec.colormap = Some(v.clone()),
            VolumeField::ColormapNegative(v) => spec.colormap_negative = Some(v.clone()),
            VolumeField::CalMin(v) => spec.cal_min = Some(*v),
            VolumeField::CalMax(v) => spec.cal_max = Some(*v),
            VolumeField::TrustCalMinMax(v) => spec.trust_cal_min_max = Some(*v),
            VolumeField::Visible(v) => spec.visible = Some(*v),
            VolumeField::ColorbarVisible(v) => spec.colorbar_visible = Some(*v),
            VolumeField::ModulateAlpha(v) => spec.modulate_alpha = Some(*v),
        }
    }
}

impl VolumeSpec {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_colormap(mut self, colormap: &str) -> Self {
        self.colormap = Some(colormap.to_string());
        self
    }

    pub fn with_cal_range(mut self, cal_min: f64, cal_max: f64) -> Self {
        self.cal_min = Some(cal_min);
        self.cal_max = Some(cal_max);
        self
    }

    pub fn with_modulation(mut self, modulation_image_url: &str) -> Self {
        self.modulation_image_url = Some(modulation_image_url.to_string());
        self
    }

    /// Parse a JSON array of volume specs.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Attributes passed to the engine's load call.
    pub fn loadable(&self) -> LoadableVolumeOptions {
        LoadableVolumeOptions {
            opacity: self.opacity,
            colormap: self.colormap.clone(),
            colormap_negative: self.colormap_negative.clone(),
            cal_min: self.cal_min,
            cal_max: self.cal_max,
            trust_cal_min_max: self.trust_cal_min_max,
            visible: self.visible,
            colorbar_visible: self.colorbar_visible,
        }
    }

    /// Set fields the engine does not take at load time and that must be
    /// written onto the live volume afterwards.
    pub fn post_load_fields(&self) -> Vec<VolumeField> {
        self.modulate_alpha
            .map(VolumeField::ModulateAlpha)
            .into_iter()
            .collect()
    }

    /// Fields set on `self` whose value differs from `applied`.
    ///
    /// The modulation reference is not a field; it is resolved separately
    /// once every volume is loaded.
    pub fn changed_fields(&self, applied: &VolumeSpec) -> Vec<VolumeField> {
        let mut fields = Vec::new();
        if let Some(v) = changed(&self.opacity, &applied.opacity) {
            fields.push(VolumeField::Opacity(v));
        }
        if let Some(v) = changed(&self.colormap, &applied.colormap) {
            fields.push(VolumeField::Colormap(v));
        }
        if let Some(v) = changed(&self.colormap_negative, &applied.colormap_negative) {
            fields.push(VolumeField::ColormapNegative(v));
        }
        if let Some(v) = changed(&self.cal_min, &applied.cal_min) {
            fields.push(VolumeField::CalMin(v));
        }
        if let Some(v) = changed(&self.cal_max, &applied.cal_max) {
            fields.push(VolumeField::CalMax(v));
        }
        if let Some(v) = changed(&self.trust_cal_min_max, &applied.trust_cal_min_max) {
            fields.push(VolumeField::TrustCalMinMax(v));
        }
        if let Some(v) = changed(&self.visible, &applied.visible) {
            fields.push(VolumeField::Visible(v));
        }
        if let Some(v) = changed(&self.colorbar_visible, &applied.colorbar_visible) {
            fields.push(VolumeField::ColorbarVisible(v));
        }
        if let Some(v) = changed(&self.modulate_alpha, &applied.modulate_alpha) {
            fields.push(VolumeField::ModulateAlpha(v));
        }
        fields
    }
}

impl Located for VolumeSpec {
    fn locator(&self) -> &str {
        &self.url
    }
}
