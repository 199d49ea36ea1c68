use serde::{Deserialize, Serialize};

use nvsync_core::{
    display_name, HandleId, LayerField, LoadableVolumeOptions, MeshField, MeshLayerSpec, MeshLoadOptions,
    VolumeField,
};

/// Live state of a single volume, as read back from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshot {
    pub id: HandleId,
    pub url: String,
    pub name: String,
    pub opacity: f32,
    pub colormap: String,
    pub colormap_negative: String,
    #[serde(rename = "cal_min")]
    pub cal_min: f64,
    #[serde(rename = "cal_max")]
    pub cal_max: f64,
    pub trust_cal_min_max: bool,
    pub visible: bool,
    pub colorbar_visible: bool,
    pub modulate_alpha: bool,
    /// Locator of the modulating volume, if any.
    pub modulation_image: Option<String>,
}

impl VolumeSnapshot {
    /// A freshly loaded volume. Unset options take engine defaults.
    pub(crate) fn loaded(id: HandleId, locator: &str, options: &LoadableVolumeOptions) -> Self {
        Self {
            id,
            url: locator.to_string(),
            name: display_name(locator).to_string(),
            opacity: options.opacity.unwrap_or(1.0),
            colormap: options.colormap.clone().unwrap_or_else(|| "gray".to_string()),
            colormap_negative: options.colormap_negative.clone().unwrap_or_default(),
            cal_min: options.cal_min.unwrap_or(0.0),
            cal_max: options.cal_max.unwrap_or(1.0),
            trust_cal_min_max: options.trust_cal_min_max.unwrap_or(true),
            visible: options.visible.unwrap_or(true),
            colorbar_visible: options.colorbar_visible.unwrap_or(true),
            modulate_alpha: false,
            modulation_image: None,
        }
    }

    pub(crate) fn apply(&mut self, field: &VolumeField) {
        match field {
            VolumeField::Opacity(v) => self.opacity = *v,
            VolumeField::Colormap(v) => self.colormap = v.clone(),
            VolumeField::ColormapNegative(v) => self.colormap_negative = v.clone(),
            VolumeField::CalMin(v) => self.cal_min = *v,
            VolumeField::CalMax(v) => self.cal_max = *v,
            VolumeField::TrustCalMinMax(v) => self.trust_cal_min_max = *v,
            VolumeField::Visible(v) => self.visible = *v,
            VolumeField::ColorbarVisible(v) => self.colorbar_visible = *v,
            VolumeField::ModulateAlpha(v) => self.modulate_alpha = *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSnapshot {
    pub id: HandleId,
    pub url: String,
    pub name: String,
    pub opacity: f32,
    pub colormap: String,
    pub colormap_negative: String,
    pub use_negative_cmap: bool,
    #[serde(rename = "global_min")]
    pub global_min: f64,
    #[serde(rename = "global_max")]
    pub global_max: f64,
    #[serde(rename = "cal_min")]
    pub cal_min: f64,
    #[serde(rename = "cal_max")]
    pub cal_max: f64,
}

impl LayerSnapshot {
    pub(crate) fn loaded(id: HandleId, spec: &MeshLayerSpec) -> Self {
        Self {
            id,
            url: spec.url.clone(),
            name: spec
                .name
                .clone()
                .unwrap_or_else(|| display_name(&spec.url).to_string()),
            opacity: spec.opacity.unwrap_or(0.5),
            colormap: spec.colormap.clone().unwrap_or_else(|| "warm".to_string()),
            colormap_negative: spec.colormap_negative.clone().unwrap_or_else(|| "winter".to_string()),
            use_negative_cmap: spec.use_negative_cmap.unwrap_or(false),
            global_min: spec.global_min.unwrap_or(0.0),
            global_max: spec.global_max.unwrap_or(1.0),
            cal_min: spec.cal_min.unwrap_or(0.0),
            cal_max: spec.cal_max.unwrap_or(1.0),
        }
    }

    pub(crate) fn apply(&mut self, field: &LayerField) {
        match field {
            LayerField::Name(v) => self.name = v.clone(),
            LayerField::Opacity(v) => self.opacity = *v,
            LayerField::Colormap(v) => self.colormap = v.clone(),
            LayerField::ColormapNegative(v) => self.colormap_negative = v.clone(),
            LayerField::UseNegativeCmap(v) => self.use_negative_cmap = *v,
            LayerField::GlobalMin(v) => self.global_min = *v,
            LayerField::GlobalMax(v) => self.global_max = *v,
            LayerField::CalMin(v) => self.cal_min = *v,
            LayerField::CalMax(v) => self.cal_max = *v,
        }
    }
}

/// Live state of a mesh and its overlay layers, in layer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSnapshot {
    pub id: HandleId,
    pub url: String,
    pub name: String,
    pub opacity: f32,
    pub visible: bool,
    pub rgba255: [u8; 4],
    pub colorbar_visible: bool,
    pub layers: Vec<LayerSnapshot>,
}

impl MeshSnapshot {
    pub(crate) fn loaded(id: HandleId, locator: &str, options: &MeshLoadOptions) -> Self {
        Self {
            id,
            url: locator.to_string(),
            name: options
                .name
                .clone()
                .unwrap_or_else(|| display_name(locator).to_string()),
            opacity: options.opacity.unwrap_or(1.0),
            visible: options.visible.unwrap_or(true),
            rgba255: options.rgba255.unwrap_or([255, 255, 255, 255]),
            colorbar_visible: options.colorbar_visible.unwrap_or(true),
            layers: Vec::new(),
        }
    }

    pub(crate) fn apply(&mut self, field: &MeshField) {
        match field {
            MeshField::Name(v) => self.name = v.clone(),
            MeshField::Opacity(v) => self.opacity = *v,
            MeshField::Visible(v) => self.visible = *v,
            MeshField::Rgba255(v) => self.rgba255 = *v,
            MeshField::ColorbarVisible(v) => self.colorbar_visible = *v,
        }
    }

    pub fn layer(&self, name: &str) -> Option<&LayerSnapshot> {
        self.layers.iter().find(|l| l.name == name)
    }
}

/// Values the engine keeps behind its dedicated option setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetterSnapshot {
    pub crosshair_color: [f32; 4],
    pub crosshair_width: f32,
    pub vol_scale_multiplier: f32,
    pub overlay_outline_width: f32,
}

impl Default for SetterSnapshot {
    fn default() -> Self {
        Self {
            crosshair_color: [1.0, 0.0, 0.0, 1.0],
            crosshair_width: 1.0,
            vol_scale_multiplier: 1.0,
            overlay_outline_width: 0.0,
        }
    }
}
