use serde::{Deserialize, Serialize};

use crate::locator::{changed, Located};

/// A surface overlay (e.g. cortical thickness) drawn on a mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshLayerSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colormap_negative: Option<String>,
    /// Whether negative values are drawn with `colormap_negative`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_negative_cmap: Option<bool>,
    #[serde(rename = "global_min", default, skip_serializing_if = "Option::is_none")]
    pub global_min: Option<f64>,
    #[serde(rename = "global_max", default, skip_serializing_if = "Option::is_none")]
    pub global_max: Option<f64>,
    #[serde(rename = "cal_min", default, skip_serializing_if = "Option::is_none")]
    pub cal_min: Option<f64>,
    #[serde(rename = "cal_max", default, skip_serializing_if = "Option::is_none")]
    pub cal_max: Option<f64>,
}

/// A mesh (e.g. a white-matter surface) with its overlay layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSpec {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Base vertex color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgba255: Option<[u8; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorbar_visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<MeshLayerSpec>,
}

/// Mesh attributes accepted at load time. Layers are loaded separately once
/// the mesh itself is live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshLoadOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rgba255: Option<[u8; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colorbar_visible: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum MeshField {
    Name(String),
    Opacity(f32),
    Visible(bool),
    Rgba255([u8; 4]),
    ColorbarVisible(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum LayerField {
    Name(String),
    Opacity(f32),
    Colormap(String),
    ColormapNegative(String),
    UseNegativeCmap(bool),
    GlobalMin(f64),
    GlobalMax(f64),
    CalMin(f64),
    CalMax(f64),
}

impl MeshField {
    pub fn name(&self) -> &'static str {
        match self {
            MeshField::Name(_) => "name",
            MeshField::Opacity(_) => "opacity",
            MeshField::Visible(_) => "visible",
            MeshField::Rgba255(_) => "rgba255",
            MeshField::ColorbarVisible(_) => "colorbarVisible",
        }
    }

    pub fn apply_to(&self, spec: &mut MeshSpec) {
        match self {
            MeshField::Name(v) => spec.name = Some(v.clone()),
            MeshField::Opacity(v) => spec.opacity = Some(*v),
            MeshField::Visible(v) => spec.visible = Some(*v),
            MeshField::Rgba255(v) => spec.rgba255 = Some(*v),
            MeshField::ColorbarVisible(v) => spec.colorbar_visible = Some(*v),
        }
    }
}

impl LayerField {
    pub fn name(&self) -> &'static str {
        match self {
            LayerField::Name(_) => "name",
            LayerField::Opacity(_) => "opacity",
            LayerField::Colormap(_) => "colormap",
            LayerField::ColormapNegative(_) => "colormapNegative",
            LayerField::UseNegativeCmap(_) => "useNegativeCmap",
            LayerField::GlobalMin(_) => "global_min",
            LayerField::GlobalMax(_) => "global_max",
            LayerField::CalMin(_) => "cal_min",
            LayerField::CalMax(_) => "cal_max",
        }
    }

    pub fn apply_to(&self, spec: &mut MeshLayerSpec) {
        match self {
            LayerField::Name(v) => spec.name = Some(v.clone()),
            LayerField::Opacity(v) => spec.opacity = Some(*v),
            LayerField::Colormap(v) => spec.colormap = Some(v.clone()),
            LayerField::ColormapNegative(v) => spec.colormap_negative = Some(v.clone()),
            LayerField::UseNegativeCmap(v) => spec.use_negative_cmap = Some(*v),
            LayerField::GlobalMin(v) => spec.global_min = Some(*v),
            LayerField::GlobalMax(v) => spec.global_max = Some(*v),
            LayerField::CalMin(v) => spec.cal_min = Some(*v),
            LayerField::CalMax(v) => spec.cal_max = Some(*v),
        }
    }
}

impl MeshSpec {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_layer(mut self, layer: MeshLayerSpec) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_rgba(mut self, rgba255: [u8; 4]) -> Self {
        self.rgba255 = Some(rgba255);
        self
    }

    pub fn list_from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load_options(&self) -> MeshLoadOptions {
        MeshLoadOptions {
            name: self.name.clone(),
            opacity: self.opacity,
            visible: self.visible,
            rgba255: self.rgba255,
            colorbar_visible: self.colorbar_visible,
        }
    }

    /// The mesh's own attributes, without its layer list.
    pub fn without_layers(&self) -> MeshSpec {
        MeshSpec {
            layers: Vec::new(),
            ..self.clone()
        }
    }

    /// Mesh fields set on `self` that differ from `applied`. Layers are
    /// reconciled on their own and never show up here.
    pub fn changed_fields(&self, applied: &MeshSpec) -> Vec<MeshField> {
        let mut fields = Vec::new();
        if let Some(v) = changed(&self.name, &applied.name) {
            fields.push(MeshField::Name(v));
        }
        if let Some(v) = changed(&self.opacity, &applied.opacity) {
            fields.push(MeshField::Opacity(v));
        }
        if let Some(v) = changed(&self.visible, &applied.visible) {
            fields.push(MeshField::Visible(v));
        }
        if let Some(v) = changed(&self.rgba255, &applied.rgba255) {
            fields.push(MeshField::Rgba255(v));
        }
        if let Some(v) = changed(&self.colorbar_visible, &applied.colorbar_visible) {
            fields.push(MeshField::ColorbarVisible(v));
        }
        fields
    }

    /// Find a layer spec by locator.
    pub fn layer(&self, locator: &str) -> Option<&MeshLayerSpec> {
        self.layers.iter().find(|l| l.url == locator)
    }
}

impl MeshLayerSpec {
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

    pub fn changed_fields(&self, applied: &MeshLayerSpec) -> Vec<LayerField> {
        let mut fields = Vec::new();
        if let Some(v) = changed(&self.name, &applied.name) {
            fields.push(LayerField::Name(v));
        }
        if let Some(v) = changed(&self.opacity, &applied.opacity) {
            fields.push(LayerField::Opacity(v));
        }
        if let Some(v) = changed(&self.colormap, &applied.colormap) {
            fields.push(LayerField::Colormap(v));
        }
        if let Some(v) = changed(&self.colormap_negative, &applied.colormap_negative) {
            fields.push(LayerField::ColormapNegative(v));
        }
        if let Some(v) = changed(&self.use_negative_cmap, &applied.use_negative_cmap) {
            fields.push(LayerField::UseNegativeCmap(v));
        }
        if let Some(v) = changed(&self.global_min, &applied.global_min) {
            fields.push(LayerField::GlobalMin(v));
        }
        if let Some(v) = changed(&self.global_max, &applied.global_max) {
            fields.push(LayerField::GlobalMax(v));
        }
        if let Some(v) = changed(&self.cal_min, &applied.cal_min) {
            fields.push(LayerField::CalMin(v));
        }
        if let Some(v) = changed(&self.cal_max, &applied.cal_max) {
            fields.push(LayerField::CalMax(v));
        }
        fields
    }
}

impl Located for MeshSpec {
    fn locator(&self) -> &str {
        &self.url
    }
}

impl Located for MeshLayerSpec {
    fn locator(&self) -> &str {
        &self.url
    }
}
