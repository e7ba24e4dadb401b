use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ReviewConfig;
use crate::error::{ReviewError, ReviewResult};

/// Stable identity of a layer: its position in the response it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub usize);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerCategory {
    Heatmap,
    Segmentation,
    Outline,
    Other,
}

impl LayerCategory {
    /// Classifies a layer from its name when upstream did not send a category.
    pub fn classify(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::Other;
        };
        let lower = name.to_ascii_lowercase();
        if lower.contains("heatmap") || lower.contains("grad") {
            Self::Heatmap
        } else if lower.contains("segment") || lower.contains("mask") || lower.contains("lime") {
            Self::Segmentation
        } else if lower.contains("outline") || lower.contains("box") || lower.contains("arrow") {
            Self::Outline
        } else {
            Self::Other
        }
    }

    pub fn default_opacity(self, config: &ReviewConfig) -> f64 {
        match self {
            Self::Heatmap => config.heatmap_opacity,
            _ => config.default_opacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Display {
    Block,
    None,
}

impl From<bool> for Display {
    fn from(shown: bool) -> Self {
        if shown {
            Self::Block
        } else {
            Self::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStyle {
    pub opacity: f64,
    display: Display,
    pub display_width: f64,
}

impl LayerStyle {
    pub fn display(&self) -> Display {
        self.display
    }
}

/// One overlay in the stack.
///
/// `active` and `style.display` are private and only change together through
/// [`Layer::set_active`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub category: LayerCategory,
    /// Displayable data URL (prefix already applied).
    pub image: String,
    pub width: f64,
    pub height: f64,
    pub description: Option<String>,
    active: bool,
    style: LayerStyle,
}

impl Layer {
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn style(&self) -> &LayerStyle {
        &self.style
    }

    pub fn opacity(&self) -> f64 {
        self.style.opacity
    }

    /// Hover text, if the layer has a non-empty description.
    pub fn tooltip(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.trim().is_empty())
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
        self.style.display = Display::from(active);
    }

    pub(crate) fn set_opacity(&mut self, opacity: f64) {
        self.style.opacity = opacity;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStyle {
    pub display_width: f64,
}

/// The unmodified source X-ray. The payload stays raw; see [`BaseImage::data_url`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseImage {
    pub image: String,
    pub width: f64,
    pub height: f64,
    pub style: BaseStyle,
}

impl BaseImage {
    pub fn data_url(&self, prefix: &str) -> String {
        with_prefix(prefix, &self.image)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBaseImage {
    pub image: String,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLayer {
    #[serde(default)]
    pub name: Option<String>,
    pub image: String,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<LayerCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerModel {
    pub base_image: BaseImage,
    pub layers: Vec<Layer>,
}

/// Turns a raw analysis result into a renderable, editable layer stack.
pub fn build_layer_model(
    base: &RawBaseImage,
    explanations: &[RawLayer],
    config: &ReviewConfig,
) -> LayerModel {
    let layers = explanations
        .iter()
        .enumerate()
        .map(|(idx, raw)| build_layer(LayerId(idx), raw, config))
        .collect();

    let width = base.width.unwrap_or(0.0);
    let base_image = BaseImage {
        image: base.image.clone(),
        width,
        height: base.height.unwrap_or(0.0),
        style: BaseStyle {
            display_width: width * config.display_scale,
        },
    };

    LayerModel { base_image, layers }
}

fn build_layer(id: LayerId, raw: &RawLayer, config: &ReviewConfig) -> Layer {
    let category = raw
        .category
        .unwrap_or_else(|| LayerCategory::classify(raw.name.as_deref()));
    let width = raw.width.unwrap_or(0.0);
    Layer {
        id,
        name: raw.name.clone().unwrap_or_default(),
        category,
        image: with_prefix(&config.image_prefix, &raw.image),
        width,
        height: raw.height.unwrap_or(0.0),
        description: raw.description.clone(),
        active: true,
        style: LayerStyle {
            opacity: category.default_opacity(config),
            display: Display::Block,
            display_width: width * config.display_scale,
        },
    }
}

pub fn with_prefix(prefix: &str, payload: &str) -> String {
    format!("{},{}", prefix.trim_end_matches(','), payload.trim())
}

/// Decodes a base64 payload, with or without a data-URL header.
pub fn decode_payload(source: &str) -> ReviewResult<Vec<u8>> {
    let payload = match source.split_once("base64,") {
        Some((_, rest)) => rest,
        None => source,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|err| ReviewError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, width: f64) -> RawLayer {
        RawLayer {
            name: Some(name.to_string()),
            image: "AAAA".to_string(),
            width: Some(width),
            height: Some(width),
            description: None,
            category: None,
        }
    }

    fn base() -> RawBaseImage {
        RawBaseImage {
            image: "QkFTRQ==".to_string(),
            width: Some(224.0),
            height: Some(224.0),
        }
    }

    #[test]
    fn heatmap_and_segmentation_defaults() {
        let config = ReviewConfig::default();
        let model = build_layer_model(
            &base(),
            &[raw("Heatmap-Grad", 200.0), raw("Segmentation", 100.0)],
            &config,
        );

        let heat = &model.layers[0];
        assert_eq!(heat.category, LayerCategory::Heatmap);
        assert_eq!(heat.style().opacity, 0.8);
        assert_eq!(heat.style().display_width, 300.0);

        let seg = &model.layers[1];
        assert_eq!(seg.category, LayerCategory::Segmentation);
        assert_eq!(seg.style().opacity, 1.0);
        assert_eq!(seg.style().display_width, 150.0);
    }

    #[test]
    fn new_layers_are_active_and_prefixed() {
        let model = build_layer_model(&base(), &[raw("Outline", 10.0)], &ReviewConfig::default());
        let layer = &model.layers[0];
        assert!(layer.active());
        assert_eq!(layer.style().display(), Display::Block);
        assert_eq!(layer.image, "data:image/png;base64,AAAA");
        assert_eq!(layer.id, LayerId(0));
    }

    #[test]
    fn base_image_keeps_raw_payload() {
        let model = build_layer_model(&base(), &[], &ReviewConfig::default());
        assert_eq!(model.base_image.image, "QkFTRQ==");
        assert_eq!(model.base_image.style.display_width, 336.0);
        assert_eq!(
            model.base_image.data_url("data:image/png;base64"),
            "data:image/png;base64,QkFTRQ=="
        );
    }

    #[test]
    fn explicit_category_overrides_name() {
        let mut layer = raw("Heatmap lookalike", 50.0);
        layer.category = Some(LayerCategory::Segmentation);
        let model = build_layer_model(&base(), &[layer], &ReviewConfig::default());
        assert_eq!(model.layers[0].style().opacity, 1.0);
    }

    #[test]
    fn missing_fields_are_hardened() {
        let layer = RawLayer {
            name: None,
            image: "AAAA".to_string(),
            width: None,
            height: None,
            description: Some("  ".to_string()),
            category: None,
        };
        let model = build_layer_model(&base(), &[layer], &ReviewConfig::default());
        let built = &model.layers[0];
        assert_eq!(built.category, LayerCategory::Other);
        assert_eq!(built.style().display_width, 0.0);
        assert_eq!(built.style().opacity, 1.0);
        assert_eq!(built.tooltip(), None);
    }

    #[test]
    fn raw_layer_reads_camel_case_json() {
        let parsed: RawLayer = serde_json::from_str(
            r#"{"name":"Heatmap","image":"AAAA","width":224,"height":224,"description":"Grad-CAM"}"#,
        )
        .unwrap();
        assert_eq!(parsed.width, Some(224.0));
        assert_eq!(parsed.description.as_deref(), Some("Grad-CAM"));
    }

    #[test]
    fn decodes_with_and_without_header() {
        assert_eq!(decode_payload("QkFTRQ==").unwrap(), b"BASE");
        assert_eq!(decode_payload("data:image/png;base64,QkFTRQ==").unwrap(), b"BASE");
        assert!(matches!(decode_payload("%%%"), Err(ReviewError::Decode(_))));
    }
}
