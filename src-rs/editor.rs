use serde::Serialize;
use tracing::debug;

use crate::error::{ReviewError, ReviewResult};
use crate::layers::{Layer, LayerId};

/// Per-layer view state: which overlay is foregrounded, and each overlay's
/// visibility and opacity.
///
/// Layers are addressed by [`LayerId`], so an edit only ever touches the layer
/// it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayEditor {
    layers: Vec<Layer>,
    selected_layer_index: usize,
}

impl OverlayEditor {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self {
            layers,
            selected_layer_index: 0,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn selected_index(&self) -> usize {
        self.selected_layer_index
    }

    pub fn selected(&self) -> Option<&Layer> {
        self.layers.get(self.selected_layer_index)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f64) -> ReviewResult<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ReviewError::InvalidOpacity(opacity));
        }
        let layer = self.layer_mut(id)?;
        layer.set_opacity(opacity);
        debug!(layer = %id, opacity, "layer opacity changed");
        Ok(())
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> ReviewResult<()> {
        let layer = self.layer_mut(id)?;
        layer.set_active(visible);
        debug!(layer = %id, visible, "layer visibility changed");
        Ok(())
    }

    pub fn select_layer(&mut self, index: usize) -> ReviewResult<()> {
        if index >= self.layers.len() {
            return Err(ReviewError::IndexOutOfRange {
                index,
                len: self.layers.len(),
            });
        }
        self.selected_layer_index = index;
        Ok(())
    }

    fn layer_mut(&mut self, id: LayerId) -> ReviewResult<&mut Layer> {
        self.layers
            .iter_mut()
            .find(|layer| layer.id == id)
            .ok_or(ReviewError::UnknownLayer(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewConfig;
    use crate::layers::{build_layer_model, Display, RawBaseImage, RawLayer};

    fn editor() -> OverlayEditor {
        let raw = |name: &str| RawLayer {
            name: Some(name.to_string()),
            image: "AAAA".to_string(),
            width: Some(100.0),
            height: Some(100.0),
            description: None,
            category: None,
        };
        let base = RawBaseImage {
            image: "AAAA".to_string(),
            width: Some(100.0),
            height: Some(100.0),
        };
        let model = build_layer_model(
            &base,
            &[raw("Heatmap"), raw("Segmentation"), raw("Outline")],
            &ReviewConfig::default(),
        );
        OverlayEditor::new(model.layers)
    }

    #[test]
    fn hide_then_show_restores_display_and_keeps_opacity() {
        let mut editor = editor();
        let id = LayerId(0);
        editor.set_opacity(id, 0.35).unwrap();

        editor.set_visible(id, false).unwrap();
        let hidden = editor.layer(id).unwrap();
        assert!(!hidden.active());
        assert_eq!(hidden.style().display(), Display::None);

        editor.set_visible(id, true).unwrap();
        let shown = editor.layer(id).unwrap();
        assert!(shown.active());
        assert_eq!(shown.style().display(), Display::Block);
        assert_eq!(shown.opacity(), 0.35);
    }

    #[test]
    fn opacity_leaves_other_layers_alone() {
        let mut editor = editor();
        editor.set_visible(LayerId(2), false).unwrap();
        let before: Vec<Layer> = editor.layers().to_vec();

        editor.set_opacity(LayerId(1), 0.1).unwrap();

        for (old, new) in before.iter().zip(editor.layers()) {
            assert_eq!(old.active(), new.active());
            assert_eq!(old.style().display(), new.style().display());
            if new.id != LayerId(1) {
                assert_eq!(old.opacity(), new.opacity());
            }
        }
        assert_eq!(editor.layer(LayerId(1)).unwrap().opacity(), 0.1);
        assert!(editor.layer(LayerId(1)).unwrap().active());
    }

    #[test]
    fn invalid_opacity_is_rejected_without_change() {
        let mut editor = editor();
        let before = editor.clone();
        assert_eq!(
            editor.set_opacity(LayerId(0), 1.2),
            Err(ReviewError::InvalidOpacity(1.2))
        );
        assert!(editor.set_opacity(LayerId(0), f64::NAN).is_err());
        assert_eq!(editor, before);
    }

    #[test]
    fn select_out_of_range_keeps_selection() {
        let mut editor = editor();
        editor.select_layer(2).unwrap();
        assert_eq!(
            editor.select_layer(3),
            Err(ReviewError::IndexOutOfRange { index: 3, len: 3 })
        );
        assert_eq!(editor.selected_index(), 2);
        assert_eq!(editor.selected().map(|l| l.name.as_str()), Some("Outline"));
    }

    #[test]
    fn unknown_layer_is_reported() {
        let mut editor = editor();
        assert_eq!(
            editor.set_visible(LayerId(9), false),
            Err(ReviewError::UnknownLayer(LayerId(9)))
        );
    }

    #[test]
    fn empty_stack_rejects_selection() {
        let mut editor = OverlayEditor::default();
        assert!(editor.selected().is_none());
        assert_eq!(
            editor.select_layer(0),
            Err(ReviewError::IndexOutOfRange { index: 0, len: 0 })
        );
    }
}
