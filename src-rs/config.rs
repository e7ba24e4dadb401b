use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHART_TITLE: &str = "KL Score Prediction Probabilities [%]";
pub const OUT_DIR_ENV: &str = "XRAY_REVIEW_OUT_DIR";

/// Presentation defaults for the layer stack and the probability chart.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Multiplier applied to source widths to get display widths.
    pub display_scale: f64,
    pub heatmap_opacity: f64,
    pub default_opacity: f64,
    /// Data-URL header prepended to encoded image payloads.
    pub image_prefix: String,
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub series_label: String,
    pub bar_color: String,
    pub show_y_axis: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            display_scale: 1.5,
            heatmap_opacity: 0.8,
            default_opacity: 1.0,
            image_prefix: "data:image/png;base64".to_string(),
            chart: ChartConfig::default(),
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            title: CHART_TITLE.to_string(),
            width: 480,
            height: 300,
            series_label: "Kellgren-Lawrence Score".to_string(),
            bar_color: "#2a71d0".to_string(),
            show_y_axis: true,
        }
    }
}

impl ReviewConfig {
    /// Reads a JSON config file, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.display_scale.is_finite() && self.display_scale > 0.0) {
            anyhow::bail!("display_scale must be a positive number");
        }
        for (key, value) in [
            ("heatmap_opacity", self.heatmap_opacity),
            ("default_opacity", self.default_opacity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{key} must be within [0, 1], got {value}");
            }
        }
        if self.chart.width < 64 || self.chart.height < 64 {
            anyhow::bail!("chart must be at least 64x64 pixels");
        }
        Ok(())
    }
}

/// Output root: explicit flag, then `XRAY_REVIEW_OUT_DIR`, then `.xray-review`.
pub fn out_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    env::var(OUT_DIR_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".xray-review"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("review.json");
        fs::write(&path, r#"{"heatmap_opacity": 0.5, "chart": {"width": 640}}"#).unwrap();

        let config = ReviewConfig::load(Some(&path)).unwrap();
        assert_eq!(config.heatmap_opacity, 0.5);
        assert_eq!(config.display_scale, 1.5);
        assert_eq!(config.chart.width, 640);
        assert_eq!(config.chart.height, 300);
        assert_eq!(config.chart.title, CHART_TITLE);
    }

    #[test]
    fn rejects_out_of_range_opacity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("review.json");
        fs::write(&path, r#"{"default_opacity": 1.4}"#).unwrap();
        assert!(ReviewConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn missing_path_uses_defaults() {
        assert_eq!(ReviewConfig::load(None).unwrap(), ReviewConfig::default());
    }

    #[test]
    fn explicit_out_root_wins() {
        let root = out_root(Some(Path::new("/tmp/explicit")));
        assert_eq!(root, PathBuf::from("/tmp/explicit"));
    }
}
