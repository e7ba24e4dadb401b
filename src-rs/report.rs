use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::composite::{compose, encode_png};
use crate::context::CaseSnapshot;
use crate::layers::{LayerCategory, LayerId};
use crate::scores::ScoreEntry;

pub const REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLayer {
    pub id: LayerId,
    pub name: String,
    pub category: LayerCategory,
    pub active: bool,
    pub opacity: f64,
    pub description: Option<String>,
    /// Composited PNG, relative to the report directory.
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub report_version: u32,
    pub generated_at: String,
    pub case_version: u64,
    pub predicted_score: u32,
    pub distribution: Vec<ScoreEntry>,
    pub chart_path: Option<String>,
    pub base_image_path: String,
    pub layers: Vec<ReportLayer>,
    pub selected_layer_index: Option<usize>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub dir: PathBuf,
    pub json: PathBuf,
}

/// Writes the report JSON and its image artifacts into `dir`.
///
/// Every visible layer is composited over the base image into its own PNG;
/// hidden layers are listed but not rendered.
pub fn write_report(snapshot: &CaseSnapshot, dir: &Path) -> Result<ReportPaths> {
    let Some(images) = &snapshot.images else {
        bail!("case has no analysis images; finish the analysis stage first");
    };
    let Some(predicted_score) = snapshot.predicted_score else {
        bail!("case has no predicted score; finish the analysis stage first");
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create report directory: {}", dir.display()))?;

    let base_name = "base.png".to_string();
    let base = compose(&images.base_image, None).context("failed to render base image")?;
    write_png(&dir.join(&base_name), &encode_png(&base)?)?;

    let mut layers = Vec::with_capacity(images.explanations.len());
    for layer in &images.explanations {
        let image_path = if layer.active() {
            let name = format!("layer-{}-{}.png", layer.id.0, slugify(&layer.name));
            let rendered = compose(&images.base_image, Some(layer))
                .with_context(|| format!("failed to composite layer {}", layer.name))?;
            write_png(&dir.join(&name), &encode_png(&rendered)?)?;
            Some(name)
        } else {
            None
        };
        layers.push(ReportLayer {
            id: layer.id,
            name: layer.name.clone(),
            category: layer.category,
            active: layer.active(),
            opacity: layer.opacity(),
            description: layer.tooltip().map(ToString::to_string),
            image_path,
        });
    }

    let chart_path = match &snapshot.chart_snapshot {
        Some(chart) => {
            let name = "chart.png".to_string();
            write_png(&dir.join(&name), &chart.png_bytes()?)?;
            Some(name)
        }
        None => None,
    };

    let report = Report {
        report_version: REPORT_VERSION,
        generated_at: Utc::now().to_rfc3339(),
        case_version: snapshot.version,
        predicted_score,
        distribution: snapshot.score_distribution.clone().unwrap_or_default(),
        chart_path,
        base_image_path: base_name,
        layers,
        selected_layer_index: snapshot.selected_layer_index,
        notes: snapshot.notes.clone(),
    };

    let json = dir.join("report.json");
    let raw = serde_json::to_string_pretty(&report)?;
    fs::write(&json, raw).with_context(|| format!("failed to write JSON: {}", json.display()))?;
    info!(path = %json.display(), layers = report.layers.len(), "report written");

    Ok(ReportPaths {
        dir: dir.to_path_buf(),
        json,
    })
}

fn write_png(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write image: {}", path.display()))
}

pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || matches!(lower, '_' | '-') {
            out.push(lower);
        } else if lower.is_ascii_whitespace() {
            out.push('-');
        }
    }
    if out.is_empty() {
        "layer".to_string()
    } else {
        out
    }
}
