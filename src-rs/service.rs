use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::layers::{RawBaseImage, RawLayer};
use crate::scores::ScoreEntry;

/// Payload returned by the inference backend for one X-ray.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub base_image: RawBaseImage,
    #[serde(default)]
    pub explanations: Vec<RawLayer>,
    pub kl_scores: KlScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlScores {
    pub distributions: Vec<ScoreEntry>,
}

/// The upstream analysis boundary.
pub trait AnalysisService {
    fn fetch(&self, source_image: &str) -> Result<AnalysisResponse>;
}

/// Serves a recorded backend response from disk.
#[derive(Debug, Clone)]
pub struct FileAnalysisService {
    path: PathBuf,
}

impl FileAnalysisService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnalysisService for FileAnalysisService {
    fn fetch(&self, _source_image: &str) -> Result<AnalysisResponse> {
        load_response(&self.path)
    }
}

pub fn load_response(path: &Path) -> Result<AnalysisResponse> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read analysis response: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid analysis response JSON: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RESPONSE: &str = r#"{
        "baseImage": {"image": "QkFTRQ==", "width": 224, "height": 224},
        "explanations": [
            {"name": "Heatmap", "image": "AAAA", "width": 224, "height": 224, "description": "Grad-CAM"},
            {"name": "Segmentation", "image": "AAAA", "width": 224, "height": 224}
        ],
        "klScores": {"distributions": [
            {"score": 0, "prob": 0.1}, {"score": 1, "prob": 0.7}, {"score": 2, "prob": 0.2}
        ]}
    }"#;

    #[test]
    fn reads_recorded_response() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("response.json");
        fs::write(&path, RESPONSE).unwrap();

        let service = FileAnalysisService::new(&path);
        let response = service.fetch("xray.png").unwrap();
        assert_eq!(response.explanations.len(), 2);
        assert_eq!(response.kl_scores.distributions[1].score, 1);
        assert_eq!(response.base_image.width, Some(224.0));
    }

    #[test]
    fn missing_file_has_context() {
        let service = FileAnalysisService::new("/nonexistent/response.json");
        let err = service.fetch("xray.png").unwrap_err();
        assert!(format!("{err:#}").contains("failed to read analysis response"));
    }
}
