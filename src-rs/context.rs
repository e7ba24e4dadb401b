use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chart::ChartSnapshot;
use crate::events::{Generation, GenerationCounter};
use crate::layers::{BaseImage, Layer};
use crate::scores::ScoreEntry;
use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseImages {
    pub base_image: BaseImage,
    pub explanations: Vec<Layer>,
}

/// Everything a review session has accumulated so far.
///
/// Reads hand out a clone of the whole record, so a reader always sees one
/// complete commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSnapshot {
    pub version: u64,
    pub stage: Stage,
    pub source_image: Option<String>,
    pub images: Option<CaseImages>,
    pub score_distribution: Option<Vec<ScoreEntry>>,
    pub predicted_score: Option<u32>,
    pub chart_snapshot: Option<ChartSnapshot>,
    /// Layer foregrounded when the analysis stage was left.
    pub selected_layer_index: Option<usize>,
    pub notes: Option<String>,
}

impl Default for CaseSnapshot {
    fn default() -> Self {
        Self {
            version: 0,
            stage: Stage::Upload,
            source_image: None,
            images: None,
            score_distribution: None,
            predicted_score: None,
            chart_snapshot: None,
            selected_layer_index: None,
            notes: None,
        }
    }
}

/// The shared case record for one review session.
///
/// Owned by the session and lent to each stage controller. Every write is a
/// field-level merge; fields a commit does not mention keep their value.
#[derive(Debug, Default)]
pub struct CaseContext {
    state: CaseSnapshot,
    render_passes: GenerationCounter,
}

impl CaseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CaseSnapshot {
        self.state.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn stage_index(&self) -> usize {
        self.state.stage.index()
    }

    pub fn images(&self) -> Option<&CaseImages> {
        self.state.images.as_ref()
    }

    pub fn score_distribution(&self) -> Option<&[ScoreEntry]> {
        self.state.score_distribution.as_deref()
    }

    pub fn predicted_score(&self) -> Option<u32> {
        self.state.predicted_score
    }

    pub fn chart_snapshot(&self) -> Option<&ChartSnapshot> {
        self.state.chart_snapshot.as_ref()
    }

    pub fn source_image(&self) -> Option<&str> {
        self.state.source_image.as_deref()
    }

    pub fn selected_layer_index(&self) -> Option<usize> {
        self.state.selected_layer_index
    }

    pub fn notes(&self) -> Option<&str> {
        self.state.notes.as_deref()
    }

    pub fn set_source_image(&mut self, source: impl Into<String>) {
        self.state.source_image = Some(source.into());
        self.bump("source_image");
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) {
        self.state.notes = Some(notes.into());
        self.bump("notes");
    }

    /// Merges analysis results. `None` leaves the stored field as it was.
    pub fn commit_analysis(
        &mut self,
        images: Option<CaseImages>,
        distribution: Option<Vec<ScoreEntry>>,
        predicted: Option<u32>,
    ) {
        if images.is_none() && distribution.is_none() && predicted.is_none() {
            return;
        }
        if let Some(images) = images {
            self.state.images = Some(images);
        }
        if let Some(distribution) = distribution {
            self.state.score_distribution = Some(distribution);
        }
        if let Some(predicted) = predicted {
            self.state.predicted_score = Some(predicted);
        }
        self.bump("analysis");
    }

    /// Issues the token for a new chart render pass. Every producer in the
    /// session draws from here, so a later pass always compares newer.
    pub fn issue_render_pass(&mut self) -> Generation {
        self.render_passes.advance()
    }

    pub fn commit_selection(&mut self, index: usize) {
        if self.state.selected_layer_index == Some(index) {
            return;
        }
        self.state.selected_layer_index = Some(index);
        self.bump("selected_layer_index");
    }

    /// Stores a chart snapshot unless a newer render pass already landed.
    pub fn commit_snapshot(&mut self, snapshot: ChartSnapshot) -> bool {
        if let Some(existing) = &self.state.chart_snapshot {
            if existing.generation > snapshot.generation {
                warn!(
                    stored = %existing.generation,
                    incoming = %snapshot.generation,
                    "ignoring chart snapshot from an older render pass"
                );
                return false;
            }
        }
        self.state.chart_snapshot = Some(snapshot);
        self.bump("chart_snapshot");
        true
    }

    /// Moves the stage cursor forward; stays put on the last stage.
    pub fn advance_stage(&mut self) -> Stage {
        match self.state.stage.next() {
            Some(next) => {
                self.state.stage = next;
                self.bump("stage");
                info!(stage = next.title(), index = next.index(), "stage advanced");
            }
            None => warn!(stage = self.state.stage.title(), "already at final stage"),
        }
        self.state.stage
    }

    fn bump(&mut self, field: &'static str) {
        self.state.version += 1;
        debug!(field, version = self.state.version, "case context committed");
    }
}
