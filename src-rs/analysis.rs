//! Controller for the analysis stage.
//!
//! Owns the local [`ViewState`] for one visit to the stage, turns backend
//! completions into a layer stack, and keeps the shared [`CaseContext`] in
//! step with every meaningful change.

use serde::Serialize;
use tracing::{info, warn};

use crate::chart::{ChartData, ChartSnapshot, ChartSnapshotProducer, RenderSurface};
use crate::config::ReviewConfig;
use crate::context::{CaseContext, CaseImages};
use crate::editor::OverlayEditor;
use crate::error::{ReviewError, ReviewResult};
use crate::events::{CompletionQueue, Generation, GenerationCounter};
use crate::layers::{build_layer_model, BaseImage, LayerId};
use crate::scores::{resolve_scores, ScoreEntry};
use crate::service::{AnalysisResponse, AnalysisService};
use crate::stage::Stage;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub overlays: OverlayEditor,
    pub base_image: Option<BaseImage>,
    pub predicted_score: Option<u32>,
    pub distribution: Vec<ScoreEntry>,
    pub chart: Option<ChartData>,
    pub chart_snapshot: Option<ChartSnapshot>,
    pub is_loading: bool,
    /// Set when the last fetch failed; the view stays loading.
    pub last_error: Option<String>,
}

impl ViewState {
    /// Editor controls are only reachable once layers have landed.
    pub fn editable(&self) -> bool {
        !self.is_loading && !self.overlays.is_empty()
    }
}

#[derive(Debug)]
pub enum Completion {
    Fetched {
        generation: Generation,
        result: Result<AnalysisResponse, String>,
    },
    RenderSettled {
        generation: Generation,
    },
}

pub struct AnalysisStage<S> {
    config: ReviewConfig,
    view: ViewState,
    fetches: GenerationCounter,
    charts: ChartSnapshotProducer<S>,
    queue: CompletionQueue<Completion>,
}

impl<S: RenderSurface> AnalysisStage<S> {
    pub fn new(config: ReviewConfig, surface: S) -> Self {
        Self {
            config,
            view: ViewState::default(),
            fetches: GenerationCounter::default(),
            charts: ChartSnapshotProducer::new(surface),
            queue: CompletionQueue::default(),
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        self.charts.surface()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Mounts the stage. Issues a fetch only when no layers are present yet;
    /// the result is queued, not applied.
    pub fn enter(&mut self, service: &dyn AnalysisService, source_image: &str) -> Option<Generation> {
        if !self.view.overlays.is_empty() || self.view.is_loading {
            return None;
        }
        let generation = self.fetches.advance();
        self.view.is_loading = true;
        self.view.last_error = None;
        info!(%generation, "analysis fetch issued");

        let result = service.fetch(source_image).map_err(|err| format!("{err:#}"));
        self.queue.push(Completion::Fetched { generation, result });
        Some(generation)
    }

    /// Clears the view for a fresh visit. Anything still in flight becomes stale.
    pub fn reset(&mut self) {
        self.view = ViewState::default();
        self.fetches.advance();
        self.charts.invalidate();
    }

    /// Drains queued completions in order. Returns the ones that were
    /// discarded, e.g. for a generation that was superseded.
    pub fn run_until_idle(&mut self, ctx: &mut CaseContext) -> Vec<ReviewError> {
        let mut discarded = Vec::new();
        while let Some(completion) = self.queue.pop() {
            let outcome = match completion {
                Completion::Fetched { generation, result } => {
                    self.apply_fetch(generation, result, ctx)
                }
                Completion::RenderSettled { generation } => self.on_render_settled(generation, ctx),
            };
            if let Err(err) = outcome {
                warn!(error = %err, "completion discarded");
                discarded.push(err);
            }
        }
        discarded
    }

    pub fn apply_fetch(
        &mut self,
        generation: Generation,
        result: Result<AnalysisResponse, String>,
        ctx: &mut CaseContext,
    ) -> ReviewResult<()> {
        self.fetches.check(generation)?;
        let response = match result {
            Ok(response) => response,
            Err(message) => {
                warn!(%generation, error = %message, "analysis fetch failed");
                self.view.last_error = Some(message);
                return Ok(());
            }
        };

        let scores = match resolve_scores(&response.kl_scores.distributions) {
            Ok(scores) => scores,
            Err(err) => {
                warn!(%generation, error = %err, "analysis response rejected");
                self.view.last_error = Some(err.to_string());
                return Err(err);
            }
        };
        let model = build_layer_model(&response.base_image, &response.explanations, &self.config);
        let chart = ChartData::from_distribution(&scores.display, &self.config.chart);

        self.view = ViewState {
            overlays: OverlayEditor::new(model.layers),
            base_image: Some(model.base_image),
            predicted_score: Some(scores.predicted),
            distribution: scores.display,
            chart: Some(chart.clone()),
            chart_snapshot: None,
            is_loading: false,
            last_error: None,
        };
        info!(
            %generation,
            layers = self.view.overlays.layers().len(),
            predicted = scores.predicted,
            "analysis applied"
        );

        ctx.commit_analysis(
            self.current_images(),
            Some(self.view.distribution.clone()),
            self.view.predicted_score,
        );
        self.request_chart(&chart, ctx)
    }

    pub fn on_render_settled(
        &mut self,
        generation: Generation,
        ctx: &mut CaseContext,
    ) -> ReviewResult<()> {
        if let Some(snapshot) = self.charts.on_settled(generation)? {
            info!(%generation, "chart snapshot ready");
            self.view.chart_snapshot = Some(snapshot.clone());
            ctx.commit_snapshot(snapshot);
        }
        Ok(())
    }

    pub fn set_opacity(&mut self, ctx: &mut CaseContext, id: LayerId, opacity: f64) -> ReviewResult<()> {
        self.view.overlays.set_opacity(id, opacity)?;
        self.commit_images(ctx);
        Ok(())
    }

    pub fn set_visible(&mut self, ctx: &mut CaseContext, id: LayerId, visible: bool) -> ReviewResult<()> {
        self.view.overlays.set_visible(id, visible)?;
        self.commit_images(ctx);
        Ok(())
    }

    pub fn select_layer(&mut self, index: usize) -> ReviewResult<()> {
        self.view.overlays.select_layer(index)
    }

    /// Freezes the current view into the case context, then moves to the next stage.
    pub fn advance(&mut self, ctx: &mut CaseContext) -> Stage {
        ctx.commit_analysis(
            self.current_images(),
            (!self.view.distribution.is_empty()).then(|| self.view.distribution.clone()),
            self.view.predicted_score,
        );
        if let Some(snapshot) = self.view.chart_snapshot.clone() {
            ctx.commit_snapshot(snapshot);
        }
        if !self.view.overlays.is_empty() {
            ctx.commit_selection(self.view.overlays.selected_index());
        }
        ctx.advance_stage()
    }

    fn request_chart(&mut self, chart: &ChartData, ctx: &mut CaseContext) -> ReviewResult<()> {
        let generation = ctx.issue_render_pass();
        self.charts.request(chart, generation)?;
        self.queue.push(Completion::RenderSettled { generation });
        Ok(())
    }

    fn commit_images(&self, ctx: &mut CaseContext) {
        ctx.commit_analysis(self.current_images(), None, None);
    }

    fn current_images(&self) -> Option<CaseImages> {
        self.view.base_image.as_ref().map(|base_image| CaseImages {
            base_image: base_image.clone(),
            explanations: self.view.overlays.layers().to_vec(),
        })
    }
}
