use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use serde::Serialize;
use tracing::{debug, info};

use crate::composite::{blend_pixel, encode_png};
use crate::config::ChartConfig;
use crate::error::{ReviewError, ReviewResult};
use crate::events::Generation;
use crate::layers::{decode_payload, with_prefix};
use crate::scores::ScoreEntry;

const PNG_PREFIX: &str = "data:image/png;base64";
const Y_MAX: f64 = 100.0;

/// Series and options handed to a rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub title: String,
    pub series_label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub bar_color: String,
    pub show_y_axis: bool,
    pub show_legend: bool,
    pub animated: bool,
}

impl ChartData {
    /// `display` is expected in percent, already ordered by score.
    pub fn from_distribution(display: &[ScoreEntry], config: &ChartConfig) -> Self {
        Self {
            title: config.title.clone(),
            series_label: config.series_label.clone(),
            labels: display.iter().map(|e| e.score.to_string()).collect(),
            values: display.iter().map(|e| e.prob).collect(),
            bar_color: config.bar_color.clone(),
            show_y_axis: config.show_y_axis,
            show_legend: false,
            animated: false,
        }
    }
}

/// Static image of a rendered chart, tagged with the render pass it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSnapshot {
    pub generation: Generation,
    pub data_url: String,
}

impl ChartSnapshot {
    pub fn png_bytes(&self) -> ReviewResult<Vec<u8>> {
        decode_payload(&self.data_url)
    }
}

/// Something that can draw a chart and hand back the current frame as PNG.
pub trait RenderSurface {
    fn render(&mut self, chart: &ChartData) -> ReviewResult<()>;
    fn export_frame(&self) -> ReviewResult<Vec<u8>>;
}

/// Produces one snapshot per completed render pass.
///
/// Pass tokens are issued by the owner of the shared store (see
/// [`CaseContext::issue_render_pass`](crate::context::CaseContext::issue_render_pass)),
/// so tokens stay ordered across every producer in a session.
/// [`request`](Self::request) starts a pass; the caller reports it as settled
/// later through [`on_settled`](Self::on_settled). A newer request supersedes
/// any pass that has not settled yet.
#[derive(Debug)]
pub struct ChartSnapshotProducer<S> {
    surface: S,
    pending: Option<Generation>,
    delivered: Option<Generation>,
}

impl<S: RenderSurface> ChartSnapshotProducer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            pending: None,
            delivered: None,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn request(&mut self, chart: &ChartData, generation: Generation) -> ReviewResult<()> {
        self.pending = None;
        self.surface.render(chart)?;
        self.pending = Some(generation);
        info!(%generation, bars = chart.values.len(), "chart render pass started");
        Ok(())
    }

    /// Exports the frame for a settled pass. Returns `None` if that pass
    /// already produced its snapshot.
    pub fn on_settled(&mut self, generation: Generation) -> ReviewResult<Option<ChartSnapshot>> {
        if self.pending != Some(generation) {
            return Err(ReviewError::StaleFetchResult {
                expected: self.pending.unwrap_or_default(),
                actual: generation,
            });
        }
        if self.delivered == Some(generation) {
            debug!(%generation, "render pass already delivered");
            return Ok(None);
        }
        let png = self.surface.export_frame()?;
        self.delivered = Some(generation);
        Ok(Some(ChartSnapshot {
            generation,
            data_url: with_prefix(PNG_PREFIX, &STANDARD.encode(png)),
        }))
    }

    /// Drops any pass in flight.
    pub fn invalidate(&mut self) {
        self.pending = None;
    }
}

/// Draws bar charts into an RGBA buffer using an 8x8 bitmap font.
#[derive(Debug, Clone)]
pub struct BitmapSurface {
    width: u32,
    height: u32,
    frame: Option<RgbaImage>,
}

impl BitmapSurface {
    pub fn new(config: &ChartConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            frame: None,
        }
    }

    pub fn frame(&self) -> Option<&RgbaImage> {
        self.frame.as_ref()
    }
}

impl RenderSurface for BitmapSurface {
    fn render(&mut self, chart: &ChartData) -> ReviewResult<()> {
        if chart.labels.len() != chart.values.len() {
            return Err(ReviewError::Render(format!(
                "{} labels for {} values",
                chart.labels.len(),
                chart.values.len()
            )));
        }
        let bar_color = parse_hex_color(&chart.bar_color).unwrap_or(Rgba([42, 113, 208, 255]));
        let mut img = RgbaImage::from_pixel(self.width, self.height, Rgba([255, 255, 255, 255]));
        let (w, h) = (self.width as i32, self.height as i32);

        let title_x = ((w - text_width(&chart.title, 1)) / 2).max(2);
        draw_bitmap_text(&mut img, title_x, 6, &chart.title, Rgba([64, 64, 64, 255]), 1);

        let left = if chart.show_y_axis { 36 } else { 8 };
        let (top, right, bottom) = (24, w - 8, h - 20);
        let plot_h = (bottom - top).max(1);
        let axis = Rgba([120, 120, 120, 255]);
        let grid = Rgba([0, 0, 0, 28]);

        if chart.show_y_axis {
            for step in 0..=4 {
                let value = Y_MAX * f64::from(step) / 4.0;
                let y = bottom - (f64::from(plot_h) * value / Y_MAX).round() as i32;
                fill_rect_alpha(&mut img, left, y, right, y, grid);
                let label = format!("{value:.0}");
                draw_bitmap_text(&mut img, left - 4 - text_width(&label, 1), y - 4, &label, axis, 1);
            }
            fill_rect_alpha(&mut img, left, top, left, bottom, axis);
        }
        fill_rect_alpha(&mut img, left, bottom, right, bottom, axis);

        let slots = chart.values.len().max(1) as i32;
        let slot_w = ((right - left) / slots).max(1);
        let bar_w = ((f64::from(slot_w) * 0.6).round() as i32).max(1);
        for (idx, (label, value)) in chart.labels.iter().zip(&chart.values).enumerate() {
            let slot_x = left + slot_w * idx as i32;
            let bar_x = slot_x + (slot_w - bar_w) / 2;
            let bar_h = (f64::from(plot_h) * value.clamp(0.0, Y_MAX) / Y_MAX).round() as i32;
            if bar_h > 0 {
                fill_rect_alpha(&mut img, bar_x, bottom - bar_h, bar_x + bar_w - 1, bottom - 1, bar_color);
            }
            let label_x = slot_x + (slot_w - text_width(label, 1)) / 2;
            draw_bitmap_text(&mut img, label_x, bottom + 6, label, axis, 1);
        }

        self.frame = Some(img);
        Ok(())
    }

    fn export_frame(&self) -> ReviewResult<Vec<u8>> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| ReviewError::Render("nothing rendered yet".to_string()))?;
        encode_png(frame)
    }
}

fn parse_hex_color(raw: &str) -> Option<Rgba<u8>> {
    let hex = raw.trim().strip_prefix('#')?;
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

fn clamp_i32(value: i32, min_value: i32, max_value: i32) -> i32 {
    value.max(min_value).min(max_value)
}

fn text_width(text: &str, scale: u32) -> i32 {
    text.chars().count() as i32 * 8 * scale.max(1) as i32
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale_i = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale_i;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (*row >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale_i;
                let py = y + row_idx as i32 * scale_i;
                fill_rect_alpha(img, px, py, px + scale_i - 1, py + scale_i - 1, color);
            }
        }
        cursor_x += 8 * scale_i;
    }
}

fn fill_rect_alpha(img: &mut RgbaImage, x0: i32, y0: i32, x1: i32, y1: i32, color: Rgba<u8>) {
    if img.width() == 0 || img.height() == 0 {
        return;
    }
    let (max_w, max_h) = (img.width() as i32 - 1, img.height() as i32 - 1);
    if x0.max(x1) < 0 || y0.max(y1) < 0 || x0.min(x1) > max_w || y0.min(y1) > max_h {
        return;
    }
    let min_x = clamp_i32(x0.min(x1), 0, max_w);
    let max_x = clamp_i32(x0.max(x1), 0, max_w);
    let min_y = clamp_i32(y0.min(y1), 0, max_h);
    let max_y = clamp_i32(y0.max(y1), 0, max_h);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dst = *img.get_pixel(x as u32, y as u32);
            img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChartConfig, CHART_TITLE};
    use crate::events::GenerationCounter;

    fn chart() -> ChartData {
        let display = [
            ScoreEntry { score: 0, prob: 10.0 },
            ScoreEntry { score: 1, prob: 60.0 },
            ScoreEntry { score: 2, prob: 30.0 },
        ];
        ChartData::from_distribution(&display, &ChartConfig::default())
    }

    #[test]
    fn chart_data_follows_display_order() {
        let data = chart();
        assert_eq!(data.title, CHART_TITLE);
        assert_eq!(data.labels, vec!["0", "1", "2"]);
        assert_eq!(data.values, vec![10.0, 60.0, 30.0]);
        assert!(!data.show_legend);
        assert!(!data.animated);
    }

    #[test]
    fn one_snapshot_per_pass() {
        let config = ChartConfig::default();
        let mut passes = GenerationCounter::default();
        let mut producer = ChartSnapshotProducer::new(BitmapSurface::new(&config));
        let pass = passes.advance();
        producer.request(&chart(), pass).unwrap();

        let snapshot = producer.on_settled(pass).unwrap().expect("first settle delivers");
        assert_eq!(snapshot.generation, pass);
        assert!(snapshot.data_url.starts_with("data:image/png;base64,"));
        let png = image::load_from_memory(&snapshot.png_bytes().unwrap()).unwrap();
        assert_eq!((png.width(), png.height()), (config.width, config.height));

        assert_eq!(producer.on_settled(pass).unwrap(), None);
    }

    #[test]
    fn newer_pass_supersedes_older() {
        let mut producer = ChartSnapshotProducer::new(BitmapSurface::new(&ChartConfig::default()));
        let mut passes = GenerationCounter::default();
        let first = passes.advance();
        producer.request(&chart(), first).unwrap();
        let second = passes.advance();
        producer.request(&chart(), second).unwrap();

        assert!(matches!(
            producer.on_settled(first),
            Err(ReviewError::StaleFetchResult { .. })
        ));
        assert!(producer.on_settled(second).unwrap().is_some());
    }

    #[test]
    fn invalidate_drops_pending_pass() {
        let mut producer = ChartSnapshotProducer::new(BitmapSurface::new(&ChartConfig::default()));
        let pass = GenerationCounter::default().advance();
        producer.request(&chart(), pass).unwrap();
        producer.invalidate();
        assert!(producer.on_settled(pass).is_err());
    }

    #[test]
    fn bars_use_configured_color() {
        let mut surface = BitmapSurface::new(&ChartConfig::default());
        surface.render(&chart()).unwrap();
        let frame = surface.frame().unwrap();
        let bar_color = Rgba([0x2a, 0x71, 0xd0, 255]);
        assert!(frame.pixels().any(|p| *p == bar_color));
    }

    #[test]
    fn export_before_render_fails() {
        let surface = BitmapSurface::new(&ChartConfig::default());
        assert!(matches!(surface.export_frame(), Err(ReviewError::Render(_))));
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_color("#2a71d0"), Some(Rgba([42, 113, 208, 255])));
        assert_eq!(parse_hex_color("#ff000080"), Some(Rgba([255, 0, 0, 128])));
        assert_eq!(parse_hex_color("blue"), None);
    }
}
