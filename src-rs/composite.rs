use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::error::{ReviewError, ReviewResult};
use crate::layers::{decode_payload, BaseImage, Layer};

pub fn decode_image(source: &str) -> ReviewResult<DynamicImage> {
    let bytes = decode_payload(source)?;
    image::load_from_memory(&bytes).map_err(|err| ReviewError::Decode(err.to_string()))
}

pub fn encode_png(img: &RgbaImage) -> ReviewResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| ReviewError::Render(err.to_string()))?;
    Ok(out.into_inner())
}

/// Renders what the reviewer sees: the base X-ray at display size with one
/// overlay blended on top at its opacity. Hidden layers contribute nothing.
pub fn compose(base: &BaseImage, overlay: Option<&Layer>) -> ReviewResult<RgbaImage> {
    let base_img = decode_image(&base.image)?;
    let mut canvas = scale_to_width(&base_img, base.style.display_width).to_rgba8();

    let Some(layer) = overlay.filter(|layer| layer.active()) else {
        return Ok(canvas);
    };
    let layer_img = decode_image(&layer.image)?;
    let scaled = scale_to_width(&layer_img, layer.style().display_width).to_rgba8();
    overlay_at_origin(&mut canvas, &scaled, layer.opacity());
    Ok(canvas)
}

fn scale_to_width(img: &DynamicImage, display_width: f64) -> DynamicImage {
    let (w, h) = (img.width().max(1), img.height().max(1));
    let target_w = display_width.round() as u32;
    if target_w == 0 || target_w == w {
        return img.clone();
    }
    let target_h = ((f64::from(h) * f64::from(target_w)) / f64::from(w))
        .round()
        .max(1.0) as u32;
    img.resize_exact(target_w, target_h, FilterType::Lanczos3)
}

fn overlay_at_origin(canvas: &mut RgbaImage, layer: &RgbaImage, opacity: f64) {
    let w = canvas.width().min(layer.width());
    let h = canvas.height().min(layer.height());
    for y in 0..h {
        for x in 0..w {
            let mut src = *layer.get_pixel(x, y);
            src[3] = (f64::from(src[3]) * opacity).round().clamp(0.0, 255.0) as u8;
            let dst = *canvas.get_pixel(x, y);
            canvas.put_pixel(x, y, blend_pixel(dst, src));
        }
    }
}

pub fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([
        mix(dst[0], src[0]),
        mix(dst[1], src[1]),
        mix(dst[2], src[2]),
        out_a,
    ])
}
