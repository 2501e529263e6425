use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbaImage};
use tracing::debug;

use crate::error::{RectifyError, Result};
use crate::geometry::ScaleFactor;

/// Working-resolution intensity image plus the natural-to-working scale.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub intensity: GrayImage,
    pub scale: ScaleFactor,
}

/// Perceptual luminance weights (ITU-R BT.601).
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Downsample `img` so its longest side is at most `max_side`, convert to
/// luminance, and stretch the intensity range to 0..=255.
pub fn normalize(img: &RgbaImage, max_side: u32) -> Result<Normalized> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(RectifyError::EmptyImage);
    }

    let (working_w, working_h) = ScaleFactor::working_dimensions(width, height, max_side);
    let scale = ScaleFactor::between((width, height), (working_w, working_h));

    let resized;
    let working = if (working_w, working_h) == (width, height) {
        img
    } else {
        resized = imageops::resize(img, working_w, working_h, FilterType::Triangle);
        &resized
    };

    let luma: Vec<f32> = working
        .pixels()
        .map(|p| {
            LUMA_WEIGHTS[0] * p[0] as f32
                + LUMA_WEIGHTS[1] * p[1] as f32
                + LUMA_WEIGHTS[2] * p[2] as f32
        })
        .collect();

    let (min, max) = luma
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    debug!(
        working_w,
        working_h,
        scale_x = scale.x(),
        scale_y = scale.y(),
        min,
        max,
        "Normalized source image"
    );

    let intensity = GrayImage::from_fn(working_w, working_h, |x, y| {
        let v = luma[(y * working_w + x) as usize];
        let stretched = if range > f32::EPSILON {
            (v - min) * 255.0 / range
        } else {
            v
        };
        Luma([stretched.round().clamp(0.0, 255.0) as u8])
    });

    Ok(Normalized { intensity, scale })
}
