use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RectifyError, Result};
use crate::homography::Homography;
use crate::geometry::Quad;

/// How a source sample is taken for each destination pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest source pixel. Exact for identity transforms.
    #[default]
    Nearest,
    /// Weighted average of the four surrounding source pixels.
    Bilinear,
}

/// Requested output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSize {
    pub width: u32,
    pub height: u32,
}

/// Card standards recognised by the sizing heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFormat {
    /// ISO/IEC 7810 ID-1 (credit-card size), ratio ~1.58.
    Id1,
    /// US business card (3.5 x 2 in), ratio 1.75.
    UsBusiness,
    Square,
    Generic,
}

impl CardFormat {
    /// Classify a long-side / short-side ratio.
    pub fn classify(ratio: f64) -> Self {
        if (ratio - 1.58).abs() <= 0.05 {
            CardFormat::Id1
        } else if (ratio - 1.75).abs() <= 0.05 {
            CardFormat::UsBusiness
        } else if (ratio - 1.0).abs() <= 0.1 {
            CardFormat::Square
        } else {
            CardFormat::Generic
        }
    }

    /// Landscape output dimensions for this format.
    pub fn landscape_size(self) -> OutputSize {
        match self {
            CardFormat::Id1 => OutputSize::new(1000, 633),
            CardFormat::UsBusiness => OutputSize::new(1050, 600),
            CardFormat::Square => OutputSize::new(800, 800),
            CardFormat::Generic => OutputSize::new(1000, 600),
        }
    }
}

impl OutputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RectifyError::InvalidOutputSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Pick an output size from the quad's averaged opposite-edge lengths.
    /// Portrait quads get the format's dimensions swapped.
    pub fn classify<S>(quad: &Quad<S>) -> (CardFormat, Self) {
        let (width, height) = quad.mean_extent();
        let (long, short) = if width >= height {
            (width, height)
        } else {
            (height, width)
        };
        if short <= f64::EPSILON || !long.is_finite() {
            let format = CardFormat::Generic;
            return (format, format.landscape_size());
        }

        let format = CardFormat::classify(long / short);
        let size = format.landscape_size();
        let size = if width >= height {
            size
        } else {
            Self::new(size.height, size.width)
        };
        debug!(ratio = long / short, ?format, ?size, "Classified output size");
        (format, size)
    }
}

impl std::str::FromStr for OutputSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Invalid size '{}', expected WIDTHxHEIGHT", s))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid width: {}", w))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid height: {}", h))?;
        let size = Self::new(width, height);
        size.validate().map_err(|err| err.to_string())?;
        Ok(size)
    }
}

/// Slack on the lower source bound so solver noise around 0 still samples.
const SAMPLE_EPSILON: f64 = 1e-9;

/// Whether a mapped coordinate lies on the source, `(-eps, W) x (-eps, H)`.
fn on_source(x: f64, y: f64, width: u32, height: u32) -> bool {
    x > -SAMPLE_EPSILON && x < width as f64 && y > -SAMPLE_EPSILON && y < height as f64
}

fn nearest_sample(img: &RgbaImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (width, height) = img.dimensions();
    // Bounds are tested before rounding: a point in [W - 0.5, W) still lies
    // on the last column.
    if !on_source(x, y, width, height) {
        return None;
    }
    let nx = (x.round().max(0.0) as u32).min(width - 1);
    let ny = (y.round().max(0.0) as u32).min(height - 1);
    Some(*img.get_pixel(nx, ny))
}

fn bilinear_sample(img: &RgbaImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (width, height) = img.dimensions();
    let (max_x, max_y) = ((width - 1) as f64, (height - 1) as f64);
    if !(0.0..=max_x).contains(&x) || !(0.0..=max_y).contains(&y) {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let x_frac = x - x0 as f64;
    let y_frac = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - x_frac) + p10[c] as f64 * x_frac;
        let bottom = p01[c] as f64 * (1.0 - x_frac) + p11[c] as f64 * x_frac;
        result[c] = (top * (1.0 - y_frac) + bottom * y_frac).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(result))
}

/// Resample `src` through `homography` into a new `size` buffer.
///
/// Every destination pixel is mapped back into the source; pixels that land
/// outside the source stay transparent black.
pub fn warp_perspective(
    src: &RgbaImage,
    homography: &Homography,
    size: OutputSize,
    interpolation: Interpolation,
) -> Result<RgbaImage> {
    size.validate()?;
    let (src_width, src_height) = src.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(RectifyError::EmptyImage);
    }

    let mut output = RgbaImage::new(size.width, size.height);
    let mut blank = 0usize;

    for out_y in 0..size.height {
        for out_x in 0..size.width {
            let sample = homography
                .map(out_x as f64, out_y as f64)
                .filter(|(sx, sy)| sx.is_finite() && sy.is_finite())
                .and_then(|(sx, sy)| match interpolation {
                    Interpolation::Nearest => nearest_sample(src, sx, sy),
                    Interpolation::Bilinear => bilinear_sample(src, sx, sy),
                });
            match sample {
                Some(pixel) => output.put_pixel(out_x, out_y, pixel),
                None => blank += 1,
            }
        }
    }

    info!(
        src_width,
        src_height,
        out_width = size.width,
        out_height = size.height,
        ?interpolation,
        blank,
        "Rectified image"
    );
    Ok(output)
}
