use image::RgbaImage;
use tracing::{info, instrument, warn};

use crate::config::{DetectionConfig, RectifyConfig};
use crate::detection::{fallback_quad, locate_quad};
use crate::edges::build_edge_map;
use crate::error::{RectifyError, Result};
use crate::geometry::{Natural, Quad, ScaleFactor, Working};
use crate::homography::Homography;
use crate::normalize::normalize;
use crate::transform::{warp_perspective, Interpolation, OutputSize};

/// Where a quadrilateral came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    /// Found by the edge-based locator.
    Detected,
    /// Locator failed; fixed inset rectangle substituted.
    Fallback,
    /// Supplied by an external detector as percentages.
    External,
}

/// Initial quadrilateral for an image, in both coordinate spaces.
#[derive(Debug, Clone)]
pub struct Detection {
    pub quad: Quad<Natural>,
    pub working_quad: Quad<Working>,
    pub scale: ScaleFactor,
    pub source: DetectionSource,
}

/// Find the card in `img`. Only an empty image is an error; a failed
/// search yields the fallback quadrilateral.
#[instrument(skip_all, fields(width = img.width(), height = img.height()))]
pub fn detect(img: &RgbaImage, config: &DetectionConfig) -> Result<Detection> {
    let (width, height) = img.dimensions();
    let normalized = normalize(img, config.max_working_side)?;
    let edges = build_edge_map(
        &normalized.intensity,
        config.blur_passes,
        config.edge_threshold,
    );
    let scale = normalized.scale;

    let detection = match locate_quad(&edges, config) {
        Ok(working_quad) => Detection {
            quad: working_quad.to_natural(scale),
            working_quad,
            scale,
            source: DetectionSource::Detected,
        },
        Err(failure) => {
            warn!(%failure, "Card detection failed");
            let quad = fallback_quad(width, height, config);
            Detection {
                working_quad: quad.to_working(scale),
                quad,
                scale,
                source: DetectionSource::Fallback,
            }
        }
    };

    info!(source = ?detection.source, quad = ?detection.quad, "Detection complete");
    Ok(detection)
}

/// Adopt a quadrilateral from an external detector, given as 0-100% of
/// the image dimensions.
pub fn import_quad(
    points: [[f64; 2]; 4],
    width: u32,
    height: u32,
    config: &DetectionConfig,
) -> Result<Detection> {
    if width == 0 || height == 0 {
        return Err(RectifyError::EmptyImage);
    }
    let quad = Quad::from_percentages(points, width, height)?;
    let scale = ScaleFactor::fit(width, height, config.max_working_side);
    info!(?quad, "Imported external quadrilateral");
    Ok(Detection {
        working_quad: quad.to_working(scale),
        quad,
        scale,
        source: DetectionSource::External,
    })
}

/// Rectify the region `quad` of `img` into a `size` buffer.
#[instrument(skip(img), fields(width = img.width(), height = img.height()))]
pub fn rectify(
    img: &RgbaImage,
    quad: &Quad<Natural>,
    size: OutputSize,
    interpolation: Interpolation,
) -> Result<RgbaImage> {
    let homography = Homography::from_quad_to_rect(quad, size.width, size.height)?;
    warp_perspective(img, &homography, size, interpolation)
}

/// Rectify with the output size taken from `config`, or classified from
/// the quad's aspect ratio when the config leaves it open.
pub fn rectify_with_config(
    img: &RgbaImage,
    quad: &Quad<Natural>,
    config: &RectifyConfig,
) -> Result<RgbaImage> {
    let size = match config.output_size {
        Some(size) => size,
        None => OutputSize::classify(quad).1,
    };
    rectify(img, quad, size, config.interpolation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use image::{imageops, Rgba};

    fn pattern(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, ((x / 16 + y / 16) % 256) as u8, 255])
        })
    }

    fn card_photo(width: u32, height: u32, card: Quad<Natural>) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let p = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            if crate::adjust::point_in_polygon(&p, &card) {
                Rgba([235, 230, 220, 255])
            } else {
                Rgba([40, 45, 50, 255])
            }
        })
    }

    #[test]
    fn test_flat_image_yields_fallback() {
        let img = RgbaImage::from_pixel(800, 600, Rgba([90, 120, 150, 255]));
        let detection = detect(&img, &DetectionConfig::default()).unwrap();
        assert_eq!(detection.source, DetectionSource::Fallback);
        let expected: Quad<Natural> = Quad::rect(96.0, 90.0, 704.0, 510.0);
        for (got, want) in detection.quad.corners.iter().zip(expected.corners.iter()) {
            assert!(got.distance(want) < 1e-9, "{:?} vs {:?}", got, want);
        }
    }

    #[test]
    fn test_detects_card_in_natural_coordinates() {
        let card: Quad<Natural> = Quad::rect(240.0, 225.0, 1760.0, 1275.0);
        let img = card_photo(2000, 1500, card);
        let detection = detect(&img, &DetectionConfig::default()).unwrap();

        assert_eq!(detection.source, DetectionSource::Detected);
        assert!((detection.scale.x() - 0.3).abs() < 1e-12);
        assert!((detection.scale.y() - 0.3).abs() < 1e-12);
        for (got, want) in detection.quad.corners.iter().zip(card.corners.iter()) {
            // A few working pixels of slack, expressed in natural pixels.
            assert!(got.distance(want) < 30.0, "{:?} vs {:?}", got, want);
        }
    }

    #[test]
    fn test_detects_skewed_card() {
        let card = Quad::<Natural>::new([
            Point::new(180.0, 140.0),
            Point::new(520.0, 110.0),
            Point::new(550.0, 330.0),
            Point::new(150.0, 360.0),
        ]);
        let img = card_photo(600, 450, card);
        let detection = detect(&img, &DetectionConfig::default()).unwrap();
        assert_eq!(detection.source, DetectionSource::Detected);
        assert!(detection.quad.validate().is_ok());
        assert!(point_inside_bounds(&detection.quad, 600.0, 450.0));
    }

    fn point_inside_bounds(quad: &Quad<Natural>, width: f64, height: f64) -> bool {
        quad.corners
            .iter()
            .all(|p| p.x >= 0.0 && p.x <= width && p.y >= 0.0 && p.y <= height)
    }

    #[test]
    fn test_import_quad_converts_percentages() {
        let detection = import_quad(
            [[12.0, 15.0], [88.0, 15.0], [88.0, 85.0], [12.0, 85.0]],
            4000,
            3000,
            &DetectionConfig::default(),
        )
        .unwrap();
        assert_eq!(detection.source, DetectionSource::External);
        assert!(detection.quad.corners[0].distance(&Point::new(480.0, 450.0)) < 1e-9);
        assert!(detection.working_quad.corners[2].distance(&Point::new(528.0, 382.5)) < 1e-9);
    }

    #[test]
    fn test_collinear_quad_surfaces_error() {
        let img = pattern(100, 100);
        let quad = Quad::<Natural>::new([
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(0.0, 50.0),
        ]);
        let result = rectify(&img, &quad, OutputSize::new(50, 50), Interpolation::Nearest);
        assert!(matches!(
            result,
            Err(RectifyError::DegenerateQuadrilateral { .. })
        ));
    }

    #[test]
    fn test_rectify_is_deterministic() {
        let img = pattern(640, 480);
        let quad = Quad::<Natural>::new([
            Point::new(60.0, 40.0),
            Point::new(600.0, 70.0),
            Point::new(580.0, 430.0),
            Point::new(90.0, 450.0),
        ]);
        let config = RectifyConfig {
            interpolation: Interpolation::Bilinear,
            output_size: None,
        };
        let first = rectify_with_config(&img, &quad, &config).unwrap();
        let second = rectify_with_config(&img, &quad, &config).unwrap();
        assert_eq!(first.dimensions(), second.dimensions());
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn test_scenario_matches_independent_resize() {
        // 4000x3000 photo, centred axis-aligned card, 1000x633 output.
        let img = pattern(4000, 3000);
        let quad: Quad<Natural> = Quad::rect(480.0, 450.0, 3520.0, 2550.0);
        let size = OutputSize::new(1000, 633);

        let out = rectify(&img, &quad, size, Interpolation::Nearest).unwrap();
        assert_eq!(out.dimensions(), (1000, 633));

        // Output pixel (x, y) takes crop pixel (floor(x * 3040 / 1000 + 1/2),
        // floor(y * 2100 / 633 + 1/2)), computed in integers. Neither ratio
        // can land exactly on a half, so there are no rounding ties.
        let crop = imageops::crop_imm(&img, 480, 450, 3040, 2100).to_image();
        for (x, y, pixel) in out.enumerate_pixels() {
            let cx = (2 * x * 3040 + 1000) / 2000;
            let cy = (2 * y * 2100 + 633) / (2 * 633);
            assert_eq!(pixel, crop.get_pixel(cx, cy), "mismatch at ({}, {})", x, y);
        }
    }

    #[test]
    fn test_quad_leaving_source_splits_blank_and_sampled() {
        let img = pattern(4000, 3000);
        let (width, height) = (4000.0, 3000.0);
        let quad = Quad::<Natural>::new([
            Point::new(-300.0, -200.0),
            Point::new(4300.0, 100.0),
            Point::new(3900.0, 3300.0),
            Point::new(200.0, 2900.0),
        ]);
        let size = OutputSize::new(1000, 633);
        let homography = Homography::from_quad_to_rect(&quad, size.width, size.height).unwrap();

        let out = rectify(&img, &quad, size, Interpolation::Nearest).unwrap();
        assert_eq!(out.dimensions(), (1000, 633));

        let (mut blank, mut sampled) = (0usize, 0usize);
        for (x, y, pixel) in out.enumerate_pixels() {
            let (sx, sy) = homography.map(x as f64, y as f64).unwrap();
            let outside = sx <= -1e-9 || sy <= -1e-9 || sx >= width || sy >= height;
            if outside {
                assert_eq!(*pixel, Rgba([0, 0, 0, 0]), "expected blank at ({}, {})", x, y);
                blank += 1;
            } else {
                let ix = (sx.round().max(0.0) as u32).min(3999);
                let iy = (sy.round().max(0.0) as u32).min(2999);
                assert_eq!(pixel, img.get_pixel(ix, iy), "mismatch at ({}, {})", x, y);
                sampled += 1;
            }
        }
        assert!(blank > 0);
        assert!(sampled > 0);
        assert_eq!(blank + sampled, 1000 * 633);
    }

    #[test]
    fn test_explicit_output_size_wins() {
        let img = pattern(200, 100);
        let quad: Quad<Natural> = Quad::rect(10.0, 10.0, 190.0, 90.0);
        let config = RectifyConfig {
            interpolation: Interpolation::Nearest,
            output_size: Some(OutputSize::new(90, 40)),
        };
        let out = rectify_with_config(&img, &quad, &config).unwrap();
        assert_eq!(out.dimensions(), (90, 40));
    }
}
