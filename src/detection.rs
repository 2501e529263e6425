use std::fmt;

use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::edges::EdgeMap;
use crate::geometry::{Corner, Natural, Point, Quad, Working};

/// Why the locator could not produce a quadrilateral.
///
/// These are recoverable: the pipeline substitutes [`fallback_quad`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateFailure {
    /// Fewer qualifying edge pixels than the configured minimum.
    InsufficientEdgeData { found: usize, required: usize },
    /// The refined corners do not span a usable quadrilateral.
    Collapsed,
}

impl fmt::Display for LocateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateFailure::InsufficientEdgeData { found, required } => write!(
                f,
                "insufficient edge data ({} pixels, need {})",
                found, required
            ),
            LocateFailure::Collapsed => write!(f, "located corners are degenerate"),
        }
    }
}

/// Value at fraction `p` of an ascending slice (nearest rank).
fn percentile(sorted: &[u32], p: f64) -> u32 {
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Scan rings of growing radius in the outward quadrant of `origin` and
/// return the first edge pixel hit.
fn refine_corner(
    edges: &EdgeMap,
    origin: (i64, i64),
    outward: (i64, i64),
    radius: u32,
) -> Option<(i64, i64)> {
    let (cx, cy) = origin;
    let (sx, sy) = outward;

    for r in 0..=radius as i64 {
        for t in 0..=r {
            for (dx, dy) in [(r, t), (t, r)] {
                let x = cx + sx * dx;
                let y = cy + sy * dy;
                if edges.is_edge_at(x, y) {
                    return Some((x, y));
                }
            }
        }
    }
    None
}

/// Locate the card outline in a working-resolution edge map.
///
/// Edge pixels inside an inner margin are reduced to a percentile bounding
/// box, and each box corner is then pulled outward onto the nearest edge
/// pixel along its diagonal.
pub fn locate_quad(
    edges: &EdgeMap,
    config: &DetectionConfig,
) -> Result<Quad<Working>, LocateFailure> {
    let (width, height) = (edges.width(), edges.height());
    let margin = (config.margin_ratio * width.min(height) as f64).round() as u32;
    let x_range = margin..width.saturating_sub(margin);
    let y_range = margin..height.saturating_sub(margin);

    let (mut xs, mut ys): (Vec<u32>, Vec<u32>) = edges
        .edge_pixels()
        .filter(|(x, y)| x_range.contains(x) && y_range.contains(y))
        .unzip();

    debug!(
        margin,
        candidates = xs.len(),
        required = config.min_edge_pixels,
        "Collected candidate edge pixels"
    );

    if xs.is_empty() || xs.len() < config.min_edge_pixels {
        return Err(LocateFailure::InsufficientEdgeData {
            found: xs.len(),
            required: config.min_edge_pixels,
        });
    }

    xs.sort_unstable();
    ys.sort_unstable();
    let x0 = percentile(&xs, config.low_percentile) as i64;
    let x1 = percentile(&xs, config.high_percentile) as i64;
    let y0 = percentile(&ys, config.low_percentile) as i64;
    let y1 = percentile(&ys, config.high_percentile) as i64;

    debug!(x0, y0, x1, y1, "Percentile bounding box");

    let box_corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];
    let mut quad = Quad::rect(x0 as f64, y0 as f64, x1 as f64, y1 as f64);

    for (corner, origin) in Corner::ALL.into_iter().zip(box_corners) {
        match refine_corner(edges, origin, corner.outward(), config.refine_radius) {
            Some((x, y)) => quad.set_corner(corner, Point::new(x as f64, y as f64)),
            None => debug!(?corner, "No edge within refine radius; keeping box corner"),
        }
    }

    if quad.validate().is_err() {
        return Err(LocateFailure::Collapsed);
    }

    debug!(?quad, "Located quadrilateral");
    Ok(quad)
}

/// Deterministic inset rectangle used when detection fails.
pub fn fallback_quad(width: u32, height: u32, config: &DetectionConfig) -> Quad<Natural> {
    let (w, h) = (width as f64, height as f64);
    let (ix, iy) = (config.fallback_inset_x, config.fallback_inset_y);
    warn!(width, height, inset_x = ix, inset_y = iy, "Using fallback quadrilateral");
    Quad::rect(w * ix, h * iy, w * (1.0 - ix), h * (1.0 - iy))
}
