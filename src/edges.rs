use image::{GrayImage, Luma};
use imageproc::filter::separable_filter_equal;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::debug;

/// Separable form of the 3x3 `[1 2 1; 2 4 2; 1 2 1] / 16` blur.
const BLUR_TAPS: [f32; 3] = [0.25, 0.5, 0.25];

const EDGE: u8 = 255;

/// Binary edge mask at working resolution.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    mask: GrayImage,
}

impl EdgeMap {
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        x < self.mask.width() && y < self.mask.height() && self.mask.get_pixel(x, y)[0] == EDGE
    }

    /// Edge test for signed coordinates; anything outside the image is not an edge.
    pub fn is_edge_at(&self, x: i64, y: i64) -> bool {
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.is_edge(x, y),
            _ => false,
        }
    }

    /// Coordinates of every edge pixel, row-major.
    pub fn edge_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == EDGE)
            .map(|(x, y, _)| (x, y))
    }

    pub fn count(&self) -> usize {
        self.edge_pixels().count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }
}

/// Blur `intensity` `blur_passes` times, then mark pixels whose Sobel
/// gradient magnitude exceeds `threshold`. The one-pixel border is never
/// marked.
pub fn build_edge_map(intensity: &GrayImage, blur_passes: u32, threshold: f32) -> EdgeMap {
    let (width, height) = intensity.dimensions();

    let mut blurred = intensity.clone();
    for _ in 0..blur_passes {
        blurred = separable_filter_equal(&blurred, &BLUR_TAPS);
    }

    let gx = horizontal_sobel(&blurred);
    let gy = vertical_sobel(&blurred);
    let threshold_sq = threshold * threshold;

    let mask = GrayImage::from_fn(width, height, |x, y| {
        if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
            return Luma([0]);
        }
        let dx = gx.get_pixel(x, y)[0] as f32;
        let dy = gy.get_pixel(x, y)[0] as f32;
        if dx * dx + dy * dy > threshold_sq {
            Luma([EDGE])
        } else {
            Luma([0])
        }
    });

    let map = EdgeMap { mask };
    debug!(
        width,
        height,
        blur_passes,
        threshold,
        edge_pixels = map.count(),
        "Built edge map"
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bright_square(size: u32, lo: u32, hi: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let img = GrayImage::from_pixel(40, 30, Luma([128]));
        let map = build_edge_map(&img, 2, 60.0);
        assert_eq!(map.count(), 0);
    }

    #[test]
    fn test_square_outline_is_detected() {
        let img = bright_square(60, 20, 40);
        let map = build_edge_map(&img, 2, 60.0);
        assert!(map.is_edge(20, 30));
        assert!(map.is_edge(39, 30));
        assert!(map.is_edge(30, 20));
        // Interior and far background stay clear.
        assert!(!map.is_edge(30, 30));
        assert!(!map.is_edge(5, 5));
    }

    #[test]
    fn test_border_is_never_edge() {
        // Step touching the frame: strong gradient right on the border.
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([0]) } else { Luma([255]) });
        let map = build_edge_map(&img, 0, 60.0);
        for i in 0..20 {
            assert!(!map.is_edge(i, 0));
            assert!(!map.is_edge(i, 19));
            assert!(!map.is_edge(0, i));
            assert!(!map.is_edge(19, i));
        }
        assert!(map.is_edge(10, 10));
    }

    #[test]
    fn test_threshold_controls_sensitivity() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([100]) } else { Luma([110]) });
        assert_eq!(build_edge_map(&img, 0, 60.0).count(), 0);
        assert!(build_edge_map(&img, 0, 30.0).count() > 0);
    }

    #[test]
    fn test_out_of_range_lookup_is_false() {
        let map = build_edge_map(&bright_square(10, 3, 7), 1, 60.0);
        assert!(!map.is_edge_at(-1, 4));
        assert!(!map.is_edge_at(4, 100));
    }
}
