use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use crate::error::{RectifyError, Result};
use crate::geometry::Quad;

/// Pivots smaller than this mean the correspondences do not pin down a
/// projective transform.
const PIVOT_EPSILON: f64 = 1e-10;

/// Denominators smaller than this put the mapped point at infinity.
const DENOM_EPSILON: f64 = 1e-12;

/// Projective transform mapping destination (output) pixels to source pixels.
///
/// The matrix has the form
///
/// ```text
/// | a b c |
/// | d e f |
/// | g h 1 |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Solve for the transform taking the canonical `width` x `height`
    /// rectangle onto `source`.
    ///
    /// Rectangle corners `(0,0) (W,0) (W,H) (0,H)` pair with the quad's
    /// TL/TR/BR/BL. Fails with [`RectifyError::DegenerateQuadrilateral`]
    /// when the quad is collinear or the elimination meets a near-zero pivot.
    pub fn from_quad_to_rect<S>(source: &Quad<S>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RectifyError::InvalidOutputSize { width, height });
        }
        source.validate()?;

        let (w, h) = (width as f64, height as f64);
        let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        // Two rows per correspondence, augmented with the right-hand side:
        //   a X + b Y + c - g X u - h Y u = u
        //   d X + e Y + f - g X v - h Y v = v
        let mut system = [[0.0f64; 9]; 8];
        for (i, ((x, y), p)) in dest.iter().zip(source.corners.iter()).enumerate() {
            let (u, v) = (p.x, p.y);
            system[2 * i] = [*x, *y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
            system[2 * i + 1] = [0.0, 0.0, 0.0, *x, *y, 1.0, -x * v, -y * v, v];
        }

        let coeffs = solve_augmented(system)?;
        let matrix = Matrix3::new(
            coeffs[0], coeffs[1], coeffs[2],
            coeffs[3], coeffs[4], coeffs[5],
            coeffs[6], coeffs[7], 1.0,
        );

        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(RectifyError::degenerate("homography has non-finite coefficients"));
        }

        debug!(?matrix, width, height, "Estimated homography");
        Ok(Self { matrix })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Map a destination point to source coordinates, or `None` when the
    /// projective denominator vanishes.
    pub fn map(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.matrix * Vector3::new(x, y, 1.0);
        if v.z.abs() < DENOM_EPSILON {
            return None;
        }
        Some((v.x / v.z, v.y / v.z))
    }
}

/// Gaussian elimination with partial pivoting on an 8x9 augmented system,
/// followed by back-substitution.
fn solve_augmented(mut a: [[f64; 9]; 8]) -> Result<[f64; 8]> {
    for col in 0..8 {
        let pivot_row = (col..8)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        let pivot = a[pivot_row][col];
        if !pivot.is_finite() || pivot.abs() < PIVOT_EPSILON {
            return Err(RectifyError::degenerate(format!(
                "singular system (pivot {:.3e} in column {})",
                pivot, col
            )));
        }
        a.swap(col, pivot_row);

        for row in (col + 1)..8 {
            let factor = a[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..9 {
                a[row][c] -= factor * a[col][c];
            }
        }
    }

    let mut x = [0.0f64; 8];
    for row in (0..8).rev() {
        let mut sum = a[row][8];
        for c in (row + 1)..8 {
            sum -= a[row][c] * x[c];
        }
        x[row] = sum / a[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Natural, Point};

    fn assert_maps_corners(quad: &Quad<Natural>, width: u32, height: u32) {
        let homography = Homography::from_quad_to_rect(quad, width, height).unwrap();
        let (w, h) = (width as f64, height as f64);
        let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        for ((x, y), expected) in dest.iter().zip(quad.corners.iter()) {
            let (sx, sy) = homography.map(*x, *y).unwrap();
            let scale = expected.x.abs().max(expected.y.abs()).max(1.0);
            assert!(
                (sx - expected.x).abs() <= 1e-6 * scale && (sy - expected.y).abs() <= 1e-6 * scale,
                "({}, {}) mapped to ({}, {}), expected {:?}",
                x,
                y,
                sx,
                sy,
                expected
            );
        }
    }

    #[test]
    fn test_round_trip_skewed_quad() {
        let quad = Quad::new([
            Point::new(412.5, 380.0),
            Point::new(3390.0, 610.25),
            Point::new(3605.0, 2480.0),
            Point::new(280.0, 2710.75),
        ]);
        assert_maps_corners(&quad, 1000, 633);
    }

    #[test]
    fn test_round_trip_strong_perspective() {
        let quad = Quad::new([
            Point::new(150.0, 40.0),
            Point::new(450.0, 40.0),
            Point::new(590.0, 390.0),
            Point::new(10.0, 390.0),
        ]);
        assert_maps_corners(&quad, 800, 800);
    }

    #[test]
    fn test_canonical_rect_gives_identity() {
        let quad: Quad<Natural> = Quad::rect(0.0, 0.0, 320.0, 200.0);
        let homography = Homography::from_quad_to_rect(&quad, 320, 200).unwrap();
        let identity = Matrix3::<f64>::identity();
        for (got, want) in homography.matrix().iter().zip(identity.iter()) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_collinear_quad_is_rejected() {
        let quad: Quad<Natural> = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(0.0, 50.0),
        ]);
        let result = Homography::from_quad_to_rect(&quad, 100, 100);
        assert!(matches!(
            result,
            Err(RectifyError::DegenerateQuadrilateral { .. })
        ));
    }

    #[test]
    fn test_singular_system_is_reported() {
        // Every row zero: the first pivot is already below epsilon.
        let result = solve_augmented([[0.0; 9]; 8]);
        assert!(matches!(
            result,
            Err(RectifyError::DegenerateQuadrilateral { .. })
        ));
    }

    #[test]
    fn test_zero_output_size_is_rejected() {
        let quad: Quad<Natural> = Quad::rect(0.0, 0.0, 10.0, 10.0);
        assert!(matches!(
            Homography::from_quad_to_rect(&quad, 0, 10),
            Err(RectifyError::InvalidOutputSize { .. })
        ));
    }

    #[test]
    fn test_map_at_infinity_is_none() {
        let homography = Homography {
            matrix: Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0),
        };
        assert_eq!(homography.map(-1.0, 5.0), None);
        assert!(homography.map(1.0, 5.0).is_some());
    }
}
