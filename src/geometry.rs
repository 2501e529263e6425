use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

use nalgebra::Vector2;

use crate::error::{RectifyError, Result};

/// Collinearity tolerance, relative to the lengths of the two spanning edges.
const COLLINEAR_EPSILON: f64 = 1e-9;

/// Smallest enclosed area (in square pixels) a usable quadrilateral may have.
const MIN_AREA: f64 = 1e-6;

/// Marker for the downsampled detection resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Working;

/// Marker for the original photograph resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Natural;

/// A point in coordinate space `S`.
///
/// Points in different spaces are different types; the only way across is
/// through a [`ScaleFactor`].
pub struct Point<S> {
    pub x: f64,
    pub y: f64,
    space: PhantomData<S>,
}

impl<S> Point<S> {
    pub const fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).norm()
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

// Manual impls so the marker type needs no bounds.
impl<S> Clone for Point<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Point<S> {}

impl<S> PartialEq for Point<S> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<S> fmt::Debug for Point<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

impl<S> Add<Vector2<f64>> for Point<S> {
    type Output = Self;

    fn add(self, delta: Vector2<f64>) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y)
    }
}

impl<S> Sub for Point<S> {
    type Output = Vector2<f64>;

    fn sub(self, other: Self) -> Vector2<f64> {
        Vector2::new(self.x - other.x, self.y - other.y)
    }
}

pub type WorkingPoint = Point<Working>;
pub type NaturalPoint = Point<Natural>;

/// Ratio of working resolution to natural resolution, per axis
/// (`working = natural * factor`).
///
/// The factors come from the rounded working dimensions, so the image
/// corners map exactly between the two spaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    x: f64,
    y: f64,
}

impl ScaleFactor {
    pub fn uniform(factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RectifyError::InvalidPoint(format!(
                "scale factor must be positive, got {}",
                factor
            )));
        }
        Ok(Self {
            x: factor,
            y: factor,
        })
    }

    /// Working dimensions that fit `(width, height)` inside `max_side`
    /// without upscaling, preserving the aspect ratio.
    pub fn working_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
        let longest = width.max(height).max(1) as f64;
        let ratio = (max_side as f64 / longest).min(1.0);
        (
            ((width as f64 * ratio).round() as u32).max(1),
            ((height as f64 * ratio).round() as u32).max(1),
        )
    }

    /// Effective factors between a natural and a working size.
    pub fn between(natural: (u32, u32), working: (u32, u32)) -> Self {
        Self {
            x: working.0 as f64 / natural.0.max(1) as f64,
            y: working.1 as f64 / natural.1.max(1) as f64,
        }
    }

    /// Factors for the working image `normalize` produces from `(width, height)`.
    pub fn fit(width: u32, height: u32, max_side: u32) -> Self {
        Self::between(
            (width, height),
            Self::working_dimensions(width, height, max_side),
        )
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn to_working(&self, point: NaturalPoint) -> WorkingPoint {
        Point::new(point.x * self.x, point.y * self.y)
    }

    pub fn to_natural(&self, point: WorkingPoint) -> NaturalPoint {
        Point::new(point.x / self.x, point.y / self.y)
    }
}

/// Rectangular extent of an image, used to clamp and bounds-check points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn of_image(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    pub fn contains<S>(&self, point: &Point<S>) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }

    pub fn clamp<S>(&self, point: Point<S>) -> Point<S> {
        Point::new(
            point.x.clamp(0.0, self.width),
            point.y.clamp(0.0, self.height),
        )
    }
}

/// Corner of a quadrilateral, in clockwise order starting top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomRight => 2,
            Corner::BottomLeft => 3,
        }
    }

    /// Unit direction pointing away from the interior of an axis-aligned box.
    pub fn outward(self) -> (i64, i64) {
        match self {
            Corner::TopLeft => (-1, -1),
            Corner::TopRight => (1, -1),
            Corner::BottomRight => (1, 1),
            Corner::BottomLeft => (-1, 1),
        }
    }
}

/// Edge of a quadrilateral, named by its position on an upright card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];

    pub fn endpoints(self) -> (Corner, Corner) {
        match self {
            Edge::Top => (Corner::TopLeft, Corner::TopRight),
            Edge::Right => (Corner::TopRight, Corner::BottomRight),
            Edge::Bottom => (Corner::BottomRight, Corner::BottomLeft),
            Edge::Left => (Corner::BottomLeft, Corner::TopLeft),
        }
    }
}

/// Four points ordered top-left, top-right, bottom-right, bottom-left.
pub struct Quad<S> {
    pub corners: [Point<S>; 4],
}

impl<S> Clone for Quad<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Quad<S> {}

impl<S> PartialEq for Quad<S> {
    fn eq(&self, other: &Self) -> bool {
        self.corners == other.corners
    }
}

impl<S> fmt::Debug for Quad<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.corners.iter()).finish()
    }
}

impl<S> Quad<S> {
    pub fn new(corners: [Point<S>; 4]) -> Self {
        Self { corners }
    }

    /// Axis-aligned rectangle spanning `(x0, y0)`..`(x1, y1)`.
    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self::new([
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    pub fn corner(&self, corner: Corner) -> Point<S> {
        self.corners[corner.index()]
    }

    pub fn set_corner(&mut self, corner: Corner, point: Point<S>) {
        self.corners[corner.index()] = point;
    }

    pub fn edge(&self, edge: Edge) -> (Point<S>, Point<S>) {
        let (a, b) = edge.endpoints();
        (self.corner(a), self.corner(b))
    }

    /// Enclosed area via the shoelace formula.
    pub fn area(&self) -> f64 {
        let mut twice = 0.0f64;
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            twice += a.x * b.y - b.x * a.y;
        }
        twice.abs() / 2.0
    }

    /// Average lengths of opposite edges, as `(width, height)`.
    pub fn mean_extent(&self) -> (f64, f64) {
        let [tl, tr, br, bl] = self.corners;
        let width = (tl.distance(&tr) + bl.distance(&br)) / 2.0;
        let height = (tl.distance(&bl) + tr.distance(&br)) / 2.0;
        (width, height)
    }

    /// Check that the quadrilateral can define a homography: finite
    /// corners, no three of them collinear, and a non-trivial area.
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.corners.iter().find(|p| !p.is_finite()) {
            return Err(RectifyError::degenerate(format!(
                "non-finite corner {:?}",
                bad
            )));
        }

        for skip in 0..4 {
            let triple: Vec<Point<S>> = (0..4)
                .filter(|&i| i != skip)
                .map(|i| self.corners[i])
                .collect();
            let u = triple[1] - triple[0];
            let v = triple[2] - triple[0];
            let cross = u.x * v.y - u.y * v.x;
            if cross.abs() <= COLLINEAR_EPSILON * u.norm() * v.norm() {
                return Err(RectifyError::degenerate(format!(
                    "corners {:?}, {:?}, {:?} are collinear",
                    triple[0], triple[1], triple[2]
                )));
            }
        }

        let area = self.area();
        if area <= MIN_AREA {
            return Err(RectifyError::degenerate(format!(
                "enclosed area {:.3e} is too small",
                area
            )));
        }
        Ok(())
    }

    pub fn to_array(&self) -> [[f64; 2]; 4] {
        self.corners.map(|p| p.to_array())
    }
}

impl Quad<Working> {
    pub fn to_natural(&self, scale: ScaleFactor) -> Quad<Natural> {
        Quad::new(self.corners.map(|p| scale.to_natural(p)))
    }
}

impl Quad<Natural> {
    pub fn to_working(&self, scale: ScaleFactor) -> Quad<Working> {
        Quad::new(self.corners.map(|p| scale.to_working(p)))
    }

    /// Build a quadrilateral from points given as 0-100% of the image
    /// dimensions, as produced by external detectors. Values outside the
    /// range are clamped.
    pub fn from_percentages(points: [[f64; 2]; 4], width: u32, height: u32) -> Result<Self> {
        if let Some(bad) = points.iter().find(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Err(RectifyError::InvalidPoint(format!(
                "non-finite percentage point {:?}",
                bad
            )));
        }
        let (w, h) = (width as f64, height as f64);
        Ok(Self::new(points.map(|p| {
            Point::new(
                p[0].clamp(0.0, 100.0) / 100.0 * w,
                p[1].clamp(0.0, 100.0) / 100.0 * h,
            )
        })))
    }

    pub fn to_percentages(&self, width: u32, height: u32) -> [[f64; 2]; 4] {
        let (w, h) = (width.max(1) as f64, height.max(1) as f64);
        self.corners.map(|p| [p.x / w * 100.0, p.y / h * 100.0])
    }
}
