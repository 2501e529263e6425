//! Geometry an interactive editor needs to let a user correct a detected
//! quadrilateral: hit testing, a drag state machine, and bounded mutations.
//!
//! Nothing here resamples pixels. Rectification happens once, after the
//! user confirms the final shape.

use nalgebra::Vector2;
use tracing::debug;

use crate::geometry::{Bounds, Corner, Edge, Point, Quad};

/// Default pointer distance within which a corner is grabbed.
pub const DEFAULT_CORNER_RADIUS: f64 = 12.0;

/// Default pointer distance within which an edge is grabbed.
pub const DEFAULT_EDGE_TOLERANCE: f64 = 8.0;

/// What a pointer position refers to on the quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Corner(Corner),
    Edge(Edge),
    Area,
}

/// The single piece of interaction state threaded through pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    DraggingCorner(Corner),
    DraggingEdge(Edge),
    DraggingArea,
}

/// Even-odd point-in-polygon test.
pub fn point_in_polygon<S>(point: &Point<S>, quad: &Quad<S>) -> bool {
    let mut inside = false;
    let mut j = 3;
    for i in 0..4 {
        let a = quad.corners[i];
        let b = quad.corners[j];
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Shortest distance from `point` to the segment `a`-`b`.
pub fn distance_to_segment<S>(point: &Point<S>, a: &Point<S>, b: &Point<S>) -> f64 {
    let ab = *b - *a;
    let ap = *point - *a;
    let len_sq = ab.norm_squared();
    if len_sq <= f64::EPSILON {
        return ap.norm();
    }
    let t = (ap.dot(&ab) / len_sq).clamp(0.0, 1.0);
    (ap - ab * t).norm()
}

/// A quadrilateral under interactive correction, confined to `bounds`.
#[derive(Debug, Clone)]
pub struct AdjustmentSurface<S> {
    quad: Quad<S>,
    bounds: Bounds,
    drag: DragState,
    anchor: Option<Point<S>>,
    corner_radius: f64,
    edge_tolerance: f64,
}

impl<S> AdjustmentSurface<S> {
    /// Start editing `quad`; corners outside `bounds` are clamped in.
    pub fn new(quad: Quad<S>, bounds: Bounds) -> Self {
        Self {
            quad: Quad::new(quad.corners.map(|p| bounds.clamp(p))),
            bounds,
            drag: DragState::Idle,
            anchor: None,
            corner_radius: DEFAULT_CORNER_RADIUS,
            edge_tolerance: DEFAULT_EDGE_TOLERANCE,
        }
    }

    pub fn with_tolerances(mut self, corner_radius: f64, edge_tolerance: f64) -> Self {
        self.corner_radius = corner_radius;
        self.edge_tolerance = edge_tolerance;
        self
    }

    pub fn quad(&self) -> &Quad<S> {
        &self.quad
    }

    pub fn into_quad(self) -> Quad<S> {
        self.quad
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    /// Classify `point`: corners win over edges, edges over the interior.
    pub fn hit_test(&self, point: &Point<S>) -> Option<Hit> {
        let nearest_corner = Corner::ALL
            .into_iter()
            .map(|c| (c, self.quad.corner(c).distance(point)))
            .filter(|(_, d)| *d <= self.corner_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((corner, _)) = nearest_corner {
            return Some(Hit::Corner(corner));
        }

        let nearest_edge = Edge::ALL
            .into_iter()
            .map(|e| {
                let (a, b) = self.quad.edge(e);
                (e, distance_to_segment(point, &a, &b))
            })
            .filter(|(_, d)| *d <= self.edge_tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((edge, _)) = nearest_edge {
            return Some(Hit::Edge(edge));
        }

        point_in_polygon(point, &self.quad).then_some(Hit::Area)
    }

    /// Place one corner, clamped to the bounds.
    pub fn move_corner(&mut self, corner: Corner, point: Point<S>) {
        self.quad.set_corner(corner, self.bounds.clamp(point));
    }

    /// Translate both endpoints of an edge by `delta`.
    ///
    /// The delta is shortened per axis to what both endpoints can take, so
    /// the edge keeps its direction when it hits the bounds.
    pub fn move_edge(&mut self, edge: Edge, delta: Vector2<f64>) {
        let (a, b) = edge.endpoints();
        let mut allowed = delta;
        for corner in [a, b] {
            let p = self.quad.corner(corner);
            let reach = self.bounds.clamp(p + delta) - p;
            if reach.x.abs() < allowed.x.abs() {
                allowed.x = reach.x;
            }
            if reach.y.abs() < allowed.y.abs() {
                allowed.y = reach.y;
            }
        }
        for corner in [a, b] {
            let moved = self.quad.corner(corner) + allowed;
            self.quad.set_corner(corner, moved);
        }
    }

    /// Translate the whole quad by `delta`. The move is rejected, leaving
    /// the quad untouched, if any corner would leave the bounds.
    pub fn pan(&mut self, delta: Vector2<f64>) -> bool {
        let moved = self.quad.corners.map(|p| p + delta);
        if moved.iter().all(|p| self.bounds.contains(p)) {
            self.quad = Quad::new(moved);
            true
        } else {
            false
        }
    }

    /// Begin a drag on whatever lies under `point`.
    pub fn pointer_down(&mut self, point: Point<S>) -> DragState {
        self.drag = match self.hit_test(&point) {
            Some(Hit::Corner(corner)) => DragState::DraggingCorner(corner),
            Some(Hit::Edge(edge)) => DragState::DraggingEdge(edge),
            Some(Hit::Area) => DragState::DraggingArea,
            None => DragState::Idle,
        };
        self.anchor = (self.drag != DragState::Idle).then_some(point);
        debug!(drag = ?self.drag, ?point, "Pointer down");
        self.drag
    }

    /// Continue the active drag. Returns whether the quad changed.
    pub fn pointer_move(&mut self, point: Point<S>) -> bool {
        let Some(anchor) = self.anchor else {
            return false;
        };
        let delta = point - anchor;
        let changed = match self.drag {
            DragState::Idle => false,
            DragState::DraggingCorner(corner) => {
                self.move_corner(corner, point);
                true
            }
            DragState::DraggingEdge(edge) => {
                self.move_edge(edge, delta);
                true
            }
            DragState::DraggingArea => self.pan(delta),
        };
        if changed {
            self.anchor = Some(point);
        }
        changed
    }

    /// End the drag and return to idle.
    pub fn pointer_up(&mut self) {
        debug!(drag = ?self.drag, quad = ?self.quad, "Pointer up");
        self.drag = DragState::Idle;
        self.anchor = None;
    }
}
