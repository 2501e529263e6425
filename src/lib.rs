pub mod adjust;
pub mod cli;
pub mod config;
pub mod detection;
pub mod edges;
pub mod error;
pub mod geometry;
pub mod homography;
pub mod normalize;
pub mod pipeline;
pub mod transform;

pub use adjust::{AdjustmentSurface, DragState, Hit};
pub use cli::Cli;
pub use config::{Config, DetectionConfig, RectifyConfig};
pub use error::{RectifyError, Result};
pub use geometry::{Bounds, Corner, Edge, Natural, Point, Quad, ScaleFactor, Working};
pub use homography::Homography;
pub use pipeline::{detect, import_quad, rectify, rectify_with_config, Detection, DetectionSource};
pub use transform::{warp_perspective, CardFormat, Interpolation, OutputSize};
