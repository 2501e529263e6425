use thiserror::Error;

/// Errors surfaced by the rectification core.
///
/// Detection never produces an error: when the edge map is too sparse the
/// locator falls back to a fixed inset quadrilateral instead.
#[derive(Debug, Error)]
pub enum RectifyError {
    /// The quadrilateral is collinear, zero-area, or produced a near-zero
    /// pivot while solving for the homography. Both cases are the same
    /// geometric problem and are reported the same way.
    #[error("degenerate quadrilateral: {reason}")]
    DegenerateQuadrilateral { reason: String },

    #[error("invalid output size {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },

    #[error("invalid point: {0}")]
    InvalidPoint(String),

    #[error("source image is empty")]
    EmptyImage,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("image processing failed: {0}")]
    Image(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RectifyError {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateQuadrilateral {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RectifyError>;
