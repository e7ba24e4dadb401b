use crate::events::Generation;
use crate::layers::LayerId;

/// Errors raised by the review engine.
///
/// Validation variants are returned before any state is touched, so a caller
/// that receives one can assume the view and case context are unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReviewError {
    /// The score distribution is empty or carries an unusable probability.
    #[error("invalid score distribution: {0}")]
    InvalidDistribution(String),

    /// A layer selection outside `[0, len)`.
    #[error("layer index {index} out of range (layers: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A completion arrived for a generation that is no longer current.
    #[error("stale result for generation {actual} (current: {expected})")]
    StaleFetchResult {
        expected: Generation,
        actual: Generation,
    },

    /// Opacity must be a number in [0, 1].
    #[error("opacity {0} outside [0, 1]")]
    InvalidOpacity(f64),

    #[error("no layer with id {0}")]
    UnknownLayer(LayerId),

    /// An encoded image payload could not be decoded.
    #[error("failed to decode image payload: {0}")]
    Decode(String),

    #[error("rendering surface failed: {0}")]
    Render(String),
}

pub type ReviewResult<T> = std::result::Result<T, ReviewError>;
