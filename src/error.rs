//! Error types for histogram, measure and resampling entry points.
//!
//! Only caller contract violations are reported here. Degenerate
//! statistics (empty histograms, zero variance) are not errors and
//! evaluate to 0.

use thiserror::Error;

/// Main error type for the crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IconicError {
    /// A buffer or array does not have the shape the call requires.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// An intensity would index outside the joint histogram.
    #[error("Intensity {value} on axis {axis} does not fit in {clamp} histogram bins")]
    BinOutOfRange { axis: usize, value: i16, clamp: usize },

    /// A volume cannot be used as given (layout or extent).
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    /// Unrecognized interpolation or similarity name.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Bin count outside the representable range.
    #[error("Invalid bin count: {0}")]
    InvalidBins(usize),

    /// Supervised mutual information was requested without a reference histogram.
    #[error("Supervised mutual information requires a reference histogram")]
    MissingReference,
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, IconicError>;

impl IconicError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create an invalid volume error.
    pub fn invalid_volume(msg: impl Into<String>) -> Self {
        Self::InvalidVolume(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = IconicError::shape_mismatch(&[4, 4], &[4, 3]);
        let msg = err.to_string();
        assert!(msg.contains("expected [4, 4]"));
        assert!(msg.contains("got [4, 3]"));
    }

    #[test]
    fn test_bin_out_of_range_display() {
        let err = IconicError::BinOutOfRange {
            axis: 1,
            value: 300,
            clamp: 256,
        };
        assert_eq!(
            err.to_string(),
            "Intensity 300 on axis 1 does not fit in 256 histogram bins"
        );
    }
}
