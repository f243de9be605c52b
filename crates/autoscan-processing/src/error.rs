use autoscan_3d::GeometryError;

/// Error types for the processing strategies.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum ProcessingError {
    /// The input point cloud has no points.
    #[error("Input point cloud is empty")]
    EmptyInput,

    /// The algorithm needs more points than it was given.
    #[error("Not enough points: required {required}, found {found}")]
    NotEnoughPoints {
        /// The minimum number of points.
        required: usize,
        /// The number of points available.
        found: usize,
    },

    /// A parameter is out of its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No usable correspondences could be established.
    #[error("No correspondences found")]
    NoCorrespondences,

    /// The geometry does not allow a meaningful result.
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Error from the geometry primitives.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Check that a parameter is a finite, strictly positive number.
pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<(), ProcessingError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ProcessingError::InvalidParameter(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

/// Check that a count parameter is not zero.
pub(crate) fn ensure_nonzero(name: &str, value: usize) -> Result<(), ProcessingError> {
    if value == 0 {
        return Err(ProcessingError::InvalidParameter(format!(
            "{name} must be greater than zero"
        )));
    }
    Ok(())
}
