/// Error types for the geometry primitives.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum GeometryError {
    /// Two buffers that must be parallel have different lengths.
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// The expected number of elements.
        expected: usize,
        /// The actual number of elements.
        actual: usize,
    },

    /// The operation requires at least one point.
    #[error("Point cloud is empty")]
    EmptyCloud,

    /// A rotation axis with zero magnitude was given.
    #[error("Cannot compute rotation matrix from a zero vector")]
    ZeroAxis,

    /// An index points outside of the point cloud.
    #[error("Index {index} out of bounds for point cloud of size {len}")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,
        /// The number of points in the cloud.
        len: usize,
    },
}
