#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

mod error;
pub use error::GeometryError;

/// Point cloud and mesh file formats.
pub mod io;

/// Linear algebra utilities.
pub mod linalg;

/// Polygon mesh container.
pub mod mesh;

/// Surface normal estimation.
pub mod normals;

/// Operations on 3D data processing.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Nearest neighbor search.
pub mod search;

/// 3D transforms algorithms.
pub mod transforms;
