/// Wavefront OBJ reader and writer.
pub mod obj;

/// Binary PCD reader and writer.
pub mod pcd;

/// ASCII PLY reader and writer.
pub mod ply;
