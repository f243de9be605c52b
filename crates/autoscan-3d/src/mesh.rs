use crate::{pointcloud::PointCloud, GeometryError};

/// A triangle mesh made of a vertex cloud and vertex index triples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonMesh {
    vertices: PointCloud,
    triangles: Vec<[u32; 3]>,
}

impl PolygonMesh {
    /// Create a new mesh.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::IndexOutOfBounds`] if a triangle references a missing vertex.
    pub fn new(vertices: PointCloud, triangles: Vec<[u32; 3]>) -> Result<Self, GeometryError> {
        let len = vertices.len();
        for tri in triangles.iter() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= len) {
                return Err(GeometryError::IndexOutOfBounds {
                    index: index as usize,
                    len,
                });
            }
        }
        Ok(Self {
            vertices,
            triangles,
        })
    }

    /// The vertices of the mesh.
    pub fn vertices(&self) -> &PointCloud {
        &self.vertices
    }

    /// The triangles of the mesh as vertex indices.
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Number of triangles in the mesh.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the mesh has no triangles.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}
