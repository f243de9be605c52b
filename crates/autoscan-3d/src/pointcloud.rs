use glam::DVec3;

use crate::{linalg, GeometryError};

/// A point cloud with points, colors, and normals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Option<Vec<[u8; 3]>>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors (optional), and normals (optional).
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Option<Vec<[u8; 3]>>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Create a point cloud holding only positions.
    pub fn from_points(points: Vec<[f64; 3]>) -> Self {
        Self::new(points, None, None)
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Replace the normals of the point cloud.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::LengthMismatch`] if there is not one normal per point.
    pub fn with_normals(mut self, normals: Vec<[f64; 3]>) -> Result<Self, GeometryError> {
        if normals.len() != self.points.len() {
            return Err(GeometryError::LengthMismatch {
                expected: self.points.len(),
                actual: normals.len(),
            });
        }
        self.normals = Some(normals);
        Ok(self)
    }

    /// Get the minimum bound of the point cloud.
    pub fn get_min_bound(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .fold(DVec3::splat(f64::INFINITY), |a, b| a.min(b))
    }

    /// Get the maximum bound of the point cloud.
    pub fn get_max_bound(&self) -> DVec3 {
        if self.points.is_empty() {
            return DVec3::ZERO;
        }
        self.points
            .iter()
            .map(|p| DVec3::from_array(*p))
            .fold(DVec3::splat(f64::NEG_INFINITY), |a, b| a.max(b))
    }

    /// Get the centroid of the point cloud, or `None` when it is empty.
    pub fn centroid(&self) -> Option<DVec3> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
        Some(sum / self.points.len() as f64)
    }

    /// Build a new point cloud from a subset of the points, keeping colors and normals.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::IndexOutOfBounds`] if any index is invalid.
    pub fn select(&self, indices: &[usize]) -> Result<Self, GeometryError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.points.len()) {
            return Err(GeometryError::IndexOutOfBounds {
                index,
                len: self.points.len(),
            });
        }
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let colors = self
            .colors
            .as_ref()
            .map(|c| indices.iter().map(|&i| c[i]).collect());
        let normals = self
            .normals
            .as_ref()
            .map(|n| indices.iter().map(|&i| n[i]).collect());
        Ok(Self::new(points, colors, normals))
    }

    /// Apply a rigid transformation, returning a new point cloud.
    ///
    /// Points are rotated and translated; normals are only rotated. Colors are kept.
    pub fn transformed(
        &self,
        dst_r_src: &[[f64; 3]; 3],
        dst_t_src: &[f64; 3],
    ) -> Result<Self, GeometryError> {
        let mut points = vec![[0.0; 3]; self.points.len()];
        linalg::transform_points3d(&self.points, dst_r_src, dst_t_src, &mut points)?;

        let normals = match &self.normals {
            Some(normals) => {
                let mut rotated = vec![[0.0; 3]; normals.len()];
                linalg::transform_points3d(normals, dst_r_src, &[0.0; 3], &mut rotated)?;
                Some(rotated)
            }
            None => None,
        };

        Ok(Self::new(points, self.colors.clone(), normals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pointcloud() {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Some(vec![[255, 0, 0], [0, 255, 0]]),
            Some(vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        );

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.colors().map(|c| c.len()), Some(2));
        assert_eq!(pointcloud.normals().map(|n| n.len()), Some(2));
        assert_eq!(pointcloud.points()[1], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bounds_and_centroid() {
        let pointcloud =
            PointCloud::from_points(vec![[0.0, -1.0, 2.0], [1.0, 3.0, -2.0], [2.0, 1.0, 0.0]]);
        assert_eq!(pointcloud.get_min_bound(), DVec3::new(0.0, -1.0, -2.0));
        assert_eq!(pointcloud.get_max_bound(), DVec3::new(2.0, 3.0, 2.0));

        let centroid = pointcloud.centroid().unwrap();
        assert_relative_eq!(centroid.x, 1.0);
        assert_relative_eq!(centroid.y, 1.0);
        assert_relative_eq!(centroid.z, 0.0);

        assert!(PointCloud::default().centroid().is_none());
        assert_eq!(PointCloud::default().get_min_bound(), DVec3::ZERO);
    }

    #[test]
    fn test_select_keeps_attributes() -> Result<(), GeometryError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            Some(vec![[1, 1, 1], [2, 2, 2], [3, 3, 3]]),
            None,
        );
        let subset = pointcloud.select(&[2, 0])?;
        assert_eq!(subset.points(), &[[2.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(subset.colors().unwrap(), &[[3, 3, 3], [1, 1, 1]]);
        assert!(subset.normals().is_none());

        assert_eq!(
            pointcloud.select(&[3]),
            Err(GeometryError::IndexOutOfBounds { index: 3, len: 3 })
        );
        Ok(())
    }

    #[test]
    fn test_transformed_rotates_normals_only() -> Result<(), GeometryError> {
        let pointcloud = PointCloud::new(
            vec![[1.0, 0.0, 0.0]],
            None,
            Some(vec![[1.0, 0.0, 0.0]]),
        );
        // 90 degrees around z
        let rotation = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let moved = pointcloud.transformed(&rotation, &[0.0, 0.0, 5.0])?;

        assert_relative_eq!(moved.points()[0][1], 1.0);
        assert_relative_eq!(moved.points()[0][2], 5.0);
        let normal = moved.normals().unwrap()[0];
        assert_relative_eq!(normal[1], 1.0);
        assert_relative_eq!(normal[2], 0.0);
        Ok(())
    }

    #[test]
    fn test_with_normals_length_mismatch() {
        let pointcloud = PointCloud::from_points(vec![[0.0; 3], [1.0; 3]]);
        let res = pointcloud.with_normals(vec![[0.0, 0.0, 1.0]]);
        assert_eq!(
            res,
            Err(GeometryError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
    }
}
