use glam::DVec3;

use crate::{linalg::symmetric_eigen, pointcloud::PointCloud, search::KdTree, GeometryError};

/// Minimum number of neighbors used to fit a local plane.
pub const MIN_PLANE_NEIGHBORS: usize = 3;

/// Result of a normal estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEstimate {
    /// Unit normals, one per point, oriented towards the viewpoint.
    pub normals: Vec<[f64; 3]>,
    /// Surface variation `λ0 / (λ0 + λ1 + λ2)` per point.
    pub curvature: Vec<f64>,
}

/// Covariance of the points selected by `indices` around their mean.
///
/// Returns the mean and the upper-triangular covariance as a full 3x3 matrix.
pub fn covariance(points: &[[f64; 3]], indices: &[usize]) -> (DVec3, [[f64; 3]; 3]) {
    let n = indices.len().max(1) as f64;
    let mean = indices
        .iter()
        .fold(DVec3::ZERO, |acc, &i| acc + DVec3::from_array(points[i]))
        / n;

    let mut cov = [[0.0; 3]; 3];
    for &i in indices {
        let d = (DVec3::from_array(points[i]) - mean).to_array();
        for r in 0..3 {
            for c in r..3 {
                cov[r][c] += d[r] * d[c];
            }
        }
    }
    for r in 0..3 {
        for c in r..3 {
            cov[r][c] /= n;
            cov[c][r] = cov[r][c];
        }
    }
    (mean, cov)
}

/// Fit a plane to the given neighborhood and return its normal and surface variation.
pub fn fit_plane_normal(points: &[[f64; 3]], indices: &[usize]) -> (DVec3, f64) {
    let (_, cov) = covariance(points, indices);
    let (values, vectors) = symmetric_eigen(cov);
    let normal = DVec3::new(vectors[0][0], vectors[1][0], vectors[2][0]);
    let sum = values.iter().map(|v| v.max(0.0)).sum::<f64>();
    let curvature = if sum > 0.0 {
        values[0].max(0.0) / sum
    } else {
        0.0
    };
    (normal.normalize_or(DVec3::Z), curvature)
}

/// Estimate per-point surface normals using a radius neighborhood.
///
/// Neighborhoods with fewer than [`MIN_PLANE_NEIGHBORS`] points inside `radius` fall back
/// to the nearest [`MIN_PLANE_NEIGHBORS`] points. Normals are flipped to face `viewpoint`.
///
/// # Arguments
///
/// * `cloud` - The input point cloud.
/// * `radius` - Search radius for the local plane fit.
/// * `viewpoint` - The sensor position the normals should face.
///
/// # Errors
///
/// Returns [`GeometryError::EmptyCloud`] if the cloud has no points.
pub fn estimate_normals(
    cloud: &PointCloud,
    radius: f64,
    viewpoint: &[f64; 3],
) -> Result<NormalEstimate, GeometryError> {
    let points = cloud.points();
    let tree = KdTree::new(points)?;
    let viewpoint = DVec3::from_array(*viewpoint);

    let mut normals = Vec::with_capacity(points.len());
    let mut curvature = Vec::with_capacity(points.len());

    for p in points.iter() {
        let mut neighbors = tree.within_radius(p, radius);
        if neighbors.len() < MIN_PLANE_NEIGHBORS {
            neighbors = tree.nearest_n(p, MIN_PLANE_NEIGHBORS);
        }
        let indices = neighbors.iter().map(|n| n.index).collect::<Vec<_>>();

        let (mut normal, c) = if indices.len() < MIN_PLANE_NEIGHBORS {
            (DVec3::Z, 0.0)
        } else {
            fit_plane_normal(points, &indices)
        };

        if normal.dot(viewpoint - DVec3::from_array(*p)) < 0.0 {
            normal = -normal;
        }
        normals.push(normal.to_array());
        curvature.push(c);
    }

    log::debug!("estimated {} normals with radius {}", normals.len(), radius);

    Ok(NormalEstimate { normals, curvature })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane(n: usize, spacing: f64) -> PointCloud {
        let mut points = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                points.push([i as f64 * spacing, j as f64 * spacing, 0.0]);
            }
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn test_plane_normals_face_viewpoint() -> Result<(), GeometryError> {
        let cloud = plane(6, 0.01);
        let estimate = estimate_normals(&cloud, 0.025, &[0.0, 0.0, 1.0])?;
        assert_eq!(estimate.normals.len(), cloud.len());
        for (n, c) in estimate.normals.iter().zip(estimate.curvature.iter()) {
            assert_relative_eq!(n[2], 1.0, epsilon = 1e-9);
            assert_relative_eq!(*c, 0.0, epsilon = 1e-9);
        }

        let flipped = estimate_normals(&cloud, 0.025, &[0.0, 0.0, -1.0])?;
        assert_relative_eq!(flipped.normals[0][2], -1.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_covariance_of_line() {
        let points = vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let (mean, cov) = covariance(&points, &[0, 1]);
        assert_relative_eq!(mean.x, 1.0);
        assert_relative_eq!(cov[0][0], 1.0);
        assert_relative_eq!(cov[1][1], 0.0);
    }

    #[test]
    fn test_empty_cloud() {
        let res = estimate_normals(&PointCloud::default(), 0.1, &[0.0; 3]);
        assert_eq!(res.err(), Some(GeometryError::EmptyCloud));
    }
}
