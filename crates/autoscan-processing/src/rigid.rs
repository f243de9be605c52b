use autoscan_3d::{
    linalg::{array33_to_dmat3, dmat3_to_array33, svd3},
    transforms::{compose_rigid, IDENTITY3},
};
use glam::{DMat3, DVec3};
use rand::{rngs::StdRng, SeedableRng};

use crate::ProcessingError;

/// Minimum number of point pairs needed to fit a rigid transform.
pub const MIN_RIGID_SAMPLES: usize = 3;

/// A rigid transformation mapping source points into the target frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    /// Row-major rotation matrix.
    pub rotation: [[f64; 3]; 3],
    /// Translation vector.
    pub translation: [f64; 3],
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: IDENTITY3,
            translation: [0.0; 3],
        }
    }

    /// Apply the transform to a single point.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        (array33_to_dmat3(&self.rotation) * DVec3::from_array(*point)
            + DVec3::from_array(self.translation))
        .to_array()
    }

    /// Return `self * other`, i.e. apply `other` first and then `self`.
    pub fn then_after(&self, other: &RigidTransform) -> RigidTransform {
        let (rotation, translation) = compose_rigid(
            &self.rotation,
            &self.translation,
            &other.rotation,
            &other.translation,
        );
        RigidTransform {
            rotation,
            translation,
        }
    }

    /// Squared distance of this transform to the identity, `‖R−I‖²_F + ‖t‖²`.
    pub fn distance_to_identity_squared(&self) -> f64 {
        let mut acc = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                acc += (self.rotation[i][j] - IDENTITY3[i][j]).powi(2);
            }
            acc += self.translation[i].powi(2);
        }
        acc
    }
}

/// Compute the centroids of two sets of points.
pub fn compute_centroids(points1: &[[f64; 3]], points2: &[[f64; 3]]) -> (DVec3, DVec3) {
    let n = points1.len().max(1) as f64;
    let mut centroid1 = DVec3::ZERO;
    let mut centroid2 = DVec3::ZERO;
    for (p1, p2) in points1.iter().zip(points2.iter()) {
        centroid1 += DVec3::from_array(*p1);
        centroid2 += DVec3::from_array(*p2);
    }
    (centroid1 / n, centroid2 / n)
}

/// Fit the rigid transformation that best maps `source` onto `target` in the least squares sense.
///
/// Kabsch fit: with `H = U S V^T` the SVD of the cross-covariance, `R = V U^T`, with the
/// last column of `V` negated when that would be a reflection.
///
/// # Arguments
///
/// * `source` - Points in the source frame.
/// * `target` - Corresponding points in the target frame.
///
/// # Errors
///
/// * [`ProcessingError::NotEnoughPoints`] with fewer than three pairs.
/// * [`ProcessingError::DegenerateGeometry`] when all source points coincide.
pub fn fit_rigid(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
) -> Result<RigidTransform, ProcessingError> {
    if source.len() != target.len() {
        return Err(autoscan_3d::GeometryError::LengthMismatch {
            expected: source.len(),
            actual: target.len(),
        }
        .into());
    }
    if source.len() < MIN_RIGID_SAMPLES {
        return Err(ProcessingError::NotEnoughPoints {
            required: MIN_RIGID_SAMPLES,
            found: source.len(),
        });
    }

    let (centroid_src, centroid_dst) = compute_centroids(source, target);

    // s[a][b] = sum (src_a - c_src_a) * (dst_b - c_dst_b)
    let mut s = [[0.0; 3]; 3];
    let mut spread = 0.0;
    for (p, q) in source.iter().zip(target.iter()) {
        let a = (DVec3::from_array(*p) - centroid_src).to_array();
        let b = (DVec3::from_array(*q) - centroid_dst).to_array();
        spread += a[0] * a[0] + a[1] * a[1] + a[2] * a[2];
        for i in 0..3 {
            for j in 0..3 {
                s[i][j] += a[i] * b[j];
            }
        }
    }
    if spread < 1e-18 {
        return Err(ProcessingError::DegenerateGeometry(
            "source points are coincident".to_string(),
        ));
    }

    let (u, _, v) = svd3(&s);
    let u = array33_to_dmat3(&u);
    let v = array33_to_dmat3(&v);
    let mut r = v * u.transpose();
    if r.determinant() < 0.0 {
        let v_corrected = DMat3::from_cols(v.x_axis, v.y_axis, -v.z_axis);
        r = v_corrected * u.transpose();
    }
    let translation = centroid_dst - r * centroid_src;

    Ok(RigidTransform {
        rotation: dmat3_to_array33(&r),
        translation: translation.to_array(),
    })
}

/// Result of a robust rigid fit.
#[derive(Debug, Clone, PartialEq)]
pub struct RansacResult {
    /// The transform refitted on the inlier set.
    pub transform: RigidTransform,
    /// Indices of the pairs consistent with the transform.
    pub inliers: Vec<usize>,
}

/// Parameters of the robust rigid fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RansacParams {
    /// A pair is an inlier when the moved source point is within this distance of its target.
    pub inlier_threshold: f64,
    /// Number of random minimal samples to evaluate.
    pub max_iterations: usize,
    /// Seed of the random number generator.
    pub seed: u64,
}

fn collect_inliers(
    transform: &RigidTransform,
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    threshold: f64,
) -> Vec<usize> {
    source
        .iter()
        .zip(target.iter())
        .enumerate()
        .filter(|(_, (p, q))| {
            let moved = DVec3::from_array(transform.apply(p));
            moved.distance(DVec3::from_array(**q)) <= threshold
        })
        .map(|(i, _)| i)
        .collect()
}

/// Robustly fit a rigid transform with RANSAC over point pairs.
///
/// Each iteration fits a transform to three random pairs and counts the pairs within
/// `inlier_threshold`. The best hypothesis is refitted on its inliers.
///
/// # Errors
///
/// * [`ProcessingError::NotEnoughPoints`] with fewer than three pairs.
/// * [`ProcessingError::NoCorrespondences`] if no hypothesis has three inliers.
pub fn ransac_rigid(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    params: &RansacParams,
) -> Result<RansacResult, ProcessingError> {
    if source.len() != target.len() {
        return Err(autoscan_3d::GeometryError::LengthMismatch {
            expected: source.len(),
            actual: target.len(),
        }
        .into());
    }
    if source.len() < MIN_RIGID_SAMPLES {
        return Err(ProcessingError::NotEnoughPoints {
            required: MIN_RIGID_SAMPLES,
            found: source.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(RigidTransform, Vec<usize>)> = None;

    for _ in 0..params.max_iterations {
        let sample = rand::seq::index::sample(&mut rng, source.len(), MIN_RIGID_SAMPLES);
        let sample_src = sample.iter().map(|i| source[i]).collect::<Vec<_>>();
        let sample_dst = sample.iter().map(|i| target[i]).collect::<Vec<_>>();

        // coincident samples carry no information
        let Ok(hypothesis) = fit_rigid(&sample_src, &sample_dst) else {
            continue;
        };

        let inliers = collect_inliers(&hypothesis, source, target, params.inlier_threshold);
        let better = match &best {
            Some((_, best_inliers)) => inliers.len() > best_inliers.len(),
            None => true,
        };
        if better {
            let all_inliers = inliers.len() == source.len();
            best = Some((hypothesis, inliers));
            if all_inliers {
                break;
            }
        }
    }

    let (hypothesis, inliers) = match best {
        Some((hypothesis, inliers)) if inliers.len() >= MIN_RIGID_SAMPLES => (hypothesis, inliers),
        _ => return Err(ProcessingError::NoCorrespondences),
    };

    let inlier_src = inliers.iter().map(|&i| source[i]).collect::<Vec<_>>();
    let inlier_dst = inliers.iter().map(|&i| target[i]).collect::<Vec<_>>();
    let refined = fit_rigid(&inlier_src, &inlier_dst)?;
    let refined_inliers = collect_inliers(&refined, source, target, params.inlier_threshold);

    log::debug!(
        "ransac: {} of {} pairs are inliers",
        inliers.len().max(refined_inliers.len()),
        source.len()
    );

    if refined_inliers.len() >= inliers.len() {
        Ok(RansacResult {
            transform: refined,
            inliers: refined_inliers,
        })
    } else {
        Ok(RansacResult {
            transform: hypothesis,
            inliers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use autoscan_3d::transforms::axis_angle_to_rotation_matrix;
    use rand::Rng;

    fn random_points(rng: &mut StdRng, num_points: usize) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| [rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>()])
            .collect()
    }

    fn assert_transform_eq(a: &RigidTransform, b: &RigidTransform, epsilon: f64) {
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(a.rotation[i][j], b.rotation[i][j], epsilon = epsilon);
            }
            assert_relative_eq!(a.translation[i], b.translation[i], epsilon = epsilon);
        }
    }

    #[test]
    fn test_fit_rigid_identity() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(0);
        let points = random_points(&mut rng, 30);
        let transform = fit_rigid(&points, &points)?;
        assert_transform_eq(&transform, &RigidTransform::identity(), 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_random() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(1);
        let source = random_points(&mut rng, 30);
        let expected = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[0.3, -0.5, 1.0], 0.7)?,
            translation: [0.5, -1.0, 2.0],
        };
        let target = source.iter().map(|p| expected.apply(p)).collect::<Vec<_>>();

        let transform = fit_rigid(&source, &target)?;
        assert_transform_eq(&transform, &expected, 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_half_turn() -> Result<(), Box<dyn std::error::Error>> {
        let source = vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
        let expected = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], std::f64::consts::PI)?,
            translation: [0.0; 3],
        };
        let target = source.iter().map(|p| expected.apply(p)).collect::<Vec<_>>();
        let transform = fit_rigid(&source, &target)?;
        assert_transform_eq(&transform, &expected, 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_planar_points() -> Result<(), Box<dyn std::error::Error>> {
        // a rank two cross-covariance must still give a proper rotation
        let source = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.5, 0.2, 0.0],
        ];
        let expected = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[0.2, 1.0, 0.1], 0.9)?,
            translation: [-0.4, 0.0, 1.5],
        };
        let target = source.iter().map(|p| expected.apply(p)).collect::<Vec<_>>();

        let transform = fit_rigid(&source, &target)?;
        assert_relative_eq!(
            array33_to_dmat3(&transform.rotation).determinant(),
            1.0,
            epsilon = 1e-9
        );
        assert_transform_eq(&transform, &expected, 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_rigid_errors() {
        assert_eq!(
            fit_rigid(&[[0.0; 3]; 2], &[[0.0; 3]; 2]),
            Err(ProcessingError::NotEnoughPoints {
                required: 3,
                found: 2
            })
        );
        assert!(matches!(
            fit_rigid(&[[1.0; 3]; 4], &[[0.0; 3]; 4]),
            Err(ProcessingError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_ransac_rejects_outliers() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(2);
        let source = random_points(&mut rng, 40);
        let expected = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[1.0, 1.0, 0.0], 0.4)?,
            translation: [0.1, 0.2, -0.3],
        };
        let mut target = source.iter().map(|p| expected.apply(p)).collect::<Vec<_>>();
        // corrupt every fifth pair
        for i in (0..target.len()).step_by(5) {
            target[i][0] += 5.0;
        }

        let params = RansacParams {
            inlier_threshold: 0.01,
            max_iterations: 200,
            seed: 7,
        };
        let result = ransac_rigid(&source, &target, &params)?;
        assert_eq!(result.inliers.len(), 32);
        assert!(result.inliers.iter().all(|i| i % 5 != 0));
        assert_transform_eq(&result.transform, &expected, 1e-9);
        Ok(())
    }

    #[test]
    fn test_ransac_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = StdRng::seed_from_u64(3);
        let source = random_points(&mut rng, 20);
        let target = random_points(&mut rng, 20);
        let params = RansacParams {
            inlier_threshold: 0.3,
            max_iterations: 50,
            seed: 11,
        };
        let a = ransac_rigid(&source, &target, &params);
        let b = ransac_rigid(&source, &target, &params);
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_transform_composition() -> Result<(), Box<dyn std::error::Error>> {
        let a = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], 0.5)?,
            translation: [1.0, 0.0, 0.0],
        };
        let b = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[1.0, 0.0, 0.0], 0.2)?,
            translation: [0.0, 2.0, 0.0],
        };
        let p = [0.3, -0.2, 0.9];
        let composed = a.then_after(&b).apply(&p);
        let sequential = a.apply(&b.apply(&p));
        for i in 0..3 {
            assert_relative_eq!(composed[i], sequential[i], epsilon = 1e-12);
        }
        assert_relative_eq!(RigidTransform::identity().distance_to_identity_squared(), 0.0);
        Ok(())
    }
}
