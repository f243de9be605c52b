use crate::{
    rigid::{ransac_rigid, RansacParams, RigidTransform, MIN_RIGID_SAMPLES},
    ProcessingError,
};

use super::Correspondence;

/// Seed of the correspondence rejection sampler, fixed so runs are reproducible.
pub const REJECTOR_SEED: u64 = 0x5ca7;

/// Keep only the correspondences consistent with a single rigid motion.
///
/// # Arguments
///
/// * `correspondences` - Candidate pairs indexing into the keypoint clouds.
/// * `source_keypoints` - Positions of the source keypoints.
/// * `target_keypoints` - Positions of the target keypoints.
/// * `inlier_threshold` - Maximum distance between a moved source keypoint and its target.
/// * `max_iterations` - Number of RANSAC samples.
///
/// # Errors
///
/// Returns [`ProcessingError::NoCorrespondences`] when fewer than three candidates or
/// inliers remain.
pub fn reject_correspondences(
    correspondences: &[Correspondence],
    source_keypoints: &[[f64; 3]],
    target_keypoints: &[[f64; 3]],
    inlier_threshold: f64,
    max_iterations: usize,
) -> Result<(Vec<Correspondence>, RigidTransform), ProcessingError> {
    if correspondences.len() < MIN_RIGID_SAMPLES {
        return Err(ProcessingError::NoCorrespondences);
    }

    let source = correspondences
        .iter()
        .map(|c| source_keypoints[c.source_index])
        .collect::<Vec<_>>();
    let target = correspondences
        .iter()
        .map(|c| target_keypoints[c.target_index])
        .collect::<Vec<_>>();

    let params = RansacParams {
        inlier_threshold,
        max_iterations,
        seed: REJECTOR_SEED,
    };
    let result = match ransac_rigid(&source, &target, &params) {
        Ok(result) => result,
        Err(ProcessingError::NotEnoughPoints { .. }) => {
            return Err(ProcessingError::NoCorrespondences)
        }
        Err(e) => return Err(e),
    };

    let inliers = result
        .inliers
        .iter()
        .map(|&i| correspondences[i])
        .collect::<Vec<_>>();
    log::debug!(
        "rejector: kept {} of {} correspondences",
        inliers.len(),
        correspondences.len()
    );
    Ok((inliers, result.transform))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(n: usize) -> Vec<Correspondence> {
        (0..n)
            .map(|i| Correspondence {
                source_index: i,
                target_index: i,
                distance: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_wrong_matches_are_removed() -> Result<(), ProcessingError> {
        let source = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
        ];
        let mut target = source
            .iter()
            .map(|p| [p[0] + 0.5, p[1], p[2]])
            .collect::<Vec<_>>();
        target[4] = [-3.0, 2.0, 7.0];

        let (kept, transform) = reject_correspondences(&pairs(5), &source, &target, 0.01, 100)?;
        assert_eq!(kept.len(), 4);
        assert!(kept.iter().all(|c| c.source_index != 4));
        assert!((transform.translation[0] - 0.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_too_few_candidates() {
        let points = vec![[0.0; 3]; 2];
        assert_eq!(
            reject_correspondences(&pairs(2), &points, &points, 0.1, 10),
            Err(ProcessingError::NoCorrespondences)
        );
    }
}
