use autoscan_3d::{pointcloud::PointCloud, search::KdTree};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{CloudRegistration, RegistrationKind, RegistrationResult};
use crate::{
    error::{ensure_nonzero, ensure_positive},
    rigid::{fit_rigid, ransac_rigid, RansacParams, RigidTransform, MIN_RIGID_SAMPLES},
    ProcessingError,
};

/// Parameters of the point to point ICP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpParams {
    /// Maximum distance between a moved source point and its nearest target point.
    pub correspondence_distance: f64,
    /// RANSAC inlier distance used to reject matches before every fit.
    pub outlier_threshold: f64,
    /// Number of RANSAC samples drawn per iteration.
    pub ransac_iterations: usize,
    /// Convergence threshold on the squared size of the incremental transform.
    pub transformation_epsilon: f64,
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            correspondence_distance: 0.05,
            outlier_threshold: 0.05,
            ransac_iterations: 100,
            transformation_epsilon: 1e-8,
            max_iterations: 50,
        }
    }
}

impl IcpParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_positive("correspondence_distance", self.correspondence_distance)?;
        ensure_positive("outlier_threshold", self.outlier_threshold)?;
        ensure_nonzero("max_iterations", self.max_iterations)?;
        ensure_nonzero("ransac_iterations", self.ransac_iterations)?;
        if !self.transformation_epsilon.is_finite() || self.transformation_epsilon < 0.0 {
            return Err(ProcessingError::InvalidParameter(format!(
                "transformation_epsilon must be non negative, got {}",
                self.transformation_epsilon
            )));
        }
        Ok(())
    }
}

/// Iterative Closest Point registration using point to point distance.
#[derive(Debug, Clone, Default)]
pub struct Icp {
    params: IcpParams,
}

impl Icp {
    /// Create the registration.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] for out of range parameters.
    pub fn new(params: IcpParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Fit the incremental transform on the RANSAC inliers of the matches.
    ///
    /// Falls back to a fit on every match when no sample gathers three inliers.
    fn fit_inliers(
        &self,
        source_match: &[[f64; 3]],
        target_match: &[[f64; 3]],
    ) -> Result<(RigidTransform, Vec<f64>), ProcessingError> {
        let ransac = RansacParams {
            inlier_threshold: self.params.outlier_threshold,
            max_iterations: self.params.ransac_iterations,
            seed: RANSAC_SEED,
        };
        match ransac_rigid(source_match, target_match, &ransac) {
            Ok(result) => {
                let inlier_src = result.inliers.iter().map(|&i| source_match[i]).collect::<Vec<_>>();
                let inlier_dst = result.inliers.iter().map(|&i| target_match[i]).collect::<Vec<_>>();
                let errors = residuals(&result.transform, &inlier_src, &inlier_dst);
                Ok((result.transform, errors))
            }
            Err(ProcessingError::NoCorrespondences) => {
                log::debug!("no RANSAC consensus, fitting all {} matches", source_match.len());
                let delta = fit_rigid(source_match, target_match)?;
                let errors = residuals(&delta, source_match, target_match);
                Ok((delta, errors))
            }
            Err(err) => Err(err),
        }
    }

    /// The current parameters.
    pub fn params(&self) -> &IcpParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: IcpParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub(crate) fn from_params_unchecked(params: IcpParams) -> Self {
        Self { params }
    }
}

const RANSAC_SEED: u64 = 0;

/// Matches of the moved source points within `max_distance` of their nearest target.
fn find_correspondences(
    source: &[[f64; 3]],
    target: &[[f64; 3]],
    kdtree: &KdTree,
    max_distance: f64,
) -> (Vec<[f64; 3]>, Vec<[f64; 3]>) {
    source
        .iter()
        .filter_map(|p| {
            let nn = kdtree.nearest_one(p);
            (nn.distance <= max_distance).then(|| (*p, target[nn.index]))
        })
        .unzip()
}

fn residuals(transform: &RigidTransform, source: &[[f64; 3]], target: &[[f64; 3]]) -> Vec<f64> {
    source
        .iter()
        .zip(target.iter())
        .map(|(p, q)| DVec3::from_array(transform.apply(p)).distance(DVec3::from_array(*q)))
        .collect()
}

impl CloudRegistration for Icp {
    fn kind(&self) -> RegistrationKind {
        RegistrationKind::Icp
    }

    fn process(
        &self,
        source: &PointCloud,
        target: &PointCloud,
    ) -> Result<RegistrationResult, ProcessingError> {
        if source.is_empty() || target.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;

        // build kdtree for target points to speed up the nearest neighbor search
        let kdtree = KdTree::new(target.points())?;

        let mut transform = RigidTransform::identity();
        let mut current_source = source.points().to_vec();
        let mut num_iterations = 0;
        let mut rmse = f64::INFINITY;
        let mut converged = false;

        for i in 0..self.params.max_iterations {
            log::debug!("Iteration: {}", i);

            let (source_match, target_match) = find_correspondences(
                &current_source,
                target.points(),
                &kdtree,
                self.params.correspondence_distance,
            );
            if source_match.len() < MIN_RIGID_SAMPLES {
                return Err(ProcessingError::NotEnoughPoints {
                    required: MIN_RIGID_SAMPLES,
                    found: source_match.len(),
                });
            }

            let (delta, errors) = self.fit_inliers(&source_match, &target_match)?;

            log::debug!(
                "Num correspondences: {} (kept {})",
                source_match.len(),
                errors.len()
            );

            for p in current_source.iter_mut() {
                *p = delta.apply(p);
            }
            transform = delta.then_after(&transform);

            rmse = (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt();
            num_iterations += 1;

            if delta.distance_to_identity_squared() < self.params.transformation_epsilon {
                log::debug!("ICP converged in {} iterations with error {}", num_iterations, rmse);
                converged = true;
                break;
            }
        }

        if !converged {
            log::debug!("ICP stopped after {} iterations with error {}", num_iterations, rmse);
        }

        let aligned = source.transformed(&transform.rotation, &transform.translation)?;
        Ok(RegistrationResult {
            aligned,
            rotation: transform.rotation,
            translation: transform.translation,
            num_iterations,
            rmse,
            converged,
        })
    }
}
