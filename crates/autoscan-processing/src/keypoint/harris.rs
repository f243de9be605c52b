use autoscan_3d::{
    linalg::symmetric_eigen, normals::estimate_normals, pointcloud::PointCloud, search::KdTree,
};
use serde::{Deserialize, Serialize};

use super::{KeypointDetector, KeypointKind};
use crate::{error::ensure_positive, ProcessingError};

/// Response function of the Harris family of 3D keypoint detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HarrisMethod {
    /// `det(M) - 0.04 * trace(M)^2`
    #[default]
    Harris,
    /// Smallest eigenvalue of `M`.
    Tomasi,
    /// `det(M) / trace(M)`
    Noble,
    /// `det(M) / trace(M)^2`
    Lowe,
    /// Surface variation of the point neighborhood.
    Curvature,
}

impl HarrisMethod {
    /// All methods.
    pub const ALL: [HarrisMethod; 5] = [
        HarrisMethod::Harris,
        HarrisMethod::Tomasi,
        HarrisMethod::Noble,
        HarrisMethod::Lowe,
        HarrisMethod::Curvature,
    ];

    /// The keypoint kind exposed by a detector using this method.
    pub fn kind(&self) -> KeypointKind {
        match self {
            HarrisMethod::Harris => KeypointKind::Harris,
            HarrisMethod::Tomasi => KeypointKind::Tomasi,
            HarrisMethod::Noble => KeypointKind::Noble,
            HarrisMethod::Lowe => KeypointKind::Lowe,
            HarrisMethod::Curvature => KeypointKind::Curvature,
        }
    }
}

/// Parameters shared by all Harris family detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarrisParams {
    /// Radius used for normal estimation and for the normal covariance.
    pub radius: f64,
    /// Radius of the non maxima suppression.
    pub radius_search: f64,
    /// Minimum response of a keypoint.
    pub threshold: f64,
    /// Keep only local maxima of the response.
    pub non_max_suppression: bool,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            radius: 0.01,
            radius_search: 0.01,
            threshold: 1e-6,
            non_max_suppression: true,
        }
    }
}

impl HarrisParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_positive("radius", self.radius)?;
        if self.non_max_suppression {
            ensure_positive("radius_search", self.radius_search)?;
        }
        if !self.threshold.is_finite() {
            return Err(ProcessingError::InvalidParameter(
                "threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Harris family 3D keypoint detector working on surface normals.
#[derive(Debug, Clone)]
pub struct HarrisKeypoint {
    method: HarrisMethod,
    params: HarrisParams,
}

impl HarrisKeypoint {
    /// Create a detector with the given response method.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] for a non positive radius.
    pub fn new(method: HarrisMethod, params: HarrisParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { method, params })
    }

    /// A detector with default parameters.
    pub fn with_method(method: HarrisMethod) -> Self {
        Self {
            method,
            params: HarrisParams::default(),
        }
    }

    pub(crate) fn from_params_unchecked(method: HarrisMethod, params: HarrisParams) -> Self {
        Self { method, params }
    }

    /// The response method.
    pub fn method(&self) -> HarrisMethod {
        self.method
    }

    /// The current parameters.
    pub fn params(&self) -> &HarrisParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: HarrisParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Compute the response of every point of the cloud.
    pub fn responses(&self, cloud: &PointCloud) -> Result<Vec<f64>, ProcessingError> {
        if cloud.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;

        let estimate = estimate_normals(cloud, self.params.radius, &[0.0; 3])?;
        let tree = KdTree::new(cloud.points())?;

        let responses = cloud
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if self.method == HarrisMethod::Curvature {
                    return estimate.curvature[i];
                }
                let neighbors = tree.within_radius(p, self.params.radius);
                let covar = normal_covariance(
                    &estimate.normals,
                    neighbors.iter().map(|n| n.index),
                );
                response(self.method, &covar)
            })
            .collect();

        Ok(responses)
    }
}

/// Mean of the outer products `n n^T` of the selected normals.
fn normal_covariance(normals: &[[f64; 3]], indices: impl Iterator<Item = usize>) -> [[f64; 3]; 3] {
    let mut covar = [[0.0; 3]; 3];
    let mut count = 0usize;
    for i in indices {
        let n = normals[i];
        for r in 0..3 {
            for c in 0..3 {
                covar[r][c] += n[r] * n[c];
            }
        }
        count += 1;
    }
    if count > 0 {
        for row in covar.iter_mut() {
            for v in row.iter_mut() {
                *v /= count as f64;
            }
        }
    }
    covar
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn response(method: HarrisMethod, covar: &[[f64; 3]; 3]) -> f64 {
    let trace = covar[0][0] + covar[1][1] + covar[2][2];
    let det = determinant(covar);
    match method {
        HarrisMethod::Harris => det - 0.04 * trace * trace,
        HarrisMethod::Tomasi => symmetric_eigen(*covar).0[0],
        HarrisMethod::Noble if trace > f64::EPSILON => det / trace,
        HarrisMethod::Lowe if trace > f64::EPSILON => det / (trace * trace),
        HarrisMethod::Noble | HarrisMethod::Lowe | HarrisMethod::Curvature => 0.0,
    }
}

/// Indices of the points above `threshold` that are local maxima within `radius`.
///
/// Ties are broken in favor of the lower index so equal neighbors yield a single keypoint.
pub(crate) fn suppress_non_maxima(
    points: &[[f64; 3]],
    responses: &[f64],
    threshold: f64,
    radius: Option<f64>,
) -> Result<Vec<usize>, ProcessingError> {
    let candidates = (0..points.len()).filter(|&i| responses[i] > threshold);
    let Some(radius) = radius else {
        return Ok(candidates.collect());
    };
    let tree = KdTree::new(points)?;
    Ok(candidates
        .filter(|&i| {
            tree.within_radius(&points[i], radius)
                .iter()
                .filter(|n| n.index != i)
                .all(|n| {
                    responses[i] > responses[n.index]
                        || (responses[i] == responses[n.index] && i < n.index)
                })
        })
        .collect())
}

impl KeypointDetector for HarrisKeypoint {
    fn kind(&self) -> KeypointKind {
        self.method.kind()
    }

    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
        let responses = self.responses(cloud)?;
        let radius = self
            .params
            .non_max_suppression
            .then_some(self.params.radius_search);
        let keypoints =
            suppress_non_maxima(cloud.points(), &responses, self.params.threshold, radius)?;

        log::debug!(
            "{:?}: {} keypoints out of {} points",
            self.method,
            keypoints.len(),
            cloud.len()
        );

        Ok(cloud.select(&keypoints)?)
    }
}
