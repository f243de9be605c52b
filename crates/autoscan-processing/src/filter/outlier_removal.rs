use autoscan_3d::{pointcloud::PointCloud, search::KdTree};
use serde::{Deserialize, Serialize};

use super::{CloudFilter, FilterKind};
use crate::{error::ensure_nonzero, ProcessingError};

/// Parameters of the statistical outlier removal filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierRemovalParams {
    /// Number of nearest neighbors used to compute the mean distance of a point.
    pub mean_k: usize,
    /// Points further than `mean + stddev_mul_thresh * stddev` are removed.
    pub stddev_mul_thresh: f64,
}

impl Default for OutlierRemovalParams {
    fn default() -> Self {
        Self {
            mean_k: 50,
            stddev_mul_thresh: 1.0,
        }
    }
}

impl OutlierRemovalParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_nonzero("mean_k", self.mean_k)?;
        if !self.stddev_mul_thresh.is_finite() {
            return Err(ProcessingError::InvalidParameter(
                "stddev_mul_thresh must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Removes points whose mean neighbor distance is statistically too large.
#[derive(Debug, Clone, Default)]
pub struct StatisticalOutlierRemoval {
    params: OutlierRemovalParams,
}

impl StatisticalOutlierRemoval {
    /// Create the filter.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if `mean_k` is zero.
    pub fn new(params: OutlierRemovalParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The current parameters.
    pub fn params(&self) -> &OutlierRemovalParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: OutlierRemovalParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub(crate) fn from_params_unchecked(params: OutlierRemovalParams) -> Self {
        Self { params }
    }
}

/// Indices of the points that survive statistical outlier removal.
///
/// For every point the mean distance to its `mean_k` nearest neighbors (itself excluded) is
/// computed. Points whose mean distance is at most `mean + stddev_mul_thresh * stddev` of
/// that distribution are kept, in input order.
pub fn statistical_inliers(
    cloud: &PointCloud,
    mean_k: usize,
    stddev_mul_thresh: f64,
) -> Result<Vec<usize>, ProcessingError> {
    if cloud.len() < 2 {
        return Ok((0..cloud.len()).collect());
    }
    let tree = KdTree::new(cloud.points())?;

    let mean_distances = cloud
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let neighbors = tree
                .nearest_n(p, mean_k + 1)
                .into_iter()
                .filter(|n| n.index != i)
                .take(mean_k)
                .collect::<Vec<_>>();
            neighbors.iter().map(|n| n.distance).sum::<f64>() / neighbors.len().max(1) as f64
        })
        .collect::<Vec<_>>();

    let n = mean_distances.len() as f64;
    let mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances
        .iter()
        .map(|d| (d - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let threshold = mean + stddev_mul_thresh * variance.sqrt();

    Ok(mean_distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d <= threshold)
        .map(|(i, _)| i)
        .collect())
}

impl CloudFilter for StatisticalOutlierRemoval {
    fn kind(&self) -> FilterKind {
        FilterKind::StatisticalOutlierRemoval
    }

    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
        if cloud.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;
        let inliers =
            statistical_inliers(cloud, self.params.mean_k, self.params.stddev_mul_thresh)?;
        log::debug!(
            "outlier removal: kept {} of {} points",
            inliers.len(),
            cloud.len()
        );
        Ok(cloud.select(&inliers)?)
    }
}
