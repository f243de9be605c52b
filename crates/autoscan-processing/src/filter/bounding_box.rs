use autoscan_3d::pointcloud::PointCloud;
use serde::{Deserialize, Serialize};

use super::{outlier_removal::statistical_inliers, CloudFilter, FilterKind};
use crate::ProcessingError;

/// An inclusive axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bounds {
    /// Lower x limit.
    pub min_x: f64,
    /// Upper x limit.
    pub max_x: f64,
    /// Lower y limit.
    pub min_y: f64,
    /// Upper y limit.
    pub max_y: f64,
    /// Lower z limit.
    pub min_z: f64,
    /// Upper z limit.
    pub max_z: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: -1.0,
            max_x: 1.0,
            min_y: -1.0,
            max_y: 1.0,
            min_z: -1.0,
            max_z: 1.0,
        }
    }
}

impl Bounds {
    /// Whether the point lies inside the box, borders included.
    pub fn contains(&self, p: &[f64; 3]) -> bool {
        (self.min_x..=self.max_x).contains(&p[0])
            && (self.min_y..=self.max_y).contains(&p[1])
            && (self.min_z..=self.max_z).contains(&p[2])
    }
}

/// Parameters of the bounding box filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingBoxParams {
    /// The crop box.
    pub bounds: Bounds,
    /// Neighbors for the outlier pass after cropping; `0` disables the pass.
    pub mean_k: usize,
    /// Standard deviation multiplier of the outlier pass.
    pub stddev_mul_thresh: f64,
}

impl Default for BoundingBoxParams {
    fn default() -> Self {
        Self {
            bounds: Bounds::default(),
            mean_k: 50,
            stddev_mul_thresh: 1.0,
        }
    }
}

impl BoundingBoxParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        let b = &self.bounds;
        if b.min_x > b.max_x || b.min_y > b.max_y || b.min_z > b.max_z {
            return Err(ProcessingError::InvalidParameter(format!(
                "bounding box minimum exceeds maximum: {b:?}"
            )));
        }
        if !self.stddev_mul_thresh.is_finite() {
            return Err(ProcessingError::InvalidParameter(
                "stddev_mul_thresh must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Crops a cloud to a box and then removes statistical outliers.
#[derive(Debug, Clone, Default)]
pub struct BoundingBoxFilter {
    params: BoundingBoxParams,
}

impl BoundingBoxFilter {
    /// Create the filter.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if a minimum exceeds its maximum.
    pub fn new(params: BoundingBoxParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The current parameters.
    pub fn params(&self) -> &BoundingBoxParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: BoundingBoxParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub(crate) fn from_params_unchecked(params: BoundingBoxParams) -> Self {
        Self { params }
    }
}

impl CloudFilter for BoundingBoxFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::BoundingBox
    }

    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
        if cloud.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;

        let inside = cloud
            .points()
            .iter()
            .enumerate()
            .filter(|(_, p)| self.params.bounds.contains(p))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let cropped = cloud.select(&inside)?;
        log::debug!("bounding box: kept {} of {} points", cropped.len(), cloud.len());

        if self.params.mean_k == 0 || cropped.is_empty() {
            return Ok(cropped);
        }

        let inliers =
            statistical_inliers(&cropped, self.params.mean_k, self.params.stddev_mul_thresh)?;
        Ok(cropped.select(&inliers)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_is_inclusive() -> Result<(), ProcessingError> {
        let cloud = PointCloud::new(
            vec![[1.0, 0.0, 0.0], [1.5, 0.0, 0.0], [-1.0, -1.0, -1.0]],
            Some(vec![[1, 1, 1], [2, 2, 2], [3, 3, 3]]),
            None,
        );
        let filter = BoundingBoxFilter::new(BoundingBoxParams {
            mean_k: 0,
            ..Default::default()
        })?;
        let cropped = filter.process(&cloud)?;
        assert_eq!(cropped.points(), &[[1.0, 0.0, 0.0], [-1.0, -1.0, -1.0]]);
        assert_eq!(cropped.colors().unwrap(), &[[1, 1, 1], [3, 3, 3]]);
        Ok(())
    }

    #[test]
    fn test_everything_outside_yields_empty_cloud() -> Result<(), ProcessingError> {
        let cloud = PointCloud::from_points(vec![[5.0, 5.0, 5.0]]);
        let cropped = BoundingBoxFilter::default().process(&cloud)?;
        assert!(cropped.is_empty());
        Ok(())
    }

    #[test]
    fn test_crop_then_outlier_pass() -> Result<(), ProcessingError> {
        let mut points = (0..20)
            .map(|i| [i as f64 * 0.01, 0.0, 0.0])
            .collect::<Vec<_>>();
        points.push([0.9, 0.9, 0.9]);
        points.push([3.0, 0.0, 0.0]);
        let cloud = PointCloud::from_points(points);

        let filter = BoundingBoxFilter::new(BoundingBoxParams {
            mean_k: 3,
            ..Default::default()
        })?;
        let filtered = filter.process(&cloud)?;
        assert!(filtered.points().iter().all(|p| p[1] == 0.0 && p[0] < 1.0));
        Ok(())
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let params = BoundingBoxParams {
            bounds: Bounds {
                min_x: 1.0,
                max_x: -1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            BoundingBoxFilter::new(params),
            Err(ProcessingError::InvalidParameter(_))
        ));
    }
}
