use autoscan_3d::{ops::luminance, pointcloud::PointCloud, search::KdTree};
use serde::{Deserialize, Serialize};

use super::{KeypointDetector, KeypointKind};
use crate::{
    error::{ensure_nonzero, ensure_positive},
    filter::voxel_downsample,
    ProcessingError,
};

/// Parameters of the SIFT keypoint detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftParams {
    /// Standard deviation of the smallest scale.
    pub min_scale: f64,
    /// Number of octaves, each doubling the scale.
    pub nr_octaves: usize,
    /// Number of scales computed per octave.
    pub nr_scales_per_octave: usize,
    /// Minimum absolute difference of gaussians of a keypoint.
    pub min_contrast: f64,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            min_scale: 0.01,
            nr_octaves: 3,
            nr_scales_per_octave: 4,
            min_contrast: 0.001,
        }
    }
}

impl SiftParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_positive("min_scale", self.min_scale)?;
        ensure_nonzero("nr_octaves", self.nr_octaves)?;
        ensure_nonzero("nr_scales_per_octave", self.nr_scales_per_octave)?;
        if !self.min_contrast.is_finite() || self.min_contrast < 0.0 {
            return Err(ProcessingError::InvalidParameter(format!(
                "min_contrast must be non negative, got {}",
                self.min_contrast
            )));
        }
        Ok(())
    }
}

/// Scale invariant keypoints on the point intensity.
///
/// The intensity is the color luminance, or the `z` coordinate for clouds without colors.
#[derive(Debug, Clone, Default)]
pub struct Sift {
    params: SiftParams,
}

impl Sift {
    /// Create the detector.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] for a non positive scale or zero counts.
    pub fn new(params: SiftParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The current parameters.
    pub fn params(&self) -> &SiftParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: SiftParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub(crate) fn from_params_unchecked(params: SiftParams) -> Self {
        Self { params }
    }

    fn detect_octave(
        &self,
        cloud: &PointCloud,
        base_scale: f64,
        keypoints: &mut Vec<([f64; 3], Option<[u8; 3]>)>,
    ) -> Result<(), ProcessingError> {
        let points = cloud.points();
        let tree = KdTree::new(points)?;
        let intensity = intensities(cloud);

        let nr_scales = self.params.nr_scales_per_octave;
        let blurred = (0..nr_scales + 3)
            .map(|s| {
                let sigma = base_scale * 2f64.powf(s as f64 / nr_scales as f64);
                gaussian_smooth(&tree, points, &intensity, sigma)
            })
            .collect::<Vec<_>>();
        let dog = blurred
            .windows(2)
            .map(|w| {
                w[1].iter()
                    .zip(w[0].iter())
                    .map(|(a, b)| a - b)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let neighborhoods = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                tree.within_radius(p, 2.0 * base_scale)
                    .into_iter()
                    .map(|n| n.index)
                    .filter(|&j| j != i)
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        for s in 1..dog.len() - 1 {
            for (i, neighbors) in neighborhoods.iter().enumerate() {
                let value = dog[s][i];
                if value.abs() < self.params.min_contrast || neighbors.is_empty() {
                    continue;
                }

                let others = neighbors
                    .iter()
                    .flat_map(|&j| [dog[s - 1][j], dog[s][j], dog[s + 1][j]])
                    .chain([dog[s - 1][i], dog[s + 1][i]]);

                let mut is_max = true;
                let mut is_min = true;
                for other in others {
                    is_max &= value > other;
                    is_min &= value < other;
                    if !is_max && !is_min {
                        break;
                    }
                }

                if is_max || is_min {
                    let color = cloud.colors().map(|c| c[i]);
                    keypoints.push((points[i], color));
                }
            }
        }

        Ok(())
    }
}

fn intensities(cloud: &PointCloud) -> Vec<f64> {
    match cloud.colors() {
        Some(colors) => colors.iter().map(luminance).collect(),
        None => cloud.points().iter().map(|p| p[2]).collect(),
    }
}

/// Gaussian weighted mean of the intensity over neighbors within `3 * sigma`.
fn gaussian_smooth(tree: &KdTree, points: &[[f64; 3]], intensity: &[f64], sigma: f64) -> Vec<f64> {
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
    points
        .iter()
        .map(|p| {
            let (weighted, total) = tree.within_radius(p, 3.0 * sigma).iter().fold(
                (0.0, 0.0),
                |(weighted, total), n| {
                    let w = (-n.distance * n.distance * inv_two_sigma_sq).exp();
                    (weighted + w * intensity[n.index], total + w)
                },
            );
            if total > 0.0 {
                weighted / total
            } else {
                0.0
            }
        })
        .collect()
}

impl KeypointDetector for Sift {
    fn kind(&self) -> KeypointKind {
        KeypointKind::Sift
    }

    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
        if cloud.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;

        let mut keypoints = Vec::new();
        for octave in 0..self.params.nr_octaves {
            let base_scale = self.params.min_scale * 2f64.powi(octave as i32);
            let downsampled = voxel_downsample(cloud, [base_scale; 3], 1)?;
            if downsampled.len() < 2 {
                log::debug!("sift: octave {octave} has too few points, stopping");
                break;
            }
            let before = keypoints.len();
            self.detect_octave(&downsampled, base_scale, &mut keypoints)?;
            log::debug!(
                "sift: octave {} ({} points) found {} keypoints",
                octave,
                downsampled.len(),
                keypoints.len() - before
            );
        }

        let (points, colors): (Vec<_>, Vec<_>) = keypoints.into_iter().unzip();
        let colors = cloud
            .colors()
            .map(|_| colors.into_iter().flatten().collect::<Vec<_>>());
        Ok(PointCloud::new(points, colors, None))
    }
}
