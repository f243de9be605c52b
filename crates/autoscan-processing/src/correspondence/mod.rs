/// Local surface descriptors.
pub mod descriptors;

mod matching;
pub use matching::match_descriptors;

mod rejector;
pub use rejector::{reject_correspondences, REJECTOR_SEED};

use autoscan_3d::pointcloud::PointCloud;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ensure_nonzero, ensure_positive},
    rigid::RigidTransform,
    ProcessingError,
};
use descriptors::Surface;

/// Identifier of a correspondence estimation variant, named after its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CorrespondenceKind {
    /// Fast point feature histograms.
    #[default]
    Fpfh,
    /// Signature of histograms of orientations with color.
    ShotColor,
    /// Point feature histograms.
    Pfh,
    /// Point feature histograms with color ratios.
    PfhRgb,
}

impl CorrespondenceKind {
    /// All correspondence variants in display order.
    pub const ALL: [CorrespondenceKind; 4] = [
        CorrespondenceKind::Fpfh,
        CorrespondenceKind::ShotColor,
        CorrespondenceKind::Pfh,
        CorrespondenceKind::PfhRgb,
    ];
}

/// A pair of matching keypoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    /// Index into the source keypoints.
    pub source_index: usize,
    /// Index into the target keypoints.
    pub target_index: usize,
    /// Distance between the two descriptors.
    pub distance: f32,
}

/// Output of a correspondence estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceResult {
    /// The source cloud moved by the estimated transform.
    pub cloud: PointCloud,
    /// The correspondences that survived rejection.
    pub correspondences: Vec<Correspondence>,
    /// Rotation from source to target.
    pub rotation: [[f64; 3]; 3],
    /// Translation from source to target.
    pub translation: [f64; 3],
}

/// Parameters shared by all correspondence variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceParams {
    /// Support radius of the radius based descriptors.
    pub descriptor_radius: f64,
    /// Radius of the normal estimation.
    pub normal_radius: f64,
    /// Number of target matches per source keypoint.
    pub correspondences_k: usize,
    /// Inlier distance of the rejector.
    pub rejector_inlier_threshold: f64,
    /// Neighborhood size of the k based descriptors.
    pub descriptor_k_search: usize,
    /// Number of samples of the rejector.
    pub rejector_max_iterations: usize,
}

impl Default for CorrespondenceParams {
    fn default() -> Self {
        Self {
            descriptor_radius: 0.05,
            normal_radius: 0.02,
            correspondences_k: 1,
            rejector_inlier_threshold: 0.05,
            descriptor_k_search: 10,
            rejector_max_iterations: 1000,
        }
    }
}

impl CorrespondenceParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_positive("descriptor_radius", self.descriptor_radius)?;
        ensure_positive("normal_radius", self.normal_radius)?;
        ensure_nonzero("correspondences_k", self.correspondences_k)?;
        ensure_positive("rejector_inlier_threshold", self.rejector_inlier_threshold)?;
        ensure_nonzero("rejector_max_iterations", self.rejector_max_iterations)?;
        if self.descriptor_k_search < 2 {
            return Err(ProcessingError::InvalidParameter(format!(
                "descriptor_k_search must be at least 2, got {}",
                self.descriptor_k_search
            )));
        }
        Ok(())
    }
}

/// Estimates keypoint correspondences between two clouds and the rigid motion they imply.
pub trait CorrespondenceEstimator {
    /// The variant implemented by this estimator.
    fn kind(&self) -> CorrespondenceKind;

    /// Match the source keypoints against the target keypoints.
    ///
    /// Descriptors use the full clouds as support. The resulting cloud is the source moved
    /// onto the target.
    fn process(
        &self,
        source: &PointCloud,
        source_keypoints: &PointCloud,
        target: &PointCloud,
        target_keypoints: &PointCloud,
    ) -> Result<CorrespondenceResult, ProcessingError>;
}

/// Descriptor matching followed by RANSAC rejection.
#[derive(Debug, Clone)]
pub struct FeatureCorrespondence {
    kind: CorrespondenceKind,
    params: CorrespondenceParams,
}

impl FeatureCorrespondence {
    /// Create an estimator using the descriptor of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] for out of range parameters.
    pub fn new(
        kind: CorrespondenceKind,
        params: CorrespondenceParams,
    ) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { kind, params })
    }

    /// An estimator with default parameters.
    pub fn with_kind(kind: CorrespondenceKind) -> Self {
        Self {
            kind,
            params: CorrespondenceParams::default(),
        }
    }

    pub(crate) fn from_params_unchecked(
        kind: CorrespondenceKind,
        params: CorrespondenceParams,
    ) -> Self {
        Self { kind, params }
    }

    /// The current parameters.
    pub fn params(&self) -> &CorrespondenceParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: CorrespondenceParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    /// Compute the descriptors of the keypoints over the given surface.
    pub fn describe(&self, surface: &Surface, keypoints: &PointCloud) -> Vec<Vec<f32>> {
        let indices = keypoints
            .points()
            .iter()
            .map(|p| surface.nearest_index(p))
            .collect::<Vec<_>>();
        match self.kind {
            CorrespondenceKind::Fpfh => {
                descriptors::fpfh(surface, &indices, self.params.descriptor_radius)
            }
            CorrespondenceKind::ShotColor => {
                descriptors::shot_color(surface, &indices, self.params.descriptor_radius)
            }
            CorrespondenceKind::Pfh => {
                descriptors::pfh(surface, &indices, self.params.descriptor_k_search)
            }
            CorrespondenceKind::PfhRgb => {
                descriptors::pfh_rgb(surface, &indices, self.params.descriptor_k_search)
            }
        }
    }
}

impl CorrespondenceEstimator for FeatureCorrespondence {
    fn kind(&self) -> CorrespondenceKind {
        self.kind
    }

    fn process(
        &self,
        source: &PointCloud,
        source_keypoints: &PointCloud,
        target: &PointCloud,
        target_keypoints: &PointCloud,
    ) -> Result<CorrespondenceResult, ProcessingError> {
        if source.is_empty() || target.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;

        let source_surface = Surface::new(source, self.params.normal_radius)?;
        let target_surface = Surface::new(target, self.params.normal_radius)?;

        let source_descriptors = self.describe(&source_surface, source_keypoints);
        let target_descriptors = self.describe(&target_surface, target_keypoints);

        let candidates = match_descriptors(
            &source_descriptors,
            &target_descriptors,
            self.params.correspondences_k,
        );
        log::debug!(
            "{:?}: {} candidate correspondences from {} / {} keypoints",
            self.kind,
            candidates.len(),
            source_keypoints.len(),
            target_keypoints.len()
        );

        let (correspondences, transform) = reject_correspondences(
            &candidates,
            source_keypoints.points(),
            target_keypoints.points(),
            self.params.rejector_inlier_threshold,
            self.params.rejector_max_iterations,
        )?;

        let cloud = source.transformed(&transform.rotation, &transform.translation)?;
        Ok(CorrespondenceResult {
            cloud,
            correspondences,
            rotation: transform.rotation,
            translation: transform.translation,
        })
    }
}

/// Persisted state of a [`CorrespondenceFactory`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceConfig {
    /// The active variant.
    pub active: CorrespondenceKind,
    /// FPFH parameters.
    pub fpfh: CorrespondenceParams,
    /// SHOT color parameters.
    pub shot_color: CorrespondenceParams,
    /// PFH parameters.
    pub pfh: CorrespondenceParams,
    /// PFHRGB parameters.
    pub pfh_rgb: CorrespondenceParams,
}

/// Owns one estimator per descriptor and tracks the active one.
#[derive(Debug, Clone)]
pub struct CorrespondenceFactory {
    active: CorrespondenceKind,
    estimators: [FeatureCorrespondence; 4],
}

impl Default for CorrespondenceFactory {
    fn default() -> Self {
        Self::from_config(&CorrespondenceConfig::default())
    }
}

fn slot(kind: CorrespondenceKind) -> usize {
    match kind {
        CorrespondenceKind::Fpfh => 0,
        CorrespondenceKind::ShotColor => 1,
        CorrespondenceKind::Pfh => 2,
        CorrespondenceKind::PfhRgb => 3,
    }
}

impl CorrespondenceFactory {
    /// Build a factory from a persisted configuration.
    pub fn from_config(config: &CorrespondenceConfig) -> Self {
        let params = [
            &config.fpfh,
            &config.shot_color,
            &config.pfh,
            &config.pfh_rgb,
        ];
        Self {
            active: config.active,
            estimators: CorrespondenceKind::ALL.map(|kind| {
                FeatureCorrespondence::from_params_unchecked(kind, params[slot(kind)].clone())
            }),
        }
    }

    /// Snapshot the factory state.
    pub fn to_config(&self) -> CorrespondenceConfig {
        let params = |kind| self.estimator(kind).params().clone();
        CorrespondenceConfig {
            active: self.active,
            fpfh: params(CorrespondenceKind::Fpfh),
            shot_color: params(CorrespondenceKind::ShotColor),
            pfh: params(CorrespondenceKind::Pfh),
            pfh_rgb: params(CorrespondenceKind::PfhRgb),
        }
    }

    /// Make `kind` the active variant. Parameters of every variant are kept.
    pub fn select(&mut self, kind: CorrespondenceKind) {
        log::debug!("correspondence: {:?} -> {:?}", self.active, kind);
        self.active = kind;
    }

    /// The active variant.
    pub fn active_kind(&self) -> CorrespondenceKind {
        self.active
    }

    /// The active estimator.
    pub fn active(&self) -> &dyn CorrespondenceEstimator {
        self.estimator(self.active)
    }

    /// The estimator of a variant.
    pub fn estimator(&self, kind: CorrespondenceKind) -> &FeatureCorrespondence {
        &self.estimators[slot(kind)]
    }

    /// Mutable access to the estimator of a variant.
    pub fn estimator_mut(&mut self, kind: CorrespondenceKind) -> &mut FeatureCorrespondence {
        &mut self.estimators[slot(kind)]
    }
}
