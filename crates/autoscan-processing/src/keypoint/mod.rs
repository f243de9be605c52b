mod harris;
pub use harris::{HarrisKeypoint, HarrisMethod, HarrisParams};

mod sift;
pub use sift::{Sift, SiftParams};

use autoscan_3d::pointcloud::PointCloud;
use serde::{Deserialize, Serialize};

use crate::ProcessingError;

/// Identifier of a keypoint detector variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeypointKind {
    /// Scale invariant feature transform on intensity.
    #[default]
    Sift,
    /// Harris response.
    Harris,
    /// Tomasi response.
    Tomasi,
    /// Noble response.
    Noble,
    /// Lowe response.
    Lowe,
    /// Curvature response.
    Curvature,
}

impl KeypointKind {
    /// All keypoint variants in display order.
    pub const ALL: [KeypointKind; 6] = [
        KeypointKind::Sift,
        KeypointKind::Harris,
        KeypointKind::Tomasi,
        KeypointKind::Noble,
        KeypointKind::Lowe,
        KeypointKind::Curvature,
    ];

    /// The Harris method behind this kind, if it is one of the Harris family.
    pub fn harris_method(&self) -> Option<HarrisMethod> {
        match self {
            KeypointKind::Sift => None,
            KeypointKind::Harris => Some(HarrisMethod::Harris),
            KeypointKind::Tomasi => Some(HarrisMethod::Tomasi),
            KeypointKind::Noble => Some(HarrisMethod::Noble),
            KeypointKind::Lowe => Some(HarrisMethod::Lowe),
            KeypointKind::Curvature => Some(HarrisMethod::Curvature),
        }
    }
}

/// A keypoint detector extracts a sparse set of salient points from a cloud.
pub trait KeypointDetector {
    /// The variant implemented by this detector.
    fn kind(&self) -> KeypointKind;

    /// Detect keypoints. The result is a cloud of keypoint positions, possibly empty.
    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError>;
}

/// Persisted state of a [`KeypointFactory`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointConfig {
    /// The active variant.
    pub active: KeypointKind,
    /// SIFT parameters.
    pub sift: SiftParams,
    /// Harris parameters.
    pub harris: HarrisParams,
    /// Tomasi parameters.
    pub tomasi: HarrisParams,
    /// Noble parameters.
    pub noble: HarrisParams,
    /// Lowe parameters.
    pub lowe: HarrisParams,
    /// Curvature parameters.
    pub curvature: HarrisParams,
}

/// Owns one instance of every keypoint detector and tracks the active one.
///
/// Each Harris method has its own detector so its parameters survive switching.
#[derive(Debug, Clone)]
pub struct KeypointFactory {
    active: KeypointKind,
    sift: Sift,
    harris: [HarrisKeypoint; 5],
}

impl Default for KeypointFactory {
    fn default() -> Self {
        Self::from_config(&KeypointConfig::default())
    }
}

fn harris_slot(method: HarrisMethod) -> usize {
    match method {
        HarrisMethod::Harris => 0,
        HarrisMethod::Tomasi => 1,
        HarrisMethod::Noble => 2,
        HarrisMethod::Lowe => 3,
        HarrisMethod::Curvature => 4,
    }
}

impl KeypointFactory {
    /// Build a factory from a persisted configuration.
    pub fn from_config(config: &KeypointConfig) -> Self {
        let params = [
            &config.harris,
            &config.tomasi,
            &config.noble,
            &config.lowe,
            &config.curvature,
        ];
        Self {
            active: config.active,
            sift: Sift::from_params_unchecked(config.sift.clone()),
            harris: HarrisMethod::ALL.map(|method| {
                HarrisKeypoint::from_params_unchecked(method, params[harris_slot(method)].clone())
            }),
        }
    }

    /// Snapshot the factory state.
    pub fn to_config(&self) -> KeypointConfig {
        let params = |method| self.harris(method).params().clone();
        KeypointConfig {
            active: self.active,
            sift: self.sift.params().clone(),
            harris: params(HarrisMethod::Harris),
            tomasi: params(HarrisMethod::Tomasi),
            noble: params(HarrisMethod::Noble),
            lowe: params(HarrisMethod::Lowe),
            curvature: params(HarrisMethod::Curvature),
        }
    }

    /// Make `kind` the active variant. Parameters of every variant are kept.
    pub fn select(&mut self, kind: KeypointKind) {
        log::debug!("keypoint: {:?} -> {:?}", self.active, kind);
        self.active = kind;
    }

    /// The active variant.
    pub fn active_kind(&self) -> KeypointKind {
        self.active
    }

    /// The active detector.
    pub fn active(&self) -> &dyn KeypointDetector {
        match self.active.harris_method() {
            Some(method) => self.harris(method),
            None => &self.sift,
        }
    }

    /// The SIFT instance.
    pub fn sift(&self) -> &Sift {
        &self.sift
    }

    /// Mutable access to the SIFT instance.
    pub fn sift_mut(&mut self) -> &mut Sift {
        &mut self.sift
    }

    /// The detector of a Harris method.
    pub fn harris(&self, method: HarrisMethod) -> &HarrisKeypoint {
        &self.harris[harris_slot(method)]
    }

    /// Mutable access to the detector of a Harris method.
    pub fn harris_mut(&mut self, method: HarrisMethod) -> &mut HarrisKeypoint {
        &mut self.harris[harris_slot(method)]
    }
}
