mod greedy_projection;
pub use greedy_projection::{GreedyProjection, GreedyProjectionParams};

use autoscan_3d::{mesh::PolygonMesh, pointcloud::PointCloud};
use serde::{Deserialize, Serialize};

use crate::ProcessingError;

/// Identifier of a surface reconstruction variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReconstructionKind {
    /// Greedy projection triangulation.
    #[default]
    GreedyProjection,
}

/// Builds a triangle mesh from a point cloud.
pub trait SurfaceReconstructor {
    /// The variant implemented by this reconstructor.
    fn kind(&self) -> ReconstructionKind;

    /// Triangulate the cloud.
    fn process(&self, cloud: &PointCloud) -> Result<PolygonMesh, ProcessingError>;
}

/// Persisted state of a [`ReconstructionFactory`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// The active variant.
    pub active: ReconstructionKind,
    /// Greedy projection parameters.
    pub greedy_projection: GreedyProjectionParams,
}

/// Owns one instance of every reconstruction variant and tracks the active one.
#[derive(Debug, Clone, Default)]
pub struct ReconstructionFactory {
    active: ReconstructionKind,
    greedy_projection: GreedyProjection,
}

impl ReconstructionFactory {
    /// Build a factory from a persisted configuration.
    pub fn from_config(config: &ReconstructionConfig) -> Self {
        Self {
            active: config.active,
            greedy_projection: GreedyProjection::from_params_unchecked(
                config.greedy_projection.clone(),
            ),
        }
    }

    /// Snapshot the factory state.
    pub fn to_config(&self) -> ReconstructionConfig {
        ReconstructionConfig {
            active: self.active,
            greedy_projection: self.greedy_projection.params().clone(),
        }
    }

    /// Make `kind` the active variant.
    pub fn select(&mut self, kind: ReconstructionKind) {
        self.active = kind;
    }

    /// The active variant.
    pub fn active_kind(&self) -> ReconstructionKind {
        self.active
    }

    /// The active reconstructor.
    pub fn active(&self) -> &dyn SurfaceReconstructor {
        match self.active {
            ReconstructionKind::GreedyProjection => &self.greedy_projection,
        }
    }

    /// The greedy projection instance.
    pub fn greedy_projection(&self) -> &GreedyProjection {
        &self.greedy_projection
    }

    /// Mutable access to the greedy projection instance.
    pub fn greedy_projection_mut(&mut self) -> &mut GreedyProjection {
        &mut self.greedy_projection
    }
}
