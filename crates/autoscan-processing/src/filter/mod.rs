mod bounding_box;
pub use bounding_box::{BoundingBoxFilter, BoundingBoxParams, Bounds};

mod outlier_removal;
pub use outlier_removal::{statistical_inliers, OutlierRemovalParams, StatisticalOutlierRemoval};

mod voxel_grid;
pub use voxel_grid::{voxel_downsample, VoxelGrid, VoxelGridParams};

use autoscan_3d::pointcloud::PointCloud;
use serde::{Deserialize, Serialize};

use crate::ProcessingError;

/// Identifier of a filter variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterKind {
    /// Voxel grid downsampling.
    #[default]
    VoxelGrid,
    /// Box crop followed by statistical outlier removal.
    BoundingBox,
    /// Statistical outlier removal.
    StatisticalOutlierRemoval,
}

impl FilterKind {
    /// All filter variants in display order.
    pub const ALL: [FilterKind; 3] = [
        FilterKind::VoxelGrid,
        FilterKind::BoundingBox,
        FilterKind::StatisticalOutlierRemoval,
    ];
}

/// A filter turns a point cloud into a new, usually smaller, point cloud.
pub trait CloudFilter {
    /// The variant implemented by this filter.
    fn kind(&self) -> FilterKind;

    /// Filter a cloud.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::EmptyInput`] for an empty cloud, or
    /// [`ProcessingError::InvalidParameter`] when the parameters are out of range.
    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError>;
}

/// Persisted state of a [`FilterFactory`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// The active variant.
    pub active: FilterKind,
    /// Voxel grid parameters.
    pub voxel_grid: VoxelGridParams,
    /// Bounding box parameters.
    pub bounding_box: BoundingBoxParams,
    /// Statistical outlier removal parameters.
    pub statistical_outlier_removal: OutlierRemovalParams,
}

/// Owns one instance of every filter variant and tracks the active one.
#[derive(Debug, Clone, Default)]
pub struct FilterFactory {
    active: FilterKind,
    voxel_grid: VoxelGrid,
    bounding_box: BoundingBoxFilter,
    outlier_removal: StatisticalOutlierRemoval,
}

impl FilterFactory {
    /// Build a factory from a persisted configuration.
    ///
    /// Parameters are validated when the filter runs.
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            active: config.active,
            voxel_grid: VoxelGrid::from_params_unchecked(config.voxel_grid.clone()),
            bounding_box: BoundingBoxFilter::from_params_unchecked(config.bounding_box.clone()),
            outlier_removal: StatisticalOutlierRemoval::from_params_unchecked(
                config.statistical_outlier_removal.clone(),
            ),
        }
    }

    /// Snapshot the factory state.
    pub fn to_config(&self) -> FilterConfig {
        FilterConfig {
            active: self.active,
            voxel_grid: self.voxel_grid.params().clone(),
            bounding_box: self.bounding_box.params().clone(),
            statistical_outlier_removal: self.outlier_removal.params().clone(),
        }
    }

    /// Make `kind` the active variant. Parameters of every variant are kept.
    pub fn select(&mut self, kind: FilterKind) {
        log::debug!("filter: {:?} -> {:?}", self.active, kind);
        self.active = kind;
    }

    /// The active variant.
    pub fn active_kind(&self) -> FilterKind {
        self.active
    }

    /// The active filter.
    pub fn active(&self) -> &dyn CloudFilter {
        match self.active {
            FilterKind::VoxelGrid => &self.voxel_grid,
            FilterKind::BoundingBox => &self.bounding_box,
            FilterKind::StatisticalOutlierRemoval => &self.outlier_removal,
        }
    }

    /// The voxel grid instance.
    pub fn voxel_grid(&self) -> &VoxelGrid {
        &self.voxel_grid
    }

    /// Mutable access to the voxel grid instance.
    pub fn voxel_grid_mut(&mut self) -> &mut VoxelGrid {
        &mut self.voxel_grid
    }

    /// The bounding box instance.
    pub fn bounding_box(&self) -> &BoundingBoxFilter {
        &self.bounding_box
    }

    /// Mutable access to the bounding box instance.
    pub fn bounding_box_mut(&mut self) -> &mut BoundingBoxFilter {
        &mut self.bounding_box
    }

    /// The statistical outlier removal instance.
    pub fn outlier_removal(&self) -> &StatisticalOutlierRemoval {
        &self.outlier_removal
    }

    /// Mutable access to the statistical outlier removal instance.
    pub fn outlier_removal_mut(&mut self) -> &mut StatisticalOutlierRemoval {
        &mut self.outlier_removal
    }
}
