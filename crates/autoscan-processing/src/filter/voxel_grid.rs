use std::collections::BTreeMap;

use autoscan_3d::pointcloud::PointCloud;
use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{CloudFilter, FilterKind};
use crate::{
    error::{ensure_nonzero, ensure_positive},
    ProcessingError,
};

/// Accumulated data of a single voxel: point sum, color sum, normal sum and count.
type VoxelData = (DVec3, [u64; 3], DVec3, usize);

/// Parameters of the voxel grid filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelGridParams {
    /// The size of the voxel (leaf) in x, y, z dimensions.
    pub leaf_size: [f64; 3],
    /// Minimum number of points required for a voxel to produce an output point.
    pub min_points_per_voxel: usize,
}

impl Default for VoxelGridParams {
    fn default() -> Self {
        Self {
            leaf_size: [0.01; 3],
            min_points_per_voxel: 1,
        }
    }
}

impl VoxelGridParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_positive("leaf_size.x", self.leaf_size[0])?;
        ensure_positive("leaf_size.y", self.leaf_size[1])?;
        ensure_positive("leaf_size.z", self.leaf_size[2])?;
        ensure_nonzero("min_points_per_voxel", self.min_points_per_voxel)
    }
}

/// A 3D voxel grid for downsampling point clouds.
#[derive(Debug, Clone, Default)]
pub struct VoxelGrid {
    params: VoxelGridParams,
}

impl VoxelGrid {
    /// Create a voxel grid filter.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] if any leaf dimension is not positive.
    pub fn new(params: VoxelGridParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The current parameters.
    pub fn params(&self) -> &VoxelGridParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: VoxelGridParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub(crate) fn from_params_unchecked(params: VoxelGridParams) -> Self {
        Self { params }
    }
}

/// Downsample a cloud by replacing the points of each voxel with their centroid.
///
/// Colors are averaged and normals averaged then normalized, when present. The output is
/// ordered by voxel index so the result does not depend on hashing.
pub fn voxel_downsample(
    point_cloud: &PointCloud,
    leaf_size: [f64; 3],
    min_points_per_voxel: usize,
) -> Result<PointCloud, ProcessingError> {
    ensure_positive("leaf_size.x", leaf_size[0])?;
    ensure_positive("leaf_size.y", leaf_size[1])?;
    ensure_positive("leaf_size.z", leaf_size[2])?;

    let leaf = DVec3::from_array(leaf_size);
    let mut grid: BTreeMap<(i64, i64, i64), VoxelData> = BTreeMap::new();

    // group points into voxels
    for (i, point) in point_cloud.points().iter().enumerate() {
        let point_vec = DVec3::from_array(*point);
        let index = (point_vec / leaf).floor();
        let key = (index.x as i64, index.y as i64, index.z as i64);
        let entry = grid
            .entry(key)
            .or_insert((DVec3::ZERO, [0; 3], DVec3::ZERO, 0));
        entry.0 += point_vec;
        entry.3 += 1;

        if let Some(color) = point_cloud.colors().and_then(|c| c.get(i)) {
            for (acc, c) in entry.1.iter_mut().zip(color.iter()) {
                *acc += *c as u64;
            }
        }
        if let Some(normal) = point_cloud.normals().and_then(|n| n.get(i)) {
            entry.2 += DVec3::from_array(*normal);
        }
    }

    // compute centroids for each voxel
    let mut points = Vec::with_capacity(grid.len());
    let mut colors = point_cloud.colors().map(|_| Vec::with_capacity(grid.len()));
    let mut normals = point_cloud.normals().map(|_| Vec::with_capacity(grid.len()));

    for (sum, color_sum, normal_sum, count) in grid.into_values() {
        if count < min_points_per_voxel {
            continue;
        }
        let inv_count = 1.0 / count as f64;
        points.push((sum * inv_count).to_array());

        if let Some(colors_vec) = colors.as_mut() {
            colors_vec.push([
                (color_sum[0] as f64 * inv_count).round() as u8,
                (color_sum[1] as f64 * inv_count).round() as u8,
                (color_sum[2] as f64 * inv_count).round() as u8,
            ]);
        }
        if let Some(normals_vec) = normals.as_mut() {
            let normal = normal_sum * inv_count;
            normals_vec.push(normal.try_normalize().unwrap_or(normal).to_array());
        }
    }

    Ok(PointCloud::new(points, colors, normals))
}

impl CloudFilter for VoxelGrid {
    fn kind(&self) -> FilterKind {
        FilterKind::VoxelGrid
    }

    fn process(&self, cloud: &PointCloud) -> Result<PointCloud, ProcessingError> {
        if cloud.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        self.params.validate()?;
        let output = voxel_downsample(
            cloud,
            self.params.leaf_size,
            self.params.min_points_per_voxel,
        )?;
        log::debug!(
            "voxel grid: {} -> {} points (leaf {:?})",
            cloud.len(),
            output.len(),
            self.params.leaf_size
        );
        Ok(output)
    }
}
