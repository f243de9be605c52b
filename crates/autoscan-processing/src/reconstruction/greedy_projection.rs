use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use autoscan_3d::{
    mesh::PolygonMesh, normals::estimate_normals, pointcloud::PointCloud, search::KdTree,
};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{ReconstructionKind, SurfaceReconstructor};
use crate::{
    error::{ensure_nonzero, ensure_positive},
    ProcessingError,
};

/// Parameters of the greedy projection triangulation. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreedyProjectionParams {
    /// Upper bound of the neighborhood radius.
    pub search_radius: f64,
    /// Multiplier of the nearest neighbor distance giving the local radius.
    pub mu: f64,
    /// Maximum number of neighbors considered per point.
    pub max_nearest_neighbors: usize,
    /// Maximum angle between the normals of connected points.
    pub max_surface_angle: f64,
    /// Minimum interior angle of a triangle.
    pub min_angle: f64,
    /// Maximum interior angle of a triangle.
    pub max_angle: f64,
    /// Radius of the normal estimation.
    pub normal_search_radius: f64,
}

impl Default for GreedyProjectionParams {
    fn default() -> Self {
        Self {
            search_radius: 0.025,
            mu: 2.5,
            max_nearest_neighbors: 100,
            max_surface_angle: 45.0,
            min_angle: 10.0,
            max_angle: 120.0,
            normal_search_radius: 0.03,
        }
    }
}

impl GreedyProjectionParams {
    fn validate(&self) -> Result<(), ProcessingError> {
        ensure_positive("search_radius", self.search_radius)?;
        ensure_positive("mu", self.mu)?;
        ensure_nonzero("max_nearest_neighbors", self.max_nearest_neighbors)?;
        ensure_positive("normal_search_radius", self.normal_search_radius)?;
        ensure_positive("max_surface_angle", self.max_surface_angle)?;
        ensure_positive("min_angle", self.min_angle)?;
        if self.min_angle >= self.max_angle || self.max_angle >= 180.0 {
            return Err(ProcessingError::InvalidParameter(format!(
                "expected 0 < min_angle < max_angle < 180, got {} and {}",
                self.min_angle, self.max_angle
            )));
        }
        Ok(())
    }
}

/// Greedy triangulation of points projected onto their local tangent plane.
#[derive(Debug, Clone, Default)]
pub struct GreedyProjection {
    params: GreedyProjectionParams,
}

impl GreedyProjection {
    /// Create the reconstructor.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidParameter`] for out of range parameters.
    pub fn new(params: GreedyProjectionParams) -> Result<Self, ProcessingError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The current parameters.
    pub fn params(&self) -> &GreedyProjectionParams {
        &self.params
    }

    /// Replace the parameters, keeping the old ones when the new set is invalid.
    pub fn set_params(&mut self, params: GreedyProjectionParams) -> Result<(), ProcessingError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub(crate) fn from_params_unchecked(params: GreedyProjectionParams) -> Self {
        Self { params }
    }
}

/// Interior angles of the triangle `abc` in radians, `None` if it is degenerate.
fn interior_angles(a: DVec3, b: DVec3, c: DVec3) -> Option<[f64; 3]> {
    let angle = |p: DVec3, q: DVec3, r: DVec3| -> Option<f64> {
        let u = (q - p).try_normalize()?;
        let v = (r - p).try_normalize()?;
        Some(u.dot(v).clamp(-1.0, 1.0).acos())
    };
    Some([angle(a, b, c)?, angle(b, c, a)?, angle(c, a, b)?])
}

fn edge(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}

/// Orthonormal tangent basis of a unit normal.
fn tangent_basis(n: DVec3) -> (DVec3, DVec3) {
    let helper = if n.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
    let u = n.cross(helper).normalize();
    let v = n.cross(u);
    (u, v)
}

struct Triangulation {
    triangles: Vec<[u32; 3]>,
    seen: HashSet<[u32; 3]>,
    edge_use: HashMap<(u32, u32), u8>,
}

impl Triangulation {
    fn try_add(&mut self, tri: [u32; 3]) -> bool {
        let mut key = tri;
        key.sort_unstable();
        if self.seen.contains(&key) {
            return false;
        }
        let edges = [edge(tri[0], tri[1]), edge(tri[1], tri[2]), edge(tri[2], tri[0])];
        if edges
            .iter()
            .any(|e| self.edge_use.get(e).copied().unwrap_or(0) >= 2)
        {
            return false;
        }
        for e in edges {
            *self.edge_use.entry(e).or_insert(0) += 1;
        }
        self.seen.insert(key);
        self.triangles.push(tri);
        true
    }
}

impl SurfaceReconstructor for GreedyProjection {
    fn kind(&self) -> ReconstructionKind {
        ReconstructionKind::GreedyProjection
    }

    fn process(&self, cloud: &PointCloud) -> Result<PolygonMesh, ProcessingError> {
        if cloud.is_empty() {
            return Err(ProcessingError::EmptyInput);
        }
        if cloud.len() < 3 {
            return Err(ProcessingError::NotEnoughPoints {
                required: 3,
                found: cloud.len(),
            });
        }
        self.params.validate()?;

        let points = cloud.points();
        let normals = estimate_normals(cloud, self.params.normal_search_radius, &[0.0; 3])?.normals;
        let tree = KdTree::new(points)?;

        let cos_max_surface = self.params.max_surface_angle.to_radians().cos();
        let min_angle = self.params.min_angle.to_radians();
        let max_angle = self.params.max_angle.to_radians();

        let mut mesh = Triangulation {
            triangles: Vec::new(),
            seen: HashSet::new(),
            edge_use: HashMap::new(),
        };

        for (i, p) in points.iter().enumerate() {
            let Some(nearest) = tree.nearest_n(p, 2).into_iter().find(|nb| nb.index != i) else {
                continue;
            };
            let radius = self.params.search_radius.min(self.params.mu * nearest.distance);
            if radius <= 0.0 {
                continue;
            }

            let origin = DVec3::from_array(*p);
            let normal = DVec3::from_array(normals[i]);
            let (u, v) = tangent_basis(normal);

            let mut fan = tree
                .within_radius(p, radius)
                .into_iter()
                .filter(|nb| nb.index != i)
                .take(self.params.max_nearest_neighbors)
                .filter(|nb| {
                    DVec3::from_array(normals[nb.index]).dot(normal).abs() >= cos_max_surface
                })
                .map(|nb| {
                    let d = DVec3::from_array(points[nb.index]) - origin;
                    (d.dot(v).atan2(d.dot(u)), nb.index)
                })
                .collect::<Vec<_>>();
            if fan.len() < 2 {
                continue;
            }
            fan.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            for k in 0..fan.len() {
                let (angle_a, a) = fan[k];
                let (angle_b, b) = fan[(k + 1) % fan.len()];
                let mut gap = angle_b - angle_a;
                if gap < 0.0 {
                    gap += 2.0 * PI;
                }
                if gap >= PI || a == b {
                    continue;
                }

                let pa = DVec3::from_array(points[a]);
                let pb = DVec3::from_array(points[b]);
                let Some(angles) = interior_angles(origin, pa, pb) else {
                    continue;
                };
                if angles.iter().any(|&t| t < min_angle || t > max_angle) {
                    continue;
                }

                // wind the triangle so it faces along the point normal
                let tri = if (pa - origin).cross(pb - origin).dot(normal) >= 0.0 {
                    [i as u32, a as u32, b as u32]
                } else {
                    [i as u32, b as u32, a as u32]
                };
                mesh.try_add(tri);
            }
        }

        if mesh.triangles.is_empty() {
            return Err(ProcessingError::DegenerateGeometry(
                "no triangle satisfies the angle constraints".to_string(),
            ));
        }

        log::debug!(
            "greedy projection: {} triangles over {} points",
            mesh.triangles.len(),
            points.len()
        );

        let vertices = cloud.clone().with_normals(normals)?;
        Ok(PolygonMesh::new(vertices, mesh.triangles)?)
    }
}
