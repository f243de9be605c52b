use std::f64::consts::PI;

use autoscan_3d::{
    normals::estimate_normals, ops::luminance, pointcloud::PointCloud, search::KdTree,
};
use glam::DVec3;

use crate::ProcessingError;

/// Length of a FPFH descriptor: 3 angular features with 11 bins each.
pub const FPFH_SIZE: usize = 33;
/// Length of a PFH descriptor: 5 bins per angular feature, jointly binned.
pub const PFH_SIZE: usize = 125;
/// Length of a PFHRGB descriptor: the PFH bins followed by 125 color ratio bins.
pub const PFH_RGB_SIZE: usize = 250;
/// Length of a SHOT color descriptor: 32 volumes of 11 shape and 5 color bins.
pub const SHOT_COLOR_SIZE: usize = 512;

const FPFH_BINS: usize = 11;
const PFH_BINS: usize = 5;
const SHOT_AZIMUTH_BINS: usize = 8;
const SHOT_SHAPE_BINS: usize = 11;
const SHOT_COLOR_BINS: usize = 5;
const SHOT_VOLUME_SIZE: usize = SHOT_SHAPE_BINS + SHOT_COLOR_BINS;

const DEFAULT_COLOR: [u8; 3] = [128, 128, 128];

/// A point cloud with the normals and search structure needed by the descriptors.
pub struct Surface<'a> {
    cloud: &'a PointCloud,
    normals: Vec<[f64; 3]>,
    tree: KdTree,
}

impl<'a> Surface<'a> {
    /// Estimate normals with `normal_radius` and index the cloud.
    pub fn new(cloud: &'a PointCloud, normal_radius: f64) -> Result<Self, ProcessingError> {
        let estimate = estimate_normals(cloud, normal_radius, &[0.0; 3])?;
        let tree = KdTree::new(cloud.points())?;
        Ok(Self {
            cloud,
            normals: estimate.normals,
            tree,
        })
    }

    /// Index of the surface point closest to `point`.
    pub fn nearest_index(&self, point: &[f64; 3]) -> usize {
        self.tree.nearest_one(point).index
    }

    /// The estimated normals.
    pub fn normals(&self) -> &[[f64; 3]] {
        &self.normals
    }

    fn point(&self, i: usize) -> DVec3 {
        DVec3::from_array(self.cloud.points()[i])
    }

    fn normal(&self, i: usize) -> DVec3 {
        DVec3::from_array(self.normals[i])
    }

    fn color(&self, i: usize) -> [u8; 3] {
        self.cloud.colors().map(|c| c[i]).unwrap_or(DEFAULT_COLOR)
    }
}

/// Angular features of a point pair: `[alpha, phi, theta, distance]`.
///
/// `alpha` is in `[-1, 1]`, `phi` in `[-1, 1]` and `theta` in `[-π, π]`. The pair is ordered
/// so the source is the point whose normal is most aligned with the connecting line.
/// Returns `None` for coincident points or a normal parallel to the connecting line.
pub fn pair_features(p1: DVec3, n1: DVec3, p2: DVec3, n2: DVec3) -> Option<[f64; 4]> {
    let mut dp = p2 - p1;
    let distance = dp.length();
    if distance <= f64::EPSILON {
        return None;
    }
    dp /= distance;

    let angle1 = n1.dot(dp);
    let angle2 = n2.dot(dp);
    let (u, n_target, phi) = if angle1.abs().acos() > angle2.abs().acos() {
        dp = -dp;
        (n2, n1, -angle2)
    } else {
        (n1, n2, angle1)
    };

    let v = dp.cross(u);
    let v = v.try_normalize()?;
    let w = u.cross(v);

    let alpha = v.dot(n_target);
    let theta = w.dot(n_target).atan2(u.dot(n_target));
    Some([alpha, phi, theta, distance])
}

fn bin(value: f64, min: f64, max: f64, bins: usize) -> usize {
    let t = ((value - min) / (max - min) * bins as f64).floor();
    (t.max(0.0) as usize).min(bins - 1)
}

/// Simplified point feature histogram of one point over its radius neighborhood.
fn spfh(surface: &Surface, index: usize, radius: f64) -> [f64; FPFH_SIZE] {
    let mut hist = [0.0; FPFH_SIZE];
    let p = surface.point(index);
    let n = surface.normal(index);

    let features = surface
        .tree
        .within_radius(&surface.cloud.points()[index], radius)
        .iter()
        .filter(|nb| nb.index != index)
        .filter_map(|nb| pair_features(p, n, surface.point(nb.index), surface.normal(nb.index)))
        .collect::<Vec<_>>();
    if features.is_empty() {
        return hist;
    }

    let increment = 100.0 / features.len() as f64;
    for [alpha, phi, theta, _] in features {
        hist[bin(theta, -PI, PI, FPFH_BINS)] += increment;
        hist[FPFH_BINS + bin(alpha, -1.0, 1.0, FPFH_BINS)] += increment;
        hist[2 * FPFH_BINS + bin(phi, -1.0, 1.0, FPFH_BINS)] += increment;
    }
    hist
}

/// Fast point feature histograms of the given surface points.
///
/// Each descriptor is the point's own SPFH plus the distance weighted SPFH of its
/// neighbors, with every 11 bin sub-histogram normalized to sum to 100.
pub fn fpfh(surface: &Surface, indices: &[usize], radius: f64) -> Vec<Vec<f32>> {
    let mut cache: Vec<Option<[f64; FPFH_SIZE]>> = vec![None; surface.cloud.len()];
    let mut cached_spfh = |i: usize| *cache[i].get_or_insert_with(|| spfh(surface, i, radius));

    indices
        .iter()
        .map(|&index| {
            let own = cached_spfh(index);
            let neighbors = surface
                .tree
                .within_radius(&surface.cloud.points()[index], radius)
                .into_iter()
                .filter(|nb| nb.index != index && nb.distance > 0.0)
                .collect::<Vec<_>>();

            let mut hist = own;
            if !neighbors.is_empty() {
                let k = neighbors.len() as f64;
                for nb in neighbors {
                    let other = cached_spfh(nb.index);
                    let weight = 1.0 / (k * nb.distance);
                    for (h, o) in hist.iter_mut().zip(other.iter()) {
                        *h += weight * o;
                    }
                }
            }

            for part in hist.chunks_mut(FPFH_BINS) {
                let sum = part.iter().sum::<f64>();
                if sum > 0.0 {
                    part.iter_mut().for_each(|h| *h *= 100.0 / sum);
                }
            }
            hist.iter().map(|&h| h as f32).collect()
        })
        .collect()
}

fn pfh_bin(features: &[f64; 4]) -> usize {
    let [alpha, phi, theta, _] = *features;
    bin(theta, -PI, PI, PFH_BINS)
        + PFH_BINS * bin(alpha, -1.0, 1.0, PFH_BINS)
        + PFH_BINS * PFH_BINS * bin(phi, -1.0, 1.0, PFH_BINS)
}

fn color_ratio_bin(c1: [u8; 3], c2: [u8; 3]) -> usize {
    let ratio = |a: u8, b: u8| {
        let r = (a as f64 + 1.0) / (b as f64 + 1.0);
        bin(r / (1.0 + r), 0.0, 1.0, PFH_BINS)
    };
    ratio(c1[0], c2[0])
        + PFH_BINS * ratio(c1[1], c2[1])
        + PFH_BINS * PFH_BINS * ratio(c1[2], c2[2])
}

fn pair_histogram(
    surface: &Surface,
    indices: &[usize],
    k: usize,
    with_color: bool,
) -> Vec<Vec<f32>> {
    let size = if with_color { PFH_RGB_SIZE } else { PFH_SIZE };
    indices
        .iter()
        .map(|&index| {
            let neighborhood = surface
                .tree
                .nearest_n(&surface.cloud.points()[index], k)
                .into_iter()
                .map(|nb| nb.index)
                .collect::<Vec<_>>();

            let mut hist = vec![0.0f64; size];
            let mut pairs = 0usize;
            for (a, &i) in neighborhood.iter().enumerate() {
                for &j in neighborhood.iter().skip(a + 1) {
                    let Some(features) = pair_features(
                        surface.point(i),
                        surface.normal(i),
                        surface.point(j),
                        surface.normal(j),
                    ) else {
                        continue;
                    };
                    hist[pfh_bin(&features)] += 1.0;
                    if with_color {
                        hist[PFH_SIZE + color_ratio_bin(surface.color(i), surface.color(j))] += 1.0;
                    }
                    pairs += 1;
                }
            }

            let scale = if pairs > 0 { 100.0 / pairs as f64 } else { 0.0 };
            hist.iter().map(|&h| (h * scale) as f32).collect()
        })
        .collect()
}

/// Point feature histograms over the `k` nearest neighbors of each point.
pub fn pfh(surface: &Surface, indices: &[usize], k: usize) -> Vec<Vec<f32>> {
    pair_histogram(surface, indices, k, false)
}

/// Point feature histograms extended with color ratio histograms.
pub fn pfh_rgb(surface: &Surface, indices: &[usize], k: usize) -> Vec<Vec<f32>> {
    pair_histogram(surface, indices, k, true)
}

/// Local reference frame from the distance weighted covariance of the neighborhood.
///
/// Returns the x, y, z axes, or `None` with fewer than three neighbors.
fn local_reference_frame(
    surface: &Surface,
    index: usize,
    neighbors: &[(usize, f64)],
    radius: f64,
) -> Option<[DVec3; 3]> {
    if neighbors.len() < 3 {
        return None;
    }
    let p = surface.point(index);
    let mut cov = [[0.0; 3]; 3];
    let mut total = 0.0;
    for &(j, distance) in neighbors {
        let w = radius - distance;
        let d = (surface.point(j) - p).to_array();
        for r in 0..3 {
            for c in 0..3 {
                cov[r][c] += w * d[r] * d[c];
            }
        }
        total += w;
    }
    if total <= 0.0 {
        return None;
    }
    for row in cov.iter_mut() {
        for v in row.iter_mut() {
            *v /= total;
        }
    }

    let (_, vectors) = autoscan_3d::linalg::symmetric_eigen(cov);
    let column = |k: usize| DVec3::new(vectors[0][k], vectors[1][k], vectors[2][k]);
    let mut x = column(2);
    let mut z = column(0);

    // orient each axis towards the majority of the neighbors
    let disambiguate = |axis: DVec3| {
        let positive = neighbors
            .iter()
            .filter(|(j, _)| (surface.point(*j) - p).dot(axis) >= 0.0)
            .count();
        if 2 * positive >= neighbors.len() {
            axis
        } else {
            -axis
        }
    };
    x = disambiguate(x);
    z = disambiguate(z);
    let y = z.cross(x);
    Some([x, y, z])
}

/// SHOT descriptors with a luminance color term.
///
/// The support sphere is split in 8 azimuth, 2 elevation and 2 radial volumes. Each volume
/// holds a histogram of the angle between neighbor normals and the frame z axis, followed
/// by a histogram of luminance differences. Descriptors are normalized to unit length.
pub fn shot_color(surface: &Surface, indices: &[usize], radius: f64) -> Vec<Vec<f32>> {
    indices
        .iter()
        .map(|&index| {
            let mut hist = vec![0.0f64; SHOT_COLOR_SIZE];
            let neighbors = surface
                .tree
                .within_radius(&surface.cloud.points()[index], radius)
                .into_iter()
                .filter(|nb| nb.index != index)
                .map(|nb| (nb.index, nb.distance))
                .collect::<Vec<_>>();

            let Some([x, y, z]) = local_reference_frame(surface, index, &neighbors, radius) else {
                return vec![0.0; SHOT_COLOR_SIZE];
            };

            let p = surface.point(index);
            let own_luminance = luminance(&surface.color(index));
            for &(j, distance) in neighbors.iter() {
                let d = surface.point(j) - p;
                let (lx, ly, lz) = (d.dot(x), d.dot(y), d.dot(z));

                let azimuth = bin(ly.atan2(lx), -PI, PI, SHOT_AZIMUTH_BINS);
                let elevation = usize::from(lz >= 0.0);
                let radial = usize::from(distance > radius / 2.0);
                let volume = (azimuth * 2 + elevation) * 2 + radial;

                let cos_theta = surface.normal(j).dot(z).clamp(-1.0, 1.0);
                let shape = bin(cos_theta, -1.0, 1.0, SHOT_SHAPE_BINS);
                let color_diff = (luminance(&surface.color(j)) - own_luminance).abs();
                let color = bin(color_diff, 0.0, 1.0, SHOT_COLOR_BINS);

                hist[volume * SHOT_VOLUME_SIZE + shape] += 1.0;
                hist[volume * SHOT_VOLUME_SIZE + SHOT_SHAPE_BINS + color] += 1.0;
            }

            let norm = hist.iter().map(|h| h * h).sum::<f64>().sqrt();
            if norm > 0.0 {
                hist.iter_mut().for_each(|h| *h /= norm);
            }
            hist.iter().map(|&h| h as f32).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wavy_surface(offset: [f64; 3]) -> PointCloud {
        let mut points = Vec::new();
        for i in 0..25 {
            for j in 0..25 {
                let x = i as f64 * 0.01;
                let y = j as f64 * 0.01;
                let z = 1.0 + 0.03 * (20.0 * x).sin() * (13.0 * y + 0.5).cos() + 0.02 * (31.0 * x * y).sin();
                points.push([x + offset[0], y + offset[1], z + offset[2]]);
            }
        }
        PointCloud::from_points(points)
    }

    #[test]
    fn test_pair_features_orthogonal_normals() {
        let f = pair_features(DVec3::ZERO, DVec3::Z, DVec3::new(2.0, 0.0, 0.0), DVec3::Y).unwrap();
        assert_relative_eq!(f[0], -1.0);
        assert_relative_eq!(f[1], 0.0);
        assert_relative_eq!(f[2], 0.0);
        assert_relative_eq!(f[3], 2.0);
        assert!(pair_features(DVec3::ZERO, DVec3::Z, DVec3::ZERO, DVec3::Z).is_none());
    }

    #[test]
    fn test_descriptor_sizes() -> Result<(), ProcessingError> {
        let cloud = wavy_surface([0.0; 3]);
        let surface = Surface::new(&cloud, 0.02)?;
        let indices = [0, 100, 312];
        assert!(fpfh(&surface, &indices, 0.05).iter().all(|d| d.len() == FPFH_SIZE));
        assert!(pfh(&surface, &indices, 10).iter().all(|d| d.len() == PFH_SIZE));
        assert!(pfh_rgb(&surface, &indices, 10).iter().all(|d| d.len() == PFH_RGB_SIZE));
        assert!(shot_color(&surface, &indices, 0.05)
            .iter()
            .all(|d| d.len() == SHOT_COLOR_SIZE));
        Ok(())
    }

    #[test]
    fn test_fpfh_sub_histograms_sum_to_100() -> Result<(), ProcessingError> {
        let cloud = wavy_surface([0.0; 3]);
        let surface = Surface::new(&cloud, 0.02)?;
        let descriptor = &fpfh(&surface, &[312], 0.05)[0];
        for part in descriptor.chunks(FPFH_BINS) {
            assert_relative_eq!(part.iter().sum::<f32>(), 100.0, epsilon = 1e-3);
        }
        Ok(())
    }

    #[test]
    fn test_descriptors_are_translation_invariant() -> Result<(), ProcessingError> {
        let cloud = wavy_surface([0.0; 3]);
        let moved = wavy_surface([0.02, -0.01, 0.0]);
        let a = Surface::new(&cloud, 0.02)?;
        let b = Surface::new(&moved, 0.02)?;

        let da = shot_color(&a, &[312], 0.05);
        let db = shot_color(&b, &[312], 0.05);
        let diff = autoscan_3d::ops::descriptor_distance(&da[0], &db[0]);
        assert!(diff < 0.5, "shot descriptors differ by {diff}");

        let da = fpfh(&a, &[312], 0.05);
        let db = fpfh(&b, &[312], 0.05);
        let diff = autoscan_3d::ops::descriptor_distance(&da[0], &db[0]);
        assert!(diff < 10.0, "fpfh descriptors differ by {diff}");
        Ok(())
    }

    #[test]
    fn test_shot_of_isolated_point_is_zero() -> Result<(), ProcessingError> {
        let cloud = PointCloud::from_points(vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let surface = Surface::new(&cloud, 0.1)?;
        let descriptor = &shot_color(&surface, &[0], 0.1)[0];
        assert!(descriptor.iter().all(|&v| v == 0.0));
        Ok(())
    }
}
