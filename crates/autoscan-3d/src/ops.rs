/// Utility function to compute the Euclidean distance between two points.
///
/// # Arguments
///
/// * `a` - A point in 3D space.
/// * `b` - Another point in 3D space.
///
/// # Returns
///
/// The Euclidean distance between the two points.
///
/// Example:
/// ```
/// use autoscan_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 6.0, 3.0];
/// assert_eq!(euclidean_distance(&a, &b), 5.0);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    squared_euclidean_distance(a, b).sqrt()
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn squared_euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Euclidean distance between two feature descriptors of equal length.
///
/// Extra trailing entries of the longer slice are ignored.
pub fn descriptor_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Compute the axis-aligned bounding box of a set of points as `(min, max)`.
///
/// Returns `None` when the slice is empty.
pub fn bounding_box(points: &[[f64; 3]]) -> Option<([f64; 3], [f64; 3])> {
    let first = points.first()?;
    let mut min = *first;
    let mut max = *first;
    for p in points.iter().skip(1) {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }
    Some((min, max))
}

/// Perceptual luminance of an RGB color in `[0, 1]`.
#[inline]
pub fn luminance(rgb: &[u8; 3]) -> f64 {
    (0.299 * rgb[0] as f64 + 0.587 * rgb[1] as f64 + 0.114 * rgb[2] as f64) / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_relative_eq!(euclidean_distance(&a, &b), 27f64.sqrt());
        assert_eq!(squared_euclidean_distance(&a, &b), 27.0);
    }

    #[test]
    fn test_descriptor_distance() {
        assert_relative_eq!(descriptor_distance(&[0.0, 3.0], &[4.0, 0.0]), 5.0);
        assert_eq!(descriptor_distance(&[], &[]), 0.0);
    }

    #[test]
    fn test_bounding_box() {
        assert!(bounding_box(&[]).is_none());
        let (min, max) = bounding_box(&[[0.0, 5.0, -1.0], [2.0, -3.0, 1.0]]).unwrap();
        assert_eq!(min, [0.0, -3.0, -1.0]);
        assert_eq!(max, [2.0, 5.0, 1.0]);
    }

    #[test]
    fn test_luminance() {
        assert_relative_eq!(luminance(&[255, 255, 255]), 1.0, epsilon = 1e-12);
        assert_eq!(luminance(&[0, 0, 0]), 0.0);
    }
}
