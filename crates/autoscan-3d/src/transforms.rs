use glam::{DMat3, DQuat, DVec3};

use crate::{linalg, GeometryError};

/// The 3x3 identity rotation.
pub const IDENTITY3: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation. It does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The row-major rotation matrix.
///
/// # Errors
///
/// Returns [`GeometryError::ZeroAxis`] if the axis has (close to) zero magnitude.
///
/// Example:
///
/// ```
/// use autoscan_3d::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [0.0, 0.0, 1.0];
/// let rotation = axis_angle_to_rotation_matrix(&axis, 0.0).unwrap();
/// assert_eq!(rotation, autoscan_3d::transforms::IDENTITY3);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<[[f64; 3]; 3], GeometryError> {
    let axis = DVec3::from_array(*axis);
    if axis.length() < 1e-10 {
        return Err(GeometryError::ZeroAxis);
    }
    let rotation = DMat3::from_axis_angle(axis.normalize(), angle);
    Ok(linalg::dmat3_to_array33(&rotation))
}

/// Compute the rotation matrix from a quaternion given as `(w, x, y, z)`.
///
/// The quaternion is normalized first.
///
/// # Errors
///
/// Returns [`GeometryError::ZeroAxis`] if the quaternion has zero norm.
pub fn quaternion_to_rotation_matrix(q: &[f64; 4]) -> Result<[[f64; 3]; 3], GeometryError> {
    let quat = DQuat::from_xyzw(q[1], q[2], q[3], q[0]);
    if quat.length() < 1e-12 {
        return Err(GeometryError::ZeroAxis);
    }
    let rotation = DMat3::from_quat(quat.normalize());
    Ok(linalg::dmat3_to_array33(&rotation))
}

/// Compose two rigid transforms as `(r_ab, t_ab) * (r_bc, t_bc)`.
///
/// The result maps points from frame `c` into frame `a`.
pub fn compose_rigid(
    r_ab: &[[f64; 3]; 3],
    t_ab: &[f64; 3],
    r_bc: &[[f64; 3]; 3],
    t_bc: &[f64; 3],
) -> ([[f64; 3]; 3], [f64; 3]) {
    let mut r_ac = [[0.0; 3]; 3];
    linalg::matmul33(r_ab, r_bc, &mut r_ac);
    let t_ac = linalg::array33_to_dmat3(r_ab) * DVec3::from_array(*t_bc) + DVec3::from_array(*t_ab);
    (r_ac, t_ac.to_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_angle_to_rotation_matrix_identity() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = axis_angle_to_rotation_matrix(&[1.0, 0.0, 0.0], 0.0)?;
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotation[i][j], IDENTITY3[i][j]);
            }
        }
        Ok(())
    }

    #[test]
    fn test_axis_angle_to_rotation_matrix_x() -> Result<(), Box<dyn std::error::Error>> {
        let rotation = axis_angle_to_rotation_matrix(&[2.0, 0.0, 0.0], std::f64::consts::FRAC_PI_2)?;
        let expected = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotation[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_axis_angle_zero_axis() {
        assert_eq!(
            axis_angle_to_rotation_matrix(&[0.0, 0.0, 0.0], 1.0),
            Err(GeometryError::ZeroAxis)
        );
    }

    #[test]
    fn test_quaternion_to_rotation_matrix() -> Result<(), Box<dyn std::error::Error>> {
        // 90 degrees around z, unnormalized
        let half = std::f64::consts::FRAC_PI_4;
        let q = [2.0 * half.cos(), 0.0, 0.0, 2.0 * half.sin()];
        let rotation = quaternion_to_rotation_matrix(&q)?;
        let expected = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotation[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
        assert!(quaternion_to_rotation_matrix(&[0.0; 4]).is_err());
        Ok(())
    }

    #[test]
    fn test_compose_rigid() -> Result<(), Box<dyn std::error::Error>> {
        let r_z = axis_angle_to_rotation_matrix(&[0.0, 0.0, 1.0], std::f64::consts::FRAC_PI_2)?;
        let (r, t) = compose_rigid(&r_z, &[1.0, 0.0, 0.0], &IDENTITY3, &[1.0, 0.0, 0.0]);
        assert_relative_eq!(t[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(t[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[1][0], 1.0, epsilon = 1e-12);
        Ok(())
    }
}
