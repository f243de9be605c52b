use glam::{DMat3, DVec3};

use crate::GeometryError;

/// Convert a row-major 3x3 array into a glam matrix.
pub fn array33_to_dmat3(m: &[[f64; 3]; 3]) -> DMat3 {
    // glam is column-major
    DMat3::from_cols(
        DVec3::new(m[0][0], m[1][0], m[2][0]),
        DVec3::new(m[0][1], m[1][1], m[2][1]),
        DVec3::new(m[0][2], m[1][2], m[2][2]),
    )
}

/// Convert a glam matrix into a row-major 3x3 array.
pub fn dmat3_to_array33(m: &DMat3) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = m.col(j)[i];
        }
    }
    out
}

/// Transform a set of points using a rotation and translation.
///
/// # Arguments
///
/// * `src_points` - A set of points to be transformed.
/// * `dst_r_src` - A rotation matrix (row-major).
/// * `dst_t_src` - A translation vector.
/// * `dst_points` - A pre-allocated vector to store the transformed points.
///
/// PRECONDITION: dst_points is a pre-allocated vector of the same size as source.
///
/// Example:
///
/// ```
/// use autoscan_3d::linalg::transform_points3d;
///
/// let src_points = vec![[2.0, 2.0, 2.0], [3.0, 4.0, 5.0]];
/// let rotation = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
/// let translation = [0.0, 0.0, 0.0];
/// let mut dst_points = vec![[0.0; 3]; src_points.len()];
/// transform_points3d(&src_points, &rotation, &translation, &mut dst_points).unwrap();
/// assert_eq!(dst_points, src_points);
/// ```
pub fn transform_points3d(
    src_points: &[[f64; 3]],
    dst_r_src: &[[f64; 3]; 3],
    dst_t_src: &[f64; 3],
    dst_points: &mut [[f64; 3]],
) -> Result<(), GeometryError> {
    if src_points.len() != dst_points.len() {
        return Err(GeometryError::LengthMismatch {
            expected: src_points.len(),
            actual: dst_points.len(),
        });
    }

    let rotation = array33_to_dmat3(dst_r_src);
    let translation = DVec3::from_array(*dst_t_src);

    for (point_dst, point_src) in dst_points.iter_mut().zip(src_points.iter()) {
        *point_dst = (rotation * DVec3::from_array(*point_src) + translation).to_array();
    }

    Ok(())
}

/// Multiply two 3x3 matrices as `m = a * b`.
pub fn matmul33(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3], m: &mut [[f64; 3]; 3]) {
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
}

/// Eigen decomposition of a real symmetric matrix.
///
/// # Arguments
///
/// * `matrix` - A symmetric N x N matrix. Only the upper triangle is read.
///
/// # Returns
///
/// The eigenvalues sorted in ascending order and the matching eigenvectors stored as
/// columns, i.e. `eigenvectors[row][k]` is component `row` of the k-th eigenvector.
///
/// Example:
///
/// ```
/// use autoscan_3d::linalg::symmetric_eigen;
///
/// let (values, vectors) = symmetric_eigen([[2.0, 0.0], [0.0, 1.0]]);
/// assert!((values[0] - 1.0).abs() < 1e-12 && (values[1] - 2.0).abs() < 1e-12);
/// assert!((vectors[1][0].abs() - 1.0).abs() < 1e-12);
/// ```
pub fn symmetric_eigen<const N: usize>(matrix: [[f64; N]; N]) -> ([f64; N], [[f64; N]; N]) {
    // mirror the upper triangle into the lower one read by faer
    let mat = faer::Mat::<f64>::from_fn(N, N, |i, j| {
        if i <= j {
            matrix[i][j]
        } else {
            matrix[j][i]
        }
    });
    let eig = mat.selfadjoint_eigendecomposition(faer::Side::Lower);
    let s = eig.s().column_vector();
    let u = eig.u();

    let mut order = [0usize; N];
    for (i, o) in order.iter_mut().enumerate() {
        *o = i;
    }
    order.sort_by(|&i, &j| s.read(i).total_cmp(&s.read(j)));

    let mut values = [0.0; N];
    let mut vectors = [[0.0; N]; N];
    for (k, &src) in order.iter().enumerate() {
        values[k] = s.read(src);
        for (row, vector_row) in vectors.iter_mut().enumerate() {
            vector_row[k] = u.read(row, src);
        }
    }

    (values, vectors)
}

/// Singular value decomposition of a 3x3 matrix, `m = U diag(s) V^T`.
///
/// # Returns
///
/// `(U, s, V)` with row-major `U` and `V`. The singular values are in non-increasing order
/// and column `k` of `U` and `V` belongs to `s[k]`.
pub fn svd3(m: &[[f64; 3]; 3]) -> ([[f64; 3]; 3], [f64; 3], [[f64; 3]; 3]) {
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| m[i][j]);
    let svd = mat.svd();
    let s = svd.s_diagonal();

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| s.read(j).total_cmp(&s.read(i)));

    let mut u = [[0.0; 3]; 3];
    let mut v = [[0.0; 3]; 3];
    let mut values = [0.0; 3];
    for (k, &src) in order.iter().enumerate() {
        values[k] = s.read(src);
        for row in 0..3 {
            u[row][k] = svd.u().read(row, src);
            v[row][k] = svd.v().read(row, src);
        }
    }
    (u, values, v)
}
