//! Minimal dense linear algebra helpers used only by OPQ's rotation-refinement
//! step (`codec::OpqQuantizer::train`). Deliberately small: OPQ's Procrustes
//! update only ever needs the SVD of a `D x D` matrix, so a classic cyclic
//! Jacobi eigensolver on the (symmetric) Gram matrix is enough — no general
//! rectangular SVD routine is needed.

/// Cyclic Jacobi eigenvalue algorithm for a symmetric `n x n` matrix stored
/// row-major in `a`. Returns `(eigenvalues, eigenvectors)` where
/// `eigenvectors` is row-major with eigenvector `i` in column `i`, i.e.
/// `eigenvectors[r * n + c]` is component `r` of eigenvector `c`.
pub fn jacobi_eigen_symmetric(a: &[f64], n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut a = a.to_vec();
    let mut v = vec![0.0; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    const MAX_SWEEPS: usize = 100;
    for _ in 0..MAX_SWEEPS {
        let mut off_diag_sum = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diag_sum += a[p * n + q] * a[p * n + q];
            }
        }
        if off_diag_sum < 1e-20 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let app = a[p * n + p];
                let aqq = a[q * n + q];
                let theta = (aqq - app) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k * n + p];
                    let akq = a[k * n + q];
                    a[k * n + p] = c * akp - s * akq;
                    a[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let aqk = a[q * n + k];
                    a[p * n + k] = c * apk - s * aqk;
                    a[q * n + k] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[k * n + p];
                    let vkq = v[k * n + q];
                    v[k * n + p] = c * vkp - s * vkq;
                    v[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues: Vec<f64> = (0..n).map(|i| a[i * n + i]).collect();
    (eigenvalues, v)
}

/// Solves the orthogonal Procrustes problem: find the `n x n` orthogonal
/// matrix `R` minimizing `||X R - Y||_F`, given the cross-covariance
/// `m = X^T Y` (row-major, `n x n`, single precision in, double precision
/// internally). Returns `R` row-major, single precision.
///
/// `R = U V^T` where `m = U S V^T`. `U` and `V` are obtained from the
/// eigendecompositions of `m m^T` and `m^T m` respectively, which share the
/// same eigenvalues (the singular values squared) by construction.
pub fn orthogonal_procrustes(m: &[f32], n: usize) -> Vec<f32> {
    let m64: Vec<f64> = m.iter().map(|&x| x as f64).collect();

    let mut mtm = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let mut acc = 0.0;
            for k in 0..n {
                acc += m64[k * n + i] * m64[k * n + j];
            }
            mtm[i * n + j] = acc;
        }
    }
    let (eigvals, v) = jacobi_eigen_symmetric(&mtm, n);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| eigvals[b].partial_cmp(&eigvals[a]).unwrap());

    let mut u = vec![0.0; n * n];
    let mut v_sorted = vec![0.0; n * n];
    for (new_col, &old_col) in order.iter().enumerate() {
        let sigma = eigvals[old_col].max(0.0).sqrt();
        for r in 0..n {
            v_sorted[r * n + new_col] = v[r * n + old_col];
        }
        if sigma > 1e-9 {
            for r in 0..n {
                let mut acc = 0.0;
                for k in 0..n {
                    acc += m64[r * n + k] * v[k * n + old_col];
                }
                u[r * n + new_col] = acc / sigma;
            }
        }
    }

    gram_schmidt_complete(&mut u, n);

    let mut r = vec![0.0f32; n * n];
    for i in 0..n {
        for j in 0..n {
            let mut acc = 0.0;
            for k in 0..n {
                acc += u[i * n + k] * v_sorted[j * n + k];
            }
            r[i * n + j] = acc as f32;
        }
    }
    r
}

/// Completes a partially-filled (possibly zero) set of columns of an `n x n`
/// matrix into a full orthonormal basis via Gram-Schmidt against the
/// standard basis, used when the Procrustes cross-covariance is rank-deficient.
fn gram_schmidt_complete(u: &mut [f64], n: usize) {
    for col in 0..n {
        let norm_sq: f64 = (0..n).map(|r| u[r * n + col] * u[r * n + col]).sum();
        if norm_sq > 1e-12 {
            let norm = norm_sq.sqrt();
            for r in 0..n {
                u[r * n + col] /= norm;
            }
            continue;
        }

        for candidate in 0..n {
            let mut e = vec![0.0; n];
            e[candidate] = 1.0;
            for prev in 0..col {
                let dot: f64 = (0..n).map(|r| e[r] * u[r * n + prev]).sum();
                for r in 0..n {
                    e[r] -= dot * u[r * n + prev];
                }
            }
            let norm_sq: f64 = e.iter().map(|x| x * x).sum();
            if norm_sq > 1e-9 {
                let norm = norm_sq.sqrt();
                for r in 0..n {
                    u[r * n + col] = e[r] / norm;
                }
                break;
            }
        }
    }
}

/// Applies an `n x n` row-major rotation matrix to a length-`n` vector.
pub fn apply_rotation(r: &[f32], v: &[f32], n: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; n];
    for i in 0..n {
        let row = &r[i * n..(i + 1) * n];
        out[i] = row.iter().zip(v).map(|(&a, &b)| a * b).sum();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jacobi_recovers_eigenvalues_of_diagonal_matrix() {
        let a = vec![3.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0];
        let (mut eigvals, _) = jacobi_eigen_symmetric(&a, 3);
        eigvals.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((eigvals[0] - 1.0).abs() < 1e-9);
        assert!((eigvals[1] - 2.0).abs() < 1e-9);
        assert!((eigvals[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn procrustes_on_identity_cross_covariance_is_identity() {
        let m = vec![1.0, 0.0, 0.0, 1.0];
        let r = orthogonal_procrustes(&m, 2);
        assert!((r[0] - 1.0).abs() < 1e-4);
        assert!((r[1]).abs() < 1e-4);
        assert!((r[2]).abs() < 1e-4);
        assert!((r[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn procrustes_recovers_known_rotation() {
        // 90 degree rotation in 2D.
        let rotation = [0.0f32, -1.0, 1.0, 0.0];
        let m: Vec<f32> = rotation.to_vec();
        let r = orthogonal_procrustes(&m, 2);
        // R should itself be an orthogonal matrix (R^T R = I).
        let rt_r_00 = r[0] * r[0] + r[2] * r[2];
        let rt_r_11 = r[1] * r[1] + r[3] * r[3];
        assert!((rt_r_00 - 1.0).abs() < 1e-3);
        assert!((rt_r_11 - 1.0).abs() < 1e-3);
    }
}
