//! Moore-Penrose pseudo-inverse for wide matrices such as mel filter banks

use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};

/// Eigenvalues of `B·Bᵀ` below this fraction of the largest are treated as zero
const RELATIVE_CUTOFF: f64 = 1e-10;

const MAX_SWEEPS: usize = 64;

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and the matrix whose columns are the eigenvectors.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        let mut diag = 0.0;
        for p in 0..n {
            diag += a[[p, p]] * a[[p, p]];
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= f64::EPSILON * f64::EPSILON * diag {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
                let c = 1.0 / t.hypot(1.0);
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}

/// Pseudo-inverse of an `n × m` matrix with `n <= m`.
///
/// Uses `pinv(B) = Bᵀ (B·Bᵀ)⁺`, so only an `n × n` eigenproblem is solved.
/// Rank-deficient inputs (e.g. all-zero filter rows) are handled by dropping
/// negligible eigenvalues. Computed in `f64` and returned as `m × n` `f32`.
pub fn pinv<S>(b: &ArrayBase<S, Ix2>) -> Array2<f32>
where
    S: Data<Elem = f32>,
{
    let b = b.mapv(f64::from);
    let gram = b.dot(&b.t());
    let (eigenvalues, vectors) = symmetric_eigen(gram);

    let largest = eigenvalues.iter().fold(0.0f64, |acc, &l| acc.max(l));
    let cutoff = largest * RELATIVE_CUTOFF;
    let inverted = eigenvalues.mapv(|l| if l > cutoff { 1.0 / l } else { 0.0 });

    // (B·Bᵀ)⁺ = V · diag(1/λ) · Vᵀ
    let scaled = &vectors * &inverted.insert_axis(ndarray::Axis(0));
    let gram_pinv = scaled.dot(&vectors.t());

    b.t().dot(&gram_pinv).mapv(|v| v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array2<f32>, b: &Array2<f32>, tol: f32) {
        assert_eq!(a.shape(), b.shape());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < tol, "{x} vs {y}");
        }
    }

    #[test]
    fn test_eigen_diagonal() {
        let (values, _) = symmetric_eigen(array![[3.0, 0.0], [0.0, 1.0]]);
        assert!((values[0] - 3.0).abs() < 1e-12);
        assert!((values[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_eigen_reconstructs() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 1.0]];
        let (values, v) = symmetric_eigen(a.clone());
        let rebuilt = (&v * &values.insert_axis(ndarray::Axis(0))).dot(&v.t());
        for (x, y) in a.iter().zip(rebuilt.iter()) {
            assert!((x - y).abs() < 1e-10);
        }
    }

    #[test]
    fn test_pinv_square_is_inverse() {
        let b = array![[2.0f32, 1.0], [1.0, 3.0]];
        let p = pinv(&b);
        assert_close(&b.dot(&p), &Array2::eye(2), 1e-5);
    }

    #[test]
    fn test_pinv_wide_right_inverse() {
        let b = array![[1.0f32, 0.5, 0.0, 0.0], [0.0, 0.5, 1.0, 0.25]];
        let p = pinv(&b);
        assert_eq!(p.shape(), &[4, 2]);
        assert_close(&b.dot(&p), &Array2::eye(2), 1e-5);
    }

    #[test]
    fn test_pinv_rank_deficient() {
        // Second row is empty, like a mel filter with no FFT bins under it
        let b = array![[1.0f32, 2.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 1.0]];
        let p = pinv(&b);
        assert!(p.iter().all(|v| v.is_finite()));
        // Penrose condition B·P·B = B
        assert_close(&b.dot(&p).dot(&b), &b, 1e-4);
        assert!(p.column(1).iter().all(|v| v.abs() < 1e-6));
    }
}
