use num_traits::Float;

/// Result of LU factorization with partial pivoting.
///
/// Stores the combined L/U factors in a single matrix (L below diagonal,
/// U on and above the diagonal) plus the row permutation.
pub struct LuFactors<F> {
    lu: Vec<Vec<F>>,
    perm: Vec<usize>,
    n: usize,
}

/// Factorize an `n x n` matrix via LU decomposition with partial pivoting.
///
/// Returns `None` if the matrix is singular (zero or near-zero pivot).
// Explicit indexing is clearer for pivoted LU: row/col indices drive pivot search and elimination
#[allow(clippy::needless_range_loop)]
pub fn lu_factor<F: Float>(a: &[Vec<F>]) -> Option<LuFactors<F>> {
    let n = a.len();
    debug_assert!(a.iter().all(|row| row.len() == n));

    let mut lu: Vec<Vec<F>> = a.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();

    let eps = F::from(1e-12).unwrap_or_else(|| F::epsilon());

    for col in 0..n {
        let mut max_val = lu[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let v = lu[row][col].abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }

        if max_val < eps {
            return None; // Singular
        }

        if max_row != col {
            lu.swap(col, max_row);
            perm.swap(col, max_row);
        }

        let pivot = lu[col][col];

        for row in (col + 1)..n {
            let factor = lu[row][col] / pivot;
            lu[row][col] = factor; // Store L factor
            for j in (col + 1)..n {
                let val = lu[col][j];
                lu[row][j] = lu[row][j] - factor * val;
            }
        }
    }

    Some(LuFactors { lu, perm, n })
}

/// Solve `A * x = b` using a pre-computed LU factorization.
// Explicit indexing is clearer for forward/back substitution with permuted indices
#[allow(clippy::needless_range_loop)]
pub fn lu_back_solve<F: Float>(factors: &LuFactors<F>, b: &[F]) -> Vec<F> {
    let n = factors.n;
    debug_assert_eq!(b.len(), n);

    let mut y = vec![F::zero(); n];
    for i in 0..n {
        y[i] = b[factors.perm[i]];
    }

    // Forward substitution (L has unit diagonal)
    for i in 1..n {
        for j in 0..i {
            let l_ij = factors.lu[i][j];
            let y_j = y[j];
            y[i] = y[i] - l_ij * y_j;
        }
    }

    // Back substitution
    let mut x = vec![F::zero(); n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum = sum - factors.lu[i][j] * x[j];
        }
        x[i] = sum / factors.lu[i][i];
    }

    x
}

/// Solve `A * x = b` via LU factorization with partial pivoting.
///
/// Returns `None` if the matrix is singular.
pub fn lu_solve<F: Float>(a: &[Vec<F>], b: &[F]) -> Option<Vec<F>> {
    let factors = lu_factor(a)?;
    Some(lu_back_solve(&factors, b))
}

/// Cholesky factorization `A = R^T R` of a symmetric matrix, returning the
/// upper factor R.
///
/// Returns `None` if the matrix is not positive definite or a pivot is not
/// finite; callers treat that as a signal to grow their regularization.
#[allow(clippy::needless_range_loop)]
pub fn cholesky<F: Float>(a: &[Vec<F>]) -> Option<Vec<Vec<F>>> {
    let n = a.len();
    debug_assert!(a.iter().all(|row| row.len() == n));

    let mut r = vec![vec![F::zero(); n]; n];
    for i in 0..n {
        let mut diag = a[i][i];
        for k in 0..i {
            diag = diag - r[k][i] * r[k][i];
        }
        if !(diag > F::zero()) || !diag.is_finite() {
            return None;
        }
        let d = diag.sqrt();
        r[i][i] = d;
        for j in (i + 1)..n {
            let mut sum = a[i][j];
            for k in 0..i {
                sum = sum - r[k][i] * r[k][j];
            }
            r[i][j] = sum / d;
        }
    }
    Some(r)
}

/// Solve `R^T z = b` for upper-triangular R (forward substitution).
pub fn forward_solve_transposed<F: Float>(r: &[Vec<F>], b: &[F]) -> Vec<F> {
    let n = r.len();
    debug_assert_eq!(b.len(), n);
    let mut z = vec![F::zero(); n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum = sum - r[k][i] * z[k];
        }
        z[i] = sum / r[i][i];
    }
    z
}

/// Solve `R x = b` for upper-triangular R (back substitution).
pub fn back_solve<F: Float>(r: &[Vec<F>], b: &[F]) -> Vec<F> {
    let n = r.len();
    debug_assert_eq!(b.len(), n);
    let mut x = vec![F::zero(); n];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for k in (i + 1)..n {
            sum = sum - r[i][k] * x[k];
        }
        x[i] = sum / r[i][i];
    }
    x
}

/// Least-squares solve `min ||A y - b||` via Householder QR with column
/// pivoting. `a` is `m x n` stored as `a[row][col]`.
///
/// Handles rank-deficient systems by zeroing the coefficients of dependent
/// columns, so it serves the same role as a full-pivoting QR solve.
#[allow(clippy::needless_range_loop)]
pub fn qr_least_squares<F: Float>(a: &[Vec<F>], b: &[F]) -> Vec<F> {
    let m = a.len();
    let n = if m > 0 { a[0].len() } else { 0 };
    debug_assert_eq!(b.len(), m);
    if m == 0 || n == 0 {
        return vec![F::zero(); n];
    }

    let mut work: Vec<Vec<F>> = a.to_vec();
    let mut qtb: Vec<F> = b.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();
    let steps = m.min(n);

    for j in 0..steps {
        // Pivot on the column with the largest remaining norm
        let mut best = j;
        let mut best_norm = F::zero();
        for c in j..n {
            let mut s = F::zero();
            for r in j..m {
                s = s + work[r][c] * work[r][c];
            }
            if s > best_norm {
                best_norm = s;
                best = c;
            }
        }
        if best != j {
            for row in work.iter_mut() {
                row.swap(j, best);
            }
            perm.swap(j, best);
        }

        // Householder vector for column j, rows j..m
        let mut alpha = F::zero();
        for r in j..m {
            alpha = alpha + work[r][j] * work[r][j];
        }
        let alpha = alpha.sqrt();
        if alpha == F::zero() {
            continue;
        }
        let alpha = if work[j][j] > F::zero() { -alpha } else { alpha };

        let mut v = vec![F::zero(); m - j];
        for r in j..m {
            v[r - j] = work[r][j];
        }
        v[0] = v[0] - alpha;
        let mut vtv = F::zero();
        for &vi in &v {
            vtv = vtv + vi * vi;
        }
        if vtv == F::zero() {
            continue;
        }

        work[j][j] = alpha;
        for r in (j + 1)..m {
            work[r][j] = F::zero();
        }

        let two = F::one() + F::one();
        for c in (j + 1)..n {
            let mut vta = F::zero();
            for r in j..m {
                vta = vta + v[r - j] * work[r][c];
            }
            let coef = two * vta / vtv;
            for r in j..m {
                work[r][c] = work[r][c] - coef * v[r - j];
            }
        }
        let mut vtb = F::zero();
        for r in j..m {
            vtb = vtb + v[r - j] * qtb[r];
        }
        let coef = two * vtb / vtv;
        for r in j..m {
            qtb[r] = qtb[r] - coef * v[r - j];
        }
    }

    // Numerical rank from the pivoted diagonal
    let r00 = work[0][0].abs();
    let tol = F::epsilon() * F::from(m.max(n)).unwrap_or_else(F::one) * r00;
    let mut rank = 0;
    for j in 0..steps {
        if work[j][j].abs() > tol {
            rank = j + 1;
        } else {
            break;
        }
    }

    // Back substitution on the leading rank x rank block
    let mut y = vec![F::zero(); n];
    for i in (0..rank).rev() {
        let mut sum = qtb[i];
        for k in (i + 1)..rank {
            sum = sum - work[i][k] * y[k];
        }
        y[i] = sum / work[i][i];
    }

    // Undo the column permutation
    let mut x = vec![F::zero(); n];
    for j in 0..n {
        x[perm[j]] = y[j];
    }
    x
}

/// Matrix-vector product for a row-major dense matrix.
pub fn mat_vec<F: Float>(a: &[Vec<F>], x: &[F]) -> Vec<F> {
    a.iter()
        .map(|row| {
            debug_assert_eq!(row.len(), x.len());
            let mut s = F::zero();
            for i in 0..x.len() {
                s = s + row[i] * x[i];
            }
            s
        })
        .collect()
}
