use num_traits::Float;

/// Per-quantity scale vector: one entry for the objective, one per equality
/// constraint, one per decision-vector entry (inequality slacks first, then
/// free parameters). Inequality constraint values share the scale of their
/// slack entry.
///
/// Computed fresh from raw magnitudes at the start of each outer iteration;
/// recomputing on an unchanged problem state yields bit-identical factors.
#[derive(Debug, Clone)]
pub(crate) struct Scaling<F> {
    factors: Vec<F>,
    m_eq: usize,
    m_ineq: usize,
}

impl<F: Float> Scaling<F> {
    /// Derive the scale vector from a raw evaluation row
    /// `[f, eq..., ineq...]`: objective entry `|f|`, equality entries the
    /// shared max equality magnitude, decision entries one, every factor
    /// clamped into `[tol, 1/tol]`.
    pub fn compute(ob: &[F], m_eq: usize, m_ineq: usize, n: usize, tol: F) -> Self {
        debug_assert!(ob.len() > m_eq);
        let npic = n + m_ineq;
        let mut factors = Vec::with_capacity(1 + m_eq + npic);
        factors.push(clamp(ob[0].abs(), tol));
        if m_eq > 0 {
            let mut max_eq = F::zero();
            for &e in &ob[1..1 + m_eq] {
                let a = e.abs();
                if a > max_eq {
                    max_eq = a;
                }
            }
            let s = clamp(max_eq, tol);
            for _ in 0..m_eq {
                factors.push(s);
            }
        }
        for _ in 0..npic {
            factors.push(F::one());
        }
        Scaling {
            factors,
            m_eq,
            m_ineq,
        }
    }

    pub fn obj(&self) -> F {
        self.factors[0]
    }

    /// Scale of constraint row `i` (equalities first, then inequalities,
    /// the latter sharing their slack's scale).
    pub fn constraint(&self, i: usize) -> F {
        if i < self.m_eq {
            self.factors[1 + i]
        } else {
            self.decision()[i - self.m_eq]
        }
    }

    /// Scales of the decision-vector entries.
    pub fn decision(&self) -> &[F] {
        &self.factors[1 + self.m_eq..]
    }

    /// Divide a raw `[f, eq..., ineq...]` row by the matching factors.
    pub fn scale_ob(&self, ob: &mut [F]) {
        ob[0] = ob[0] / self.obj();
        for i in 1..ob.len() {
            ob[i] = ob[i] / self.constraint(i - 1);
        }
    }

    pub fn scale_decision(&self, p: &mut [F]) {
        for (v, &s) in p.iter_mut().zip(self.decision()) {
            *v = *v / s;
        }
    }

    pub fn unscale_decision(&self, p: &mut [F]) {
        for (v, &s) in p.iter_mut().zip(self.decision()) {
            *v = *v * s;
        }
    }

    /// Raw parameter values from a scaled decision vector.
    pub fn unscale_params(&self, p: &[F]) -> Vec<F> {
        let dec = self.decision();
        (self.m_ineq..p.len()).map(|i| p[i] * dec[i]).collect()
    }

    pub fn scale_multipliers(&self, y: &mut [F]) {
        for (i, v) in y.iter_mut().enumerate() {
            *v = *v * self.constraint(i) / self.obj();
        }
    }

    pub fn unscale_multipliers(&self, y: &mut [F]) {
        for (i, v) in y.iter_mut().enumerate() {
            *v = *v * self.obj() / self.constraint(i);
        }
    }

    pub fn scale_hessian(&self, h: &mut [Vec<F>]) {
        let dec = self.decision();
        for (i, row) in h.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = *v * dec[i] * dec[j] / self.obj();
            }
        }
    }

    pub fn unscale_hessian(&self, h: &mut [Vec<F>]) {
        let dec = self.decision();
        for (i, row) in h.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = *v * self.obj() / (dec[i] * dec[j]);
            }
        }
    }

    /// Gradient of the scaled objective with respect to the scaled
    /// decision vector, from the raw parameter gradient. Slack entries
    /// are zero.
    pub fn scale_gradient(&self, raw: &[F]) -> Vec<F> {
        let dec = self.decision();
        let mut g = vec![F::zero(); dec.len()];
        for (j, &r) in raw.iter().enumerate() {
            g[self.m_ineq + j] = r * dec[self.m_ineq + j] / self.obj();
        }
        g
    }

    pub fn unscale_gradient(&self, g: &mut [F]) {
        let dec = self.decision();
        for (i, v) in g.iter_mut().enumerate() {
            *v = *v * self.obj() / dec[i];
        }
    }

    /// Scale factor for Jacobian entry (constraint `i`, decision column `j`).
    pub fn jacobian_factor(&self, i: usize, j: usize) -> F {
        self.decision()[j] / self.constraint(i)
    }
}

fn clamp<F: Float>(x: F, tol: F) -> F {
    x.max(tol).min(F::one() / tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factors_floor_and_cap() {
        let ob = vec![1e-14, 2.0, -6.0];
        let s = Scaling::compute(&ob, 2, 0, 3, 1e-9);
        assert_eq!(s.obj(), 1e-9, "objective magnitude floors at tol");
        assert_eq!(s.constraint(0), 6.0, "equalities share the max magnitude");
        assert_eq!(s.constraint(1), 6.0);
        assert_eq!(s.decision(), &[1.0, 1.0, 1.0]);

        let huge = vec![1e14_f64];
        let s = Scaling::compute(&huge, 0, 0, 1, 1e-9);
        assert_eq!(s.obj(), 1e9, "objective magnitude caps at 1/tol");
    }

    #[test]
    fn recompute_is_bit_identical() {
        let ob = vec![3.7, 0.2, -1.4];
        let a = Scaling::compute(&ob, 2, 1, 2, 1e-9);
        let b = Scaling::compute(&ob, 2, 1, 2, 1e-9);
        assert_eq!(a.factors, b.factors);
    }

    #[test]
    fn multiplier_scaling_round_trips() {
        let ob = vec![4.0, 2.0];
        let s = Scaling::compute(&ob, 1, 0, 2, 1e-9);
        let mut y = vec![1.5];
        s.scale_multipliers(&mut y);
        assert!((y[0] - 1.5 * 2.0 / 4.0).abs() < 1e-15);
        s.unscale_multipliers(&mut y);
        assert!((y[0] - 1.5).abs() < 1e-15);
    }

    #[test]
    fn hessian_scaling_round_trips() {
        let ob = vec![2.0, 4.0];
        let s = Scaling::compute(&ob, 1, 0, 2, 1e-9);
        let mut h = vec![vec![1.0, 0.5], vec![0.5, 3.0]];
        let orig = h.clone();
        s.scale_hessian(&mut h);
        s.unscale_hessian(&mut h);
        for i in 0..2 {
            for j in 0..2 {
                assert!((h[i][j] - orig[i][j]).abs() < 1e-14);
            }
        }
    }
}
