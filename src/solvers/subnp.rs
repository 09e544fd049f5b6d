use log::debug;
use num_traits::Float;

use crate::convergence::{as_f64, cast, dot, infinity_norm, norm};
use crate::feasibility::{least_norm_projection, restore_feasibility};
use crate::line_search::three_point;
use crate::linalg::{back_solve, cholesky, forward_solve_transposed, mat_vec, qr_least_squares};
use crate::problem::{Bounds, Problem};
use crate::scaling::Scaling;
use crate::solvers::{eval_fc, eval_gradient, Dims, Phase};

/// Regularization growth applied when a trial factorization fails or the
/// step leaves the bounds. Empirically chosen, treated as a tunable.
const REG_GROWTH: f64 = 3.0;
/// Shrink of the carried regularization at the start of each inner
/// iteration.
const REG_SHRINK: f64 = 10.0;
/// Retry cap for the regularized step loop; a safety valve, normally the
/// non-finite check fires long before this.
const STEP_RETRY_CAP: usize = 1_000_000;

/// Warm-start state handed to one inner-minimizer call, in raw units.
pub(crate) struct SubnpInput<'a, F> {
    /// Decision vector (slacks first).
    pub p: &'a [F],
    /// Lagrange multipliers, `nc` entries (empty when unconstrained).
    pub y: &'a [F],
    /// Raw evaluation row `[f, eq..., ineq...]` at `p`.
    pub fc: &'a [F],
    /// Hessian approximation over the decision vector.
    pub hessian: &'a [Vec<F>],
    /// Carried regularization scalar.
    pub reg: F,
    /// Penalty weight on the squared constraint violation.
    pub rho: F,
    /// Inner iteration cap.
    pub max_minor: usize,
    /// Convergence tolerance.
    pub tol: F,
}

/// State returned by one inner-minimizer call, unscaled.
pub(crate) struct SubnpOutput<F> {
    pub p: Vec<F>,
    pub y: Vec<F>,
    pub hessian: Vec<Vec<F>>,
    /// Objective gradient over the decision vector at the last gradient
    /// evaluation (slack entries zero).
    pub gradient: Vec<F>,
    /// Regularization scalar to carry into the next call.
    pub reg: F,
    /// Step between the last two inner iterates, for the outer
    /// step-size convergence test.
    pub last_step: Vec<F>,
    pub func_evals: usize,
    pub minor_iters: usize,
    /// The regularized Hessian could not be repaired; the caller should
    /// rescale and retry or give up.
    pub failed: bool,
    pub interrupted: bool,
    /// Feasibility restoration hit its cap.
    pub infeasible: bool,
}

/// One inner-minimizer call: BFGS model maintenance, regularized Newton
/// steps projected onto the linearized constraint manifold, and the
/// three-point merit line search, all in scaled units.
pub(crate) fn subnp<F, P>(
    problem: &mut P,
    phase: Phase,
    dims: Dims,
    bounds: &Bounds<F>,
    scale: &Scaling<F>,
    input: SubnpInput<'_, F>,
) -> SubnpOutput<F>
where
    F: Float,
    P: Problem<F>,
{
    let n = dims.n;
    let m_eq = dims.m_eq;
    let m_ineq = dims.m_ineq;
    let nc = dims.nc();
    let npic = dims.npic();
    let tol = input.tol;
    let rho = input.rho;

    let mut func_evals = 0usize;
    let mut infeasible = false;
    let mut interrupted = false;

    let mut fc = input.fc.to_vec();
    scale.scale_ob(&mut fc);
    let mut p = input.p.to_vec();
    scale.scale_decision(&mut p);
    let sbounds = bounds.scaled(scale.decision());
    let mut y = input.y.to_vec();
    scale.scale_multipliers(&mut y);
    let mut hessv: Vec<Vec<F>> = input.hessian.to_vec();
    scale.scale_hessian(&mut hessv);

    let mut g = vec![F::zero(); npic];
    let mut a: Vec<Vec<F>> = vec![vec![F::zero(); npic]; nc];
    let mut b: Vec<F> = vec![F::zero(); nc];
    // Whether the evaluation row must be refreshed before it is trusted;
    // stays false only when the entry point already satisfies the
    // linearized constraints.
    let mut reeval = true;

    if nc > 0 {
        let mut constraint: Vec<F> = fc[1..1 + nc].to_vec();

        // Gradient and constraint Jacobian at the entry point; this
        // linearization is held fixed for the whole call.
        let x = scale.unscale_params(&p);
        let raw_grad = eval_gradient(problem, &x, phase);
        g = scale.scale_gradient(&raw_grad);

        for i in 0..m_ineq {
            a[m_eq + i][i] = F::zero() - F::one();
        }
        if m_eq > 0 {
            let eq_jac = problem.equality_jacobian(&x);
            debug_assert_eq!(eq_jac.len(), m_eq);
            for i in 0..m_eq {
                for jj in 0..n {
                    a[i][m_ineq + jj] = eq_jac[i][jj] * scale.jacobian_factor(i, m_ineq + jj);
                }
            }
        }
        if m_ineq > 0 {
            let ineq_jac = problem.inequality_jacobian(&x);
            debug_assert_eq!(ineq_jac.len(), m_ineq);
            for i in 0..m_ineq {
                for jj in 0..n {
                    // Jacobian of the sign-normalized (negated) values.
                    a[m_eq + i][m_ineq + jj] = (F::zero() - ineq_jac[i][jj])
                        * scale.jacobian_factor(m_eq + i, m_ineq + jj);
                }
            }
        }

        for i in 0..m_ineq {
            constraint[m_eq + i] = constraint[m_eq + i] - p[i];
        }

        b = mat_vec(&a, &p);
        for i in 0..nc {
            b[i] = b[i] - constraint[i];
        }

        reeval = false;
        if infinity_norm(&constraint) >= tol {
            reeval = true;
            if !bounds.bounded {
                if !least_norm_projection(&mut p, &a, &constraint) {
                    debug!("least-norm projection skipped: singular normal matrix");
                }
            } else {
                if !restore_feasibility(&mut p, &a, &constraint, &sbounds, tol) {
                    infeasible = true;
                    debug!("feasibility restoration hit its cap; continuing from best point");
                }
                b = mat_vec(&a, &p);
            }
        }
    }

    if reeval {
        let x = scale.unscale_params(&p);
        let (mut fresh, _) = eval_fc(problem, &x, phase, m_eq, m_ineq);
        func_evals += 1;
        scale.scale_ob(&mut fresh);
        fc = fresh;
    }

    let mut merit_val = fc[0];
    for i in 0..m_ineq {
        fc[1 + m_eq + i] = fc[1 + m_eq + i] - p[i];
    }
    if nc > 0 {
        let ap = mat_vec(&a, &p);
        for i in 0..nc {
            fc[1 + i] = fc[1 + i] - ap[i] + b[i];
        }
        let c = &fc[1..1 + nc];
        let cnorm = norm(c);
        merit_val = fc[0] - dot(&y, c) + rho * cnorm * cnorm;
    }

    let mut reg = input.reg;
    let mut prev_p = vec![F::zero(); npic];
    let mut prev_g = vec![F::zero(); npic];
    let mut last_step = vec![F::zero(); npic];
    let mut minor = 0usize;
    let mut cap = input.max_minor;

    let sqrt_eps = F::epsilon().sqrt();
    let dx_floor = cast::<F>(0.01);

    while minor < cap {
        minor += 1;

        if reeval {
            let x = scale.unscale_params(&p);
            let raw_grad = eval_gradient(problem, &x, phase);
            g = scale.scale_gradient(&raw_grad);
        }

        if minor > 1 {
            // BFGS update from the step and gradient differences; skipped
            // unless both curvature products are positive.
            let mut s = vec![F::zero(); npic];
            let mut dg = vec![F::zero(); npic];
            for i in 0..npic {
                s[i] = p[i] - prev_p[i];
                dg[i] = g[i] - prev_g[i];
            }
            last_step = s.clone();
            let hs = mat_vec(&hessv, &s);
            let step_curv = dot(&s, &hs);
            let grad_curv = dot(&s, &dg);
            if step_curv > F::zero() && grad_curv > F::zero() {
                for i in 0..npic {
                    for k in 0..npic {
                        hessv[i][k] =
                            hessv[i][k] - hs[i] * hs[k] / step_curv + dg[i] * dg[k] / grad_curv;
                    }
                }
            }
        }

        // Per-coordinate step scaling: a coordinate close to its bound
        // gets a large weight and therefore a small step.
        let mut dx = vec![dx_floor; npic];
        if bounds.bounded {
            for i in 0..sbounds.mm {
                let gap = (p[i] - sbounds.lower[i]).min(sbounds.upper[i] - p[i]) + sqrt_eps;
                dx[i] = F::one() / gap;
            }
            if !bounds.param_bounded {
                let mut min_dx = dx_floor;
                for &d in &dx[..sbounds.mm] {
                    if d < min_dx {
                        min_dx = d;
                    }
                }
                for d in dx.iter_mut().skip(sbounds.mm) {
                    *d = min_dx;
                }
            }
        }

        reg = reg / cast::<F>(REG_SHRINK);

        // Regularized Newton step: grow reg until the factorization
        // succeeds and the trial point respects the bounds. A bound
        // violation means the step is too large, not something to clip.
        let mut p_trial: Vec<F> = Vec::new();
        let mut accepted = false;
        let mut failed = false;
        let mut tries = 0usize;
        while tries < STEP_RETRY_CAP {
            tries += 1;

            let mut cz = hessv.clone();
            for (i, row) in cz.iter_mut().enumerate() {
                row[i] = row[i] + reg * dx[i] * dx[i];
            }
            if cz.iter().any(|row| row.iter().any(|v| !v.is_finite())) {
                failed = true;
                break;
            }

            let r = match cholesky(&cz) {
                Some(r) => r,
                None => {
                    reg = (reg * cast::<F>(REG_GROWTH)).max(F::epsilon());
                    if !reg.is_finite() {
                        failed = true;
                        break;
                    }
                    continue;
                }
            };

            let whitened_g = forward_solve_transposed(&r, &g);
            let u = if nc == 0 {
                let mut u = back_solve(&r, &whitened_g);
                for v in u.iter_mut() {
                    *v = F::zero() - *v;
                }
                u
            } else {
                // Project the step onto the linearized constraint
                // manifold through a least-squares multiplier estimate.
                let mut whitened_at = vec![vec![F::zero(); nc]; npic];
                for (i, row) in a.iter().enumerate() {
                    let col = forward_solve_transposed(&r, row);
                    for k in 0..npic {
                        whitened_at[k][i] = col[k];
                    }
                }
                y = qr_least_squares(&whitened_at, &whitened_g);
                let mut rhs = whitened_g.clone();
                for k in 0..npic {
                    let mut s = F::zero();
                    for i in 0..nc {
                        s = s + whitened_at[k][i] * y[i];
                    }
                    rhs[k] = rhs[k] - s;
                }
                let mut u = back_solve(&r, &rhs);
                for v in u.iter_mut() {
                    *v = F::zero() - *v;
                }
                u
            };

            let trial: Vec<F> = p.iter().zip(&u).map(|(&pi, &ui)| pi + ui).collect();
            if !bounds.bounded {
                p_trial = trial;
                accepted = true;
                break;
            }
            let mut gap = F::infinity();
            for i in 0..sbounds.mm {
                gap = gap
                    .min(trial[i] - sbounds.lower[i])
                    .min(sbounds.upper[i] - trial[i]);
            }
            if gap > F::zero() {
                p_trial = trial;
                accepted = true;
                break;
            }
            if !gap.is_finite() {
                failed = true;
                break;
            }
            reg = (reg * cast::<F>(REG_GROWTH)).max(F::epsilon());
        }

        if failed || !accepted {
            debug!(
                "regularized factorization unrepairable after {} tries (reg {:.3e})",
                tries,
                as_f64(reg)
            );
            let mut p_out = p.clone();
            scale.unscale_decision(&mut p_out);
            let mut hess_out = hessv.clone();
            scale.unscale_hessian(&mut hess_out);
            let mut g_out = g.clone();
            scale.unscale_gradient(&mut g_out);
            let mut step_out = last_step.clone();
            scale.unscale_decision(&mut step_out);
            return SubnpOutput {
                p: p_out,
                y: vec![F::zero(); nc],
                hessian: hess_out,
                gradient: g_out,
                reg: input.reg,
                last_step: step_out,
                func_evals,
                minor_iters: minor,
                failed: true,
                interrupted,
                infeasible,
            };
        }

        // Three-point line search on the merit function between the
        // current iterate and the full step.
        let bracket = {
            let a_ref = &a;
            let b_ref = &b;
            let y_ref = &y;
            let mut eval_merit = |pt: &[F]| -> Option<(Vec<F>, F)> {
                if problem.interrupted() {
                    return None;
                }
                let x = scale.unscale_params(pt);
                let (mut row, _) = eval_fc(problem, &x, phase, m_eq, m_ineq);
                scale.scale_ob(&mut row);
                for i in 0..m_ineq {
                    row[1 + m_eq + i] = row[1 + m_eq + i] - pt[i];
                }
                let merit = if nc > 0 {
                    let apt = mat_vec(a_ref, pt);
                    for i in 0..nc {
                        row[1 + i] = row[1 + i] - apt[i] + b_ref[i];
                    }
                    let c = &row[1..1 + nc];
                    let cnorm = norm(c);
                    row[0] - dot(y_ref, c) + rho * cnorm * cnorm
                } else {
                    row[0]
                };
                Some((row, merit))
            };
            three_point(&p, &fc, merit_val, &p_trial, &mut eval_merit, tol)
        };
        func_evals += bracket.evals;

        prev_p = p.clone();
        prev_g = g.clone();
        reeval = true;

        if bracket.interrupted {
            // Keep the last complete iterate.
            interrupted = true;
            break;
        }

        let best = bracket.merit[0].min(bracket.merit[1]).min(bracket.merit[2]);
        if merit_val <= best {
            cap = minor;
        }
        let reduce = (merit_val - best) / (F::one() + merit_val.abs());
        if reduce < tol {
            cap = minor;
        }

        // Evaluated before any assignment; the order is load-bearing on
        // degenerate ties.
        let take_low = bracket.merit[0] < bracket.merit[1];
        let take_high = bracket.merit[2] < bracket.merit[1] && bracket.merit[0] >= bracket.merit[1];
        let take_mid = bracket.merit[0] >= bracket.merit[1] && bracket.merit[2] >= bracket.merit[1];
        if take_low {
            merit_val = bracket.merit[0];
            p = bracket.points[0].clone();
            fc = bracket.rows[0].clone();
        }
        if take_high {
            merit_val = bracket.merit[2];
            p = bracket.points[2].clone();
            fc = bracket.rows[2].clone();
        }
        if take_mid {
            merit_val = bracket.merit[1];
            p = bracket.points[1].clone();
            fc = bracket.rows[1].clone();
        }
    }

    let mut p_out = p;
    scale.unscale_decision(&mut p_out);
    let mut y_out = y;
    scale.unscale_multipliers(&mut y_out);
    let mut hess_out = hessv;
    scale.unscale_hessian(&mut hess_out);
    let mut g_out = g;
    scale.unscale_gradient(&mut g_out);
    let mut step_out = last_step;
    scale.unscale_decision(&mut step_out);

    SubnpOutput {
        p: p_out,
        y: y_out,
        hessian: hess_out,
        gradient: g_out,
        reg,
        last_step: step_out,
        func_evals,
        minor_iters: minor,
        failed: false,
        interrupted,
        infeasible,
    }
}
