use log::debug;
use num_traits::Float;

use crate::convergence::{as_f64, cast, infinity_norm, norm};
use crate::problem::{Bounds, Problem};
use crate::result::{Inform, SolveResult};
use crate::scaling::Scaling;
use crate::solvers::subnp::{subnp, SubnpInput};
use crate::solvers::{eval_fc, params_of, Dims, Phase};

/// Configuration for the solver.
#[derive(Debug, Clone)]
pub struct SolnpConfig<F> {
    /// Outer (major) iteration cap (default: 400).
    pub max_major: usize,
    /// Inner (minor) iteration cap per outer iteration (default: 800).
    pub max_minor: usize,
    /// Convergence tolerance (default: 1e-9).
    pub tol: F,
    /// Initial penalty weight on the squared constraint violation
    /// (default: 1.0).
    pub rho: F,
    /// Step-size weight in the final convergence test (default: 1e-7).
    pub delta: F,
}

impl Default for SolnpConfig<f64> {
    fn default() -> Self {
        SolnpConfig {
            max_major: 400,
            max_minor: 800,
            tol: 1e-9,
            rho: 1.0,
            delta: 1e-7,
        }
    }
}

impl Default for SolnpConfig<f32> {
    fn default() -> Self {
        SolnpConfig {
            max_major: 400,
            max_minor: 800,
            tol: 1e-4,
            rho: 1.0,
            delta: 1e-3,
        }
    }
}

/// Minimize `problem` starting from `x0`.
///
/// Runs the augmented-Lagrangian outer loop around the inner SQP
/// minimizer. When any inequality is violated at `x0`, a preliminary pass
/// minimizes total inequality violation before the full problem is
/// optimized. Always returns a complete [`SolveResult`]; failures are
/// classified on [`Inform`].
pub fn solve<F, P>(problem: &mut P, x0: &[F], config: &SolnpConfig<F>) -> SolveResult<F>
where
    F: Float,
    P: Problem<F>,
{
    let n = problem.dim();
    assert_eq!(x0.len(), n, "x0 length must match problem dimension");
    let m_eq = problem.eq_count();
    let m_ineq_total = problem.ineq_count();
    let tol = config.tol;

    let mut pars = x0.to_vec();
    let mut func_evals = 0usize;
    let mut infeasible = false;

    if config.max_major == 0 || config.max_minor == 0 {
        let (fc0, _) = eval_fc(problem, &pars, Phase::Main, m_eq, m_ineq_total);
        return SolveResult {
            x: pars,
            value: fc0[0],
            gradient: vec![F::zero(); n],
            hessian: identity(n + m_ineq_total),
            multipliers: vec![F::zero(); m_eq + m_ineq_total],
            constraints: fc0[1..].to_vec(),
            iterations: 0,
            func_evals: 1,
            infeasible: false,
            inform: Inform::NotAtOptimum,
        };
    }

    // Two-pass strategy: a violated inequality at the start inserts a
    // violation-minimization pass before the main pass.
    let needs_feasibility_pass = if m_ineq_total > 0 {
        let h = problem.inequality(&pars);
        let lb = problem.ineq_lower();
        h.iter().enumerate().any(|(i, &hi)| F::zero() - hi < lb[i])
    } else {
        false
    };
    let phases: &[Phase] = if needs_feasibility_pass {
        &[Phase::Feasibility, Phase::Main]
    } else {
        &[Phase::Main]
    };

    // Carriers for the final (last-pass) state.
    let mut final_fc: Vec<F> = Vec::new();
    let mut final_gradient: Vec<F> = Vec::new();
    let mut final_hessian: Vec<Vec<F>> = Vec::new();
    let mut final_y: Vec<F> = Vec::new();
    let mut final_m_ineq = 0usize;
    let mut iterations = 0usize;
    let mut inform = Inform::NotAtOptimum;

    for &phase in phases {
        let m_ineq = if phase == Phase::Feasibility {
            0
        } else {
            m_ineq_total
        };
        let dims = Dims { n, m_eq, m_ineq };
        let nc = dims.nc();
        let npic = dims.npic();
        let bounds = Bounds::build(problem, m_ineq);

        let mut rho = config.rho;
        let (mut fc, mut invalid) = eval_fc(problem, &pars, phase, m_eq, m_ineq);
        func_evals += 1;
        let mut obj_prev = fc[0];
        // Trend vector: relative objective improvement, previous violation
        // norm, current violation norm.
        let mut trend = [F::zero(); 3];
        let mut y: Vec<F> = vec![F::zero(); nc];
        let mut hessian = identity(npic);
        let mut reg = cast::<F>(n as f64);
        let mut gradient = vec![F::zero(); npic];
        let mut last_step = vec![F::zero(); npic];

        let mut p = vec![F::zero(); npic];
        p[m_ineq..].copy_from_slice(&pars);

        if nc > 0 {
            let mut constraint: Vec<F> = fc[1..1 + nc].to_vec();
            seed_slacks(&mut p, &mut constraint, &bounds, m_eq, m_ineq);
            trend[1] = norm(&constraint);
            if m_ineq == 0 && trend[1] <= cast::<F>(10.0) * tol {
                rho = F::zero();
            }
        }

        let mut iter = 0usize;
        let mut interrupted = false;
        let mut numerical = false;
        let mut restoration_stuck = false;

        while iter < config.max_major {
            iter += 1;
            if problem.interrupted() {
                interrupted = true;
                break;
            }

            // Rescale from the raw magnitudes at the current point.
            let scale = Scaling::compute(&fc, m_eq, m_ineq, n, tol);
            let mut out = subnp(
                problem,
                phase,
                dims,
                &bounds,
                &scale,
                SubnpInput {
                    p: &p,
                    y: &y,
                    fc: &fc,
                    hessian: &hessian,
                    reg,
                    rho,
                    max_minor: config.max_minor,
                    tol,
                },
            );
            func_evals += out.func_evals;

            if out.failed {
                // Recovery: recompute the scale from a fresh evaluation at
                // the returned point and retry once.
                debug!("inner minimizer hit a numerical failure; rescaling and retrying");
                let x = params_of(&out.p, m_ineq);
                let (fc_fresh, inv) = eval_fc(problem, &x, phase, m_eq, m_ineq);
                func_evals += 1;
                invalid = inv;
                let rescale = Scaling::compute(&fc_fresh, m_eq, m_ineq, n, tol);
                let retry = subnp(
                    problem,
                    phase,
                    dims,
                    &bounds,
                    &rescale,
                    SubnpInput {
                        p: &out.p,
                        y: &y,
                        fc: &fc_fresh,
                        hessian: &out.hessian,
                        reg: out.reg,
                        rho,
                        max_minor: config.max_minor,
                        tol,
                    },
                );
                func_evals += retry.func_evals;
                if retry.failed {
                    numerical = true;
                    p = retry.p;
                    y = retry.y;
                    hessian = retry.hessian;
                    gradient = retry.gradient;
                    let x = params_of(&p, m_ineq);
                    let (fc_last, inv) = eval_fc(problem, &x, phase, m_eq, m_ineq);
                    func_evals += 1;
                    invalid = inv;
                    fc = fc_last;
                    break;
                }
                out = retry;
            }

            p = out.p;
            y = out.y;
            hessian = out.hessian;
            gradient = out.gradient;
            reg = out.reg;
            last_step = out.last_step;
            if out.infeasible {
                restoration_stuck = true;
                infeasible = true;
            }

            let x = params_of(&p, m_ineq);
            let (fc_new, inv) = eval_fc(problem, &x, phase, m_eq, m_ineq);
            func_evals += 1;
            invalid = inv;
            fc = fc_new;

            if out.interrupted {
                interrupted = true;
                break;
            }

            trend[0] = (obj_prev - fc[0]) / infinity_norm(&fc).max(F::one());
            obj_prev = fc[0];

            if nc > 0 {
                let mut constraint: Vec<F> = fc[1..1 + nc].to_vec();
                seed_slacks(&mut p, &mut constraint, &bounds, m_eq, m_ineq);
                trend[2] = norm(&constraint);

                let five = cast::<F>(5.0);
                let ten = cast::<F>(10.0);
                if trend[2] < ten * tol {
                    rho = F::zero();
                    reg = reg.min(tol);
                }
                if trend[2] < five * trend[1] {
                    rho = rho / five;
                }
                if trend[2] > ten * trend[1] {
                    rho = five * rho.max(tol.sqrt());
                }
                if (tol + trend[0]).max(trend[1] - trend[2]) <= F::zero() {
                    // Both trend signals stalled: drop the multipliers and
                    // the off-diagonal curvature.
                    debug!("stagnating trend; resetting hessian to its diagonal");
                    for v in y.iter_mut() {
                        *v = F::zero();
                    }
                    for i in 0..npic {
                        for k in 0..npic {
                            if i != k {
                                hessian[i][k] = F::zero();
                            }
                        }
                    }
                }
                trend[1] = trend[2];
            }

            let settled = (trend[0] * trend[0] + trend[1] * trend[1]).sqrt();
            debug!(
                "outer iter {}: objective {:.6e}, trend {:.6e}, rho {:.3e}, inner iters {}",
                iter,
                as_f64(fc[0]),
                as_f64(settled),
                as_f64(rho),
                out.minor_iters
            );
            if settled <= tol || restoration_stuck {
                break;
            }
        }

        pars = params_of(&p, m_ineq);

        let settled = (trend[0] * trend[0] + trend[1] * trend[1]).sqrt();
        inform = if interrupted {
            Inform::NotAtOptimum
        } else if numerical {
            Inform::NumericalFailure
        } else if invalid {
            Inform::NotAtOptimum
        } else if settled <= tol {
            let step_sq = norm(&last_step) * norm(&last_step);
            let point_sq = norm(&pars) * norm(&pars);
            if config.delta * step_sq <= tol.sqrt() * (F::one() + point_sq) {
                Inform::Converged
            } else {
                Inform::ConvergedSuboptimal
            }
        } else if iter >= config.max_major {
            Inform::IterationLimit
        } else {
            Inform::NotAtOptimum
        };

        final_fc = fc;
        final_gradient = gradient;
        final_hessian = hessian;
        final_y = y;
        final_m_ineq = m_ineq;
        iterations = iter;

        if interrupted || numerical {
            break;
        }
    }

    SolveResult {
        x: pars,
        value: final_fc[0],
        gradient: final_gradient[final_m_ineq..].to_vec(),
        hessian: final_hessian,
        multipliers: final_y,
        constraints: final_fc[1..].to_vec(),
        iterations,
        func_evals,
        infeasible,
        inform,
    }
}

/// Replace the slack entries with the current inequality values when those
/// sit strictly inside the slack bounds, then subtract the slacks from the
/// inequality rows of `constraint`.
fn seed_slacks<F: Float>(
    p: &mut [F],
    constraint: &mut [F],
    bounds: &Bounds<F>,
    m_eq: usize,
    m_ineq: usize,
) {
    if m_ineq == 0 {
        return;
    }
    let interior = (0..m_ineq).all(|i| {
        let v = constraint[m_eq + i];
        v - bounds.lower[i] > F::zero() && bounds.upper[i] - v > F::zero()
    });
    if interior {
        for i in 0..m_ineq {
            p[i] = constraint[m_eq + i];
        }
    }
    for i in 0..m_ineq {
        constraint[m_eq + i] = constraint[m_eq + i] - p[i];
    }
}

fn identity<F: Float>(n: usize) -> Vec<Vec<F>> {
    let mut h = vec![vec![F::zero(); n]; n];
    for (i, row) in h.iter_mut().enumerate() {
        row[i] = F::one();
    }
    h
}
