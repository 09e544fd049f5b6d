use num_traits::Float;

/// Bisection cap for the bracket loop. A safety valve, not an expected
/// outcome; reaching it on a benign problem is a solver-quality regression.
pub(crate) const BISECT_CAP: usize = 1_000_000;

/// State of the three evaluation points after a merit-function bracket
/// search: index 0 is the low end, 1 the interior point, 2 the high end.
pub(crate) struct Bracket<F> {
    /// Step fractions along the segment from the current iterate (0) to
    /// the full trial step (1).
    pub alpha: [F; 3],
    /// Merit values at the three points.
    pub merit: [F; 3],
    pub points: [Vec<F>; 3],
    /// Corrected objective/constraint rows at the three points.
    pub rows: [Vec<F>; 3],
    /// Merit evaluations performed.
    pub evals: usize,
    /// Set when the evaluator reported a cancellation; the bracket holds
    /// the last complete state.
    pub interrupted: bool,
}

/// Three-point bisection search on the merit function between the current
/// iterate `p` (step 0) and the trial point `p_trial` (step 1).
///
/// `eval` maps a candidate decision vector to its corrected
/// objective/constraint row and merit value, returning `None` on
/// cancellation. The bracket is narrowed toward whichever side holds the
/// better merit. The three narrowing conditions are applied in a fixed
/// order and later blocks may overwrite earlier ones; the behavior on
/// degenerate ties depends on that order.
pub(crate) fn three_point<F, E>(
    p: &[F],
    row: &[F],
    entry_merit: F,
    p_trial: &[F],
    eval: &mut E,
    tol: F,
) -> Bracket<F>
where
    F: Float,
    E: FnMut(&[F]) -> Option<(Vec<F>, F)>,
{
    let mut br = Bracket {
        alpha: [F::zero(), F::zero(), F::one()],
        merit: [entry_merit, entry_merit, entry_merit],
        points: [p.to_vec(), p.to_vec(), p_trial.to_vec()],
        rows: [row.to_vec(), row.to_vec(), row.to_vec()],
        evals: 0,
        interrupted: false,
    };

    match eval(p_trial) {
        Some((high_row, high_merit)) => {
            br.evals += 1;
            br.rows[2] = high_row;
            br.merit[2] = high_merit;
        }
        None => {
            br.interrupted = true;
            return br;
        }
    }

    let two = F::one() + F::one();
    let mut gap = F::one();
    let mut iters = 0;
    while gap > tol && iters < BISECT_CAP {
        iters += 1;
        br.alpha[1] = (br.alpha[0] + br.alpha[2]) / two;
        let frac = br.alpha[1];
        let mid: Vec<F> = p
            .iter()
            .zip(p_trial)
            .map(|(&lo, &hi)| lo * (F::one() - frac) + hi * frac)
            .collect();

        match eval(&mid) {
            Some((mid_row, mid_merit)) => {
                br.evals += 1;
                br.points[1] = mid;
                br.rows[1] = mid_row;
                br.merit[1] = mid_merit;
            }
            None => {
                br.interrupted = true;
                return br;
            }
        }

        let worst = br.merit[0].max(br.merit[1]).max(br.merit[2]);
        if worst < entry_merit {
            let best = br.merit[0].min(br.merit[1]).min(br.merit[2]);
            gap = tol * (worst - best) / (entry_merit - worst);
        }

        // Evaluated before any copy; overlap between the first two blocks
        // is intentional and the order is load-bearing on ties.
        let mid_not_below_low = br.merit[1] >= br.merit[0];
        let low_holds = br.merit[0] <= br.merit[2] && br.merit[1] < br.merit[0];
        let high_holds = br.merit[1] < br.merit[0] && br.merit[0] > br.merit[2];

        if mid_not_below_low {
            br.merit[2] = br.merit[1];
            br.rows[2] = br.rows[1].clone();
            br.alpha[2] = br.alpha[1];
            br.points[2] = br.points[1].clone();
        }
        if low_holds {
            br.merit[2] = br.merit[1];
            br.rows[2] = br.rows[1].clone();
            br.alpha[2] = br.alpha[1];
            br.points[2] = br.points[1].clone();
        }
        if high_holds {
            br.merit[0] = br.merit[1];
            br.rows[0] = br.rows[1].clone();
            br.alpha[0] = br.alpha[1];
            br.points[0] = br.points[1].clone();
        }

        if gap >= tol {
            gap = br.alpha[2] - br.alpha[0];
        }
    }

    br
}
