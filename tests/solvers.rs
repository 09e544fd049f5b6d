use approx::assert_relative_eq;
use solnp::{solve, Inform, Problem, SolnpConfig};

// ============================================================
// Test problems
// ============================================================

/// f(x) = 0.5 * sum((x_i - c_i)^2), minimum at `center`, inside [-10, 10].
struct Quadratic {
    center: Vec<f64>,
}

impl Problem<f64> for Quadratic {
    fn dim(&self) -> usize {
        self.center.len()
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        let f = x
            .iter()
            .zip(&self.center)
            .map(|(&xi, &ci)| 0.5 * (xi - ci) * (xi - ci))
            .sum();
        Some(f)
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        x.iter().zip(&self.center).map(|(&xi, &ci)| xi - ci).collect()
    }

    fn lower_bounds(&self) -> Vec<f64> {
        vec![-10.0; self.dim()]
    }

    fn upper_bounds(&self) -> Vec<f64> {
        vec![10.0; self.dim()]
    }
}

/// f(x) = (x + 5)^2 on [-1, 1]: the unconstrained minimum sits outside the
/// box, so the solver must stop on the boundary at x = -1.
struct ShiftedBox;

impl Problem<f64> for ShiftedBox {
    fn dim(&self) -> usize {
        1
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        Some((x[0] + 5.0) * (x[0] + 5.0))
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * (x[0] + 5.0)]
    }

    fn lower_bounds(&self) -> Vec<f64> {
        vec![-1.0]
    }

    fn upper_bounds(&self) -> Vec<f64> {
        vec![1.0]
    }
}

/// Rosenbrock: f(x) = (1 - x0)^2 + 100*(x1 - x0^2)^2, minimum at (1, 1).
struct Rosenbrock2D;

impl Problem<f64> for Rosenbrock2D {
    fn dim(&self) -> usize {
        2
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        let a = 1.0 - x[0];
        let b = x[1] - x[0] * x[0];
        Some(a * a + 100.0 * b * b)
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        let a = 1.0 - x[0];
        let b = x[1] - x[0] * x[0];
        vec![-2.0 * a - 400.0 * x[0] * b, 200.0 * b]
    }
}

/// minimize (x-1)^2 + (y-2)^2 subject to x + y = 2, x,y in [-10, 10].
/// Closed-form optimum (0.5, 1.5), objective 0.5, multiplier -1.
struct LineConstrained;

impl Problem<f64> for LineConstrained {
    fn dim(&self) -> usize {
        2
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        Some((x[0] - 1.0) * (x[0] - 1.0) + (x[1] - 2.0) * (x[1] - 2.0))
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * (x[0] - 1.0), 2.0 * (x[1] - 2.0)]
    }

    fn eq_count(&self) -> usize {
        1
    }

    fn equality(&mut self, x: &[f64]) -> Vec<f64> {
        vec![x[0] + x[1] - 2.0]
    }

    fn equality_jacobian(&mut self, _x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0, 1.0]]
    }

    fn lower_bounds(&self) -> Vec<f64> {
        vec![-10.0, -10.0]
    }

    fn upper_bounds(&self) -> Vec<f64> {
        vec![10.0, 10.0]
    }
}

/// minimize x^2 subject to x >= 1 (inequality 1 - x <= 0).
/// Optimum x = 1 with the slack at its lower bound.
struct HalfLine;

impl Problem<f64> for HalfLine {
    fn dim(&self) -> usize {
        1
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        Some(x[0] * x[0])
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * x[0]]
    }

    fn ineq_count(&self) -> usize {
        1
    }

    fn inequality(&mut self, x: &[f64]) -> Vec<f64> {
        vec![1.0 - x[0]]
    }

    fn inequality_jacobian(&mut self, _x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![-1.0]]
    }
}

/// minimize x^2 + y^2 subject to x + y = 1 and x >= 0.25; the inequality is
/// inactive at the optimum (0.5, 0.5).
struct MixedConstraints;

impl Problem<f64> for MixedConstraints {
    fn dim(&self) -> usize {
        2
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        Some(x[0] * x[0] + x[1] * x[1])
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * x[0], 2.0 * x[1]]
    }

    fn eq_count(&self) -> usize {
        1
    }

    fn equality(&mut self, x: &[f64]) -> Vec<f64> {
        vec![x[0] + x[1] - 1.0]
    }

    fn equality_jacobian(&mut self, _x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0, 1.0]]
    }

    fn ineq_count(&self) -> usize {
        1
    }

    fn inequality(&mut self, x: &[f64]) -> Vec<f64> {
        vec![0.25 - x[0]]
    }

    fn inequality_jacobian(&mut self, _x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![-1.0, 0.0]]
    }
}

/// minimize (x-5)^2 with the sign-normalized inequality x - 1 in [0, 2],
/// i.e. 1 <= x <= 3 expressed through slack bounds; optimum x = 3 with the
/// slack at its upper bound.
struct TwoSidedIneq;

impl Problem<f64> for TwoSidedIneq {
    fn dim(&self) -> usize {
        1
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        Some((x[0] - 5.0) * (x[0] - 5.0))
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * (x[0] - 5.0)]
    }

    fn ineq_count(&self) -> usize {
        1
    }

    fn inequality(&mut self, x: &[f64]) -> Vec<f64> {
        vec![1.0 - x[0]]
    }

    fn inequality_jacobian(&mut self, _x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![-1.0]]
    }

    fn ineq_upper(&self) -> Vec<f64> {
        vec![2.0]
    }
}

/// Objective that always signals an aborted evaluation.
struct AlwaysInvalid;

impl Problem<f64> for AlwaysInvalid {
    fn dim(&self) -> usize {
        2
    }

    fn objective(&mut self, _x: &[f64]) -> Option<f64> {
        None
    }

    fn gradient(&mut self, _x: &[f64]) -> Vec<f64> {
        vec![0.0, 0.0]
    }
}

/// Quadratic whose interrupt flag trips after a fixed number of
/// objective evaluations.
struct CancelAfter {
    evals: usize,
    limit: usize,
}

impl Problem<f64> for CancelAfter {
    fn dim(&self) -> usize {
        2
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        self.evals += 1;
        Some(x[0] * x[0] + x[1] * x[1])
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * x[0], 2.0 * x[1]]
    }

    fn interrupted(&self) -> bool {
        self.evals >= self.limit
    }
}

/// Two equality constraints that cannot both hold.
struct Inconsistent;

impl Problem<f64> for Inconsistent {
    fn dim(&self) -> usize {
        2
    }

    fn objective(&mut self, x: &[f64]) -> Option<f64> {
        Some(x[0] * x[0] + x[1] * x[1])
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        vec![2.0 * x[0], 2.0 * x[1]]
    }

    fn eq_count(&self) -> usize {
        2
    }

    fn equality(&mut self, x: &[f64]) -> Vec<f64> {
        vec![x[0] + x[1] - 2.0, x[0] + x[1] - 5.0]
    }

    fn equality_jacobian(&mut self, _x: &[f64]) -> Vec<Vec<f64>> {
        vec![vec![1.0, 1.0], vec![1.0, 1.0]]
    }

    fn lower_bounds(&self) -> Vec<f64> {
        vec![-10.0, -10.0]
    }

    fn upper_bounds(&self) -> Vec<f64> {
        vec![10.0, 10.0]
    }
}

// ============================================================
// Unconstrained and box-bounded
// ============================================================

#[test]
fn quadratic_converges_from_any_start() {
    for start in [[-9.0, 9.0], [0.0, 0.0], [7.5, -2.5]] {
        let mut obj = Quadratic {
            center: vec![1.0, -2.0],
        };
        let result = solve(&mut obj, &start, &SolnpConfig::default());

        assert_eq!(
            result.inform,
            Inform::Converged,
            "start {:?} ended with {:?}",
            start,
            result.inform
        );
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(result.x[1], -2.0, epsilon = 1e-5);
        assert!(result.value < 1e-8, "f = {}", result.value);
    }
}

#[test]
fn minimum_outside_box_stops_on_boundary() {
    let mut obj = ShiftedBox;
    let result = solve(&mut obj, &[0.5], &SolnpConfig::default());

    assert!(
        (result.x[0] + 1.0).abs() < 1e-4,
        "x = {}, expected the active bound -1",
        result.x[0]
    );
    assert!(
        result.x[0] >= -1.0 - 1e-8,
        "bound violated: x = {}",
        result.x[0]
    );
    assert!(matches!(
        result.inform,
        Inform::Converged | Inform::ConvergedSuboptimal
    ));
}

#[test]
fn rosenbrock_unbounded() {
    let mut obj = Rosenbrock2D;
    let result = solve(&mut obj, &[0.0, 0.0], &SolnpConfig::default());

    assert!(
        (result.x[0] - 1.0).abs() < 1e-4 && (result.x[1] - 1.0).abs() < 1e-4,
        "x = {:?}",
        result.x
    );
    assert!(result.value < 1e-7, "f = {}", result.value);
}

#[test]
fn objective_scale_does_not_change_the_answer() {
    struct Scaled;
    impl Problem<f64> for Scaled {
        fn dim(&self) -> usize {
            1
        }
        fn objective(&mut self, x: &[f64]) -> Option<f64> {
            Some(1e6 * ((x[0] - 3.0) * (x[0] - 3.0) + 1.0))
        }
        fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
            vec![2e6 * (x[0] - 3.0)]
        }
    }

    let result = solve(&mut Scaled, &[-4.0], &SolnpConfig::default());
    assert_eq!(result.inform, Inform::Converged);
    assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-4);
}

// ============================================================
// Equality constraints
// ============================================================

#[test]
fn line_constrained_matches_closed_form() {
    let mut obj = LineConstrained;
    let result = solve(&mut obj, &[0.0, 0.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::Converged, "{:?}", result.inform);
    assert_relative_eq!(result.x[0], 0.5, epsilon = 1e-5);
    assert_relative_eq!(result.x[1], 1.5, epsilon = 1e-5);
    assert_relative_eq!(result.value, 0.5, epsilon = 1e-5);
    assert!(
        result.constraints[0].abs() < 1e-8,
        "equality residual {}",
        result.constraints[0]
    );
    assert_eq!(result.multipliers.len(), 1);
    assert!(
        (result.multipliers[0] + 1.0).abs() < 1e-2,
        "multiplier = {}, expected -1",
        result.multipliers[0]
    );
}

#[test]
fn line_constrained_from_far_start() {
    let mut obj = LineConstrained;
    let result = solve(&mut obj, &[5.0, -3.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::Converged, "{:?}", result.inform);
    assert_relative_eq!(result.x[0], 0.5, epsilon = 1e-5);
    assert_relative_eq!(result.x[1], 1.5, epsilon = 1e-5);
}

#[test]
fn inconsistent_equalities_do_not_converge() {
    let mut obj = Inconsistent;
    let result = solve(&mut obj, &[0.0, 0.0], &SolnpConfig::default());

    assert!(
        !matches!(
            result.inform,
            Inform::Converged | Inform::ConvergedSuboptimal
        ),
        "impossible constraints reported {:?}",
        result.inform
    );
    assert!(result.infeasible, "infeasibility warning not surfaced");
    for v in &result.x {
        assert!(v.is_finite());
    }
}

// ============================================================
// Inequality constraints and the two-pass strategy
// ============================================================

#[test]
fn half_line_from_infeasible_start() {
    let mut obj = HalfLine;
    let result = solve(&mut obj, &[-2.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::Converged, "{:?}", result.inform);
    assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-5);
    // The sign-normalized inequality value equals the slack, pinned at its
    // lower bound.
    assert!(
        result.constraints[0].abs() < 1e-5,
        "slack = {}, expected its lower bound 0",
        result.constraints[0]
    );
}

#[test]
fn half_line_from_feasible_start() {
    let mut obj = HalfLine;
    let result = solve(&mut obj, &[4.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::Converged, "{:?}", result.inform);
    assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-5);
}

#[test]
fn mixed_constraints_inactive_inequality() {
    let mut obj = MixedConstraints;
    // x0 violates x >= 0.25, so the restoration pass runs first.
    let result = solve(&mut obj, &[-1.0, 0.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::Converged, "{:?}", result.inform);
    assert_relative_eq!(result.x[0], 0.5, epsilon = 1e-4);
    assert_relative_eq!(result.x[1], 0.5, epsilon = 1e-4);
    assert!(result.constraints[0].abs() < 1e-8, "equality residual");
    assert!(
        result.constraints[1] > -1e-8,
        "inequality violated at the solution: {}",
        result.constraints[1]
    );
}

#[test]
fn two_sided_inequality_stops_at_upper_slack_bound() {
    let mut obj = TwoSidedIneq;
    let result = solve(&mut obj, &[2.0], &SolnpConfig::default());

    assert!(matches!(
        result.inform,
        Inform::Converged | Inform::ConvergedSuboptimal
    ));
    assert_relative_eq!(result.x[0], 3.0, epsilon = 1e-4);
    assert!(
        (result.constraints[0] - 2.0).abs() < 1e-4,
        "slack = {}, expected its upper bound 2",
        result.constraints[0]
    );
}

// ============================================================
// Failure taxonomy
// ============================================================

#[test]
fn always_invalid_objective_stops_cleanly() {
    let mut obj = AlwaysInvalid;
    let result = solve(&mut obj, &[1.0, 1.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::NotAtOptimum);
    assert_eq!(result.x.len(), 2);
    for v in &result.x {
        assert!(v.is_finite());
    }
}

#[test]
fn cancellation_reports_not_at_optimum() {
    let mut obj = CancelAfter { evals: 0, limit: 3 };
    let result = solve(&mut obj, &[5.0, 5.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::NotAtOptimum);
    assert_eq!(result.x.len(), 2, "canonical point stays complete");
    for v in &result.x {
        assert!(v.is_finite());
    }
}

#[test]
fn zero_iteration_cap_returns_start() {
    let mut obj = Quadratic {
        center: vec![0.0, 0.0],
    };
    let config = SolnpConfig {
        max_major: 0,
        ..SolnpConfig::default()
    };
    let result = solve(&mut obj, &[2.0, 3.0], &config);

    assert_eq!(result.inform, Inform::NotAtOptimum);
    assert_eq!(result.x, vec![2.0, 3.0]);
    assert_eq!(result.iterations, 0);
}

// ============================================================
// Result record contents
// ============================================================

#[test]
fn result_record_dimensions() {
    let mut obj = HalfLine;
    let result = solve(&mut obj, &[4.0], &SolnpConfig::default());

    assert_eq!(result.x.len(), 1, "slack entries are stripped");
    assert_eq!(result.gradient.len(), 1);
    assert_eq!(result.hessian.len(), 2, "hessian spans slack + parameter");
    assert_eq!(result.multipliers.len(), 1);
    assert_eq!(result.constraints.len(), 1);
    assert!(result.func_evals > 0);
    assert!(result.iterations > 0);
}

#[test]
fn gradient_reported_at_solution() {
    let mut obj = Quadratic {
        center: vec![2.0, -1.0],
    };
    let result = solve(&mut obj, &[6.0, 6.0], &SolnpConfig::default());

    assert_eq!(result.inform, Inform::Converged);
    for (i, g) in result.gradient.iter().enumerate() {
        assert!(
            g.abs() < 1e-4,
            "gradient[{}] = {} should vanish at the optimum",
            i,
            g
        );
    }
}
