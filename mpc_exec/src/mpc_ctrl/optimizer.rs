//! Trajectory optimiser
//!
//! Formulates and solves the finite-horizon program each tick. The decision
//! vector holds only the actuator pairs: states are recovered by rolling the
//! vehicle model forward (single shooting), so the model-linking equality
//! constraints hold by construction and the solver sees a purely
//! bound-constrained problem. The bounds are the actuator limits.
//!
//! The solve uses PANOC with exact gradients obtained by forward-mode dual
//! numbers, one perturbed rollout per decision variable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use num_dual::Dual64;
use optimization_engine::{
    constraints::Rectangle,
    core::{ExitStatus, Optimizer, Problem},
    panoc::{PANOCCache, PANOCOptimizer},
    SolverError,
};
use std::time::Duration;

// Internal
use super::{cost, vehicle_model, Params, VehicleState, NUM_ACTUATORS};
use util::maths::clamp;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Memory length of the L-BFGS directions used by PANOC.
const LBFGS_MEMORY: usize = 10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The result of one tick's optimisation.
#[derive(Clone, Debug, Default)]
pub struct Solution {
    /// First steering demand of the optimal sequence. Units: radians
    pub steer_rad: f64,

    /// First acceleration demand of the optimal sequence. Units: normalised
    pub accel: f64,

    /// The optimiser's forward-predicted (x, y) trajectory in the VB frame,
    /// one point per horizon step after the initial state.
    pub predicted_m_vb: Vec<[f64; 2]>,

    /// True if the solver reached its convergence tolerance. When false the
    /// demands are the best iterate found within the iteration/time budget.
    pub converged: bool,

    /// True if the solver failed outright and the demands are the safe
    /// default (zero steering, zero acceleration).
    pub safe_default: bool,

    /// Number of solver iterations used.
    pub iterations: usize,

    /// Final value of the cost function.
    pub cost: f64,
}

/// The trajectory optimiser.
///
/// Holds the PANOC workspace and the decision-variable buffer. These are
/// reused across ticks as allocations only: the decision vector is zeroed at
/// the start of every solve, no warm-start state survives a tick.
pub struct Solver {
    cache: PANOCCache,

    /// Flat decision vector, `num_actuator_steps` (steer, accel) pairs.
    actuators: Vec<f64>,

    /// Per-variable lower bounds.
    lower: Vec<f64>,

    /// Per-variable upper bounds.
    upper: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Solver {
    /// Build a solver for the given (already validated) parameters.
    pub fn new(params: &Params) -> Self {
        let num_vars = NUM_ACTUATORS * params.num_actuator_steps();

        let mut lower = Vec::with_capacity(num_vars);
        let mut upper = Vec::with_capacity(num_vars);
        for _ in 0..params.num_actuator_steps() {
            lower.push(params.steer_min_rad);
            lower.push(params.accel_min);
            upper.push(params.steer_max_rad);
            upper.push(params.accel_max);
        }

        Solver {
            cache: PANOCCache::new(num_vars, params.solver_tolerance, LBFGS_MEMORY),
            actuators: vec![0.0; num_vars],
            lower,
            upper,
        }
    }

    /// Solve the trajectory optimisation from the given initial state.
    ///
    /// Never fails the tick: a non-convergent solve returns the best iterate
    /// found, and a failed solve returns the safe default command with the
    /// `safe_default` flag raised.
    pub fn solve(
        &mut self,
        initial_state: &VehicleState,
        coeffs: &[f64],
        params: &Params,
    ) -> Solution {
        // No warm start: each tick re-solves from scratch using the freshly
        // measured state
        for v in self.actuators.iter_mut() {
            *v = 0.0;
        }

        let cost_fn = |u: &[f64], c: &mut f64| -> Result<(), SolverError> {
            *c = cost::rollout_cost(u, initial_state, coeffs, params);
            Ok(())
        };

        // Forward-mode gradient: rollout once per decision variable with
        // that variable's dual perturbation set
        let grad_fn = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
            let mut u_dual: Vec<Dual64> =
                u.iter().map(|&v| Dual64::from(v)).collect();

            for i in 0..u.len() {
                u_dual[i].eps = 1.0;
                let c = cost::rollout_cost(&u_dual, initial_state, coeffs, params);
                grad[i] = c.eps;
                u_dual[i].eps = 0.0;
            }

            Ok(())
        };

        let bounds = Rectangle::new(Some(&self.lower), Some(&self.upper));
        let problem = Problem::new(&bounds, grad_fn, cost_fn);
        let mut panoc = PANOCOptimizer::new(problem, &mut self.cache)
            .with_max_iter(params.solver_max_iter)
            .with_max_duration(Duration::from_millis(params.solver_max_time_ms));

        let status = match panoc.solve(&mut self.actuators) {
            Ok(s) => s,
            Err(e) => {
                // Degenerate solve, command the safe default rather than
                // failing the tick
                warn!("Trajectory solve failed ({:?}), issuing safe default", e);
                return Solution {
                    safe_default: true,
                    ..Solution::default()
                };
            }
        };

        let steer_rad = clamp(
            &self.actuators[0],
            &params.steer_min_rad,
            &params.steer_max_rad,
        );
        let accel = clamp(&self.actuators[1], &params.accel_min, &params.accel_max);

        if !steer_rad.is_finite() || !accel.is_finite() {
            warn!("Trajectory solve produced non-finite demands, issuing safe default");
            return Solution {
                safe_default: true,
                ..Solution::default()
            };
        }

        Solution {
            steer_rad,
            accel,
            predicted_m_vb: self.predict_trajectory(initial_state, coeffs, params),
            converged: matches!(status.exit_status(), ExitStatus::Converged),
            safe_default: false,
            iterations: status.iterations(),
            cost: status.cost_value(),
        }
    }

    /// Roll the solved actuator sequence through the model to recover the
    /// predicted (x, y) trajectory for visualisation.
    fn predict_trajectory(
        &self,
        initial_state: &VehicleState,
        coeffs: &[f64],
        params: &Params,
    ) -> Vec<[f64; 2]> {
        let mut state = initial_state.to_array::<f64>();
        let mut trajectory = Vec::with_capacity(params.num_actuator_steps());

        for t in 0..params.num_actuator_steps() {
            state = vehicle_model::step(
                &state,
                self.actuators[NUM_ACTUATORS * t],
                self.actuators[NUM_ACTUATORS * t + 1],
                coeffs,
                params.pred_time_step_s,
                params.wheelbase_lf_m,
            );
            trajectory.push([state[0], state[1]]);
        }

        trajectory
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A straight reference along the x axis.
    fn straight_ref() -> Vec<f64> {
        vec![0.0, 0.0, 0.0, 0.0]
    }

    /// Solved demands always lie within the configured bounds, across a
    /// spread of feasible initial states.
    #[test]
    fn test_bound_enforcement() {
        let params = Params::default();
        let mut solver = Solver::new(&params);

        let scenarios = [
            VehicleState::from_errors(0.0, 0.0, 0.0),
            VehicleState::from_errors(25.0, 3.0, 0.4),
            VehicleState::from_errors(10.0, -5.0, -0.8),
            VehicleState::from_errors(40.0, 8.0, 1.2),
            VehicleState::from_errors(5.0, -0.1, 0.01),
        ];

        for state in scenarios.iter() {
            let solution = solver.solve(state, &[0.5, 0.2, -0.01, 0.001], &params);

            assert!(solution.steer_rad >= params.steer_min_rad);
            assert!(solution.steer_rad <= params.steer_max_rad);
            assert!(solution.accel >= params.accel_min);
            assert!(solution.accel <= params.accel_max);
        }
    }

    /// On the path at rest the optimiser holds the wheel straight and
    /// accelerates towards the reference speed.
    #[test]
    fn test_straight_line_accelerates() {
        let params = Params::default();
        let mut solver = Solver::new(&params);

        let state = VehicleState::from_errors(0.0, 0.0, 0.0);
        let solution = solver.solve(&state, &straight_ref(), &params);

        assert!(!solution.safe_default);
        assert!(solution.steer_rad.abs() < 0.05);
        assert!(solution.accel > 0.0);
    }

    /// A reference curving left ahead of the vehicle demands a left (positive)
    /// steering command.
    #[test]
    fn test_left_curve_steers_left() {
        let params = Params::default();
        let mut solver = Solver::new(&params);

        // y = 0.05 x^2, curving left
        let coeffs = [0.0, 0.0, 0.05, 0.0];
        let state = VehicleState::from_errors(15.0, 0.0, 0.0);

        let solution = solver.solve(&state, &coeffs, &params);

        assert!(!solution.safe_default);
        assert!(solution.steer_rad > 0.0);
        assert!(solution.steer_rad <= params.steer_max_rad);
    }

    /// Increasing the cross-track weight does not worsen the final-step
    /// cross-track error on a simple curved reference.
    #[test]
    fn test_cte_weight_monotonicity() {
        let coeffs = [1.0, 0.02, 0.0, 0.0];
        let state = VehicleState::from_errors(15.0, 1.0, -0.02);

        let final_cte = |cte_weight: f64| -> f64 {
            let mut params = Params::default();
            params.cte_weight = cte_weight;

            let mut solver = Solver::new(&params);
            let solution = solver.solve(&state, &coeffs, &params);
            assert!(!solution.safe_default);

            // Roll the solution out again to read the final cte
            let mut s = state.to_array::<f64>();
            for t in 0..params.num_actuator_steps() {
                s = vehicle_model::step(
                    &s,
                    solver.actuators[NUM_ACTUATORS * t],
                    solver.actuators[NUM_ACTUATORS * t + 1],
                    &coeffs,
                    params.pred_time_step_s,
                    params.wheelbase_lf_m,
                );
            }
            s[4].abs()
        };

        let loose = final_cte(200.0);
        let tight = final_cte(20000.0);

        assert!(tight <= loose + 1e-6);
    }

    /// The predicted trajectory has one point per actuator step.
    #[test]
    fn test_predicted_trajectory_length() {
        let params = Params::default();
        let mut solver = Solver::new(&params);

        let state = VehicleState::from_errors(10.0, 0.0, 0.0);
        let solution = solver.solve(&state, &straight_ref(), &params);

        assert_eq!(
            solution.predicted_m_vb.len(),
            params.num_actuator_steps()
        );
    }
}
