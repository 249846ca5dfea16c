//! Implementations for the MpcCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use nalgebra::Vector2;
use serde::Serialize;

// Internal
use super::{
    frame, poly, vehicle_model, FitError, InitError, MpcCtrlError, Params,
    Solution, Solver, VehicleState, REF_POLY_DEGREE,
};
use crate::loc::Pose;
use util::{module::State, session::Session};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of reference-curve sample points returned for visualisation.
const NUM_REF_SAMPLES: usize = 25;

/// Spacing of the reference-curve sample points along the VB x axis.
///
/// Units: meters
const REF_SAMPLE_SPACING_M: f64 = 2.5;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Model predictive control module state.
///
/// The only data carried between ticks is the read-only parameter set and
/// the solver's workspace allocations, everything else is tick-scoped.
#[derive(Default)]
pub struct MpcCtrl {
    pub(crate) params: Params,

    pub(crate) report: StatusReport,

    pub(crate) solver: Option<Solver>,
}

/// Input data to the module, one telemetry tick's worth.
#[derive(Clone, Debug, Default)]
pub struct InputData {
    /// The vehicle's pose in the GM frame.
    pub pose_gm: Pose,

    /// The vehicle's measured forward speed.
    ///
    /// Units: meters/second
    pub speed_ms: f64,

    /// The actuator command most recently applied by the vehicle, needed for
    /// latency compensation.
    pub last_cmd: ActuatorCmd,

    /// Reference waypoints in the GM frame, ordered along the path.
    ///
    /// Units: meters
    pub waypoints_m_gm: Vec<Vector2<f64>>,
}

/// Output command from MpcCtrl that the transport layer must deliver to the
/// vehicle.
#[derive(Clone, Debug, Default, Serialize)]
pub struct OutputData {
    /// The actuator command for this tick.
    pub cmd: ActuatorCmd,

    /// The optimiser's predicted trajectory in the VB frame, for
    /// visualisation.
    pub predicted_m_vb: Vec<[f64; 2]>,

    /// Samples of the fitted reference curve in the VB frame, for
    /// visualisation.
    pub ref_samples_m_vb: Vec<[f64; 2]>,
}

/// A single actuator command pair.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ActuatorCmd {
    /// Steering angle demand. Positive steers left.
    ///
    /// Units: radians
    pub steer_rad: f64,

    /// Acceleration demand.
    ///
    /// Units: normalised, -1 (full braking) to +1 (full throttle)
    pub accel: f64,
}

/// The status report containing various error flags and monitoring
/// quantities.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatusReport {
    /// The measured cross-track error at the start of the tick.
    pub cte_m: f64,

    /// The measured heading error at the start of the tick.
    pub heading_err_rad: f64,

    /// Degree of the reference polynomial actually fit. Less than the
    /// nominal degree if the fitter had to fall back.
    pub fit_degree: usize,

    /// True if the solver reached its convergence tolerance this tick.
    pub solve_converged: bool,

    /// Number of solver iterations used this tick.
    pub solve_iterations: usize,

    /// Final cost of the solved trajectory.
    pub solve_cost: f64,

    /// True if the solve failed and the safe default command was issued.
    pub safe_cmd_issued: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for MpcCtrl {
    type InitData = &'static str;
    type InitError = InitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file. Invalid
    /// parameters are a startup-fatal error.
    fn init(&mut self, init_data: Self::InitData, _session: &Session)
        -> Result<(), Self::InitError>
    {
        // Load and validate the parameters
        self.params = util::params::load(init_data)?;
        self.params.validate()?;

        // Build the solver for this horizon
        self.solver = Some(Solver::new(&self.params));

        Ok(())
    }

    /// Perform one tick of MPC processing.
    ///
    /// Processing involves:
    ///  1. Validating the telemetry
    ///  2. Transforming the waypoints into the VB frame
    ///  3. Fitting the reference polynomial and computing the tracking errors
    ///  4. Propagating the state through the actuation latency
    ///  5. Solving the trajectory optimisation
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        // Clear the status report
        self.report = StatusReport::default();

        self.validate_input(input_data)?;

        // Waypoints into the body frame, in which the pose is the origin
        let waypoints_m_vb =
            frame::waypoints_to_vb(&input_data.pose_gm, &input_data.waypoints_m_gm);

        let (coeffs, fit_degree) = self.fit_reference(&waypoints_m_vb)?;
        self.report.fit_degree = fit_degree;

        // At the body-frame origin the cross-track error is the polynomial's
        // constant term and the heading error is the negated tangent angle
        let cte_m = coeffs[0];
        let heading_err_rad = -poly::eval_deriv(&coeffs, 0.0f64).atan();

        self.report.cte_m = cte_m;
        self.report.heading_err_rad = heading_err_rad;

        // Solve from the state the vehicle will be in when the command takes
        // effect, not the state it was measured in
        let measured = VehicleState::from_errors(
            input_data.speed_ms,
            cte_m,
            heading_err_rad,
        );
        let initial_state = vehicle_model::propagate_latency(
            &measured,
            input_data.last_cmd.steer_rad,
            input_data.last_cmd.accel,
            &coeffs,
            self.params.actuation_latency_s,
            self.params.wheelbase_lf_m,
        );

        let solver = self.solver.as_mut().ok_or(MpcCtrlError::NotInitialised)?;
        let solution = solver.solve(&initial_state, &coeffs, &self.params);

        if solution.safe_default {
            self.report.safe_cmd_issued = true;
        }
        else if !solution.converged {
            warn!(
                "Trajectory solve hit its budget after {} iterations, \
                using best iterate",
                solution.iterations
            );
        }

        self.report.solve_converged = solution.converged;
        self.report.solve_iterations = solution.iterations;
        self.report.solve_cost = solution.cost;

        let output = self.build_output(&solution, &coeffs);

        trace!(
            "MpcCtrl output:\n    steer: {:.4} rad\n    accel: {:.4}",
            output.cmd.steer_rad,
            output.cmd.accel
        );

        Ok((output, self.report))
    }
}

impl MpcCtrl {
    /// Reject the tick if the telemetry is malformed or insufficient.
    fn validate_input(&self, input_data: &InputData) -> Result<(), MpcCtrlError> {
        let required = REF_POLY_DEGREE + 1;
        if input_data.waypoints_m_gm.len() < required {
            return Err(MpcCtrlError::TooFewWaypoints {
                found: input_data.waypoints_m_gm.len(),
                required,
                degree: REF_POLY_DEGREE,
            });
        }

        let finite = input_data.pose_gm.is_finite()
            && input_data.speed_ms.is_finite()
            && input_data.last_cmd.steer_rad.is_finite()
            && input_data.last_cmd.accel.is_finite()
            && input_data
                .waypoints_m_gm
                .iter()
                .all(|wp| wp.x.is_finite() && wp.y.is_finite());

        if !finite {
            return Err(MpcCtrlError::NonFiniteInput);
        }

        Ok(())
    }

    /// Fit the reference polynomial to the body-frame waypoints.
    ///
    /// If the nominal degree-3 system is degenerate (for example
    /// near-duplicate x values after the transform) fall back to degree 2
    /// and then 1 before rejecting the tick.
    fn fit_reference(
        &self,
        waypoints_m_vb: &[Vector2<f64>],
    ) -> Result<(Vec<f64>, usize), MpcCtrlError> {
        let xs: Vec<f64> = waypoints_m_vb.iter().map(|wp| wp.x).collect();
        let ys: Vec<f64> = waypoints_m_vb.iter().map(|wp| wp.y).collect();

        let mut last_err = None;
        for degree in (1..=REF_POLY_DEGREE).rev() {
            match poly::fit(&xs, &ys, degree) {
                Ok(coeffs) => {
                    if degree < REF_POLY_DEGREE {
                        warn!(
                            "Reference fit fell back from degree {} to {}",
                            REF_POLY_DEGREE, degree
                        );
                    }
                    return Ok((coeffs, degree));
                }
                Err(e) => last_err = Some(e),
            }
        }

        // All degrees failed, reject the tick
        Err(MpcCtrlError::FitDegenerate(
            last_err.unwrap_or(FitError::Degenerate),
        ))
    }

    /// Assemble the output data from the solution and reference polynomial.
    fn build_output(&self, solution: &Solution, coeffs: &[f64]) -> OutputData {
        // Sample the reference curve ahead of the vehicle for visualisation
        let ref_samples_m_vb = (0..NUM_REF_SAMPLES)
            .map(|i| {
                let x = REF_SAMPLE_SPACING_M * i as f64;
                [x, poly::eval(coeffs, x)]
            })
            .collect();

        OutputData {
            cmd: ActuatorCmd {
                steer_rad: solution.steer_rad,
                accel: solution.accel,
            },
            predicted_m_vb: solution.predicted_m_vb.clone(),
            ref_samples_m_vb,
        }
    }

    /// Get a reference to the module's parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }
}
