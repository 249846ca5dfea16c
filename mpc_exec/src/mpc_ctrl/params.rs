//! Parameters structure for MpcCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Model Predictive Control.
///
/// These are loaded once at initialisation and are read-only afterwards, the
/// controller holds no other state between ticks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- HORIZON ----

    /// Number of prediction steps in the horizon.
    pub num_pred_steps: usize,

    /// Duration of a single prediction step.
    ///
    /// Units: seconds
    pub pred_time_step_s: f64,

    // ---- VEHICLE GEOMETRY ----

    /// The distance between the front axle and the vehicle's centre of
    /// gravity, which governs the turning dynamics.
    ///
    /// Units: meters
    pub wheelbase_lf_m: f64,

    // ---- ACTUATOR CAPABILITIES ----

    /// Minimum steering angle (lowest negative value).
    ///
    /// Units: radians
    pub steer_min_rad: f64,

    /// Maximum steering angle (highest positive value).
    ///
    /// Units: radians
    pub steer_max_rad: f64,

    /// Minimum acceleration demand (full braking).
    ///
    /// Units: normalised, -1 to +1
    pub accel_min: f64,

    /// Maximum acceleration demand (full throttle).
    ///
    /// Units: normalised, -1 to +1
    pub accel_max: f64,

    // ---- REFERENCE ----

    /// Target cruising speed the cost function pulls the vehicle towards.
    ///
    /// Units: meters/second
    pub ref_speed_ms: f64,

    // ---- COST WEIGHTS ----

    /// Weight on the squared cross-track error at every horizon step.
    pub cte_weight: f64,

    /// Weight on the squared heading error at every horizon step.
    pub heading_err_weight: f64,

    /// Weight on the squared speed error at every horizon step.
    pub speed_err_weight: f64,

    /// Weight on the squared steering magnitude at every actuator step.
    pub steer_weight: f64,

    /// Weight on the squared acceleration magnitude at every actuator step.
    pub accel_weight: f64,

    /// Weight on the squared difference between consecutive steering
    /// demands. Large values give smooth steering.
    pub steer_rate_weight: f64,

    /// Weight on the squared difference between consecutive acceleration
    /// demands.
    pub accel_rate_weight: f64,

    // ---- LATENCY ----

    /// The fixed delay between command computation and actuation. The
    /// measured state is propagated forward by this duration before the
    /// solve.
    ///
    /// Units: seconds
    pub actuation_latency_s: f64,

    // ---- SOLVER ----

    /// Maximum number of solver iterations per tick.
    pub solver_max_iter: usize,

    /// Maximum solver wall-clock time per tick. Together with the iteration
    /// cap this keeps the tick budget deterministic.
    ///
    /// Units: milliseconds
    pub solver_max_time_ms: u64,

    /// Tolerance on the solver's fixed-point residual for convergence.
    pub solver_tolerance: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Ways in which the loaded parameters can be invalid. Any of these is fatal
/// at startup.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("num_pred_steps must be at least 2, got {0}")]
    HorizonTooShort(usize),

    #[error("pred_time_step_s must be positive, got {0}")]
    NonPositiveTimeStep(f64),

    #[error("wheelbase_lf_m must be positive, got {0}")]
    NonPositiveWheelbase(f64),

    #[error("Actuator bound range [{0}, {1}] is empty or reversed")]
    InvalidBounds(f64, f64),

    #[error("Cost weight {0} must be non-negative, got {1}")]
    NegativeWeight(&'static str, f64),

    #[error("actuation_latency_s must be non-negative, got {0}")]
    NegativeLatency(f64),

    #[error("solver_max_iter must be greater than zero")]
    ZeroSolverIterations,

    #[error("solver_tolerance must be positive, got {0}")]
    NonPositiveTolerance(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    /// Default tuning, matching the values in `params/mpc_ctrl.toml`.
    fn default() -> Self {
        Params {
            num_pred_steps: 10,
            pred_time_step_s: 0.1,
            wheelbase_lf_m: 2.67,
            steer_min_rad: -0.436332,
            steer_max_rad: 0.436332,
            accel_min: -1.0,
            accel_max: 1.0,
            ref_speed_ms: 18.0,
            cte_weight: 2000.0,
            heading_err_weight: 2000.0,
            speed_err_weight: 1.0,
            steer_weight: 5.0,
            accel_weight: 5.0,
            steer_rate_weight: 200.0,
            accel_rate_weight: 10.0,
            actuation_latency_s: 0.1,
            solver_max_iter: 200,
            solver_max_time_ms: 50,
            solver_tolerance: 1e-4,
        }
    }
}

impl Params {
    /// Check that the loaded parameters describe a solvable problem.
    ///
    /// Called once at module initialisation, an error here is fatal for the
    /// process.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.num_pred_steps < 2 {
            return Err(ParamError::HorizonTooShort(self.num_pred_steps));
        }
        if self.pred_time_step_s <= 0.0 {
            return Err(ParamError::NonPositiveTimeStep(self.pred_time_step_s));
        }
        if self.wheelbase_lf_m <= 0.0 {
            return Err(ParamError::NonPositiveWheelbase(self.wheelbase_lf_m));
        }
        if self.steer_min_rad >= self.steer_max_rad {
            return Err(ParamError::InvalidBounds(
                self.steer_min_rad,
                self.steer_max_rad,
            ));
        }
        if self.accel_min >= self.accel_max {
            return Err(ParamError::InvalidBounds(self.accel_min, self.accel_max));
        }

        for &(name, weight) in [
            ("cte_weight", self.cte_weight),
            ("heading_err_weight", self.heading_err_weight),
            ("speed_err_weight", self.speed_err_weight),
            ("steer_weight", self.steer_weight),
            ("accel_weight", self.accel_weight),
            ("steer_rate_weight", self.steer_rate_weight),
            ("accel_rate_weight", self.accel_rate_weight),
        ]
        .iter()
        {
            if weight < 0.0 {
                return Err(ParamError::NegativeWeight(name, weight));
            }
        }

        if self.actuation_latency_s < 0.0 {
            return Err(ParamError::NegativeLatency(self.actuation_latency_s));
        }
        if self.solver_max_iter == 0 {
            return Err(ParamError::ZeroSolverIterations);
        }
        if self.solver_tolerance <= 0.0 {
            return Err(ParamError::NonPositiveTolerance(self.solver_tolerance));
        }

        Ok(())
    }

    /// Number of actuator steps in the horizon (one fewer than the number of
    /// prediction steps).
    pub fn num_actuator_steps(&self) -> usize {
        self.num_pred_steps - 1
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(Params::default().validate().is_ok());
    }

    /// The default steering bounds are the physical 25 degree limits.
    #[test]
    fn test_default_steer_bounds() {
        let p = Params::default();
        assert!((p.steer_max_rad - util::maths::deg_to_rad(25.0)).abs() < 1e-6);
        assert!((p.steer_min_rad + util::maths::deg_to_rad(25.0)).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut p = Params::default();
        p.num_pred_steps = 1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.pred_time_step_s = 0.0;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.steer_min_rad = p.steer_max_rad;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.cte_weight = -1.0;
        assert!(p.validate().is_err());
    }
}
