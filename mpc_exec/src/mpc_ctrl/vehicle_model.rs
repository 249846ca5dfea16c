//! Kinematic bicycle model with error dynamics
//!
//! The model used for prediction inside the optimiser. The state vector is
//! (x, y, psi, v, cte, epsi): planar position and heading in the VB frame at
//! solve start, speed, cross-track error and heading error to the reference
//! polynomial.
//!
//! The step function is generic over `num_dual::DualNum` so a single
//! implementation serves the plain f64 rollouts (latency compensation,
//! predicted trajectory) and the dual-number rollouts used to differentiate
//! the cost function.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use num_dual::DualNum;
use serde::Serialize;

// Internal
use super::{poly, NUM_STATES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The vehicle state at the start of an optimisation.
///
/// Expressed in the VB frame, so `x_m`, `y_m` and `heading_rad` are zero by
/// construction for a freshly measured state and only become non-zero after
/// latency propagation. A new instance is produced every tick, it is never
/// mutated in place.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct VehicleState {
    /// Position along the VB x axis. Units: meters
    pub x_m: f64,

    /// Position along the VB y axis. Units: meters
    pub y_m: f64,

    /// Heading relative to the VB x axis. Units: radians
    pub heading_rad: f64,

    /// Forward speed. Units: meters/second
    pub speed_ms: f64,

    /// Cross-track error to the reference polynomial. Units: meters
    pub cte_m: f64,

    /// Heading error to the reference tangent. Units: radians
    pub heading_err_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VehicleState {
    /// Build the initial body-frame state from the measured speed and the
    /// errors computed from the reference polynomial.
    pub fn from_errors(speed_ms: f64, cte_m: f64, heading_err_rad: f64) -> Self {
        VehicleState {
            x_m: 0.0,
            y_m: 0.0,
            heading_rad: 0.0,
            speed_ms,
            cte_m,
            heading_err_rad,
        }
    }

    /// Pack the state into the flat array form used by the rollouts.
    pub fn to_array<D: DualNum<f64> + Copy>(&self) -> [D; NUM_STATES] {
        [
            D::from(self.x_m),
            D::from(self.y_m),
            D::from(self.heading_rad),
            D::from(self.speed_ms),
            D::from(self.cte_m),
            D::from(self.heading_err_rad),
        ]
    }

    /// Unpack a plain f64 state array.
    pub fn from_array(state: &[f64; NUM_STATES]) -> Self {
        VehicleState {
            x_m: state[0],
            y_m: state[1],
            heading_rad: state[2],
            speed_ms: state[3],
            cte_m: state[4],
            heading_err_rad: state[5],
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Advance the state by one discrete step of duration `dt_s` under the given
/// steering angle and acceleration.
///
/// Positive steering turns the vehicle left (heading increases). `coeffs` is
/// the reference polynomial, used for the error dynamics: the desired
/// heading is the arctangent of its derivative at x.
pub fn step<D: DualNum<f64> + Copy>(
    state: &[D; NUM_STATES],
    steer_rad: D,
    accel: D,
    coeffs: &[f64],
    dt_s: f64,
    wheelbase_lf_m: f64,
) -> [D; NUM_STATES] {
    let [x, y, psi, v, _cte, epsi] = *state;

    let ref_y = poly::eval(coeffs, x);
    let ref_heading = poly::eval_deriv(coeffs, x).atan();

    let heading_rate = v * steer_rad * (dt_s / wheelbase_lf_m);

    [
        x + v * psi.cos() * dt_s,
        y + v * psi.sin() * dt_s,
        psi + heading_rate,
        v + accel * dt_s,
        ref_y - y + v * epsi.sin() * dt_s,
        psi - ref_heading + heading_rate,
    ]
}

/// Propagate the freshly measured body-frame state forward through the
/// actuation latency using the last applied actuator values.
///
/// One model step of the latency duration. Solving from this predicted state
/// rather than the raw measured one is what stops the commanded steering
/// lagging the vehicle by the actuation delay.
pub fn propagate_latency(
    state: &VehicleState,
    last_steer_rad: f64,
    last_accel: f64,
    coeffs: &[f64],
    latency_s: f64,
    wheelbase_lf_m: f64,
) -> VehicleState {
    if latency_s <= 0.0 {
        return *state;
    }

    let propagated = step(
        &state.to_array(),
        last_steer_rad,
        last_accel,
        coeffs,
        latency_s,
        wheelbase_lf_m,
    );

    VehicleState::from_array(&propagated)
}

#[cfg(test)]
mod test {
    use super::*;

    const LF_M: f64 = 2.67;

    fn straight_ref() -> Vec<f64> {
        // Reference along the x axis: y = 0
        vec![0.0, 0.0, 0.0, 0.0]
    }

    /// Repeated evaluation of the same step yields identical results.
    #[test]
    fn test_step_deterministic() {
        let state = [1.0f64, 0.5, 0.1, 8.0, -0.2, 0.05];
        let coeffs = [0.3, 0.02, -0.001, 0.0004];

        let first = step(&state, 0.08, 0.4, &coeffs, 0.1, LF_M);
        for _ in 0..10 {
            let again = step(&state, 0.08, 0.4, &coeffs, 0.1, LF_M);
            assert_eq!(first, again);
        }
    }

    /// Driving straight along a straight reference accumulates no error.
    #[test]
    fn test_straight_drive_no_error() {
        let mut state = VehicleState::from_errors(10.0, 0.0, 0.0).to_array();
        let coeffs = straight_ref();

        for _ in 0..20 {
            state = step(&state, 0.0f64, 0.0, &coeffs, 0.1, LF_M);
        }

        // x advances at v, everything else stays zero
        assert!((state[0] - 20.0).abs() < 1e-9);
        assert!(state[1].abs() < 1e-12);
        assert!(state[2].abs() < 1e-12);
        assert!(state[4].abs() < 1e-12);
        assert!(state[5].abs() < 1e-12);
    }

    /// Positive steering increases the heading (left turn convention).
    #[test]
    fn test_left_steer_increases_heading() {
        let state = VehicleState::from_errors(10.0, 0.0, 0.0).to_array();
        let next = step(&state, 0.1f64, 0.0, &straight_ref(), 0.1, LF_M);

        assert!(next[2] > 0.0);
        assert!((next[2] - 10.0 * 0.1 * 0.1 / LF_M).abs() < 1e-12);
    }

    /// Latency propagation is exactly one model step of the delay duration.
    #[test]
    fn test_latency_propagation() {
        let measured = VehicleState::from_errors(10.0, 0.3, -0.05);
        let coeffs = [0.3, 0.05, 0.0, 0.0];

        let propagated =
            propagate_latency(&measured, 0.1, 0.5, &coeffs, 0.1, LF_M);

        // Hand-computed single step from (0, 0, 0, 10, ...)
        assert!((propagated.x_m - 1.0).abs() < 1e-12);
        assert!(propagated.y_m.abs() < 1e-12);
        assert!((propagated.heading_rad - 10.0 * 0.1 * 0.1 / LF_M).abs() < 1e-12);
        assert!((propagated.speed_ms - 10.05).abs() < 1e-12);

        // cte' = f(0) - 0 + v sin(epsi) dt
        let expected_cte = 0.3 + 10.0 * (-0.05f64).sin() * 0.1;
        assert!((propagated.cte_m - expected_cte).abs() < 1e-12);

        // The propagated state must differ from the raw measured one
        assert!((propagated.x_m - measured.x_m).abs() > 0.9);
    }

    /// Zero latency returns the measured state unchanged.
    #[test]
    fn test_zero_latency_is_identity() {
        let measured = VehicleState::from_errors(5.0, 0.1, 0.02);
        let propagated =
            propagate_latency(&measured, 0.2, 0.3, &straight_ref(), 0.0, LF_M);

        assert_eq!(propagated.cte_m, measured.cte_m);
        assert_eq!(propagated.speed_ms, measured.speed_ms);
    }
}
