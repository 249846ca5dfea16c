//! Cost function for the trajectory optimisation
//!
//! The objective is a weighted sum over the horizon of tracking terms
//! (cross-track error, heading error, speed error), control effort terms and
//! control smoothness terms. The actuator sequence is rolled forward through
//! the vehicle model (single shooting), so evaluating the cost also enforces
//! the model-consistency constraints by construction.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use num_dual::DualNum;

// Internal
use super::{vehicle_model, Params, VehicleState, NUM_ACTUATORS};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Evaluate the horizon cost of an actuator sequence.
///
/// `actuators` is the flat decision vector, `num_actuator_steps` pairs of
/// (steer, accel). Generic over dual numbers: evaluating with one dual
/// actuator element perturbed yields the corresponding gradient entry.
pub fn rollout_cost<D: DualNum<f64> + Copy>(
    actuators: &[D],
    initial_state: &VehicleState,
    coeffs: &[f64],
    params: &Params,
) -> D {
    let mut state = initial_state.to_array::<D>();
    let mut cost = tracking_cost(&state, params);

    let num_steps = actuators.len() / NUM_ACTUATORS;

    for t in 0..num_steps {
        let steer = actuators[NUM_ACTUATORS * t];
        let accel = actuators[NUM_ACTUATORS * t + 1];

        // Control effort
        cost = cost
            + steer * steer * params.steer_weight
            + accel * accel * params.accel_weight;

        // Smoothness between consecutive actuator steps
        if t + 1 < num_steps {
            let steer_diff = actuators[NUM_ACTUATORS * (t + 1)] - steer;
            let accel_diff = actuators[NUM_ACTUATORS * (t + 1) + 1] - accel;
            cost = cost
                + steer_diff * steer_diff * params.steer_rate_weight
                + accel_diff * accel_diff * params.accel_rate_weight;
        }

        state = vehicle_model::step(
            &state,
            steer,
            accel,
            coeffs,
            params.pred_time_step_s,
            params.wheelbase_lf_m,
        );

        cost = cost + tracking_cost(&state, params);
    }

    cost
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// The per-step tracking terms: cte^2, epsi^2 and (v - v_ref)^2.
fn tracking_cost<D: DualNum<f64> + Copy>(
    state: &[D; super::NUM_STATES],
    params: &Params,
) -> D {
    let cte = state[4];
    let epsi = state[5];
    let speed_err = state[3] - D::from(params.ref_speed_ms);

    cte * cte * params.cte_weight
        + epsi * epsi * params.heading_err_weight
        + speed_err * speed_err * params.speed_err_weight
}

#[cfg(test)]
mod test {
    use super::*;

    /// Zero actuators on a perfect straight reference at reference speed
    /// cost nothing.
    #[test]
    fn test_perfect_tracking_zero_cost() {
        let params = Params::default();
        let state = VehicleState::from_errors(params.ref_speed_ms, 0.0, 0.0);
        let coeffs = [0.0, 0.0, 0.0, 0.0];
        let actuators = vec![0.0f64; NUM_ACTUATORS * params.num_actuator_steps()];

        let cost = rollout_cost(&actuators, &state, &coeffs, &params);
        assert!(cost.abs() < 1e-12);
    }

    /// An offset from the reference always costs more than none.
    #[test]
    fn test_cte_increases_cost() {
        let params = Params::default();
        let coeffs = [0.0, 0.0, 0.0, 0.0];
        let actuators = vec![0.0f64; NUM_ACTUATORS * params.num_actuator_steps()];

        let on_path = VehicleState::from_errors(params.ref_speed_ms, 0.0, 0.0);
        let off_path = VehicleState::from_errors(params.ref_speed_ms, 1.0, 0.0);

        let cost_on = rollout_cost(&actuators, &on_path, &coeffs, &params);
        let cost_off = rollout_cost(&actuators, &off_path, &coeffs, &params);

        assert!(cost_off > cost_on);
    }

    /// Jerky steering sequences cost more than constant ones of the same
    /// magnitude. Zero speed so the vehicle does not move and only the
    /// actuator terms differ between the two sequences.
    #[test]
    fn test_smoothness_penalty() {
        let params = Params::default();
        let coeffs = [0.0, 0.0, 0.0, 0.0];
        let state = VehicleState::from_errors(0.0, 0.0, 0.0);

        let n = params.num_actuator_steps();
        let mut constant = vec![0.0f64; NUM_ACTUATORS * n];
        let mut alternating = vec![0.0f64; NUM_ACTUATORS * n];
        for t in 0..n {
            constant[NUM_ACTUATORS * t] = 0.1;
            alternating[NUM_ACTUATORS * t] = if t % 2 == 0 { 0.1 } else { -0.1 };
        }

        let cost_const = rollout_cost(&constant, &state, &coeffs, &params);
        let cost_alt = rollout_cost(&alternating, &state, &coeffs, &params);

        assert!(cost_alt > cost_const);
    }
}
