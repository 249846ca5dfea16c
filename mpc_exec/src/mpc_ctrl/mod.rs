//! Model predictive control module
//!
//! Once per telemetry tick `MpcCtrl` takes the vehicle's measured state and a
//! sparse set of global-frame reference waypoints and produces the next
//! actuator command (steering and acceleration) by solving a finite-horizon
//! constrained nonlinear program over the kinematic bicycle model.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cost;
mod frame;
mod optimizer;
mod params;
mod poly;
mod state;
mod vehicle_model;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use cost::*;
pub use frame::*;
pub use optimizer::*;
pub use params::*;
pub use poly::*;
pub use state::*;
pub use vehicle_model::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of elements in the optimisation state vector
/// (x, y, psi, v, cte, epsi).
pub const NUM_STATES: usize = 6;

/// The number of actuators commanded by the controller (steer, accel).
pub const NUM_ACTUATORS: usize = 2;

/// Degree of the reference polynomial fit to the transformed waypoints.
pub const REF_POLY_DEGREE: usize = 3;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MpcCtrl initialisation.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Failed to load the parameter file: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Parameters are invalid: {0}")]
    InvalidParams(#[from] ParamError),
}

/// Possible errors that can occur during MpcCtrl cyclic processing.
///
/// All of these are tick-local: the caller shall log them and carry on with
/// the next telemetry tick, none of them terminate the process.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error(
        "Too few waypoints for a degree {degree} reference fit: got {found}, \
        need at least {required}"
    )]
    TooFewWaypoints {
        found: usize,
        required: usize,
        degree: usize,
    },

    #[error("Telemetry contains non-finite values")]
    NonFiniteInput,

    #[error("Reference polynomial fit is degenerate: {0}")]
    FitDegenerate(#[from] FitError),

    #[error("MpcCtrl has not been initialised")]
    NotInitialised,
}
