//! # Telemetry boundary
//!
//! The controller receives its input as JSON-shaped telemetry from an
//! external transport. This module is the typed boundary for that data: it
//! deserialises the wire format, checks the parts only the boundary can
//! check (matching waypoint array lengths), and converts into the
//! strongly-typed `mpc_ctrl::InputData`. The core never sees raw wire data.
//!
//! Wire conventions: angles in radians, positive steering is a left turn,
//! speed in meters/second. Any transport with a different convention shall
//! convert before this boundary.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// Internal
use crate::loc::Pose;
use crate::mpc_ctrl::{ActuatorCmd, InputData, OutputData};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One tick of telemetry as it arrives on the wire.
#[derive(Clone, Debug, Deserialize)]
pub struct Telemetry {
    /// Vehicle position in the GM frame.
    ///
    /// Units: meters
    pub x: f64,
    /// Vehicle position in the GM frame.
    ///
    /// Units: meters
    pub y: f64,

    /// Vehicle heading in the GM frame.
    ///
    /// Units: radians
    pub psi: f64,

    /// Vehicle forward speed.
    ///
    /// Units: meters/second
    pub speed: f64,

    /// The steering command currently applied by the vehicle.
    ///
    /// Units: radians
    pub steering_angle: f64,

    /// The acceleration command currently applied by the vehicle.
    ///
    /// Units: normalised, -1 to +1
    pub throttle: f64,

    /// Reference waypoint x coordinates in the GM frame.
    ///
    /// Units: meters
    pub ptsx: Vec<f64>,

    /// Reference waypoint y coordinates in the GM frame.
    ///
    /// Units: meters
    pub ptsy: Vec<f64>,
}

/// The controller's reply on the wire: the command plus the two polylines a
/// visualiser can draw.
#[derive(Clone, Debug, Serialize)]
pub struct Response {
    /// Steering command, radians, positive left.
    pub steering_angle: f64,

    /// Acceleration command, -1 to +1.
    pub throttle: f64,

    /// Predicted trajectory x coordinates in the VB frame.
    pub mpc_x: Vec<f64>,
    /// Predicted trajectory y coordinates in the VB frame.
    pub mpc_y: Vec<f64>,

    /// Reference curve sample x coordinates in the VB frame.
    pub next_x: Vec<f64>,
    /// Reference curve sample y coordinates in the VB frame.
    pub next_y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while converting wire telemetry into controller input.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(
        "Waypoint arrays have mismatched lengths: ptsx has {ptsx_len}, \
        ptsy has {ptsy_len}"
    )]
    WaypointLengthMismatch { ptsx_len: usize, ptsy_len: usize },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Telemetry {
    /// Convert this telemetry tick into controller input data.
    ///
    /// Only the waypoint-array pairing is checked here. Finiteness and the
    /// minimum waypoint count are checked by `MpcCtrl` itself, which raises
    /// its own errors for them.
    pub fn into_input_data(self) -> Result<InputData, TelemetryError> {
        if self.ptsx.len() != self.ptsy.len() {
            return Err(TelemetryError::WaypointLengthMismatch {
                ptsx_len: self.ptsx.len(),
                ptsy_len: self.ptsy.len(),
            });
        }

        let waypoints_m_gm = self
            .ptsx
            .iter()
            .zip(self.ptsy.iter())
            .map(|(&x, &y)| Vector2::new(x, y))
            .collect();

        Ok(InputData {
            pose_gm: Pose::new(self.x, self.y, self.psi),
            speed_ms: self.speed,
            last_cmd: ActuatorCmd {
                steer_rad: self.steering_angle,
                accel: self.throttle,
            },
            waypoints_m_gm,
        })
    }
}

impl Response {
    /// Build a wire response from the controller's output.
    pub fn from_output(output: &OutputData) -> Self {
        Response {
            steering_angle: output.cmd.steer_rad,
            throttle: output.cmd.accel,
            mpc_x: output.predicted_m_vb.iter().map(|p| p[0]).collect(),
            mpc_y: output.predicted_m_vb.iter().map(|p| p[1]).collect(),
            next_x: output.ref_samples_m_vb.iter().map(|p| p[0]).collect(),
            next_y: output.ref_samples_m_vb.iter().map(|p| p[1]).collect(),
        }
    }
}
