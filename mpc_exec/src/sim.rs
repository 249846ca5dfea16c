//! # Built-in simulation plant
//!
//! A minimal kinematic plant plus a synthetic track, used by the
//! executable's closed-loop demo mode and by end-to-end tests. It stands in
//! for the external vehicle/simulator so the full control loop can run
//! without any network dependency.
//!
//! The plant applies commands after a configurable actuation latency, which
//! is what makes the controller's latency compensation observable in the
//! loop.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;
use std::collections::VecDeque;

// Internal
use crate::mpc_ctrl::ActuatorCmd;
use crate::telemetry::Telemetry;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the simulation plant, loaded from `sim.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Integration time step of the plant.
    ///
    /// Units: seconds
    pub time_step_s: f64,

    /// Distance from the centre of gravity to the front axle.
    ///
    /// Units: meters
    pub wheelbase_lf_m: f64,

    /// Delay between a command being issued and the plant applying it.
    ///
    /// Units: seconds
    pub actuation_latency_s: f64,

    /// Scaling from normalised acceleration command to actual acceleration.
    ///
    /// Units: meters/second/second per unit command
    pub accel_scale_ms2: f64,

    /// Amplitude of the synthetic sine track.
    ///
    /// Units: meters
    pub track_amplitude_m: f64,

    /// Spatial wavelength of the synthetic sine track.
    ///
    /// Units: meters
    pub track_wavelength_m: f64,

    /// Spacing of the waypoints reported to the controller.
    ///
    /// Units: meters
    pub waypoint_spacing_m: f64,

    /// Number of waypoints reported to the controller each tick.
    pub num_waypoints: usize,
}

/// Ways in which the loaded sim parameters can be invalid. Any of these is
/// fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ParamError {
    #[error("time_step_s must be positive, got {0}")]
    NonPositiveTimeStep(f64),

    #[error("wheelbase_lf_m must be positive, got {0}")]
    NonPositiveWheelbase(f64),

    #[error("actuation_latency_s must be non-negative, got {0}")]
    NegativeLatency(f64),

    #[error("accel_scale_ms2 must be non-negative, got {0}")]
    NegativeAccelScale(f64),

    #[error("track_wavelength_m must be positive, got {0}")]
    NonPositiveWavelength(f64),

    #[error("waypoint_spacing_m must be positive, got {0}")]
    NonPositiveWaypointSpacing(f64),

    #[error("num_waypoints must be at least 4, got {0}")]
    TooFewWaypoints(usize),
}

/// The simulation plant state.
pub struct Sim {
    params: Params,

    // Pose and speed in the GM frame
    x_m: f64,
    y_m: f64,
    heading_rad: f64,
    speed_ms: f64,

    /// Commands waiting out the actuation latency, oldest at the front.
    pending_cmds: VecDeque<ActuatorCmd>,

    /// The command the plant is currently applying.
    applied_cmd: ActuatorCmd,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Params {
            time_step_s: 0.1,
            wheelbase_lf_m: 2.67,
            actuation_latency_s: 0.1,
            accel_scale_ms2: 5.0,
            track_amplitude_m: 4.0,
            track_wavelength_m: 120.0,
            waypoint_spacing_m: 5.0,
            num_waypoints: 6,
        }
    }
}

impl Sim {
    /// Build a plant at the start of the track.
    ///
    /// The parameters must have passed `Params::validate`.
    pub fn new(params: Params) -> Self {
        // Fill the latency queue with null commands so the plant applies
        // nothing until real commands have aged through it
        let delay_steps =
            (params.actuation_latency_s / params.time_step_s).round() as usize;
        let pending_cmds =
            std::iter::repeat(ActuatorCmd::default())
                .take(delay_steps)
                .collect();

        Sim {
            heading_rad: params.track_heading_rad(0.0),
            params,
            x_m: 0.0,
            y_m: 0.0,
            speed_ms: 0.0,
            pending_cmds,
            applied_cmd: ActuatorCmd::default(),
        }
    }

    /// Advance the plant by one time step under the given command.
    ///
    /// The command enters the latency queue; the command actually applied
    /// this step is whichever one has aged through it.
    pub fn step(&mut self, cmd: ActuatorCmd) {
        self.pending_cmds.push_back(cmd);
        // The queue is pre-filled in new() so this always succeeds
        if let Some(cmd) = self.pending_cmds.pop_front() {
            self.applied_cmd = cmd;
        }

        let dt = self.params.time_step_s;
        let accel_ms2 = self.applied_cmd.accel * self.params.accel_scale_ms2;

        self.x_m += self.speed_ms * self.heading_rad.cos() * dt;
        self.y_m += self.speed_ms * self.heading_rad.sin() * dt;
        self.heading_rad += self.speed_ms / self.params.wheelbase_lf_m
            * self.applied_cmd.steer_rad
            * dt;
        self.speed_ms = (self.speed_ms + accel_ms2 * dt).max(0.0);
    }

    /// Produce the telemetry the controller sees this tick.
    pub fn telemetry(&self) -> Telemetry {
        // Waypoints start from the track abeam the vehicle and march ahead
        let start_x = (self.x_m / self.params.waypoint_spacing_m).floor()
            * self.params.waypoint_spacing_m;

        let mut ptsx = Vec::with_capacity(self.params.num_waypoints);
        let mut ptsy = Vec::with_capacity(self.params.num_waypoints);
        for i in 0..self.params.num_waypoints {
            let x = start_x + self.params.waypoint_spacing_m * i as f64;
            ptsx.push(x);
            ptsy.push(self.params.track_y_m(x));
        }

        Telemetry {
            x: self.x_m,
            y: self.y_m,
            psi: self.heading_rad,
            speed: self.speed_ms,
            steering_angle: self.applied_cmd.steer_rad,
            throttle: self.applied_cmd.accel,
            ptsx,
            ptsy,
        }
    }

    /// Lateral distance from the vehicle to the track at the vehicle's x.
    ///
    /// A crude monitoring quantity for the demo loop, not the controller's
    /// own cross-track error.
    pub fn track_offset_m(&self) -> f64 {
        self.y_m - self.params.track_y_m(self.x_m)
    }

    /// Current forward speed of the plant.
    ///
    /// Units: meters/second
    pub fn speed_ms(&self) -> f64 {
        self.speed_ms
    }
}

impl Params {
    /// Check that the loaded parameters describe a usable plant.
    ///
    /// Called once at startup, an error here is fatal for the process. In
    /// particular the time step must be positive so the latency queue length
    /// (`actuation_latency_s / time_step_s`) is well defined.
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.time_step_s <= 0.0 {
            return Err(ParamError::NonPositiveTimeStep(self.time_step_s));
        }
        if self.wheelbase_lf_m <= 0.0 {
            return Err(ParamError::NonPositiveWheelbase(self.wheelbase_lf_m));
        }
        if self.actuation_latency_s < 0.0 {
            return Err(ParamError::NegativeLatency(self.actuation_latency_s));
        }
        if self.accel_scale_ms2 < 0.0 {
            return Err(ParamError::NegativeAccelScale(self.accel_scale_ms2));
        }
        if self.track_wavelength_m <= 0.0 {
            return Err(ParamError::NonPositiveWavelength(self.track_wavelength_m));
        }
        if self.waypoint_spacing_m <= 0.0 {
            return Err(ParamError::NonPositiveWaypointSpacing(
                self.waypoint_spacing_m,
            ));
        }
        // The controller needs at least degree + 1 points for its fit
        if self.num_waypoints < 4 {
            return Err(ParamError::TooFewWaypoints(self.num_waypoints));
        }

        Ok(())
    }

    /// Track centreline y at the given x.
    fn track_y_m(&self, x_m: f64) -> f64 {
        let k = 2.0 * std::f64::consts::PI / self.track_wavelength_m;
        self.track_amplitude_m * (k * x_m).sin()
    }

    /// Track tangent heading at the given x.
    fn track_heading_rad(&self, x_m: f64) -> f64 {
        let k = 2.0 * std::f64::consts::PI / self.track_wavelength_m;
        (self.track_amplitude_m * k * (k * x_m).cos()).atan()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::{MpcCtrl, Params as CtrlParams, Solver, StatusReport};
    use util::module::State;

    #[test]
    fn test_default_params_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut p = Params::default();
        p.time_step_s = 0.0;
        assert!(matches!(
            p.validate(),
            Err(ParamError::NonPositiveTimeStep(_))
        ));

        let mut p = Params::default();
        p.actuation_latency_s = -0.1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.num_waypoints = 3;
        assert!(p.validate().is_err());
    }

    /// Closed loop: the controller drives the plant along the sine track
    /// through the actuation-latency queue, reaching speed while the lateral
    /// offset from the track stays bounded.
    #[test]
    fn test_closed_loop_tracking() {
        let ctrl_params = CtrlParams::default();
        let mut ctrl = MpcCtrl {
            solver: Some(Solver::new(&ctrl_params)),
            params: ctrl_params,
            report: StatusReport::default(),
        };

        let mut sim = Sim::new(Params::default());

        let mut max_offset_m = 0.0f64;
        for _ in 0..300 {
            let input = sim.telemetry().into_input_data().unwrap();
            let (output, report) = ctrl.proc(&input).unwrap();
            assert!(!report.safe_cmd_issued);

            sim.step(output.cmd);
            max_offset_m = max_offset_m.max(sim.track_offset_m().abs());
        }

        assert!(sim.speed_ms() > 10.0);
        assert!(max_offset_m < 1.5, "max offset {} m", max_offset_m);
    }

    /// With no command the plant stays put.
    #[test]
    fn test_stationary_without_command() {
        let mut sim = Sim::new(Params::default());

        for _ in 0..10 {
            sim.step(ActuatorCmd::default());
        }

        let telem = sim.telemetry();
        assert_eq!(telem.x, 0.0);
        assert_eq!(telem.y, 0.0);
        assert_eq!(telem.speed, 0.0);
    }

    /// Commands take effect only after the configured latency has elapsed.
    #[test]
    fn test_actuation_latency() {
        let params = Params {
            actuation_latency_s: 0.2,
            time_step_s: 0.1,
            ..Params::default()
        };
        let mut sim = Sim::new(params);

        let throttle = ActuatorCmd {
            steer_rad: 0.0,
            accel: 1.0,
        };

        // Two steps of latency: the first two steps apply the null commands
        // pre-filled in the queue
        sim.step(throttle);
        assert_eq!(sim.speed_ms(), 0.0);
        sim.step(throttle);
        assert_eq!(sim.speed_ms(), 0.0);
        sim.step(throttle);
        assert!(sim.speed_ms() > 0.0);
    }

    /// The reported waypoints lie on the synthetic track.
    #[test]
    fn test_waypoints_on_track() {
        let params = Params::default();
        let sim = Sim::new(params.clone());

        let telem = sim.telemetry();
        assert_eq!(telem.ptsx.len(), params.num_waypoints);
        for (&x, &y) in telem.ptsx.iter().zip(telem.ptsy.iter()) {
            assert!((y - params.track_y_m(x)).abs() < 1e-12);
        }
    }

    /// Full throttle accelerates the plant forward along the track.
    #[test]
    fn test_throttle_moves_plant() {
        let mut sim = Sim::new(Params::default());

        for _ in 0..50 {
            sim.step(ActuatorCmd {
                steer_rad: 0.0,
                accel: 1.0,
            });
        }

        let telem = sim.telemetry();
        assert!(telem.x > 0.0);
        assert!(telem.speed > 0.0);
    }
}
