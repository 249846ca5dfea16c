//! # MPC controller library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to
//! access items defined inside the controller crate.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// Localisation types - the vehicle's pose in the global map frame
pub mod loc;

/// Model predictive control module - converts reference waypoints and vehicle state into actuator
/// commands
pub mod mpc_ctrl;

/// Simulation plant - a minimal kinematic vehicle and synthetic track for closed loop runs
pub mod sim;

/// Telemetry boundary - typed representation of the transport layer's JSON telemetry
pub mod telemetry;
