//! # Localisation module
//!
//! This module provides the vehicle's pose as supplied by the external
//! localisation source. The controller never estimates the pose itself, it
//! consumes an already-localised one (see `telemetry`).

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The current pose (position and heading in the GM frame) of the vehicle.
///
/// More specifically this represents the Vehicle Body (VB) frame in the
/// Global Map (GM) frame. The vehicle moves in the plane so the pose is
/// planar.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    /// The position in the GM frame.
    ///
    /// Units: meters
    pub position_m_gm: Vector2<f64>,

    /// The heading (angle to the positive GM_X axis, right hand rule about
    /// GM_Z) of the vehicle.
    ///
    /// Units: radians
    pub heading_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Pose {
    fn default() -> Self {
        Pose {
            position_m_gm: Vector2::zeros(),
            heading_rad: 0.0,
        }
    }
}

impl Pose {
    /// Build a pose from raw position components and a heading.
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Pose {
            position_m_gm: Vector2::new(x_m, y_m),
            heading_rad,
        }
    }

    /// True if all components of the pose are finite.
    pub fn is_finite(&self) -> bool {
        self.position_m_gm.x.is_finite()
            && self.position_m_gm.y.is_finite()
            && self.heading_rad.is_finite()
    }
}
