//! Waypoint frame transformation
//!
//! Waypoints arrive in the global map (GM) frame but the optimiser works in
//! the vehicle body (VB) frame, in which the vehicle's position and heading
//! are identically zero. Solving in the body frame removes absolute-position
//! scale from the optimisation and keeps the polynomial fit well conditioned
//! near the origin.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector2;

// Internal
use crate::loc::Pose;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Transform GM-frame waypoints into the VB frame of the given pose.
///
/// Each waypoint is translated by the negative of the vehicle position and
/// then rotated by the negative of the vehicle heading.
pub fn waypoints_to_vb(
    pose_gm: &Pose,
    waypoints_m_gm: &[Vector2<f64>],
) -> Vec<Vector2<f64>> {
    let (sin_psi, cos_psi) = (-pose_gm.heading_rad).sin_cos();

    waypoints_m_gm
        .iter()
        .map(|wp| {
            let shifted = wp - pose_gm.position_m_gm;
            Vector2::new(
                shifted.x * cos_psi - shifted.y * sin_psi,
                shifted.x * sin_psi + shifted.y * cos_psi,
            )
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    /// Transforming the vehicle's own position always yields the origin.
    #[test]
    fn test_own_position_maps_to_origin() {
        let pose = Pose::new(12.3, -45.6, 2.1);
        let transformed = waypoints_to_vb(&pose, &[pose.position_m_gm]);

        assert!(transformed[0].x.abs() < 1e-12);
        assert!(transformed[0].y.abs() < 1e-12);
    }

    /// A point directly ahead along the heading maps to positive x, zero y.
    #[test]
    fn test_point_ahead_maps_to_positive_x() {
        let pose = Pose::new(3.0, 4.0, 0.7);
        let ahead = Vector2::new(
            3.0 + 5.0 * 0.7f64.cos(),
            4.0 + 5.0 * 0.7f64.sin(),
        );

        let transformed = waypoints_to_vb(&pose, &[ahead]);

        assert!((transformed[0].x - 5.0).abs() < 1e-12);
        assert!(transformed[0].y.abs() < 1e-12);
    }

    /// A point to the left of the vehicle has positive body-frame y.
    #[test]
    fn test_point_left_has_positive_y() {
        let pose = Pose::new(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        // Vehicle faces +GM_Y, so -GM_X is to its left
        let left = Vector2::new(-2.0, 0.0);

        let transformed = waypoints_to_vb(&pose, &[left]);

        assert!(transformed[0].y > 1.9);
        assert!(transformed[0].x.abs() < 1e-12);
    }
}
