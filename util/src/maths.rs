//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Clamp a value between a minimum and maximum.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Convert an angle in degrees into radians.
pub fn deg_to_rad<T>(angle_deg: T) -> T
where
    T: Float
{
    angle_deg * T::from(std::f64::consts::PI).unwrap() / T::from(180).unwrap()
}

/// Convert an angle in radians into degrees.
pub fn rad_to_deg<T>(angle_rad: T) -> T
where
    T: Float
{
    angle_rad * T::from(180).unwrap() / T::from(std::f64::consts::PI).unwrap()
}
