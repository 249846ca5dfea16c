//! Polynomial least-squares fitting and evaluation
//!
//! The reference path is represented as a low order polynomial fit to the
//! body-frame waypoints. The fit is a QR least-squares solve over the
//! Vandermonde design matrix, evaluation is by Horner's rule and is generic
//! over dual numbers so the same code runs inside the autodiff rollout.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Smallest acceptable magnitude for a diagonal element of the R factor.
/// Anything below this indicates a numerically degenerate design matrix,
/// for example near-duplicate x values after the frame transform.
const MIN_R_DIAG: f64 = 1e-10;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur when fitting the reference polynomial.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("x and y sequences must be the same length (got {0} and {1})")]
    LengthMismatch(usize, usize),

    #[error("Fit degree {degree} outside the valid range [1, {max_degree}]")]
    DegreeOutOfRange { degree: usize, max_degree: usize },

    #[error("Design matrix is numerically degenerate")]
    Degenerate,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Fit a polynomial of the given degree to the points `(xs[i], ys[i])`,
/// minimising the sum of squared residuals.
///
/// Returns the coefficients in ascending powers of x (`c[0] + c[1]*x + ...`,
/// `degree + 1` of them). The degree must satisfy
/// `1 <= degree <= xs.len() - 1`.
pub fn fit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Vec<f64>, FitError> {
    if xs.len() != ys.len() {
        return Err(FitError::LengthMismatch(xs.len(), ys.len()));
    }
    if degree < 1 || degree + 1 > xs.len() {
        return Err(FitError::DegreeOutOfRange {
            degree,
            max_degree: xs.len().saturating_sub(1),
        });
    }

    // Vandermonde design matrix, one row per point with columns of
    // successive powers of x
    let design = DMatrix::from_fn(xs.len(), degree + 1, |row, col| {
        xs[row].powi(col as i32)
    });
    let rhs = DVector::from_column_slice(ys);

    // Least squares via the thin QR decomposition: solve R c = Q^T y
    let qr = design.qr();
    let r = qr.r();

    // Check conditioning before the back substitution
    for i in 0..r.nrows().min(r.ncols()) {
        if r[(i, i)].abs() < MIN_R_DIAG {
            return Err(FitError::Degenerate);
        }
    }

    let qty = qr.q().transpose() * rhs;
    let coeffs = r
        .solve_upper_triangular(&qty)
        .ok_or(FitError::Degenerate)?;

    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(FitError::Degenerate);
    }

    Ok(coeffs.iter().cloned().collect())
}

/// Evaluate a polynomial (coefficients in ascending powers) at `x`.
///
/// Generic over dual numbers so the optimiser's rollout can differentiate
/// through the reference curve.
pub fn eval<D: DualNum<f64> + Copy>(coeffs: &[f64], x: D) -> D {
    let mut result = D::from(0.0);
    for &c in coeffs.iter().rev() {
        result = result * x + D::from(c);
    }
    result
}

/// Evaluate the first derivative of a polynomial (coefficients in ascending
/// powers) at `x`.
pub fn eval_deriv<D: DualNum<f64> + Copy>(coeffs: &[f64], x: D) -> D {
    let mut result = D::from(0.0);
    for i in (1..coeffs.len()).rev() {
        result = result * x + D::from(coeffs[i] * i as f64);
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;

    /// Fitting points generated exactly from a known polynomial must recover
    /// the original coefficients to within numerical tolerance.
    #[test]
    fn test_fit_round_trip() {
        let truth = [1.5, -0.2, 0.03, 0.004];
        let xs: Vec<f64> = (0..10).map(|i| i as f64 - 4.0).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| eval(&truth, x)).collect();

        let coeffs = fit(&xs, &ys, 3).unwrap();

        assert_eq!(coeffs.len(), 4);
        for (fitted, expected) in coeffs.iter().zip(truth.iter()) {
            assert!(
                (fitted - expected).abs() < 1e-9,
                "fitted {} expected {}",
                fitted,
                expected
            );
        }
    }

    #[test]
    fn test_fit_length_mismatch() {
        assert!(matches!(
            fit(&[0.0, 1.0, 2.0], &[0.0, 1.0], 1),
            Err(FitError::LengthMismatch(3, 2))
        ));
    }

    #[test]
    fn test_fit_degree_out_of_range() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [0.0, 1.0, 2.0];
        assert!(matches!(
            fit(&xs, &ys, 3),
            Err(FitError::DegreeOutOfRange { .. })
        ));
        assert!(matches!(
            fit(&xs, &ys, 0),
            Err(FitError::DegreeOutOfRange { .. })
        ));
    }

    /// Near-duplicate x values make the degree 3 design matrix degenerate.
    #[test]
    fn test_fit_degenerate() {
        let xs = [1.0, 1.0, 1.0, 1.0];
        let ys = [0.0, 0.5, 1.0, 1.5];
        assert!(matches!(fit(&xs, &ys, 3), Err(FitError::Degenerate)));
    }

    #[test]
    fn test_eval_horner() {
        // 2 + 3x + x^2 at x = 2 is 12
        assert!((eval(&[2.0, 3.0, 1.0], 2.0f64) - 12.0).abs() < 1e-12);
        // Derivative 3 + 2x at x = 2 is 7
        assert!((eval_deriv(&[2.0, 3.0, 1.0], 2.0f64) - 7.0).abs() < 1e-12);
    }
}
