//! Input Validation for Release Parameters
//!
//! # Parameter Constraints
//!
//! ## Epsilon (ε)
//! - Must be finite and strictly positive; ε = 0 is rejected rather than
//!   standing in for "infinite noise"
//! - Smaller = more private, but more noise
//! - Values above [`LOOSE_EPSILON`] are accepted but offer little protection
//!
//! ## Sensitivity (Δf)
//! - Must be finite and non-negative; a zero-width BoundRange has zero
//!   sensitivity and releases the clamped value unchanged
//!
//! ## Bounds
//! - Both finite, lower ≤ upper

use crate::{GeoPrivError, Result};

/// Beyond this, privacy protection is negligible
pub const LOOSE_EPSILON: f64 = 10.0;

/// Validate epsilon parameter
pub fn validate_epsilon(epsilon: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(GeoPrivError::InvalidBudget(epsilon));
    }

    if epsilon > LOOSE_EPSILON {
        tracing::warn!(epsilon, "epsilon above {} gives little privacy protection", LOOSE_EPSILON);
    }

    Ok(())
}

/// Validate sensitivity parameter
pub fn validate_sensitivity(sensitivity: f64) -> Result<()> {
    if !sensitivity.is_finite() || sensitivity < 0.0 {
        return Err(GeoPrivError::InvalidParameter(format!(
            "sensitivity must be finite and non-negative, got {}",
            sensitivity
        )));
    }
    Ok(())
}

/// Validate a clamping interval
///
/// The width `upper - lower` must itself be finite, since every sensitivity
/// is derived from it.
pub fn validate_bounds(lower: f64, upper: f64) -> Result<()> {
    if !lower.is_finite() || !upper.is_finite() || lower > upper || !(upper - lower).is_finite() {
        return Err(GeoPrivError::InvalidBounds { lower, upper });
    }
    Ok(())
}

/// Validate a requested anonymity size
pub fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(GeoPrivError::InvalidParameter(
            "anonymity size k must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Validate a focal rank against the anonymity size (0 disables re-centering)
pub fn validate_focal_rank(focal_rank: usize, k: usize) -> Result<()> {
    if focal_rank > 0 && focal_rank >= k {
        return Err(GeoPrivError::InvalidParameter(format!(
            "focal rank {} must be below k = {}",
            focal_rank, k
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_epsilon_valid() {
        assert!(validate_epsilon(0.1).is_ok());
        assert!(validate_epsilon(1.0).is_ok());
        assert!(validate_epsilon(50.0).is_ok());
    }

    #[test]
    fn test_validate_epsilon_invalid() {
        assert_eq!(validate_epsilon(0.0), Err(GeoPrivError::InvalidBudget(0.0)));
        assert!(validate_epsilon(-1.0).is_err());
        assert!(validate_epsilon(f64::INFINITY).is_err());
        assert!(validate_epsilon(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_sensitivity() {
        assert!(validate_sensitivity(0.0).is_ok());
        assert!(validate_sensitivity(100.0).is_ok());
        assert!(validate_sensitivity(-1.0).is_err());
        assert!(validate_sensitivity(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(0.0, 100.0).is_ok());
        assert!(validate_bounds(5.0, 5.0).is_ok());
        assert_eq!(
            validate_bounds(10.0, 1.0),
            Err(GeoPrivError::InvalidBounds { lower: 10.0, upper: 1.0 })
        );
        assert!(validate_bounds(f64::NEG_INFINITY, 1.0).is_err());
        // Finite edges whose width overflows
        assert!(validate_bounds(-f64::MAX, f64::MAX).is_err());
    }

    #[test]
    fn test_validate_focal_rank() {
        assert!(validate_focal_rank(0, 1).is_ok());
        assert!(validate_focal_rank(3, 5).is_ok());
        assert!(validate_focal_rank(5, 5).is_err());
        assert!(validate_k(0).is_err());
    }
}
