//! Laplace Mechanism
//!
//! For a numeric query f with sensitivity Δf (the maximum change in f when
//! one record is added/removed), the Laplace mechanism releases:
//!
//! ```text
//! M(D) = f(D) + Lap(0, Δf/ε)
//! ```
//!
//! The Laplace distribution with scale b = Δf/ε has PDF:
//!
//! ```text
//! p(x) = (1/2b) * e^(-|x|/b)
//! ```
//!
//! # Inverse CDF Sampling
//!
//! With U uniform on (-0.5, 0.5), obtained from a uniform draw on (0, 1)
//! that excludes 0:
//!
//! ```text
//! X = -b * sign(U) * ln(1 - 2|U|)
//! ```
//!
//! Each sample consumes entropy from the caller's [`UniformSource`].

use crate::rng::{centered, UniformSource};
use crate::validation::{validate_epsilon, validate_sensitivity};
use crate::{GeoPrivError, Result};

/// Laplace mechanism for (ε, 0)-differential privacy
pub struct LaplaceMechanism;

impl LaplaceMechanism {
    /// Sample from Laplace(0, scale)
    ///
    /// A zero scale yields exactly 0 without drawing.
    pub fn sample<S: UniformSource + ?Sized>(scale: f64, source: &mut S) -> Result<f64> {
        if !scale.is_finite() || scale < 0.0 {
            return Err(GeoPrivError::InvalidParameter(format!(
                "Laplace scale must be finite and non-negative, got {}",
                scale
            )));
        }
        if scale == 0.0 {
            return Ok(0.0);
        }

        let u = centered(source)?;

        // Inverse CDF: -scale * sign(u) * ln(1 - 2|u|)
        let noise = -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln();

        Ok(noise)
    }

    /// Add Laplace noise to a value for (ε, 0)-differential privacy
    ///
    /// Returns value + Lap(0, sensitivity/epsilon).
    pub fn add_noise<S: UniformSource + ?Sized>(
        value: f64,
        sensitivity: f64,
        epsilon: f64,
        source: &mut S,
    ) -> Result<f64> {
        let scale = Self::compute_scale(sensitivity, epsilon)?;
        Ok(value + Self::sample(scale, source)?)
    }

    /// scale = Δf / ε
    pub fn compute_scale(sensitivity: f64, epsilon: f64) -> Result<f64> {
        validate_sensitivity(sensitivity)?;
        validate_epsilon(epsilon)?;
        Ok(sensitivity / epsilon)
    }

    /// Var(Lap(0, b)) = 2b²
    pub fn variance(scale: f64) -> f64 {
        2.0 * scale * scale
    }

    /// SD = √2 * b
    pub fn std_dev(scale: f64) -> f64 {
        Self::variance(scale).sqrt()
    }

    /// Half-width of the interval holding 95% of the noise
    ///
    /// P(|X| < x) = 1 - e^(-x/b), so x = -b * ln(0.05) ≈ 3b.
    pub fn confidence_interval_95(scale: f64) -> f64 {
        -scale * 0.05_f64.ln()
    }
}
