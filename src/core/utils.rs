//! Utility functions shared by the hardware models and estimators.
//!
//! This module contains helper functions for:
//! - Probability validation.
//! - Phase arithmetic on the circle.
//! - Decibel conversions.
//! - Binary Shannon entropy.

use crate::core::errors::ConfigError;
use std::f64::consts::{PI, TAU};

/// Tolerance used when comparing phases.
pub const PHASE_TOLERANCE: f64 = 1e-9;

/// Checks that `value` is a probability in $[0, 1]$.
pub fn validate_prob(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidProbability { name, value });
    }
    Ok(value)
}

/// Wraps a phase into $[0, 2\pi)$.
pub fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Normalizes a phase difference into $(-\pi, \pi]$.
pub fn normalize_phase_difference(delta: f64) -> f64 {
    let wrapped = wrap_phase(delta);
    if wrapped > PI { wrapped - TAU } else { wrapped }
}

/// Returns true when two phases coincide on the circle.
pub fn phases_match(a: f64, b: f64) -> bool {
    normalize_phase_difference(b - a).abs() < PHASE_TOLERANCE
}

/// Converts a ratio in decibels to a linear power ratio.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Binary Shannon entropy $h(x) = -x\log_2 x - (1-x)\log_2(1-x)$.
///
/// Defined as zero at both endpoints and outside $(0, 1)$.
pub fn binary_entropy(x: f64) -> f64 {
    if x <= 0.0 || x >= 1.0 {
        return 0.0;
    }
    -x * x.log2() - (1.0 - x) * (1.0 - x).log2()
}
