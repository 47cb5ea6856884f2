//! Key analysis after sifting: QBER estimation and post-processing length.
//!
//! Post-processing here is a closed-form length estimate. No error
//! correcting code or hashing is run.

use crate::config::PostprocessingConfig;
use crate::errors::ConfigError;
use crate::session::SiftedKeyPair;
use crate::utils;
use rand::Rng;
use rand::seq::index;
use tracing::warn;

/// Sampled QBER of a sifted key pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QberEstimate {
    /// Fraction of sampled positions that disagree.
    pub qber: f64,
    pub errors: usize,
    pub sample_size: usize,
}

/// Estimates the QBER by publicly comparing a random sample of positions.
///
/// # Arguments
///
/// * `alice` - Alice's sifted key.
/// * `bob` - Bob's sifted key, index-aligned with Alice's.
/// * `disclose_rate` - Fraction of the key to disclose; at least one bit is always sampled.
/// * `rng` - Source of randomness for sampling without replacement.
///
/// # Returns
///
/// A `QberEstimate`, or a `ConfigError` when the keys differ in length or
/// the disclose rate is not a probability. Empty keys give a zero estimate.
pub fn calculate_qber<R: Rng + ?Sized>(
    alice: &[bool],
    bob: &[bool],
    disclose_rate: f64,
    rng: &mut R,
) -> Result<QberEstimate, ConfigError> {
    if alice.len() != bob.len() {
        return Err(ConfigError::KeyLengthMismatch {
            alice: alice.len(),
            bob: bob.len(),
        });
    }
    utils::validate_prob("disclose_rate", disclose_rate)?;

    let key_length = alice.len();
    if key_length == 0 {
        return Ok(QberEstimate {
            qber: 0.0,
            errors: 0,
            sample_size: 0,
        });
    }

    let sample_size = ((disclose_rate * key_length as f64) as usize).clamp(1, key_length);
    let errors = index::sample(rng, key_length, sample_size)
        .into_iter()
        .filter(|&i| alice[i] != bob[i])
        .count();

    Ok(QberEstimate {
        qber: errors as f64 / sample_size as f64,
        errors,
        sample_size,
    })
}

/// [`calculate_qber`] on an aligned key pair.
pub fn estimate_qber<R: Rng + ?Sized>(
    key: &SiftedKeyPair,
    disclose_rate: f64,
    rng: &mut R,
) -> Result<QberEstimate, ConfigError> {
    calculate_qber(key.alice(), key.bob(), disclose_rate, rng)
}

/// Step-by-step key lengths of the post-processing estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostprocessingReport {
    pub final_key_length: usize,
    pub after_parameter_estimation: usize,
    pub after_error_correction: usize,
    pub after_privacy_amplification: usize,
    /// Fraction of the key spent on error correction.
    pub ec_fraction: f64,
    pub qber: f64,
    /// QBER exceeded the configured ceiling; the key should not be trusted.
    pub qber_too_high: bool,
}

/// Closed-form post-processing estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Postprocessor {
    config: PostprocessingConfig,
}

impl Default for Postprocessor {
    fn default() -> Self {
        Self {
            config: PostprocessingConfig::default(),
        }
    }
}

impl Postprocessor {
    pub fn new(config: PostprocessingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PostprocessingConfig {
        &self.config
    }

    /// Estimates the final secret key length from a raw sifted length.
    ///
    /// Three shrinkage stages are applied in order: the disclosed fraction,
    /// error-correction leakage of `efficiency * h(qber)`, and the privacy
    /// amplification ratio. Above a QBER of one half the leakage saturates
    /// at one bit per bit. A QBER over the ceiling is flagged, not rejected.
    pub fn estimate(&self, raw_sifted_length: usize, qber: f64) -> PostprocessingReport {
        let qber = if qber.is_nan() { 1.0 } else { qber.clamp(0.0, 1.0) };
        let cfg = &self.config;

        let after_dr = raw_sifted_length as f64 * (1.0 - cfg.disclose_rate);
        let ec_fraction = cfg.error_correction_efficiency * utils::binary_entropy(qber.min(0.5));
        let after_ec = (after_dr * (1.0 - ec_fraction)).max(0.0);
        let after_pa = after_ec * (1.0 - cfg.privacy_amplification_ratio);

        let qber_too_high = qber > cfg.qber_ceiling;
        if qber_too_high {
            warn!(qber, ceiling = cfg.qber_ceiling, "QBER is too high for secure key generation");
        }

        PostprocessingReport {
            final_key_length: after_pa.floor() as usize,
            after_parameter_estimation: after_dr.floor() as usize,
            after_error_correction: after_ec.floor() as usize,
            after_privacy_amplification: after_pa.floor() as usize,
            ec_fraction,
            qber,
            qber_too_high,
        }
    }
}

/// [`Postprocessor::estimate`] with default parameters.
pub fn postprocess(raw_sifted_length: usize, qber: f64) -> PostprocessingReport {
    Postprocessor::default().estimate(raw_sifted_length, qber)
}
