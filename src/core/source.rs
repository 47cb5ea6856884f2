//! Transmitter hardware: weak coherent light source and modulators.

use crate::core::errors::ConfigError;
use crate::core::utils;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Attenuated laser emitting weak coherent pulses.
///
/// The photon number of each pulse is Poisson distributed with mean `mu`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhotonSource {
    mu: f64,
}

impl PhotonSource {
    /// Creates a source with mean photon number `mu`, which must lie in $(0, 1)$.
    pub fn new(mu: f64) -> Result<Self, ConfigError> {
        if !(mu > 0.0 && mu < 1.0) {
            return Err(ConfigError::InvalidMeanPhotonNumber(mu));
        }
        Ok(Self { mu })
    }

    pub fn mean_photon_number(&self) -> f64 {
        self.mu
    }

    /// Samples the photon count of one pulse at the configured mean.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        poisson(self.mu, rng)
    }

    /// Samples one pulse at an overriding mean without touching the configuration.
    pub fn sample_with<R: Rng + ?Sized>(&self, mu: f64, rng: &mut R) -> u32 {
        poisson(mu, rng)
    }
}

/// Knuth's multiplication method: multiply uniform draws until the running
/// product drops below $e^{-\mu}$. The number of draws minus one is the sample.
fn poisson<R: Rng + ?Sized>(mu: f64, rng: &mut R) -> u32 {
    if !(mu > 0.0) || !mu.is_finite() {
        return 0;
    }
    let limit = (-mu).exp();
    let mut product = 1.0;
    let mut draws = 0u32;
    while product > limit {
        draws += 1;
        product *= rng.random::<f64>();
    }
    draws.saturating_sub(1)
}

/// Output level of an intensity modulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntensityState {
    On,
    Off,
}

impl FromStr for IntensityState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(ConfigError::UnknownModulatorState(s.to_string())),
        }
    }
}

impl fmt::Display for IntensityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// Intensity modulator with a finite extinction ratio.
///
/// The "off" state only suppresses the light by the extinction ratio, so
/// residual photons still leak through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityModulator {
    extinction_ratio_db: f64,
    extinction_ratio_linear: f64,
}

impl IntensityModulator {
    pub fn new(extinction_ratio_db: f64) -> Result<Self, ConfigError> {
        if !(extinction_ratio_db > 0.0) || !extinction_ratio_db.is_finite() {
            return Err(ConfigError::InvalidExtinctionRatio(extinction_ratio_db));
        }
        Ok(Self {
            extinction_ratio_db,
            extinction_ratio_linear: utils::db_to_linear(extinction_ratio_db),
        })
    }

    pub fn extinction_ratio_db(&self) -> f64 {
        self.extinction_ratio_db
    }

    /// Effective mean photon number for the given modulator state.
    pub fn modulate(&self, base_mu: f64, state: IntensityState) -> f64 {
        match state {
            IntensityState::On => base_mu,
            IntensityState::Off => base_mu / self.extinction_ratio_linear,
        }
    }
}

/// Phase modulator: adds a shift to the carrier phase modulo $2\pi$.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PhaseModulator;

impl PhaseModulator {
    pub fn modulate(&self, current_phase: f64, shift: f64) -> f64 {
        utils::wrap_phase(current_phase + shift)
    }
}
