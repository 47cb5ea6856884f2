//! Receiver hardware: single-photon detectors and the DPS interferometer.

use crate::core::errors::ConfigError;
use crate::core::utils;
use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Physical parameters of a single-photon detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Probability that an incident photon triggers a click, in $(0, 1]$.
    pub quantum_efficiency: f64,
    /// Dark counts per nanosecond.
    pub dark_count_rate: f64,
    /// Detection gate width in nanoseconds.
    pub time_window_ns: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            quantum_efficiency: 0.9,
            dark_count_rate: 1e-7,
            time_window_ns: 1.0,
        }
    }
}

impl DetectorConfig {
    /// Probability of a dark count within one gate.
    pub fn dark_count_probability(&self) -> f64 {
        self.dark_count_rate * self.time_window_ns
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.quantum_efficiency > 0.0 && self.quantum_efficiency <= 1.0) {
            return Err(ConfigError::InvalidEfficiency(self.quantum_efficiency));
        }
        if !(self.dark_count_rate >= 0.0) || !(self.time_window_ns >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "dark_count_rate",
                reason: "dark count rate and time window must be non-negative".into(),
            });
        }
        utils::validate_prob("dark_count_probability", self.dark_count_probability())?;
        Ok(())
    }
}

/// Single-photon detector with finite efficiency and dark counts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detector {
    efficiency: f64,
    dark_count_probability: f64,
}

impl Detector {
    pub fn new(config: &DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            efficiency: config.quantum_efficiency,
            dark_count_probability: config.dark_count_probability(),
        })
    }

    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    pub fn dark_count_probability(&self) -> f64 {
        self.dark_count_probability
    }

    /// Returns whether the detector clicks.
    ///
    /// Real photons click with probability $1 - (1-\eta)^n$; failing that, a
    /// dark count may still fire. A click never tells which of the two it was.
    pub fn detect<R: Rng + ?Sized>(&self, incident_photons: u32, rng: &mut R) -> bool {
        if incident_photons > 0 {
            let miss_all = (1.0 - self.efficiency).powf(f64::from(incident_photons));
            if rng.random::<f64>() < 1.0 - miss_all {
                return true;
            }
        }
        rng.random::<f64>() < self.dark_count_probability
    }
}

/// Delay-line Mach-Zehnder interferometer used by DPS receivers.
///
/// Two consecutive pulses are recombined; the output ports see the
/// constructive and destructive parts of the interference.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Interferometer;

impl Interferometer {
    /// Returns the port probabilities `(constructive, destructive)`,
    /// i.e. $(\cos^2(\Delta\phi/2), \sin^2(\Delta\phi/2))$.
    pub fn interfere(&self, phase_prev: f64, phase_curr: f64) -> (f64, f64) {
        let delta = utils::normalize_phase_difference(phase_curr - phase_prev);

        // Balanced beam splitters: each port gets half of the summed amplitudes.
        let early = Complex64::from_polar(1.0, 0.0);
        let late = Complex64::from_polar(1.0, delta);
        let constructive = ((early + late) * 0.5).norm_sqr();
        let destructive = ((early - late) * 0.5).norm_sqr();

        (constructive, destructive)
    }
}
