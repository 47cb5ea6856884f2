//! Configuration for nodes, networks, sessions and post-processing.
//!
//! Every struct has defaults matching a typical 1 GHz fibre testbed and a
//! `validate` method. They derive serde so a service layer can load them
//! from JSON or YAML; the simulator itself never serializes anything.

use crate::errors::ConfigError;
use crate::protocols::qkd::bb84::DEFAULT_MISALIGNMENT_ERROR;
use crate::session::SessionParams;
use crate::{DetectorConfig, IntensityModulator, PhotonSource, utils};
use serde::{Deserialize, Serialize};

/// Transmitter light source configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Mean photon number per pulse, in (0, 1).
    pub mean_photon_number: f64,
    /// Intensity modulator extinction ratio in dB.
    pub extinction_ratio_db: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mean_photon_number: 0.2,
            extinction_ratio_db: 20.0,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        PhotonSource::new(self.mean_photon_number)?;
        IntensityModulator::new(self.extinction_ratio_db)?;
        Ok(())
    }
}

/// Per-node hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    /// Fraction of COW pairs used for monitoring when a session does not override it.
    pub cow_monitor_ratio: f64,
    /// Photon count at or below which a COW pulse is treated as empty.
    pub cow_detection_threshold: u32,
    /// Probability that a matched-basis BB84 detection reads the wrong bit.
    pub bb84_misalignment_error: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            detector: DetectorConfig::default(),
            cow_monitor_ratio: 0.1,
            cow_detection_threshold: 0,
            bb84_misalignment_error: DEFAULT_MISALIGNMENT_ERROR,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        self.detector.validate()?;
        utils::validate_prob("cow_monitor_ratio", self.cow_monitor_ratio)?;
        utils::validate_prob("bb84_misalignment_error", self.bb84_misalignment_error)?;
        Ok(())
    }
}

/// Network-wide configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Seed for the network's random generator. `None` draws fresh entropy.
    pub seed: Option<u64>,
    /// Fibre loss used by links created without an explicit attenuation.
    pub default_attenuation_db_per_km: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed: None,
            default_attenuation_db_per_km: 0.2,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let atten = self.default_attenuation_db_per_km;
        if !atten.is_finite() || atten < 0.0 {
            return Err(ConfigError::InvalidAttenuation(atten));
        }
        Ok(())
    }
}

/// Parameters of the closed-form post-processing estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessingConfig {
    /// Fraction of the sifted key disclosed for QBER estimation.
    pub disclose_rate: f64,
    /// Error-correction overhead over the Shannon limit, must exceed 1.
    pub error_correction_efficiency: f64,
    /// Fraction removed by privacy amplification.
    pub privacy_amplification_ratio: f64,
    /// QBER above which a warning is raised.
    pub qber_ceiling: f64,
}

impl Default for PostprocessingConfig {
    fn default() -> Self {
        Self {
            disclose_rate: 0.10,
            error_correction_efficiency: 1.2,
            privacy_amplification_ratio: 0.5,
            qber_ceiling: 0.10,
        }
    }
}

impl PostprocessingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        utils::validate_prob("disclose_rate", self.disclose_rate)?;
        utils::validate_prob("privacy_amplification_ratio", self.privacy_amplification_ratio)?;
        utils::validate_prob("qber_ceiling", self.qber_ceiling)?;
        if !(self.error_correction_efficiency > 1.0) || !self.error_correction_efficiency.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "error_correction_efficiency",
                reason: format!("must be greater than 1, got {}", self.error_correction_efficiency),
            });
        }
        Ok(())
    }
}

fn default_num_pulses() -> usize {
    10_000
}

fn default_pulse_interval_ns() -> f64 {
    1.0
}

/// DPS session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DpsParams {
    #[serde(default = "default_num_pulses")]
    pub num_pulses: usize,
    #[serde(default = "default_pulse_interval_ns")]
    pub pulse_interval_ns: f64,
    #[serde(default)]
    pub phase_flip_prob: f64,
}

impl Default for DpsParams {
    fn default() -> Self {
        Self {
            num_pulses: default_num_pulses(),
            pulse_interval_ns: default_pulse_interval_ns(),
            phase_flip_prob: 0.0,
        }
    }
}

impl DpsParams {
    pub fn new(num_pulses: usize, pulse_interval_ns: f64) -> Self {
        Self {
            num_pulses,
            pulse_interval_ns,
            ..Self::default()
        }
    }

    pub fn with_phase_flip_prob(mut self, p: f64) -> Self {
        self.phase_flip_prob = p;
        self
    }

    pub fn session(&self) -> SessionParams {
        SessionParams {
            num_pulses: self.num_pulses,
            pulse_interval_ns: self.pulse_interval_ns,
            phase_flip_prob: self.phase_flip_prob,
        }
    }
}

/// COW session parameters.
///
/// `monitor_ratio` and `detection_threshold` fall back to the sending and
/// receiving node's configuration when unset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CowParams {
    #[serde(default = "default_num_pulses")]
    pub num_pulses: usize,
    #[serde(default = "default_pulse_interval_ns")]
    pub pulse_interval_ns: f64,
    #[serde(default)]
    pub monitor_ratio: Option<f64>,
    #[serde(default)]
    pub detection_threshold: Option<u32>,
    #[serde(default)]
    pub phase_flip_prob: f64,
    #[serde(default)]
    pub bit_flip_prob: f64,
}

impl Default for CowParams {
    fn default() -> Self {
        Self {
            num_pulses: default_num_pulses(),
            pulse_interval_ns: default_pulse_interval_ns(),
            monitor_ratio: None,
            detection_threshold: None,
            phase_flip_prob: 0.0,
            bit_flip_prob: 0.0,
        }
    }
}

impl CowParams {
    pub fn new(num_pulses: usize, pulse_interval_ns: f64) -> Self {
        Self {
            num_pulses,
            pulse_interval_ns,
            ..Self::default()
        }
    }

    pub fn with_monitor_ratio(mut self, ratio: f64) -> Self {
        self.monitor_ratio = Some(ratio);
        self
    }

    pub fn with_detection_threshold(mut self, photons: u32) -> Self {
        self.detection_threshold = Some(photons);
        self
    }

    pub fn with_phase_flip_prob(mut self, p: f64) -> Self {
        self.phase_flip_prob = p;
        self
    }

    pub fn with_bit_flip_prob(mut self, p: f64) -> Self {
        self.bit_flip_prob = p;
        self
    }

    pub fn session(&self) -> SessionParams {
        SessionParams {
            num_pulses: self.num_pulses,
            pulse_interval_ns: self.pulse_interval_ns,
            phase_flip_prob: self.phase_flip_prob,
        }
    }
}

/// BB84 session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bb84Params {
    #[serde(default = "default_num_pulses")]
    pub num_pulses: usize,
    #[serde(default = "default_pulse_interval_ns")]
    pub pulse_interval_ns: f64,
    #[serde(default)]
    pub phase_flip_prob: f64,
}

impl Default for Bb84Params {
    fn default() -> Self {
        Self {
            num_pulses: default_num_pulses(),
            pulse_interval_ns: default_pulse_interval_ns(),
            phase_flip_prob: 0.0,
        }
    }
}

impl Bb84Params {
    pub fn new(num_pulses: usize, pulse_interval_ns: f64) -> Self {
        Self {
            num_pulses,
            pulse_interval_ns,
            ..Self::default()
        }
    }

    pub fn with_phase_flip_prob(mut self, p: f64) -> Self {
        self.phase_flip_prob = p;
        self
    }

    pub fn session(&self) -> SessionParams {
        SessionParams {
            num_pulses: self.num_pulses,
            pulse_interval_ns: self.pulse_interval_ns,
            phase_flip_prob: self.phase_flip_prob,
        }
    }
}
