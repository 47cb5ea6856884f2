//! Fibre links: span loss, photon thinning and channel phase noise.

use crate::core::errors::ConfigError;
use crate::core::pulse::Encoding;
use crate::core::utils;
use rand::Rng;
use std::f64::consts::PI;

/// Fibre families understood by the link model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FiberKind {
    #[default]
    SingleMode,
    MultiMode,
}

/// Physical description of an optical fibre span.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fiber {
    pub length_km: f64,
    pub attenuation_db_per_km: f64,
    pub kind: FiberKind,
}

impl Fiber {
    pub fn single_mode(length_km: f64, attenuation_db_per_km: f64) -> Self {
        Self {
            length_km,
            attenuation_db_per_km,
            kind: FiberKind::SingleMode,
        }
    }

    /// Total loss over the span in dB.
    pub fn total_attenuation_db(&self) -> f64 {
        self.length_km * self.attenuation_db_per_km
    }

    /// Probability that a single photon survives the span: $10^{-L/10}$.
    pub fn transmission_probability(&self) -> f64 {
        10f64.powf(-self.total_attenuation_db() / 10.0)
    }
}

/// Lossy optical channel. Loss is symmetric, so one instance serves both
/// directions of a link.
#[derive(Clone, Debug, PartialEq)]
pub struct OpticalChannel {
    distance_km: f64,
    attenuation_db_per_km: f64,
    survival_probability: f64,
}

impl OpticalChannel {
    pub fn new(distance_km: f64, attenuation_db_per_km: f64) -> Result<Self, ConfigError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(ConfigError::InvalidDistance(distance_km));
        }
        if !attenuation_db_per_km.is_finite() || attenuation_db_per_km < 0.0 {
            return Err(ConfigError::InvalidAttenuation(attenuation_db_per_km));
        }

        let survival_probability = Fiber::single_mode(distance_km, attenuation_db_per_km)
            .transmission_probability()
            .clamp(0.0, 1.0);

        Ok(Self {
            distance_km,
            attenuation_db_per_km,
            survival_probability,
        })
    }

    pub fn from_fiber(fiber: &Fiber) -> Result<Self, ConfigError> {
        Self::new(fiber.length_km, fiber.attenuation_db_per_km)
    }

    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    pub fn attenuation_db_per_km(&self) -> f64 {
        self.attenuation_db_per_km
    }

    pub fn survival_probability(&self) -> f64 {
        self.survival_probability
    }

    /// Binomial thinning: each photon independently survives.
    pub fn transmit<R: Rng + ?Sized>(&self, photon_count: u32, rng: &mut R) -> u32 {
        if self.survival_probability >= 1.0 {
            return photon_count;
        }
        (0..photon_count)
            .filter(|_| rng.random::<f64>() < self.survival_probability)
            .count() as u32
    }
}

/// Phase noise picked up in the fibre.
///
/// Each flip event is a phase slip of $\pi$ that persists for the rest of
/// the session, so for phase-referenced pulses it inverts the phase
/// difference between the current pulse and its predecessor. For BB84 a
/// flip exchanges the two states of the pulse's basis.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseNoise {
    flip_prob: f64,
    offset: f64,
}

impl PhaseNoise {
    pub fn new(flip_prob: f64) -> Result<Self, ConfigError> {
        let flip_prob = utils::validate_prob("phase_flip_prob", flip_prob)?;
        Ok(Self {
            flip_prob,
            offset: 0.0,
        })
    }

    /// A noiseless channel.
    pub fn none() -> Self {
        Self {
            flip_prob: 0.0,
            offset: 0.0,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&mut self, encoding: Encoding, rng: &mut R) -> Encoding {
        let flip = self.flip_prob > 0.0 && rng.random_bool(self.flip_prob);

        match encoding {
            Encoding::Polarization(_) if flip => encoding.shifted(PI),
            Encoding::Polarization(_) => encoding,
            _ => {
                if flip {
                    self.offset = utils::wrap_phase(self.offset + PI);
                }
                encoding.shifted(self.offset)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pulse::Bb84State;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn survival_probability_follows_attenuation() {
        let channel = OpticalChannel::new(50.0, 0.2).unwrap();
        assert!((channel.survival_probability() - 0.1).abs() < 1e-12);

        let lossless = OpticalChannel::new(0.0, 0.2).unwrap();
        assert_eq!(lossless.survival_probability(), 1.0);
    }

    #[test]
    fn rejects_negative_geometry() {
        assert!(matches!(
            OpticalChannel::new(-1.0, 0.2),
            Err(ConfigError::InvalidDistance(_))
        ));
        assert!(matches!(
            OpticalChannel::new(1.0, -0.2),
            Err(ConfigError::InvalidAttenuation(_))
        ));
    }

    #[test]
    fn transmit_never_creates_photons() {
        let channel = OpticalChannel::new(10.0, 0.2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for n in 0..20 {
            assert!(channel.transmit(n, &mut rng) <= n);
        }
        let lossless = OpticalChannel::new(0.0, 0.2).unwrap();
        assert_eq!(lossless.transmit(5, &mut rng), 5);
    }

    #[test]
    fn fiber_reports_total_loss() {
        let fiber = Fiber::single_mode(20.0, 0.2);
        assert!((fiber.total_attenuation_db() - 4.0).abs() < 1e-12);
        let channel = OpticalChannel::from_fiber(&fiber).unwrap();
        assert!((channel.survival_probability() - fiber.transmission_probability()).abs() < 1e-12);
    }

    #[test]
    fn certain_flip_accumulates_phase_slips() {
        let mut noise = PhaseNoise::new(1.0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let first = noise.apply(Encoding::Phase(0.0), &mut rng).phase().unwrap();
        let second = noise.apply(Encoding::Phase(0.0), &mut rng).phase().unwrap();
        assert!(utils::phases_match(first, PI));
        assert!(utils::phases_match(second, 0.0));

        let state = noise.apply(Encoding::Polarization(Bb84State::One), &mut rng);
        assert_eq!(state, Encoding::Polarization(Bb84State::Zero));
    }

    #[test]
    fn no_noise_is_identity() {
        let mut noise = PhaseNoise::none();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let out = noise.apply(Encoding::Phase(1.25), &mut rng);
        assert_eq!(out, Encoding::Phase(1.25));
        assert!(PhaseNoise::new(1.1).is_err());
    }
}
