//! BB84 over weak coherent pulses.

use super::{ProtocolKind, QkdProtocol};
use crate::errors::ConfigError;
use crate::session::{SessionRecord, SiftOutcome};
use crate::utils;
use crate::{Basis, Bb84State, Detector, Encoding, PhotonSource, Pulse, PulseRole, ReceivedPulse, SiftedKeyPair};
use rand::Rng;

/// Default probability that a matched-basis detection reads the wrong bit.
pub const DEFAULT_MISALIGNMENT_ERROR: f64 = 0.02;

/// Bob's record for one BB84 slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bb84Measurement {
    pub basis: Basis,
    pub click: bool,
    pub bit: Option<bool>,
}

/// BB84 over weak coherent pulses
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bb84 {
    misalignment_error: f64,
}

impl Default for Bb84 {
    fn default() -> Self {
        Self {
            misalignment_error: DEFAULT_MISALIGNMENT_ERROR,
        }
    }
}

impl Bb84 {
    pub fn new(misalignment_error: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            misalignment_error: utils::validate_prob("misalignment_error", misalignment_error)?,
        })
    }
}

impl QkdProtocol for Bb84 {
    type Measurement = Bb84Measurement;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Bb84
    }

    fn encode<R: Rng + ?Sized>(
        &self,
        source: &PhotonSource,
        num_pulses: usize,
        pulse_interval_ns: f64,
        rng: &mut R,
    ) -> Vec<Pulse> {
        (0..num_pulses)
            .map(|slot| {
                // Alice prepares one of the four states
                let bit = rng.random_bool(0.5);
                let basis = Basis::random(rng);
                Pulse {
                    time_slot: slot,
                    time_ns: slot as f64 * pulse_interval_ns,
                    photon_count: source.sample(rng),
                    encoding: Encoding::Polarization(Bb84State::encode(bit, basis)),
                    intended_bit: Some(bit),
                    role: PulseRole::None,
                }
            })
            .collect()
    }

    fn measure<R: Rng + ?Sized>(
        &self,
        received: &[ReceivedPulse],
        slot: usize,
        detector: &Detector,
        rng: &mut R,
    ) -> Bb84Measurement {
        let pulse = &received[slot];
        let basis = Basis::random(rng);
        let click = detector.detect(pulse.photon_count, rng);

        let bit = match (click, pulse.encoding) {
            (false, _) => None,
            (true, Encoding::Polarization(state)) if state.basis() == basis => {
                let misread = self.misalignment_error > 0.0 && rng.random_bool(self.misalignment_error);
                Some(state.bit() ^ misread)
            }
            // Wrong basis: the outcome is a coin flip
            (true, _) => Some(rng.random_bool(0.5)),
        };

        Bb84Measurement { basis, click, bit }
    }

    fn sift<R: Rng + ?Sized>(
        &self,
        record: &SessionRecord<Bb84Measurement>,
        _rng: &mut R,
    ) -> SiftOutcome {
        let mut key = SiftedKeyPair::new();

        // Bases are disclosed publicly; only matching ones with a click survive
        for (pulse, measurement) in record.sent.iter().zip(&record.measured) {
            let Encoding::Polarization(state) = pulse.encoding else {
                continue;
            };
            if state.basis() != measurement.basis || !measurement.click {
                continue;
            }
            if let (Some(alice_bit), Some(bob_bit)) = (pulse.intended_bit, measurement.bit) {
                key.push(alice_bit, bob_bit);
            }
        }

        SiftOutcome {
            key,
            monitoring: None,
        }
    }
}
