//! Differential-Phase-Shift (DPS) QKD.
//!
//! Alice sends a train of weak coherent pulses and encodes each bit in the
//! phase difference ($0$ or $\pi$) between a pulse and its predecessor.
//! Bob interferes every pair of consecutive pulses in a delay-line
//! Mach-Zehnder interferometer with one detector on each output port.

use super::{ProtocolKind, QkdProtocol};
use crate::session::{SessionRecord, SiftOutcome};
use crate::utils;
use crate::{
    Detector, Encoding, Interferometer, PhaseModulator, PhotonSource, Pulse, PulseRole,
    ReceivedPulse, SiftedKeyPair,
};
use rand::Rng;
use std::f64::consts::PI;

/// Bob's detector clicks for one time slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DpsMeasurement {
    /// Detector on the constructive port.
    pub click_d1: bool,
    /// Detector on the destructive port.
    pub click_d2: bool,
}

impl DpsMeasurement {
    /// D1 alone reads 0, D2 alone reads 1, anything else is inconclusive.
    pub fn bit(&self) -> Option<bool> {
        match (self.click_d1, self.click_d2) {
            (true, false) => Some(false),
            (false, true) => Some(true),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Dps {
    modulator: PhaseModulator,
    interferometer: Interferometer,
}

impl Dps {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QkdProtocol for Dps {
    type Measurement = DpsMeasurement;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Dps
    }

    fn encode<R: Rng + ?Sized>(
        &self,
        source: &PhotonSource,
        num_pulses: usize,
        pulse_interval_ns: f64,
        rng: &mut R,
    ) -> Vec<Pulse> {
        let mut pulses = Vec::with_capacity(num_pulses);
        // The only state carried from one pulse to the next.
        let mut last_phase: Option<f64> = None;

        for slot in 0..num_pulses {
            let photon_count = source.sample(rng);

            let (phase, intended_bit, role) = match last_phase {
                None => {
                    let phase = if rng.random_bool(0.5) { PI } else { 0.0 };
                    (phase, None, PulseRole::Reference)
                }
                Some(previous) => {
                    let bit = rng.random_bool(0.5);
                    let shift = if bit { PI } else { 0.0 };
                    (self.modulator.modulate(previous, shift), Some(bit), PulseRole::None)
                }
            };
            last_phase = Some(phase);

            pulses.push(Pulse {
                time_slot: slot,
                time_ns: slot as f64 * pulse_interval_ns,
                photon_count,
                encoding: Encoding::Phase(phase),
                intended_bit,
                role,
            });
        }

        pulses
    }

    fn measure<R: Rng + ?Sized>(
        &self,
        received: &[ReceivedPulse],
        slot: usize,
        detector: &Detector,
        rng: &mut R,
    ) -> DpsMeasurement {
        let current = &received[slot];
        let previous = slot.checked_sub(1).map(|i| &received[i]);

        let mut click_d1 = false;
        let mut click_d2 = false;

        // Interference needs light in both arms of the delay line.
        if let Some(previous) = previous {
            if previous.photon_count > 0 && current.photon_count > 0 {
                let phase_prev = previous.encoding.phase().unwrap_or(0.0);
                let phase_curr = current.encoding.phase().unwrap_or(0.0);
                let (p_constructive, _) = self.interferometer.interfere(phase_prev, phase_curr);

                // Both ports share one detector calibration.
                if rng.random::<f64>() < p_constructive {
                    click_d1 = detector.detect(1, rng);
                } else {
                    click_d2 = detector.detect(1, rng);
                }
            }
        }

        if !click_d1 {
            click_d1 = detector.detect(0, rng);
        }
        if !click_d2 {
            click_d2 = detector.detect(0, rng);
        }

        DpsMeasurement { click_d1, click_d2 }
    }

    fn sift<R: Rng + ?Sized>(
        &self,
        record: &SessionRecord<DpsMeasurement>,
        _rng: &mut R,
    ) -> SiftOutcome {
        let mut key = SiftedKeyPair::new();

        for i in 1..record.len() {
            let Some(bob_bit) = record.measured[i].bit() else {
                continue;
            };
            // Alice derives her bit from her own phase trace.
            let (Some(prev), Some(curr)) = (
                record.sent[i - 1].encoding.phase(),
                record.sent[i].encoding.phase(),
            ) else {
                continue;
            };
            let delta = utils::normalize_phase_difference(curr - prev);
            let alice_bit = delta.abs() >= utils::PHASE_TOLERANCE;

            key.push(alice_bit, bob_bit);
        }

        SiftOutcome {
            key,
            monitoring: None,
        }
    }
}
