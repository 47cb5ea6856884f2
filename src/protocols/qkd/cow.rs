//! Coherent-One-Way (COW) QKD.
//!
//! Pulses travel in pairs. A data pair carries one bit in the position of
//! its bright pulse: bit 0 is (off, on), bit 1 is (on, off). A monitor
//! pair has both pulses on and carries no bit; its phase coherence is
//! checked publicly to reveal tampering.
//!
//! Sifting keeps a data pair only when exactly one of its two pulses
//! clicked. Pairs with no click or with two clicks are dropped.

use super::{ProtocolKind, QkdProtocol};
use crate::errors::ConfigError;
use crate::session::{SessionRecord, SiftOutcome};
use crate::utils;
use crate::{
    Detector, Encoding, IntensityModulator, IntensityState, PhotonSource, Pulse, PulseRole,
    ReceivedPulse, SiftedKeyPair,
};
use rand::Rng;
use tracing::{trace, warn};

/// Monitoring success rates below this value suggest eavesdropping.
pub const MONITOR_ALARM_THRESHOLD: f64 = 0.9;

/// Carrier phase shared by every COW pulse.
const CARRIER_PHASE: f64 = 0.0;

/// Outcome of the monitor-pair check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitoringStats {
    pub attempted: usize,
    pub successful: usize,
}

impl MonitoringStats {
    /// Fraction of monitor pairs that clicked twice with matching phases.
    pub fn success_rate(&self) -> Option<f64> {
        if self.attempted == 0 {
            None
        } else {
            Some(self.successful as f64 / self.attempted as f64)
        }
    }

    pub fn is_suspicious(&self) -> bool {
        self.success_rate()
            .is_some_and(|rate| rate < MONITOR_ALARM_THRESHOLD)
    }
}

/// Bob's record for one COW slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CowMeasurement {
    pub click: bool,
    pub role: PulseRole,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cow {
    monitor_ratio: f64,
    modulator: IntensityModulator,
    detection_threshold: u32,
    bit_flip_prob: f64,
}

impl Cow {
    /// # Arguments
    ///
    /// * `monitor_ratio` - Probability that a pair is a monitor pair.
    /// * `modulator` - Transmitter intensity modulator.
    /// * `detection_threshold` - Pulses with at most this many photons are treated as empty.
    /// * `bit_flip_prob` - Independent flip probability applied to Bob's sifted key.
    pub fn new(
        monitor_ratio: f64,
        modulator: IntensityModulator,
        detection_threshold: u32,
        bit_flip_prob: f64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            monitor_ratio: utils::validate_prob("monitor_ratio", monitor_ratio)?,
            modulator,
            detection_threshold,
            bit_flip_prob: utils::validate_prob("bit_flip_prob", bit_flip_prob)?,
        })
    }

    pub fn monitor_ratio(&self) -> f64 {
        self.monitor_ratio
    }
}

impl QkdProtocol for Cow {
    type Measurement = CowMeasurement;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Cow
    }

    fn encode<R: Rng + ?Sized>(
        &self,
        source: &PhotonSource,
        num_pulses: usize,
        pulse_interval_ns: f64,
        rng: &mut R,
    ) -> Vec<Pulse> {
        let num_pairs = num_pulses / 2;
        let mut pulses = Vec::with_capacity(num_pairs * 2);
        let base_mu = source.mean_photon_number();

        for _ in 0..num_pairs {
            let (levels, roles, intended_bit) = if rng.random::<f64>() < self.monitor_ratio {
                (
                    [IntensityState::On, IntensityState::On],
                    [PulseRole::MonitorFirst, PulseRole::MonitorSecond],
                    None,
                )
            } else {
                let bit = rng.random_bool(0.5);
                let levels = if bit {
                    [IntensityState::On, IntensityState::Off]
                } else {
                    [IntensityState::Off, IntensityState::On]
                };
                (levels, [PulseRole::DataFirst, PulseRole::DataSecond], Some(bit))
            };

            for (level, role) in levels.into_iter().zip(roles) {
                let slot = pulses.len();
                let mu = self.modulator.modulate(base_mu, level);
                pulses.push(Pulse {
                    time_slot: slot,
                    time_ns: slot as f64 * pulse_interval_ns,
                    photon_count: source.sample_with(mu, rng),
                    encoding: Encoding::Intensity {
                        level,
                        phase: CARRIER_PHASE,
                    },
                    intended_bit,
                    role,
                });
            }
        }

        pulses
    }

    fn measure<R: Rng + ?Sized>(
        &self,
        received: &[ReceivedPulse],
        slot: usize,
        detector: &Detector,
        rng: &mut R,
    ) -> CowMeasurement {
        let pulse = &received[slot];
        let incident = if pulse.photon_count > self.detection_threshold {
            pulse.photon_count
        } else {
            0
        };

        CowMeasurement {
            click: detector.detect(incident, rng),
            role: pulse.role,
        }
    }

    fn sift<R: Rng + ?Sized>(
        &self,
        record: &SessionRecord<CowMeasurement>,
        rng: &mut R,
    ) -> SiftOutcome {
        let mut key = SiftedKeyPair::new();
        let mut monitoring = MonitoringStats::default();

        for (pair, first) in (0..record.len() / 2).map(|p| (p, 2 * p)) {
            let second = first + 1;
            let (m1, m2) = (&record.measured[first], &record.measured[second]);

            match (record.sent[first].role, record.sent[second].role) {
                (PulseRole::MonitorFirst, PulseRole::MonitorSecond) => {
                    monitoring.attempted += 1;
                    let coherent = match (
                        record.received[first].encoding.phase(),
                        record.received[second].encoding.phase(),
                    ) {
                        (Some(a), Some(b)) => utils::phases_match(a, b),
                        _ => false,
                    };
                    if m1.click && m2.click && coherent {
                        monitoring.successful += 1;
                    }
                }
                (PulseRole::DataFirst, PulseRole::DataSecond) => {
                    if m1.click == m2.click {
                        trace!(pair, both = m1.click, "ambiguous data pair dropped");
                        continue;
                    }
                    let Some(alice_bit) = record.sent[first].intended_bit else {
                        continue;
                    };
                    // A lone click on the first pulse reads as bit 1.
                    key.push(alice_bit, m1.click);
                }
                _ => {}
            }
        }

        key.flip_bob_bits(self.bit_flip_prob, rng);

        if monitoring.is_suspicious() {
            warn!(
                successful = monitoring.successful,
                attempted = monitoring.attempted,
                "COW monitoring success rate is low, possible eavesdropping or high channel loss"
            );
        }

        SiftOutcome {
            key,
            monitoring: Some(monitoring),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionDriver, SessionParams};
    use crate::{DetectorConfig, OpticalChannel};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cow(monitor_ratio: f64, bit_flip_prob: f64) -> Cow {
        Cow::new(monitor_ratio, IntensityModulator::new(20.0).unwrap(), 0, bit_flip_prob).unwrap()
    }

    #[test]
    fn odd_pulse_counts_drop_the_remainder() {
        let source = PhotonSource::new(0.5).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let pulses = cow(0.2, 0.0).encode(&source, 101, 1.0, &mut rng);
        assert_eq!(pulses.len(), 100);
        for (i, p) in pulses.iter().enumerate() {
            assert_eq!(p.time_slot, i);
        }
    }

    #[test]
    fn data_pairs_place_the_bright_pulse_by_bit() {
        let source = PhotonSource::new(0.5).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let pulses = cow(0.0, 0.0).encode(&source, 400, 1.0, &mut rng);

        for pair in pulses.chunks(2) {
            let bit = pair[0].intended_bit.unwrap();
            let level = |p: &Pulse| match p.encoding {
                Encoding::Intensity { level, .. } => level,
                _ => panic!("COW pulse without intensity encoding"),
            };
            if bit {
                assert_eq!((level(&pair[0]), level(&pair[1])), (IntensityState::On, IntensityState::Off));
            } else {
                assert_eq!((level(&pair[0]), level(&pair[1])), (IntensityState::Off, IntensityState::On));
            }
        }
    }

    #[test]
    fn all_monitor_train_yields_no_key() {
        let source = PhotonSource::new(0.5).unwrap();
        let channel = OpticalChannel::new(0.0, 0.2).unwrap();
        let detector = Detector::new(&DetectorConfig::default()).unwrap();
        let driver = SessionDriver::new(&source, &channel, &detector);
        let mut rng = ChaCha8Rng::seed_from_u64(10);

        let params = SessionParams {
            num_pulses: 200,
            pulse_interval_ns: 1.0,
            phase_flip_prob: 0.0,
        };
        let outcome = driver.run(&cow(1.0, 0.0), &params, &mut rng).unwrap();
        assert!(outcome.key.is_empty());
        assert_eq!(outcome.monitoring.unwrap().attempted, 100);
    }

    #[test]
    fn sifted_pairs_have_exactly_one_click() {
        let source = PhotonSource::new(0.8).unwrap();
        let channel = OpticalChannel::new(5.0, 0.2).unwrap();
        let detector = Detector::new(&DetectorConfig {
            dark_count_rate: 0.01,
            ..DetectorConfig::default()
        })
        .unwrap();
        let driver = SessionDriver::new(&source, &channel, &detector);
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let protocol = cow(0.1, 0.0);

        let params = SessionParams {
            num_pulses: 2_000,
            pulse_interval_ns: 1.0,
            phase_flip_prob: 0.0,
        };
        let record = driver.record(&protocol, &params, &mut rng).unwrap();
        let single_click_data_pairs = (0..record.len() / 2)
            .filter(|&p| record.sent[2 * p].role.is_data())
            .filter(|&p| record.measured[2 * p].click != record.measured[2 * p + 1].click)
            .count();

        let outcome = protocol.sift(&record, &mut rng);
        assert_eq!(outcome.key.len(), single_click_data_pairs);
    }

    #[test]
    fn monitoring_stats_flag_low_success() {
        let healthy = MonitoringStats {
            attempted: 10,
            successful: 9,
        };
        let degraded = MonitoringStats {
            attempted: 10,
            successful: 5,
        };
        assert!(!healthy.is_suspicious());
        assert!(degraded.is_suspicious());
        assert_eq!(MonitoringStats::default().success_rate(), None);
        assert!(!MonitoringStats::default().is_suspicious());
    }

    #[test]
    fn pulses_at_or_below_threshold_only_click_on_dark_counts() {
        let source = PhotonSource::new(0.9).unwrap();
        let channel = OpticalChannel::new(0.0, 0.2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(14);
        let params = SessionParams {
            num_pulses: 2_000,
            pulse_interval_ns: 1.0,
            phase_flip_prob: 0.0,
        };
        let protocol = Cow::new(0.2, IntensityModulator::new(20.0).unwrap(), 1_000, 0.0).unwrap();

        let ideal = Detector::new(&DetectorConfig {
            quantum_efficiency: 1.0,
            dark_count_rate: 0.0,
            time_window_ns: 1.0,
        })
        .unwrap();
        let driver = SessionDriver::new(&source, &channel, &ideal);
        let record = driver.record(&protocol, &params, &mut rng).unwrap();
        assert!(record.received.iter().any(|p| p.photon_count > 0));
        assert!(record.measured.iter().all(|m| !m.click));
        let outcome = protocol.sift(&record, &mut rng);
        assert!(outcome.key.is_empty());
        assert_eq!(outcome.monitoring.unwrap().successful, 0);

        let noisy = Detector::new(&DetectorConfig {
            quantum_efficiency: 1.0,
            dark_count_rate: 1.0,
            time_window_ns: 1.0,
        })
        .unwrap();
        let driver = SessionDriver::new(&source, &channel, &noisy);
        let record = driver.record(&protocol, &params, &mut rng).unwrap();
        assert!(record.measured.iter().all(|m| m.click));
        assert!(protocol.sift(&record, &mut rng).key.is_empty());
    }

    #[test]
    fn rejects_invalid_ratios() {
        let modulator = IntensityModulator::new(20.0).unwrap();
        assert!(Cow::new(1.5, modulator, 0, 0.0).is_err());
        assert!(Cow::new(0.1, modulator, 0, -0.1).is_err());
    }
}
