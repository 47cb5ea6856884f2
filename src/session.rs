//! One key-generation session between a transmitter and a receiver.
//!
//! The driver runs a protocol's encode step, sends every pulse through the
//! channel, measures it in slot order and finally sifts the record.

use crate::errors::ConfigError;
use crate::protocols::qkd::{MonitoringStats, ProtocolKind, QkdProtocol};
use crate::{Detector, OpticalChannel, PhaseNoise, PhotonSource, Pulse, ReceivedPulse};
use rand::Rng;
use tracing::debug;

/// Aligned sifted key halves of the two parties.
///
/// Both halves always have the same length and index `i` of one
/// corresponds to index `i` of the other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiftedKeyPair {
    alice: Vec<bool>,
    bob: Vec<bool>,
}

impl SiftedKeyPair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a pair from two halves, rejecting halves of different length.
    pub fn from_parts(alice: Vec<bool>, bob: Vec<bool>) -> Result<Self, ConfigError> {
        if alice.len() != bob.len() {
            return Err(ConfigError::KeyLengthMismatch {
                alice: alice.len(),
                bob: bob.len(),
            });
        }
        Ok(Self { alice, bob })
    }

    /// Appends one agreed slot.
    pub fn push(&mut self, alice_bit: bool, bob_bit: bool) {
        self.alice.push(alice_bit);
        self.bob.push(bob_bit);
    }

    pub fn alice(&self) -> &[bool] {
        &self.alice
    }

    pub fn bob(&self) -> &[bool] {
        &self.bob
    }

    pub fn len(&self) -> usize {
        self.alice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alice.is_empty()
    }

    /// Flips each of Bob's bits independently with probability `p`.
    pub fn flip_bob_bits<R: Rng + ?Sized>(&mut self, p: f64, rng: &mut R) {
        if p <= 0.0 {
            return;
        }
        for bit in &mut self.bob {
            if rng.random_bool(p) {
                *bit = !*bit;
            }
        }
    }

    /// Number of positions where the halves disagree.
    pub fn mismatches(&self) -> usize {
        self.alice
            .iter()
            .zip(&self.bob)
            .filter(|(a, b)| a != b)
            .count()
    }

    pub fn into_parts(self) -> (Vec<bool>, Vec<bool>) {
        (self.alice, self.bob)
    }
}

/// Result of public reconciliation on one session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SiftOutcome {
    pub key: SiftedKeyPair,
    /// Monitoring-pair statistics, for protocols that send monitor pulses.
    pub monitoring: Option<MonitoringStats>,
}

/// Everything recorded during one session, densely indexed by time slot.
///
/// Lives only for the duration of a single key-generation call.
#[derive(Clone, Debug)]
pub struct SessionRecord<M> {
    pub sent: Vec<Pulse>,
    pub received: Vec<ReceivedPulse>,
    pub measured: Vec<M>,
}

impl<M> SessionRecord<M> {
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

/// Per-call session parameters shared by all protocols.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionParams {
    pub num_pulses: usize,
    pub pulse_interval_ns: f64,
    pub phase_flip_prob: f64,
}

impl SessionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pulse_interval_ns.is_finite() || self.pulse_interval_ns < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "pulse_interval_ns",
                reason: format!("must be finite and non-negative, got {}", self.pulse_interval_ns),
            });
        }
        crate::utils::validate_prob("phase_flip_prob", self.phase_flip_prob)?;
        Ok(())
    }
}

/// Summary of a finished session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOutcome {
    pub protocol: ProtocolKind,
    pub key: SiftedKeyPair,
    pub monitoring: Option<MonitoringStats>,
    /// Pulses requested for the session.
    pub num_pulses: usize,
    /// Pulses actually emitted (COW drops an odd trailing pulse).
    pub pulses_sent: usize,
    /// Simulated wall time of the pulse train in nanoseconds.
    pub elapsed_ns: f64,
}

/// Drives one protocol session: transmitter, channel, receiver, sifting.
///
/// The pulse loop is strictly sequential because DPS and COW measurements
/// depend on earlier slots.
#[derive(Clone, Copy, Debug)]
pub struct SessionDriver<'a> {
    source: &'a PhotonSource,
    channel: &'a OpticalChannel,
    detector: &'a Detector,
}

impl<'a> SessionDriver<'a> {
    pub fn new(source: &'a PhotonSource, channel: &'a OpticalChannel, detector: &'a Detector) -> Self {
        Self {
            source,
            channel,
            detector,
        }
    }

    /// Runs a complete session of `protocol`.
    ///
    /// # Arguments
    ///
    /// * `protocol` - Encode/decode/sift rules for this session.
    /// * `params` - Pulse count, pulse spacing and channel phase-flip probability.
    /// * `rng` - Randomness for every stochastic step.
    ///
    /// # Returns
    ///
    /// The sifted key pair plus session statistics, or a `ConfigError` if
    /// `params` are invalid. Losses and inconclusive events only shorten the key.
    pub fn run<P, R>(
        &self,
        protocol: &P,
        params: &SessionParams,
        rng: &mut R,
    ) -> Result<SessionOutcome, ConfigError>
    where
        P: QkdProtocol,
        R: Rng + ?Sized,
    {
        params.validate()?;
        let record = self.record(protocol, params, rng)?;
        let pulses_sent = record.len();
        let SiftOutcome { key, monitoring } = protocol.sift(&record, rng);

        debug!(
            protocol = %protocol.kind(),
            pulses = params.num_pulses,
            sent = pulses_sent,
            sifted = key.len(),
            "session complete"
        );

        Ok(SessionOutcome {
            protocol: protocol.kind(),
            key,
            monitoring,
            num_pulses: params.num_pulses,
            pulses_sent,
            elapsed_ns: params.num_pulses as f64 * params.pulse_interval_ns,
        })
    }

    /// Runs the physical part of a session and returns the raw record.
    pub fn record<P, R>(
        &self,
        protocol: &P,
        params: &SessionParams,
        rng: &mut R,
    ) -> Result<SessionRecord<P::Measurement>, ConfigError>
    where
        P: QkdProtocol,
        R: Rng + ?Sized,
    {
        let mut noise = PhaseNoise::new(params.phase_flip_prob)?;
        let sent = protocol.encode(self.source, params.num_pulses, params.pulse_interval_ns, rng);

        let mut received = Vec::with_capacity(sent.len());
        let mut measured = Vec::with_capacity(sent.len());

        for pulse in &sent {
            let photon_count = self.channel.transmit(pulse.photon_count, rng);
            let encoding = noise.apply(pulse.encoding, rng);
            received.push(ReceivedPulse {
                time_slot: pulse.time_slot,
                photon_count,
                encoding,
                role: pulse.role,
            });
            measured.push(protocol.measure(&received, pulse.time_slot, self.detector, rng));
        }

        Ok(SessionRecord {
            sent,
            received,
            measured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_rejects_mismatched_halves() {
        let err = SiftedKeyPair::from_parts(vec![true], vec![]).unwrap_err();
        assert_eq!(err, ConfigError::KeyLengthMismatch { alice: 1, bob: 0 });
    }

    #[test]
    fn push_keeps_halves_aligned() {
        let mut key = SiftedKeyPair::new();
        key.push(true, false);
        key.push(false, false);
        assert_eq!(key.len(), 2);
        assert_eq!(key.alice(), &[true, false]);
        assert_eq!(key.bob(), &[false, false]);
        assert_eq!(key.mismatches(), 1);

        let (alice, bob) = key.into_parts();
        assert_eq!((alice.len(), bob.len()), (2, 2));
    }

    #[test]
    fn certain_bit_flip_complements_bob() {
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(9);
        let mut key = SiftedKeyPair::from_parts(vec![true, false, true], vec![true, false, true]).unwrap();
        key.flip_bob_bits(1.0, &mut rng);
        assert_eq!(key.bob(), &[false, true, false]);
        assert_eq!(key.alice(), &[true, false, true]);
    }

    #[test]
    fn negative_pulse_interval_is_rejected() {
        let params = SessionParams {
            num_pulses: 10,
            pulse_interval_ns: -1.0,
            phase_flip_prob: 0.0,
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidParameter { name: "pulse_interval_ns", .. })
        ));
    }
}
