//! Optical pulses as recorded by the transmitter and seen by the receiver.

use crate::core::source::IntensityState;
use crate::core::utils;
use std::f64::consts::PI;

/// Conjugate measurement bases of BB84.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Basis {
    Rectilinear,
    Diagonal,
}

impl Basis {
    pub fn random<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            Basis::Diagonal
        } else {
            Basis::Rectilinear
        }
    }
}

/// The four BB84 states: $|0\rangle, |1\rangle$ and $|+\rangle, |-\rangle$.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bb84State {
    Zero,
    One,
    Plus,
    Minus,
}

impl Bb84State {
    pub fn encode(bit: bool, basis: Basis) -> Self {
        match (basis, bit) {
            (Basis::Rectilinear, false) => Self::Zero,
            (Basis::Rectilinear, true) => Self::One,
            (Basis::Diagonal, false) => Self::Plus,
            (Basis::Diagonal, true) => Self::Minus,
        }
    }

    pub fn basis(&self) -> Basis {
        match self {
            Self::Zero | Self::One => Basis::Rectilinear,
            Self::Plus | Self::Minus => Basis::Diagonal,
        }
    }

    pub fn bit(&self) -> bool {
        matches!(self, Self::One | Self::Minus)
    }

    /// The orthogonal state within the same basis.
    pub fn flipped(&self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
            Self::Plus => Self::Minus,
            Self::Minus => Self::Plus,
        }
    }
}

/// What a pulse carries, per protocol.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Encoding {
    /// DPS: absolute carrier phase in $[0, 2\pi)$.
    Phase(f64),
    /// COW: intensity level on a fixed carrier phase.
    Intensity { level: IntensityState, phase: f64 },
    /// BB84: one of four canonical states.
    Polarization(Bb84State),
}

impl Encoding {
    /// Carrier phase for phase-referenced encodings.
    pub fn phase(&self) -> Option<f64> {
        match self {
            Encoding::Phase(phase) | Encoding::Intensity { phase, .. } => Some(*phase),
            Encoding::Polarization(_) => None,
        }
    }

    /// Applies a phase offset; BB84 states flip within their basis when the
    /// offset is an odd multiple of $\pi$.
    pub fn shifted(&self, offset: f64) -> Self {
        match *self {
            Encoding::Phase(phase) => Encoding::Phase(utils::wrap_phase(phase + offset)),
            Encoding::Intensity { level, phase } => Encoding::Intensity {
                level,
                phase: utils::wrap_phase(phase + offset),
            },
            Encoding::Polarization(state) => {
                if utils::phases_match(offset, PI) {
                    Encoding::Polarization(state.flipped())
                } else {
                    Encoding::Polarization(state)
                }
            }
        }
    }
}

/// Protocol-specific role of a pulse within the train.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PulseRole {
    None,
    /// First DPS pulse; sets the phase reference and carries no bit.
    Reference,
    DataFirst,
    DataSecond,
    MonitorFirst,
    MonitorSecond,
}

impl PulseRole {
    pub fn is_data(&self) -> bool {
        matches!(self, PulseRole::DataFirst | PulseRole::DataSecond)
    }

    pub fn is_monitor(&self) -> bool {
        matches!(self, PulseRole::MonitorFirst | PulseRole::MonitorSecond)
    }
}

/// A pulse as emitted by the transmitter. Never mutated after recording.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    pub time_slot: usize,
    /// Emission time in nanoseconds since the start of the session.
    pub time_ns: f64,
    pub photon_count: u32,
    pub encoding: Encoding,
    pub intended_bit: Option<bool>,
    pub role: PulseRole,
}

/// A pulse after the channel: surviving photons and post-noise encoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReceivedPulse {
    pub time_slot: usize,
    pub photon_count: u32,
    pub encoding: Encoding,
    pub role: PulseRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bb84_states_round_trip_bit_and_basis() {
        for basis in [Basis::Rectilinear, Basis::Diagonal] {
            for bit in [false, true] {
                let state = Bb84State::encode(bit, basis);
                assert_eq!(state.basis(), basis);
                assert_eq!(state.bit(), bit);
                assert_eq!(state.flipped().bit(), !bit);
                assert_eq!(state.flipped().basis(), basis);
            }
        }
    }

    #[test]
    fn pi_shift_flips_polarization_and_rotates_phase() {
        let flipped = Encoding::Polarization(Bb84State::Plus).shifted(PI);
        assert_eq!(flipped, Encoding::Polarization(Bb84State::Minus));
        let unchanged = Encoding::Polarization(Bb84State::Zero).shifted(0.0);
        assert_eq!(unchanged, Encoding::Polarization(Bb84State::Zero));

        let phase = Encoding::Phase(PI).shifted(PI).phase().unwrap();
        assert!(phase.abs() < 1e-12);
    }
}
