//! Quantum Key Distribution (QKD) Protocols.
//!
//! This module contains the prepare-and-measure protocols simulated over
//! weak coherent pulses:
//! - **DPS**: bits in the phase difference of consecutive pulses.
//! - **COW**: bits in the position of a pulse within a pulse pair.
//! - **BB84**: bits in one of two conjugate bases.
//!
//! Every protocol implements [`QkdProtocol`]; the shared
//! [`SessionDriver`](crate::session::SessionDriver) drives any of them.

pub mod bb84;
pub mod cow;
pub mod dps;

use crate::errors::ConfigError;
use crate::session::{SessionRecord, SiftOutcome};
use crate::{Detector, Pulse, PhotonSource, ReceivedPulse};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use bb84::{Bb84, Bb84Measurement};
pub use cow::{Cow, CowMeasurement, MONITOR_ALARM_THRESHOLD, MonitoringStats};
pub use dps::{Dps, DpsMeasurement};

/// The protocols the simulator knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Dps,
    Cow,
    Bb84,
}

impl FromStr for ProtocolKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dps" => Ok(Self::Dps),
            "cow" => Ok(Self::Cow),
            "bb84" => Ok(Self::Bb84),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dps => write!(f, "dps"),
            Self::Cow => write!(f, "cow"),
            Self::Bb84 => write!(f, "bb84"),
        }
    }
}

/// A prepare-and-measure QKD protocol.
///
/// Implementors supply the transmitter's encode step, the receiver's
/// per-pulse decode step, and the public sifting procedure. Any state
/// carried across pulses lives inside a single `encode` call, so nothing
/// leaks from one session into the next.
pub trait QkdProtocol {
    /// Receiver-side record for one time slot.
    type Measurement: Clone + fmt::Debug;

    fn kind(&self) -> ProtocolKind;

    /// Prepares the full pulse train for one session.
    fn encode<R: Rng + ?Sized>(
        &self,
        source: &PhotonSource,
        num_pulses: usize,
        pulse_interval_ns: f64,
        rng: &mut R,
    ) -> Vec<Pulse>;

    /// Measures the pulse at `slot`. `received` holds every pulse that has
    /// arrived so far, indexed by slot, with `slot` the last entry.
    fn measure<R: Rng + ?Sized>(
        &self,
        received: &[ReceivedPulse],
        slot: usize,
        detector: &Detector,
        rng: &mut R,
    ) -> Self::Measurement;

    /// Public reconciliation turning a finished session into a key pair.
    fn sift<R: Rng + ?Sized>(
        &self,
        record: &SessionRecord<Self::Measurement>,
        rng: &mut R,
    ) -> SiftOutcome;
}
