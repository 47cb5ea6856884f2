mod channels;
pub mod errors;
mod measurements;
mod pulse;
mod source;
pub mod utils;

pub use channels::{Fiber, FiberKind, OpticalChannel, PhaseNoise};
pub use measurements::{Detector, DetectorConfig, Interferometer};
pub use pulse::{Basis, Bb84State, Encoding, Pulse, PulseRole, ReceivedPulse};
pub use source::{IntensityModulator, IntensityState, PhaseModulator, PhotonSource};
