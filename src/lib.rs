//! Simulation of prepare-and-measure quantum key distribution over lossy
//! optical links.
//!
//! Three protocols are modelled on top of weak coherent pulses: differential
//! phase shift (DPS), coherent one-way (COW) and BB84. Nodes are linked by
//! fibre channels and can chain keys over several hops as trusted relays.

pub mod config;
mod core;
pub mod network;
pub mod postprocessing;
pub mod protocols;
pub mod session;

pub use crate::config::{
    Bb84Params, CowParams, DpsParams, NetworkConfig, NodeConfig, PostprocessingConfig, SourceConfig,
};
pub use crate::core::{
    Basis, Bb84State, Detector, DetectorConfig, Encoding, Fiber, FiberKind, IntensityModulator,
    IntensityState, Interferometer, OpticalChannel, PhaseModulator, PhaseNoise, PhotonSource, Pulse,
    PulseRole, ReceivedPulse, errors, utils,
};
pub use crate::network::{ChannelLink, Network, Node, RelayOutcome, TrafficLogEntry};
pub use crate::postprocessing::{
    PostprocessingReport, Postprocessor, QberEstimate, calculate_qber, estimate_qber, postprocess,
};
pub use crate::protocols::qkd::{
    Bb84, Cow, Dps, MonitoringStats, ProtocolKind, QkdProtocol,
};
pub use crate::session::{
    SessionDriver, SessionOutcome, SessionParams, SessionRecord, SiftOutcome, SiftedKeyPair,
};
