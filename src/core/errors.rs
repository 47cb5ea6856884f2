//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Mean photon number must lie in (0, 1) for weak coherent pulses, got {0}")]
    InvalidMeanPhotonNumber(f64),

    #[error("Extinction ratio must be positive in dB, got {0}")]
    InvalidExtinctionRatio(f64),

    #[error("Invalid probability for {name}: {value}. Must be between 0.0 and 1.0")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("Quantum efficiency must lie in (0, 1], got {0}")]
    InvalidEfficiency(f64),

    #[error("Distance must be finite and non-negative, got {0} km")]
    InvalidDistance(f64),

    #[error("Attenuation must be finite and non-negative, got {0} dB/km")]
    InvalidAttenuation(f64),

    #[error("Sifted keys differ in length (alice: {alice}, bob: {bob})")]
    KeyLengthMismatch { alice: usize, bob: usize },

    #[error("Modulator state must be 'on' or 'off', got '{0}'")]
    UnknownModulatorState(String),

    #[error("Unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("Node '{0}' does not exist")]
    UnknownNode(String),

    #[error("Node with ID '{0}' already exists")]
    DuplicateNode(String),

    #[error("No channel defined between '{from}' and '{to}'")]
    NoLink { from: String, to: String },

    #[error("Nodes '{a}' and '{b}' are already connected")]
    AlreadyConnected { a: String, b: String },

    #[error("Node '{0}' cannot be linked to itself")]
    SelfLink(String),

    #[error("Path must start with '{sender}' and end with '{receiver}'")]
    PathEndpointMismatch { sender: String, receiver: String },

    #[error("Path must contain at least two nodes, got {0}")]
    PathTooShort(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QkdError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}
