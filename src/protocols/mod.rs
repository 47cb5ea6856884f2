//! Quantum Cryptography Protocols.
//!
//! This module contains the QKD protocols driven by the session engine.

pub mod qkd;
pub use qkd::{ProtocolKind, QkdProtocol, bb84, cow, dps};
