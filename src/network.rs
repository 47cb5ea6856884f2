//! QKD network: nodes, optical links and trusted-relay key chaining.

use crate::config::{Bb84Params, CowParams, DpsParams, NetworkConfig, NodeConfig};
use crate::errors::{ConfigError, QkdError, TopologyError};
use crate::protocols::qkd::{Bb84, Cow, Dps, MonitoringStats, ProtocolKind, QkdProtocol};
use crate::session::{SessionDriver, SessionOutcome, SessionParams, SiftedKeyPair};
use crate::{Detector, Fiber, IntensityModulator, OpticalChannel, PhotonSource};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An optical link shared by both endpoint nodes.
pub type ChannelLink = Arc<OpticalChannel>;

/// One completed key-generation session, as logged by the initiating node.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficLogEntry {
    pub protocol: ProtocolKind,
    pub partner_id: String,
    pub pulse_count: usize,
    pub sifted_length: usize,
    pub elapsed_ns: f64,
    pub monitoring: Option<MonitoringStats>,
}

/// A QKD-capable network node. It can act as transmitter, receiver or
/// trusted relay.
///
/// Hardware models are built once from the node's configuration; the
/// protocol objects that carry per-session state are rebuilt for every
/// session.
#[derive(Clone, Debug)]
pub struct Node {
    id: String,
    config: NodeConfig,
    source: PhotonSource,
    modulator: IntensityModulator,
    detector: Detector,
    links: HashMap<String, ChannelLink>,
    shared_keys: HashMap<(String, ProtocolKind), Vec<bool>>,
    traffic_log: Vec<TrafficLogEntry>,
}

impl Node {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Result<Self, QkdError> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            source: PhotonSource::new(config.source.mean_photon_number)?,
            modulator: IntensityModulator::new(config.source.extinction_ratio_db)?,
            detector: Detector::new(&config.detector)?,
            config,
            links: HashMap::new(),
            shared_keys: HashMap::new(),
            traffic_log: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn link(&self, neighbor_id: &str) -> Option<&ChannelLink> {
        self.links.get(neighbor_id)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &str> {
        self.links.keys().map(String::as_str)
    }

    pub fn traffic_log(&self) -> &[TrafficLogEntry] {
        &self.traffic_log
    }

    /// Most recent sifted key half shared with `partner` over `protocol`.
    pub fn shared_key(&self, partner: &str, protocol: ProtocolKind) -> Option<&[bool]> {
        self.shared_keys
            .get(&(partner.to_string(), protocol))
            .map(Vec::as_slice)
    }

    fn add_link(&mut self, neighbor_id: &str, link: ChannelLink) {
        self.links.insert(neighbor_id.to_string(), link);
    }

    /// Forwards a key segment from `from` towards `to` when acting as a
    /// trusted relay. Only succeeds if this node holds non-empty keys with both.
    pub fn relay_key(&self, from: &str, to: &str, protocol: ProtocolKind, key: &[bool]) -> Option<Vec<bool>> {
        let has_from = self.shared_key(from, protocol).is_some_and(|k| !k.is_empty());
        let has_to = self.shared_key(to, protocol).is_some_and(|k| !k.is_empty());
        if !has_from || !has_to {
            debug!(relay = %self.id, from, to, "relay lacks a key with one neighbour");
            return None;
        }
        Some(key.to_vec())
    }

    /// Runs a DPS session with `peer`, this node transmitting.
    pub fn generate_and_share_key<R: Rng + ?Sized>(
        &mut self,
        peer: &mut Node,
        params: &DpsParams,
        rng: &mut R,
    ) -> Result<SiftedKeyPair, QkdError> {
        let outcome = self.run_session(peer, &Dps::new(), &params.session(), rng)?;
        Ok(outcome.key)
    }

    /// Runs a COW session with `peer`, this node transmitting.
    pub fn generate_and_share_key_cow<R: Rng + ?Sized>(
        &mut self,
        peer: &mut Node,
        params: &CowParams,
        rng: &mut R,
    ) -> Result<SiftedKeyPair, QkdError> {
        let protocol = Cow::new(
            params.monitor_ratio.unwrap_or(self.config.cow_monitor_ratio),
            self.modulator,
            params
                .detection_threshold
                .unwrap_or(peer.config.cow_detection_threshold),
            params.bit_flip_prob,
        )?;
        let outcome = self.run_session(peer, &protocol, &params.session(), rng)?;
        Ok(outcome.key)
    }

    /// Runs a BB84 session with `peer`, this node transmitting.
    pub fn generate_and_share_key_bb84<R: Rng + ?Sized>(
        &mut self,
        peer: &mut Node,
        params: &Bb84Params,
        rng: &mut R,
    ) -> Result<SiftedKeyPair, QkdError> {
        let protocol = Bb84::new(peer.config.bb84_misalignment_error)?;
        let outcome = self.run_session(peer, &protocol, &params.session(), rng)?;
        Ok(outcome.key)
    }

    /// Runs one session of any protocol over the link to `peer`, stores the
    /// key halves on both nodes and logs the session here.
    pub fn run_session<P, R>(
        &mut self,
        peer: &mut Node,
        protocol: &P,
        params: &SessionParams,
        rng: &mut R,
    ) -> Result<SessionOutcome, QkdError>
    where
        P: QkdProtocol,
        R: Rng + ?Sized,
    {
        let channel = self
            .links
            .get(&peer.id)
            .cloned()
            .ok_or_else(|| TopologyError::NoLink {
                from: self.id.clone(),
                to: peer.id.clone(),
            })?;

        debug!(
            protocol = %protocol.kind(),
            alice = %self.id,
            bob = %peer.id,
            pulses = params.num_pulses,
            "starting key generation"
        );

        let driver = SessionDriver::new(&self.source, &channel, &peer.detector);
        let outcome = driver.run(protocol, params, rng)?;

        let kind = outcome.protocol;
        self.shared_keys
            .insert((peer.id.clone(), kind), outcome.key.alice().to_vec());
        peer.shared_keys
            .insert((self.id.clone(), kind), outcome.key.bob().to_vec());

        self.traffic_log.push(TrafficLogEntry {
            protocol: kind,
            partner_id: peer.id.clone(),
            pulse_count: outcome.num_pulses,
            sifted_length: outcome.key.len(),
            elapsed_ns: outcome.elapsed_ns,
            monitoring: outcome.monitoring,
        });

        Ok(outcome)
    }
}

/// Result of a multi-hop trusted-relay key establishment.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayOutcome {
    /// Every edge produced a key; `key` concatenates the transmitter-side halves.
    Established {
        key: Vec<bool>,
        segment_lengths: Vec<usize>,
    },
    /// An edge produced an empty key and the path was abandoned.
    Aborted { from: String, to: String },
}

impl RelayOutcome {
    pub fn key(&self) -> Option<&[bool]> {
        match self {
            RelayOutcome::Established { key, .. } => Some(key),
            RelayOutcome::Aborted { .. } => None,
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self, RelayOutcome::Established { .. })
    }
}

/// Registry of nodes and links plus the randomness that drives them.
pub struct Network<R: Rng = ChaCha8Rng> {
    config: NetworkConfig,
    nodes: HashMap<String, Node>,
    rng: R,
}

impl Network<ChaCha8Rng> {
    /// Creates an empty network seeded from `config`.
    pub fn new(config: NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            config,
            ..Self::with_rng(rng)
        })
    }

    /// Default configuration with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl Default for Network<ChaCha8Rng> {
    fn default() -> Self {
        Self::with_rng(ChaCha8Rng::from_rng(&mut rand::rng()))
    }
}

impl<R: Rng> Network<R> {
    /// Creates an empty network driven by an injected generator.
    pub fn with_rng(rng: R) -> Self {
        Self {
            config: NetworkConfig::default(),
            nodes: HashMap::new(),
            rng,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds a node. Ids must be unique across the network.
    pub fn add_node(&mut self, id: &str, config: NodeConfig) -> Result<&Node, QkdError> {
        if self.nodes.contains_key(id) {
            return Err(TopologyError::DuplicateNode(id.to_string()).into());
        }
        let node = Node::new(id, config)?;
        info!(node = id, "node added");
        Ok(&*self.nodes.entry(id.to_string()).or_insert(node))
    }

    /// Links two nodes with one shared optical channel.
    ///
    /// Reconnecting an already linked pair is rejected and leaves the
    /// existing link untouched.
    pub fn connect_nodes(
        &mut self,
        id_a: &str,
        id_b: &str,
        distance_km: f64,
        attenuation_db_per_km: f64,
    ) -> Result<ChannelLink, QkdError> {
        self.connect(id_a, id_b, OpticalChannel::new(distance_km, attenuation_db_per_km)?)
    }

    /// Links two nodes using the network's default fibre attenuation.
    pub fn link_nodes(&mut self, id_a: &str, id_b: &str, distance_km: f64) -> Result<ChannelLink, QkdError> {
        let attenuation = self.config.default_attenuation_db_per_km;
        self.connect_nodes(id_a, id_b, distance_km, attenuation)
    }

    /// Links two nodes over a described fibre span.
    pub fn connect_fiber(&mut self, id_a: &str, id_b: &str, fiber: &Fiber) -> Result<ChannelLink, QkdError> {
        self.connect(id_a, id_b, OpticalChannel::from_fiber(fiber)?)
    }

    fn connect(&mut self, id_a: &str, id_b: &str, channel: OpticalChannel) -> Result<ChannelLink, QkdError> {
        if id_a == id_b {
            return Err(TopologyError::SelfLink(id_a.to_string()).into());
        }
        self.require(id_a)?;
        self.require(id_b)?;
        if self.nodes[id_a].link(id_b).is_some() {
            return Err(TopologyError::AlreadyConnected {
                a: id_a.to_string(),
                b: id_b.to_string(),
            }
            .into());
        }

        let link: ChannelLink = Arc::new(channel);
        if let Some(node) = self.nodes.get_mut(id_a) {
            node.add_link(id_b, Arc::clone(&link));
        }
        if let Some(node) = self.nodes.get_mut(id_b) {
            node.add_link(id_a, Arc::clone(&link));
        }

        info!(
            a = id_a,
            b = id_b,
            distance_km = link.distance_km(),
            survival = link.survival_probability(),
            "nodes connected"
        );
        Ok(link)
    }

    /// DPS session from `alice` to `bob`.
    pub fn generate_and_share_key(
        &mut self,
        alice: &str,
        bob: &str,
        params: &DpsParams,
    ) -> Result<SiftedKeyPair, QkdError> {
        self.with_pair(alice, bob, |a, b, rng| a.generate_and_share_key(b, params, rng))
    }

    /// COW session from `alice` to `bob`.
    pub fn generate_and_share_key_cow(
        &mut self,
        alice: &str,
        bob: &str,
        params: &CowParams,
    ) -> Result<SiftedKeyPair, QkdError> {
        self.with_pair(alice, bob, |a, b, rng| a.generate_and_share_key_cow(b, params, rng))
    }

    /// BB84 session from `alice` to `bob`.
    pub fn generate_and_share_key_bb84(
        &mut self,
        alice: &str,
        bob: &str,
        params: &Bb84Params,
    ) -> Result<SiftedKeyPair, QkdError> {
        self.with_pair(alice, bob, |a, b, rng| a.generate_and_share_key_bb84(b, params, rng))
    }

    /// Trusted-relay DPS key along `path`.
    pub fn establish_end_to_end_raw_key(
        &mut self,
        sender_id: &str,
        receiver_id: &str,
        path: &[&str],
        params: &DpsParams,
    ) -> Result<RelayOutcome, QkdError> {
        self.relay(sender_id, receiver_id, path, |a, b, rng| {
            a.generate_and_share_key(b, params, rng)
        })
    }

    /// Trusted-relay COW key along `path`.
    pub fn establish_end_to_end_raw_key_cow(
        &mut self,
        sender_id: &str,
        receiver_id: &str,
        path: &[&str],
        params: &CowParams,
    ) -> Result<RelayOutcome, QkdError> {
        self.relay(sender_id, receiver_id, path, |a, b, rng| {
            a.generate_and_share_key_cow(b, params, rng)
        })
    }

    /// Trusted-relay BB84 key along `path`.
    pub fn establish_end_to_end_raw_key_bb84(
        &mut self,
        sender_id: &str,
        receiver_id: &str,
        path: &[&str],
        params: &Bb84Params,
    ) -> Result<RelayOutcome, QkdError> {
        self.relay(sender_id, receiver_id, path, |a, b, rng| {
            a.generate_and_share_key_bb84(b, params, rng)
        })
    }

    /// Runs one independent session per edge of `path` and concatenates the
    /// transmitter-side keys. Topology is checked for the whole path before
    /// any session runs.
    fn relay<F>(
        &mut self,
        sender_id: &str,
        receiver_id: &str,
        path: &[&str],
        mut run_edge: F,
    ) -> Result<RelayOutcome, QkdError>
    where
        F: FnMut(&mut Node, &mut Node, &mut R) -> Result<SiftedKeyPair, QkdError>,
    {
        if path.len() < 2 {
            return Err(TopologyError::PathTooShort(path.len()).into());
        }
        if path.first() != Some(&sender_id) || path.last() != Some(&receiver_id) {
            return Err(TopologyError::PathEndpointMismatch {
                sender: sender_id.to_string(),
                receiver: receiver_id.to_string(),
            }
            .into());
        }
        for edge in path.windows(2) {
            self.require_link(edge[0], edge[1])?;
        }

        let mut key = Vec::new();
        let mut segment_lengths = Vec::with_capacity(path.len() - 1);

        for edge in path.windows(2) {
            let (from, to) = (edge[0], edge[1]);
            let segment = self.with_pair(from, to, &mut run_edge)?;

            if segment.is_empty() {
                warn!(from, to, "empty sifted key on relay edge, aborting");
                return Ok(RelayOutcome::Aborted {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            segment_lengths.push(segment.len());
            key.extend_from_slice(segment.alice());
        }

        info!(
            sender = sender_id,
            receiver = receiver_id,
            hops = path.len() - 1,
            length = key.len(),
            "end-to-end raw key established"
        );
        Ok(RelayOutcome::Established {
            key,
            segment_lengths,
        })
    }

    fn with_pair<T, F>(&mut self, alice: &str, bob: &str, f: F) -> Result<T, QkdError>
    where
        F: FnOnce(&mut Node, &mut Node, &mut R) -> Result<T, QkdError>,
    {
        if alice == bob {
            return Err(TopologyError::SelfLink(alice.to_string()).into());
        }
        self.require(alice)?;
        self.require(bob)?;

        let Self { nodes, rng, .. } = self;
        match nodes.get_disjoint_mut([alice, bob]) {
            [Some(a), Some(b)] => f(a, b, rng),
            _ => Err(TopologyError::UnknownNode(alice.to_string()).into()),
        }
    }

    fn require(&self, id: &str) -> Result<&Node, TopologyError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TopologyError::UnknownNode(id.to_string()))
    }

    fn require_link(&self, from: &str, to: &str) -> Result<(), TopologyError> {
        if self.require(from)?.link(to).is_none() {
            self.require(to)?;
            return Err(TopologyError::NoLink {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_network() -> Network {
        let mut net = Network::seeded(7);
        net.add_node("alice", NodeConfig::default()).unwrap();
        net.add_node("bob", NodeConfig::default()).unwrap();
        net
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut net = two_node_network();
        let err = net.add_node("alice", NodeConfig::default()).unwrap_err();
        assert_eq!(err, QkdError::Topology(TopologyError::DuplicateNode("alice".into())));
        assert_eq!(net.len(), 2);
    }

    #[test]
    fn invalid_node_config_surfaces_at_construction() {
        let mut net = Network::seeded(0);
        let mut config = NodeConfig::default();
        config.source.mean_photon_number = 2.0;
        assert_eq!(
            net.add_node("x", config).unwrap_err(),
            QkdError::Config(ConfigError::InvalidMeanPhotonNumber(2.0))
        );
        assert!(net.is_empty());
    }

    #[test]
    fn link_is_shared_by_both_endpoints() {
        let mut net = two_node_network();
        let link = net.connect_nodes("alice", "bob", 10.0, 0.2).unwrap();
        let a_side = net.node("alice").unwrap().link("bob").unwrap();
        let b_side = net.node("bob").unwrap().link("alice").unwrap();
        assert!(Arc::ptr_eq(a_side, b_side));
        assert!(Arc::ptr_eq(a_side, &link));
        assert_eq!(net.node("alice").unwrap().neighbors().collect::<Vec<_>>(), vec!["bob"]);
    }

    #[test]
    fn reconnecting_is_rejected_and_keeps_the_existing_link() {
        let mut net = two_node_network();
        net.connect_nodes("alice", "bob", 10.0, 0.2).unwrap();
        let err = net.connect_nodes("bob", "alice", 50.0, 0.2).unwrap_err();
        assert!(matches!(err, QkdError::Topology(TopologyError::AlreadyConnected { .. })));
        assert_eq!(net.node("alice").unwrap().link("bob").unwrap().distance_km(), 10.0);
    }

    #[test]
    fn invalid_network_config_is_rejected_at_construction() {
        let result = Network::new(NetworkConfig {
            seed: Some(1),
            default_attenuation_db_per_km: -0.2,
        });
        assert!(matches!(result, Err(ConfigError::InvalidAttenuation(_))));
    }

    #[test]
    fn default_attenuation_comes_from_network_config() {
        let mut net = Network::new(NetworkConfig {
            seed: Some(1),
            default_attenuation_db_per_km: 0.5,
        })
        .unwrap();
        net.add_node("alice", NodeConfig::default()).unwrap();
        net.add_node("bob", NodeConfig::default()).unwrap();
        let link = net.link_nodes("alice", "bob", 4.0).unwrap();
        assert_eq!(link.attenuation_db_per_km(), 0.5);
        assert!((link.survival_probability() - 10f64.powf(-0.2)).abs() < 1e-12);
    }

    #[test]
    fn connecting_unknown_or_same_node_fails() {
        let mut net = two_node_network();
        assert!(matches!(
            net.connect_nodes("alice", "carol", 1.0, 0.2),
            Err(QkdError::Topology(TopologyError::UnknownNode(id))) if id == "carol"
        ));
        assert!(matches!(
            net.connect_nodes("alice", "alice", 1.0, 0.2),
            Err(QkdError::Topology(TopologyError::SelfLink(_)))
        ));
    }

    #[test]
    fn session_without_link_is_a_topology_error() {
        let mut net = two_node_network();
        let err = net
            .generate_and_share_key("alice", "bob", &DpsParams::new(100, 1.0))
            .unwrap_err();
        assert!(matches!(err, QkdError::Topology(TopologyError::NoLink { .. })));
        assert!(net.node("alice").unwrap().traffic_log().is_empty());
    }

    #[test]
    fn session_stores_keys_and_logs_on_initiator() {
        let mut net = two_node_network();
        net.connect_nodes("alice", "bob", 5.0, 0.2).unwrap();
        let key = net
            .generate_and_share_key_cow("alice", "bob", &CowParams::new(2_000, 1.0).with_monitor_ratio(0.2))
            .unwrap();

        let alice = net.node("alice").unwrap();
        let bob = net.node("bob").unwrap();
        assert_eq!(alice.shared_key("bob", ProtocolKind::Cow), Some(key.alice()));
        assert_eq!(bob.shared_key("alice", ProtocolKind::Cow), Some(key.bob()));
        assert_eq!(alice.shared_key("bob", ProtocolKind::Dps), None);

        let log = alice.traffic_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].protocol, ProtocolKind::Cow);
        assert_eq!(log[0].partner_id, "bob");
        assert_eq!(log[0].pulse_count, 2_000);
        assert_eq!(log[0].sifted_length, key.len());
        assert_eq!(log[0].elapsed_ns, 2_000.0);
        assert!(log[0].monitoring.is_some());
        assert!(bob.traffic_log().is_empty());
    }

    #[test]
    fn relay_needs_keys_with_both_neighbours() {
        let mut net = Network::seeded(3);
        for id in ["a", "r", "b"] {
            net.add_node(id, NodeConfig::default()).unwrap();
        }
        net.connect_nodes("a", "r", 1.0, 0.2).unwrap();
        net.connect_nodes("r", "b", 1.0, 0.2).unwrap();
        net.generate_and_share_key("a", "r", &DpsParams::new(500, 1.0)).unwrap();

        let relay = net.node("r").unwrap();
        assert_eq!(relay.relay_key("a", "b", ProtocolKind::Dps, &[true]), None);

        net.generate_and_share_key("r", "b", &DpsParams::new(500, 1.0)).unwrap();
        let relay = net.node("r").unwrap();
        assert_eq!(
            relay.relay_key("a", "b", ProtocolKind::Dps, &[true, false]),
            Some(vec![true, false])
        );
    }

    #[test]
    fn relay_refuses_when_an_edge_key_is_empty() {
        let mut net = Network::seeded(4);
        for id in ["a", "r", "b"] {
            net.add_node(id, NodeConfig::default()).unwrap();
        }
        net.connect_nodes("a", "r", 1.0, 0.2).unwrap();
        net.connect_nodes("r", "b", 10_000.0, 0.2).unwrap();
        let first = net.generate_and_share_key("a", "r", &DpsParams::new(1_000, 1.0)).unwrap();
        let second = net.generate_and_share_key("r", "b", &DpsParams::new(100, 1.0)).unwrap();
        assert!(!first.is_empty());
        assert!(second.is_empty());

        let relay = net.node("r").unwrap();
        assert_eq!(relay.shared_key("b", ProtocolKind::Dps), Some(&[][..]));
        assert_eq!(relay.relay_key("a", "b", ProtocolKind::Dps, &[true]), None);
    }
}
