//! Domain value types shared by every component of the policy engine.

use std::collections::{HashMap, HashSet};

/// A count of the base Lightning/Bitcoin unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Satoshi(pub u64);

impl Satoshi {
	pub fn new(value: u64) -> Self {
		Self(value)
	}

	/// Fractional bitcoin value. Display-only; never used in monetary arithmetic.
	pub fn as_btc(self) -> f64 {
		self.0 as f64 / 100_000_000.0
	}
}

impl std::ops::Add for Satoshi {
	type Output = Satoshi;
	fn add(self, rhs: Satoshi) -> Satoshi {
		Satoshi(self.0 + rhs.0)
	}
}

impl std::fmt::Display for Satoshi {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} sat", self.0)
	}
}

/// A non-negative fee rate expressed in parts-per-million of the routed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FeePPM(pub u32);

impl FeePPM {
	pub fn new(ppm: u32) -> Self {
		Self(ppm)
	}

	/// Multiplicative rate, e.g. 1_000 ppm -> 0.001.
	pub fn as_rate(self) -> f64 {
		self.0 as f64 / 1_000_000.0
	}
}

impl std::fmt::Display for FeePPM {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ppm", self.0)
	}
}

/// Opaque 64-bit channel identifier assigned by the node client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Opaque node identifier; a hex-encoded compressed public key in practice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PubKey(pub String);

impl PubKey {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}
}

impl std::fmt::Display for PubKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<&str> for PubKey {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}

/// A gossiped network node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
	pub pubkey: PubKey,
	pub alias: String,
	/// Unix timestamp of the node's last gossip update.
	pub last_updated: i64,
	pub addresses: Vec<String>,
}

impl Node {
	/// True iff at least one advertised address is not a Tor onion address.
	pub fn is_clearnet(&self) -> bool {
		self.addresses.iter().any(|addr| !addr.contains("onion"))
	}
}

/// An undirected edge in the gossiped channel graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
	pub capacity: Satoshi,
	pub endpoint_a: PubKey,
	pub endpoint_b: PubKey,
}

/// A snapshot of the known network graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
	pub nodes: HashMap<PubKey, Node>,
	pub edges: Vec<Edge>,
}

/// One of the local node's channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
	pub channel_id: ChannelId,
	pub capacity: Satoshi,
	pub local_balance: Satoshi,
	pub local_outbound_fee: FeePPM,
	pub remote_balance: Satoshi,
	pub remote_node: Node,
	pub private: bool,
}

impl Channel {
	/// Percent of capacity currently on the local side, always in [0, 100].
	pub fn liquidity_percent(&self) -> f64 {
		if self.capacity.0 == 0 {
			return 0.0;
		}
		100.0 * self.local_balance.0 as f64 / self.capacity.0 as f64
	}

	/// Liquidity percent as if `delta` additional satoshis sat on the local side.
	pub fn liquidity_percent_with_delta(&self, delta: i64) -> f64 {
		if self.capacity.0 == 0 {
			return 0.0;
		}
		let hypothetical_local = self.local_balance.0 as i64 + delta;
		100.0 * hypothetical_local as f64 / self.capacity.0 as f64
	}
}

/// A single forwarded HTLC, as reported by the node client's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forward {
	pub timestamp: i64,
	pub channel_in: ChannelId,
	pub channel_out: ChannelId,
}

/// A `Node` enriched with graph-relative metrics, produced by the candidate engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeNode {
	pub node: Node,
	pub distance: i64,
	pub distant_neighbors: i64,
	pub channels: i64,
	pub capacity: Satoshi,
	pub neighbors: Vec<PubKey>,
}

pub type PubKeySet = HashSet<PubKey>;
