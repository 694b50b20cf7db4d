//! The candidate engine: graph crawl producing a ranked list of peering targets relative to a
//! root node.

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::cancel::CancelHandle;
use crate::error::{EngineError, Result};
use crate::port::NodeClient;
use crate::types::{Graph, PubKey, PubKeySet, RelativeNode, Satoshi};

/// A neighbor further than this many hops is counted as a "distant neighbor".
const DISTANT_NEIGHBOR_LIMIT: i64 = 2;

/// Parameters for a candidate search.
#[derive(Debug, Clone)]
pub struct CandidatesRequest {
	/// Root node to measure distance from. `None` means the local node.
	pub pubkey: Option<PubKey>,
	pub min_capacity: Satoshi,
	pub min_channels: i64,
	pub min_distance: i64,
	pub min_distant_neighbors: i64,
	pub min_updated: i64,
	/// Pubkeys treated as if already channeled to the root, shortening BFS distance through them
	/// without counting as real channels.
	pub assumed: PubKeySet,
	pub limit: usize,
	pub clearnet_only: bool,
}

impl CandidatesRequest {
	/// Rejects requests with `min_distance < 2`: below that, the BFS "unreachable" default of 0
	/// is indistinguishable from a deliberately shallow search, which the core refuses to guess.
	pub fn validate(&self) -> Result<()> {
		if self.min_distance < 2 {
			return Err(EngineError::configuration("min_distance must be at least 2"));
		}
		Ok(())
	}
}

/// Runs a candidate search against a live node client: fetches the graph, resolves the root
/// pubkey (the local node's, unless overridden), and ranks candidates.
pub async fn candidates(
	client: &dyn NodeClient, cancel: &CancelHandle, request: &CandidatesRequest,
) -> Result<Vec<RelativeNode>> {
	request.validate()?;
	cancel.check()?;

	let root = match &request.pubkey {
		Some(pk) => pk.clone(),
		None => client.get_info(cancel).await.map_err(EngineError::port)?.pubkey,
	};

	cancel.check()?;
	let graph = client.describe_graph(cancel).await.map_err(EngineError::port)?;

	Ok(rank_candidates(&graph, &root, request))
}

/// Pure graph-crawl algorithm, independent of any node client: BFS distance, distant-neighbor
/// count, filter, sort, truncate. Exposed separately so it can be property-tested without a mock
/// port.
pub fn rank_candidates(graph: &Graph, root: &PubKey, request: &CandidatesRequest) -> Vec<RelativeNode> {
	let mut nodes: HashMap<PubKey, RelativeNode> = graph
		.nodes
		.iter()
		.map(|(pk, node)| {
			(
				pk.clone(),
				RelativeNode {
					node: node.clone(),
					distance: 0,
					distant_neighbors: 0,
					channels: 0,
					capacity: Satoshi(0),
					neighbors: Vec::new(),
				},
			)
		})
		.collect();

	for edge in &graph.edges {
		if let Some(a) = nodes.get_mut(&edge.endpoint_a) {
			a.neighbors.push(edge.endpoint_b.clone());
			a.capacity = a.capacity + edge.capacity;
			a.channels += 1;
		}
		if let Some(b) = nodes.get_mut(&edge.endpoint_b) {
			b.neighbors.push(edge.endpoint_a.clone());
			b.capacity = b.capacity + edge.capacity;
			b.channels += 1;
		}
	}

	for assumed in &request.assumed {
		if !nodes.contains_key(assumed) || !nodes.contains_key(root) {
			debug!("assumed pubkey {} not present in graph, ignoring", assumed);
			continue;
		}
		// Splice a synthetic edge: a routing-topology assumption, not a real channel, so
		// capacity and channel counts are left untouched.
		nodes.get_mut(root).unwrap().neighbors.push(assumed.clone());
		nodes.get_mut(assumed).unwrap().neighbors.push(root.clone());
	}

	if !nodes.contains_key(root) {
		return Vec::new();
	}

	let mut visited = PubKeySet::new();
	visited.insert(root.clone());
	nodes.get_mut(root).unwrap().distance = 0;
	let mut queue = VecDeque::new();
	queue.push_back(root.clone());

	while let Some(current) = queue.pop_front() {
		let current_distance = nodes[&current].distance;
		let neighbors = nodes[&current].neighbors.clone();
		for neighbor in neighbors {
			if visited.insert(neighbor.clone()) {
				if let Some(n) = nodes.get_mut(&neighbor) {
					n.distance = current_distance + 1;
				}
				queue.push_back(neighbor);
			}
		}
	}

	let distances: HashMap<PubKey, i64> = nodes.iter().map(|(pk, rn)| (pk.clone(), rn.distance)).collect();
	for (pk, rn) in nodes.iter_mut() {
		rn.distant_neighbors = rn
			.neighbors
			.iter()
			.filter(|n| distances.get(*n).copied().unwrap_or(0) > DISTANT_NEIGHBOR_LIMIT)
			.count() as i64;
		let _ = pk;
	}

	let mut result: Vec<RelativeNode> = nodes
		.into_iter()
		.filter(|(pk, _)| pk != root)
		// Unreachable nodes keep the BFS default distance of 0, indistinguishable from a
		// shallow search; exclude them explicitly rather than lean on the distance comparison.
		.filter(|(pk, _)| visited.contains(pk))
		.map(|(_, rn)| rn)
		.filter(|rn| rn.capacity >= request.min_capacity)
		.filter(|rn| rn.channels >= request.min_channels)
		.filter(|rn| rn.distance >= request.min_distance)
		.filter(|rn| rn.distant_neighbors >= request.min_distant_neighbors)
		.filter(|rn| rn.node.last_updated > request.min_updated)
		.filter(|rn| !request.clearnet_only || rn.node.is_clearnet())
		.collect();

	result.sort_by(|a, b| {
		(b.distance, b.distant_neighbors, b.capacity, b.channels).cmp(&(
			a.distance,
			a.distant_neighbors,
			a.capacity,
			a.channels,
		))
	});
	result.truncate(request.limit);
	result
}
