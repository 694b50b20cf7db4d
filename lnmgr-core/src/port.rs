//! The node-client port: the single capability interface the core consumes from a Lightning
//! daemon. A concrete binding (gRPC to a specific implementation, invoice decoding, route
//! construction) is explicitly out of scope; this crate ships only [`crate::mock::MockNodeClient`]
//! for tests.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::cancel::CancelHandle;
use crate::types::{Channel, ChannelId, FeePPM, Graph, PubKey, Satoshi};

/// Identifies the local node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
	pub pubkey: PubKey,
}

/// An opaque, payable-only-by-this-node invoice string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice(pub String);

/// A batch of channels whose liquidity changed, as delivered by [`NodeClient::subscribe_channel_updates`].
pub type ChannelUpdateBatch = Vec<Channel>;

/// The abstract operations the policy engine consumes from a Lightning daemon.
///
/// Every operation is fallible and cancellable. Implementations must be safe to share across
/// concurrently running tasks (`Arc<dyn NodeClient>`); the core issues at most one outstanding
/// call per logical task.
#[async_trait]
pub trait NodeClient: Send + Sync {
	async fn get_info(&self, cancel: &CancelHandle) -> Result<NodeInfo, PortError>;

	/// Full known network snapshot; announced channels only.
	async fn describe_graph(&self, cancel: &CancelHandle) -> Result<Graph, PortError>;

	/// Fresh liquidity for a single channel.
	async fn get_channel(
		&self, cancel: &CancelHandle, channel_id: ChannelId,
	) -> Result<Channel, PortError>;

	/// Local channels, active and inactive.
	async fn list_channels(&self, cancel: &CancelHandle) -> Result<Vec<Channel>, PortError>;

	/// Updates the local outbound fee policy for a channel. Idempotent.
	async fn set_fee(
		&self, cancel: &CancelHandle, channel_id: ChannelId, fee: FeePPM,
	) -> Result<(), PortError>;

	/// Creates an invoice payable only by this node.
	async fn add_invoice(
		&self, cancel: &CancelHandle, amount: Satoshi,
	) -> Result<Invoice, PortError>;

	/// Pays `invoice`, constraining the route to egress `out_channel_id` and ingress from
	/// `last_hop`, paying at most `max_fee` ppm. Returns the fee actually paid.
	#[allow(clippy::too_many_arguments)]
	async fn send_payment(
		&self, cancel: &CancelHandle, invoice: &Invoice, out_channel_id: ChannelId,
		last_hop: &PubKey, max_fee: FeePPM, timeout: std::time::Duration,
	) -> Result<Satoshi, PortError>;

	/// A live stream of channel-update batches, emitted whenever liquidity changes materially.
	fn subscribe_channel_updates(
		&self, cancel: CancelHandle,
	) -> BoxStream<'static, Result<ChannelUpdateBatch, PortError>>;

	/// Forwards recorded since `since` (a Unix timestamp). Bounded by an implementation cap;
	/// callers should request windows small enough to not saturate it.
	async fn forwarding_history(
		&self, cancel: &CancelHandle, since: i64,
	) -> Result<ForwardingHistory, PortError>;
}

/// The result of a `forwarding_history` call, distinguishing a truncated (saturated) window from
/// a complete one so the caller can decide whether the data is trustworthy.
#[derive(Debug, Clone, Default)]
pub struct ForwardingHistory {
	pub forwards: Vec<crate::types::Forward>,
	pub saturated: bool,
}

/// An error surfaced by a node-client operation.
#[derive(thiserror::Error, Debug)]
pub enum PortError {
	#[error("{0}")]
	Other(String),
}

impl PortError {
	pub fn other(msg: impl Into<String>) -> Self {
		PortError::Other(msg.into())
	}
}
