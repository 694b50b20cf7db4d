//! An in-memory [`NodeClient`] used by this crate's own tests and made available to downstream
//! test suites under the `test-util` feature.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

use crate::cancel::CancelHandle;
use crate::port::{ChannelUpdateBatch, ForwardingHistory, Invoice, NodeClient, NodeInfo, PortError};
use crate::types::{Channel, ChannelId, FeePPM, Forward, Graph, PubKey, Satoshi};

/// An in-memory node, scriptable for tests: channel list, graph, forwarding history, and a queue
/// of payment outcomes consumed in order by `send_payment`.
pub struct MockNodeClient {
	pubkey: PubKey,
	graph: Mutex<Graph>,
	channels: Mutex<HashMap<ChannelId, Channel>>,
	forwards: Mutex<Vec<Forward>>,
	saturated: Mutex<bool>,
	set_fee_calls: AtomicU32,
	list_channels_calls: AtomicU32,
	payment_outcomes: Mutex<VecDeque<Result<Satoshi, PortError>>>,
	set_fee_failures: Mutex<HashMap<ChannelId, VecDeque<PortError>>>,
	invoice_counter: AtomicU64,
	update_tx: Mutex<Option<mpsc::Sender<Result<ChannelUpdateBatch, PortError>>>>,
	/// Artificial latency injected into `list_channels`, for exercising callers' overrun handling.
	list_channels_delay: Mutex<Duration>,
}

impl MockNodeClient {
	pub fn new() -> Self {
		Self {
			pubkey: PubKey::new("local"),
			graph: Mutex::new(Graph::default()),
			channels: Mutex::new(HashMap::new()),
			forwards: Mutex::new(Vec::new()),
			saturated: Mutex::new(false),
			set_fee_calls: AtomicU32::new(0),
			list_channels_calls: AtomicU32::new(0),
			payment_outcomes: Mutex::new(VecDeque::new()),
			set_fee_failures: Mutex::new(HashMap::new()),
			invoice_counter: AtomicU64::new(0),
			update_tx: Mutex::new(None),
			list_channels_delay: Mutex::new(Duration::ZERO),
		}
	}

	/// Makes `list_channels` sleep for `delay` before returning, to simulate a slow daemon tick.
	pub fn set_list_channels_delay(&self, delay: Duration) {
		*self.list_channels_delay.lock().unwrap() = delay;
	}

	pub fn with_pubkey(mut self, pubkey: impl Into<String>) -> Self {
		self.pubkey = PubKey::new(pubkey);
		self
	}

	pub fn set_graph(&self, graph: Graph) {
		*self.graph.lock().unwrap() = graph;
	}

	pub fn set_channels(&self, channels: Vec<Channel>) {
		*self.channels.lock().unwrap() = channels.into_iter().map(|c| (c.channel_id, c)).collect();
	}

	pub fn set_forwards(&self, forwards: Vec<Forward>, saturated: bool) {
		*self.forwards.lock().unwrap() = forwards;
		*self.saturated.lock().unwrap() = saturated;
	}

	/// Queues a payment outcome; `send_payment` calls consume these in FIFO order, falling back
	/// to a zero-fee success once the queue is empty.
	pub fn queue_payment_outcome(&self, outcome: Result<Satoshi, PortError>) {
		self.payment_outcomes.lock().unwrap().push_back(outcome);
	}

	/// Queues a `set_fee` failure for `channel_id`; the next `set_fee` call against that channel
	/// consumes it and fails instead of applying the fee, falling back to success once the queue
	/// for that channel is empty.
	pub fn queue_set_fee_failure(&self, channel_id: ChannelId, error: PortError) {
		self.set_fee_failures.lock().unwrap().entry(channel_id).or_default().push_back(error);
	}

	pub fn fee_of(&self, channel_id: ChannelId) -> FeePPM {
		self.channels.lock().unwrap()[&channel_id].local_outbound_fee
	}

	pub fn channel(&self, channel_id: ChannelId) -> Channel {
		self.channels.lock().unwrap()[&channel_id].clone()
	}

	pub fn set_fee_call_count(&self) -> u32 {
		self.set_fee_calls.load(Ordering::SeqCst)
	}

	pub fn list_channels_call_count(&self) -> u32 {
		self.list_channels_calls.load(Ordering::SeqCst)
	}

	/// Pushes a batch onto the live channel-update stream, if one has been subscribed.
	pub async fn push_update(&self, batch: Result<ChannelUpdateBatch, PortError>) {
		let tx = self.update_tx.lock().unwrap().clone();
		if let Some(tx) = tx {
			let _ = tx.send(batch).await;
		}
	}
}

impl Default for MockNodeClient {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl NodeClient for MockNodeClient {
	async fn get_info(&self, cancel: &CancelHandle) -> Result<NodeInfo, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		Ok(NodeInfo { pubkey: self.pubkey.clone() })
	}

	async fn describe_graph(&self, cancel: &CancelHandle) -> Result<Graph, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		Ok(self.graph.lock().unwrap().clone())
	}

	async fn get_channel(&self, cancel: &CancelHandle, channel_id: ChannelId) -> Result<Channel, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		self.channels
			.lock()
			.unwrap()
			.get(&channel_id)
			.cloned()
			.ok_or_else(|| PortError::other(format!("unknown channel {channel_id}")))
	}

	async fn list_channels(&self, cancel: &CancelHandle) -> Result<Vec<Channel>, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		self.list_channels_calls.fetch_add(1, Ordering::SeqCst);
		let delay = *self.list_channels_delay.lock().unwrap();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		Ok(self.channels.lock().unwrap().values().cloned().collect())
	}

	async fn set_fee(&self, cancel: &CancelHandle, channel_id: ChannelId, fee: FeePPM) -> Result<(), PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		self.set_fee_calls.fetch_add(1, Ordering::SeqCst);
		if let Some(queue) = self.set_fee_failures.lock().unwrap().get_mut(&channel_id) {
			if let Some(err) = queue.pop_front() {
				return Err(err);
			}
		}
		let mut channels = self.channels.lock().unwrap();
		let channel = channels
			.get_mut(&channel_id)
			.ok_or_else(|| PortError::other(format!("unknown channel {channel_id}")))?;
		channel.local_outbound_fee = fee;
		Ok(())
	}

	async fn add_invoice(&self, cancel: &CancelHandle, amount: Satoshi) -> Result<Invoice, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		let n = self.invoice_counter.fetch_add(1, Ordering::SeqCst);
		Ok(Invoice(format!("mock-invoice-{n}-{}", amount.0)))
	}

	async fn send_payment(
		&self, cancel: &CancelHandle, _invoice: &Invoice, out_channel_id: ChannelId, _last_hop: &PubKey,
		max_fee: FeePPM, _timeout: std::time::Duration,
	) -> Result<Satoshi, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		let outcome = self.payment_outcomes.lock().unwrap().pop_front();
		match outcome {
			Some(outcome) => outcome,
			None => {
				let _ = (out_channel_id, max_fee);
				Ok(Satoshi(0))
			}
		}
	}

	fn subscribe_channel_updates(
		&self, cancel: CancelHandle,
	) -> BoxStream<'static, Result<ChannelUpdateBatch, PortError>> {
		let (tx, rx) = mpsc::channel(16);
		*self.update_tx.lock().unwrap() = Some(tx);
		let stream = futures_util::stream::unfold((rx, cancel), |(mut rx, cancel)| async move {
			if cancel.is_cancelled() {
				return None;
			}
			rx.recv().await.map(|item| (item, (rx, cancel)))
		});
		Box::pin(stream)
	}

	async fn forwarding_history(&self, cancel: &CancelHandle, since: i64) -> Result<ForwardingHistory, PortError> {
		cancel.check().map_err(|_| PortError::other("cancelled"))?;
		let forwards: Vec<Forward> =
			self.forwards.lock().unwrap().iter().filter(|f| f.timestamp >= since).copied().collect();
		Ok(ForwardingHistory { forwards, saturated: *self.saturated.lock().unwrap() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures_util::StreamExt;

	#[tokio::test]
	async fn subscribed_updates_are_delivered_in_order() {
		let client = MockNodeClient::new();
		let cancel = CancelHandle::never();
		let mut stream = client.subscribe_channel_updates(cancel);
		client.push_update(Ok(vec![])).await;
		client.push_update(Err(PortError::other("boom"))).await;
		assert!(stream.next().await.unwrap().is_ok());
		assert!(stream.next().await.unwrap().is_err());
	}

	#[tokio::test]
	async fn unknown_channel_is_an_error() {
		let client = MockNodeClient::new();
		let cancel = CancelHandle::never();
		assert!(client.get_channel(&cancel, ChannelId(99)).await.is_err());
	}
}
