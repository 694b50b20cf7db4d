//! The fee controller: keeps each public channel's outbound fee aligned with its liquidity
//! bucket, reacting to both an initial snapshot and a live stream of channel updates.

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::cancel::CancelHandle;
use crate::error::EngineError;
use crate::port::NodeClient;
use crate::schedule::FeeSchedule;
use crate::types::{Channel, ChannelId, FeePPM};

/// One channel's fee, before and after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeUpdate {
	pub channel_id: ChannelId,
	pub previous_fee: FeePPM,
	pub new_fee: FeePPM,
}

/// Reconciles every public channel's fee against `schedule` once, returning the channels whose
/// fee actually changed. Private channels are left untouched: their fee has no gossip effect and
/// reflects a deliberate peer-specific arrangement.
pub async fn reconcile_once(
	client: &dyn NodeClient, cancel: &CancelHandle, schedule: &FeeSchedule,
) -> Result<Vec<FeeUpdate>, EngineError> {
	let channels = client.list_channels(cancel).await.map_err(EngineError::port)?;
	apply_schedule(client, cancel, schedule, &channels).await
}

async fn apply_schedule(
	client: &dyn NodeClient, cancel: &CancelHandle, schedule: &FeeSchedule, channels: &[Channel],
) -> Result<Vec<FeeUpdate>, EngineError> {
	let mut updates = Vec::new();
	for channel in channels {
		cancel.check()?;
		if channel.private {
			debug!("channel {} is private, skipping fee reconciliation", channel.channel_id);
			continue;
		}
		let target = schedule.effective_fee_for(channel);
		if target == channel.local_outbound_fee {
			continue;
		}
		info!(
			"channel {} liquidity {:.1}% fee {} -> {}",
			channel.channel_id,
			channel.liquidity_percent(),
			channel.local_outbound_fee,
			target
		);
		match client.set_fee(cancel, channel.channel_id, target).await {
			Ok(()) => updates.push(FeeUpdate {
				channel_id: channel.channel_id,
				previous_fee: channel.local_outbound_fee,
				new_fee: target,
			}),
			Err(err) => {
				// Fee changes are best-effort: a single channel's failure doesn't stop the rest
				// of the batch from being reconciled.
				error!("failed to set fee on channel {}: {err}", channel.channel_id);
			}
		}
	}
	Ok(updates)
}

/// Runs the fee controller until `cancel` fires: an initial full reconciliation, then one
/// reconciliation per channel-update batch delivered by the node client's live stream. Update
/// batches are delivered on the returned channel as they're applied; the task itself drives
/// reconciliation and exits (dropping the sender) once `cancel` fires or the update stream ends.
pub fn run(
	client: std::sync::Arc<dyn NodeClient>, cancel: CancelHandle, schedule: FeeSchedule,
) -> mpsc::Receiver<Result<Vec<FeeUpdate>, EngineError>> {
	let (tx, rx) = mpsc::channel(16);
	tokio::spawn(async move {
		let initial = reconcile_once(client.as_ref(), &cancel, &schedule).await;
		if tx.send(initial).await.is_err() {
			return;
		}

		let mut updates = client.subscribe_channel_updates(cancel.clone());
		let mut cancelled = cancel.clone();
		loop {
			tokio::select! {
				_ = cancelled.cancelled() => {
					debug!("fee controller cancelled");
					return;
				}
				batch = updates.next() => {
					let Some(batch) = batch else {
						debug!("channel update stream ended");
						return;
					};
					let result = match batch {
						Ok(channels) => apply_schedule(client.as_ref(), &cancel, &schedule, &channels).await,
						Err(err) => {
							warn!("channel update stream error: {err}");
							Err(EngineError::port(err))
						}
					};
					if tx.send(result).await.is_err() {
						return;
					}
				}
			}
		}
	});
	rx
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::MockNodeClient;
	use crate::port::PortError;
	use crate::types::{Node, PubKey, Satoshi};

	fn remote(name: &str) -> Node {
		Node { pubkey: PubKey::new(name), alias: name.into(), last_updated: 0, addresses: vec![] }
	}

	fn channel(id: u64, capacity: u64, local: u64, fee: u32, private: bool) -> Channel {
		Channel {
			channel_id: ChannelId(id),
			capacity: Satoshi(capacity),
			local_balance: Satoshi(local),
			local_outbound_fee: FeePPM::new(fee),
			remote_balance: Satoshi(capacity - local),
			remote_node: remote("peer"),
			private,
		}
	}

	fn schedule() -> FeeSchedule {
		FeeSchedule::new(
			vec![80.0, 20.0],
			vec![FeePPM::new(5), FeePPM::new(50), FeePPM::new(500)],
			0.0,
		)
		.unwrap()
	}

	#[tokio::test]
	async fn reconciles_public_channels_and_skips_private() {
		let client = MockNodeClient::new();
		client.set_channels(vec![channel(1, 100, 10, 50, false), channel(2, 100, 10, 50, true)]);
		let cancel = CancelHandle::never();
		let updates = reconcile_once(&client, &cancel, &schedule()).await.unwrap();
		assert_eq!(updates.len(), 1);
		assert_eq!(updates[0].channel_id, ChannelId(1));
		assert_eq!(updates[0].new_fee, FeePPM::new(500));
		assert_eq!(client.fee_of(ChannelId(2)), FeePPM::new(50));
	}

	#[tokio::test]
	async fn no_op_when_fee_already_matches_schedule() {
		let client = MockNodeClient::new();
		client.set_channels(vec![channel(1, 100, 10, 500, false)]);
		let cancel = CancelHandle::never();
		let updates = reconcile_once(&client, &cancel, &schedule()).await.unwrap();
		assert!(updates.is_empty());
		assert_eq!(client.set_fee_call_count(), 0);
	}

	#[tokio::test]
	async fn a_failed_set_fee_does_not_stop_the_rest_of_the_batch() {
		let client = MockNodeClient::new();
		client.set_channels(vec![
			channel(1, 100, 10, 50, false),
			channel(2, 100, 10, 50, false),
			channel(3, 100, 10, 50, false),
		]);
		client.queue_set_fee_failure(ChannelId(2), PortError::other("backend unavailable"));
		let cancel = CancelHandle::never();

		let updates = reconcile_once(&client, &cancel, &schedule()).await.unwrap();

		let updated_ids: std::collections::HashSet<_> = updates.iter().map(|u| u.channel_id).collect();
		assert_eq!(updated_ids, [ChannelId(1), ChannelId(3)].into_iter().collect());
		assert_eq!(client.fee_of(ChannelId(1)), FeePPM::new(500));
		assert_eq!(client.fee_of(ChannelId(2)), FeePPM::new(50), "failed set_fee must not apply");
		assert_eq!(client.fee_of(ChannelId(3)), FeePPM::new(500));
	}
}
