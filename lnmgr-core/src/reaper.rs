//! The reaper: flags channels with no forwarding activity in a recent window. Takes no action
//! itself; the caller decides whether an unused channel is worth closing.

use std::collections::HashSet;

use crate::cancel::CancelHandle;
use crate::error::EngineError;
use crate::port::NodeClient;
use crate::types::ChannelId;

const LOOKBACK_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Returns the local channels that appear as neither `channel_in` nor `channel_out` in any
/// forward recorded in the last 30 days, as of `now` (a Unix timestamp).
///
/// Fails with [`EngineError::HistorySaturated`] if the node client reports its forwarding-history
/// cap was hit: a truncated window would make "unused" an unreliable claim.
pub async fn unused_channels(
	client: &dyn NodeClient, cancel: &CancelHandle, now: i64,
) -> Result<Vec<ChannelId>, EngineError> {
	cancel.check()?;
	let channels = client.list_channels(cancel).await.map_err(EngineError::port)?;
	let history = client.forwarding_history(cancel, now - LOOKBACK_SECONDS).await.map_err(EngineError::port)?;
	if history.saturated {
		return Err(EngineError::HistorySaturated);
	}

	let mut used: HashSet<ChannelId> = HashSet::new();
	for forward in &history.forwards {
		used.insert(forward.channel_in);
		used.insert(forward.channel_out);
	}

	Ok(channels.into_iter().map(|c| c.channel_id).filter(|id| !used.contains(id)).collect())
}
