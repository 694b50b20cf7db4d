mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use lnmgr_core::cancel::{CancelHandle, CancelSource};
use lnmgr_core::mock::MockNodeClient;
use lnmgr_core::schedule::FeeSchedule;
use lnmgr_core::types::{FeePPM, PubKey, PubKeySet};
use lnmgr_core::{candidates, fees, reaper, rebalance};
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{load_config, ArgsConfig, CliConfig};

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Run the candidate engine once and print a ranked table.
	Candidates,
	/// Run the fee controller, once or continuously.
	Fees {
		#[arg(long)]
		daemon: bool,
	},
	/// Rebalance a single channel pair, or the whole fleet if no pair is given.
	Rebalance {
		#[arg(long)]
		out_channel: Option<u64>,
		#[arg(long)]
		last_hop: Option<String>,
		#[arg(long, default_value_t = 5.0)]
		step_percent: f64,
		#[arg(long, default_value_t = 20.0)]
		max_percent: f64,
		/// Keep rebalancing the whole fleet on a fixed tick instead of running once.
		#[arg(long)]
		daemon: bool,
	},
	/// Print channels with no recent forwarding activity.
	Reap,
}

const RECONNAISSANCE_TICK: Duration = Duration::from_secs(4 * 60 * 60);

fn main() -> ExitCode {
	let args = ArgsConfig::parse();
	let config = match load_config(&args) {
		Ok(config) => config,
		Err(err) => {
			eprintln!("configuration error: {err}");
			return ExitCode::from(2);
		}
	};

	env_logger::Builder::new().parse_filters(&config.log_level).init();

	let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(err) => {
			eprintln!("failed to start async runtime: {err}");
			return ExitCode::from(2);
		}
	};

	runtime.block_on(run(config, args.command))
}

async fn run(config: CliConfig, command: Command) -> ExitCode {
	let schedule = match FeeSchedule::new(
		config.liquidity_thresholds.clone(),
		config.liquidity_fees.iter().map(|f| FeePPM::new(*f)).collect(),
		config.liquidity_stickiness,
	) {
		Ok(schedule) => schedule,
		Err(err) => {
			eprintln!("configuration error: {err}");
			return ExitCode::from(2);
		}
	};

	// The wire protocol to a concrete Lightning daemon is out of scope; the CLI drives the engine
	// against the in-memory mock so every subcommand is runnable end to end in this repository.
	let client: Arc<MockNodeClient> = Arc::new(MockNodeClient::new());
	let cancel_source = Arc::new(CancelSource::new());
	let cancel = cancel_source.handle();

	let daemon_mode = matches!(command, Command::Fees { daemon: true } | Command::Rebalance { daemon: true, .. });
	if daemon_mode {
		let cancel_source = Arc::clone(&cancel_source);
		tokio::spawn(async move {
			match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
				Ok(mut sigterm) => {
					sigterm.recv().await;
					info!("received SIGTERM, shutting down");
					cancel_source.cancel();
				}
				Err(err) => warn!("failed to register SIGTERM handler: {err}"),
			}
		});
	}

	let result = dispatch(client, &cancel, &schedule, &config, command).await;
	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("{err}");
			ExitCode::FAILURE
		}
	}
}

async fn dispatch(
	client: Arc<MockNodeClient>, cancel: &CancelHandle, schedule: &FeeSchedule, config: &CliConfig,
	command: Command,
) -> Result<(), lnmgr_core::EngineError> {
	match command {
		Command::Candidates => run_candidates(client.as_ref(), cancel, config).await,
		Command::Fees { daemon } => run_fees(client, cancel.clone(), schedule.clone(), daemon).await,
		Command::Rebalance { out_channel: _, last_hop: _, step_percent, max_percent, daemon: true } => {
			let node_client: Arc<dyn lnmgr_core::NodeClient> = client;
			daemon_loop(node_client, cancel.clone(), Arc::new(schedule.clone()), step_percent, max_percent).await;
			Ok(())
		}
		Command::Rebalance { out_channel, last_hop, step_percent, max_percent, daemon: false } => {
			run_rebalance(client.as_ref(), cancel, schedule, out_channel, last_hop, step_percent, max_percent).await
		}
		Command::Reap => run_reap(client.as_ref(), cancel).await,
	}
}

async fn run_candidates(
	client: &dyn lnmgr_core::NodeClient, cancel: &CancelHandle, config: &CliConfig,
) -> Result<(), lnmgr_core::EngineError> {
	let assumed: PubKeySet = config.assume.iter().map(|s| PubKey::new(s.clone())).collect();
	let request = candidates::CandidatesRequest {
		pubkey: None,
		min_capacity: lnmgr_core::types::Satoshi::new(config.min_capacity),
		min_channels: config.min_channels,
		min_distance: config.min_distance,
		min_distant_neighbors: config.min_distant_neighbors,
		min_updated: config.min_updated,
		assumed,
		limit: config.limit,
		clearnet_only: config.clearnet,
	};
	let results = candidates::candidates(client, cancel, &request).await?;
	println!("{:<66} {:>8} {:>8} {:>10} {:>8}", "pubkey", "distance", "distant", "capacity", "channels");
	for rn in &results {
		println!(
			"{:<66} {:>8} {:>8} {:>10} {:>8}",
			rn.node.pubkey, rn.distance, rn.distant_neighbors, rn.capacity, rn.channels
		);
	}
	Ok(())
}

async fn run_fees(
	client: Arc<MockNodeClient>, cancel: CancelHandle, schedule: FeeSchedule, daemon: bool,
) -> Result<(), lnmgr_core::EngineError> {
	let node_client: Arc<dyn lnmgr_core::NodeClient> = client;
	let mut updates = fees::run(node_client, cancel, schedule);

	let Some(first) = updates.recv().await else {
		return Ok(());
	};
	let applied = first?;
	println!("applied {} fee update(s)", applied.len());
	for update in &applied {
		println!("channel {}: {} -> {}", update.channel_id, update.previous_fee, update.new_fee);
	}

	if !daemon {
		return Ok(());
	}

	while let Some(batch) = updates.recv().await {
		match batch {
			Ok(applied) => {
				info!("applied {} fee update(s)", applied.len());
			}
			Err(err) => warn!("fee controller error: {err}"),
		}
	}
	Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_rebalance(
	client: &dyn lnmgr_core::NodeClient, cancel: &CancelHandle, schedule: &FeeSchedule,
	out_channel: Option<u64>, last_hop: Option<String>, step_percent: f64, max_percent: f64,
) -> Result<(), lnmgr_core::EngineError> {
	let fee_ceiling = schedule.rebalance_fee_ceiling();
	match (out_channel, last_hop) {
		(Some(out_channel), Some(last_hop)) => {
			let (moved, fee_paid) = rebalance::rebalance(
				client,
				cancel,
				lnmgr_core::types::ChannelId(out_channel),
				&PubKey::new(last_hop),
				step_percent,
				max_percent,
				fee_ceiling,
			)
			.await?;
			println!("moved {moved:.1}% for {fee_paid} in fees");
		}
		_ => {
			let mut rng = StdRng::from_entropy();
			let moved = rebalance::rebalance_all(client, cancel, schedule, &mut rng, step_percent, max_percent).await?;
			for (channel_id, percent) in moved {
				println!("channel {channel_id}: moved {percent:.1}%");
			}
		}
	}
	Ok(())
}

async fn run_reap(client: &dyn lnmgr_core::NodeClient, cancel: &CancelHandle) -> Result<(), lnmgr_core::EngineError> {
	let now = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.expect("system clock is before the Unix epoch")
		.as_secs() as i64;
	let unused = reaper::unused_channels(client, cancel, now).await?;
	for channel_id in unused {
		println!("{channel_id}");
	}
	Ok(())
}

/// Drives `rebalance_all` on a fixed tick, never overlapping runs. Ticks are never queued up: if
/// a run overruns the tick period, the ticks that elapsed during the overrun are dropped rather
/// than fired back-to-back once the run completes, and a warning is logged either way.
async fn daemon_loop(
	client: Arc<dyn lnmgr_core::NodeClient>, cancel: CancelHandle, schedule: Arc<FeeSchedule>, step_percent: f64,
	max_percent: f64,
) {
	daemon_loop_with_tick(client, cancel, schedule, step_percent, max_percent, RECONNAISSANCE_TICK).await
}

/// A tick interval that drops ticks missed during an overrunning run rather than queueing them up
/// to fire back-to-back once the run completes.
fn daemon_interval(tick_period: Duration) -> tokio::time::Interval {
	let mut interval = tokio::time::interval(tick_period);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	interval
}

async fn daemon_loop_with_tick(
	client: Arc<dyn lnmgr_core::NodeClient>, cancel: CancelHandle, schedule: Arc<FeeSchedule>, step_percent: f64,
	max_percent: f64, tick_period: Duration,
) {
	let mut interval = daemon_interval(tick_period);
	let mut rng = StdRng::from_entropy();
	loop {
		tokio::select! {
			_ = { let mut c = cancel.clone(); async move { c.cancelled().await } } => return,
			_ = interval.tick() => {
				let started = Instant::now();
				match rebalance::rebalance_all(client.as_ref(), &cancel, &schedule, &mut rng, step_percent, max_percent).await {
					Ok(moved) => info!("daemon tick rebalanced {} channel(s)", moved.len()),
					Err(err) => error!("daemon tick failed: {err}"),
				}
				if started.elapsed() > tick_period {
					warn!("rebalance tick took {:?}, longer than the {:?} tick period", started.elapsed(), tick_period);
				}
			}
		}
	}
}
