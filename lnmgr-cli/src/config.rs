//! Layered configuration: built-in defaults, then an optional TOML file, then CLI flags /
//! environment variables — each layer overriding the last.

use std::fs;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

/// The engine's fully-resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
	pub liquidity_thresholds: Vec<f64>,
	pub liquidity_fees: Vec<u32>,
	pub liquidity_stickiness: f64,
	pub min_capacity: u64,
	pub min_channels: i64,
	pub min_distance: i64,
	pub min_distant_neighbors: i64,
	pub min_updated: i64,
	pub limit: usize,
	pub clearnet: bool,
	pub assume: Vec<String>,
	pub log_level: String,
}

/// Built-in defaults, merged first and overridden by every later layer.
#[derive(Default)]
struct ConfigBuilder {
	liquidity_thresholds: Option<Vec<f64>>,
	liquidity_fees: Option<Vec<u32>>,
	liquidity_stickiness: Option<f64>,
	min_capacity: Option<u64>,
	min_channels: Option<i64>,
	min_distance: Option<i64>,
	min_distant_neighbors: Option<i64>,
	min_updated: Option<i64>,
	limit: Option<usize>,
	clearnet: Option<bool>,
	assume: Option<Vec<String>>,
	log_level: Option<String>,
}

impl ConfigBuilder {
	fn defaults() -> Self {
		Self {
			liquidity_thresholds: Some(vec![80.0, 20.0]),
			liquidity_fees: Some(vec![5, 50, 500]),
			liquidity_stickiness: Some(0.0),
			min_capacity: Some(0),
			min_channels: Some(0),
			min_distance: Some(2),
			min_distant_neighbors: Some(0),
			min_updated: Some(0),
			limit: Some(10),
			clearnet: Some(false),
			assume: Some(Vec::new()),
			log_level: Some("info".to_string()),
		}
	}

	fn merge_toml(&mut self, toml: TomlConfig) {
		if let Some(liquidity) = toml.liquidity {
			self.liquidity_thresholds = liquidity.thresholds.or(self.liquidity_thresholds.clone());
			self.liquidity_fees = liquidity.fees.or(self.liquidity_fees.clone());
			self.liquidity_stickiness = liquidity.stickiness.or(self.liquidity_stickiness);
		}
		if let Some(candidates) = toml.candidates {
			self.min_capacity = candidates.min_capacity.or(self.min_capacity);
			self.min_channels = candidates.min_channels.or(self.min_channels);
			self.min_distance = candidates.min_distance.or(self.min_distance);
			self.min_distant_neighbors = candidates.min_distant_neighbors.or(self.min_distant_neighbors);
			self.min_updated = candidates.min_updated.or(self.min_updated);
			self.limit = candidates.limit.or(self.limit);
			self.clearnet = candidates.clearnet.or(self.clearnet);
			self.assume = candidates.assume.or(self.assume.clone());
		}
		if let Some(log) = toml.log {
			self.log_level = log.level.or(self.log_level.clone());
		}
	}

	fn merge_args(&mut self, args: &ArgsConfig) {
		if let Some(stickiness) = args.liquidity_stickiness {
			self.liquidity_stickiness = Some(stickiness);
		}
		if let Some(thresholds) = &args.liquidity_thresholds {
			self.liquidity_thresholds = Some(thresholds.clone());
		}
		if let Some(fees) = &args.liquidity_fees {
			self.liquidity_fees = Some(fees.clone());
		}
		if let Some(min_capacity) = args.min_capacity {
			self.min_capacity = Some(min_capacity);
		}
		if let Some(min_channels) = args.min_channels {
			self.min_channels = Some(min_channels);
		}
		if let Some(min_distance) = args.min_distance {
			self.min_distance = Some(min_distance);
		}
		if let Some(min_distant_neighbors) = args.min_distant_neighbors {
			self.min_distant_neighbors = Some(min_distant_neighbors);
		}
		if let Some(min_updated) = args.min_updated {
			self.min_updated = Some(min_updated);
		}
		if let Some(limit) = args.limit {
			self.limit = Some(limit);
		}
		if args.clearnet {
			self.clearnet = Some(true);
		}
		if !args.assume.is_empty() {
			self.assume = Some(args.assume.clone());
		}
		if let Some(log_level) = &args.log_level {
			self.log_level = Some(log_level.clone());
		}
	}

	fn build(self) -> io::Result<CliConfig> {
		let liquidity_thresholds =
			self.liquidity_thresholds.ok_or_else(|| missing_field_err("liquidity.thresholds"))?;
		let liquidity_fees = self.liquidity_fees.ok_or_else(|| missing_field_err("liquidity.fees"))?;
		Ok(CliConfig {
			liquidity_thresholds,
			liquidity_fees,
			liquidity_stickiness: self.liquidity_stickiness.unwrap_or(0.0),
			min_capacity: self.min_capacity.unwrap_or(0),
			min_channels: self.min_channels.unwrap_or(0),
			min_distance: self.min_distance.unwrap_or(2),
			min_distant_neighbors: self.min_distant_neighbors.unwrap_or(0),
			min_updated: self.min_updated.unwrap_or(0),
			limit: self.limit.unwrap_or(10),
			clearnet: self.clearnet.unwrap_or(false),
			assume: self.assume.unwrap_or_default(),
			log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
		})
	}
}

/// Configuration as read from a TOML file; every field optional so a partial file is valid.
#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
	liquidity: Option<TomlLiquidityConfig>,
	candidates: Option<TomlCandidatesConfig>,
	log: Option<TomlLogConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlLiquidityConfig {
	thresholds: Option<Vec<f64>>,
	fees: Option<Vec<u32>>,
	stickiness: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TomlCandidatesConfig {
	min_capacity: Option<u64>,
	min_channels: Option<i64>,
	min_distance: Option<i64>,
	min_distant_neighbors: Option<i64>,
	min_updated: Option<i64>,
	limit: Option<usize>,
	clearnet: Option<bool>,
	assume: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TomlLogConfig {
	level: Option<String>,
}

/// Flags and environment variables recognised on top of the TOML file.
#[derive(Parser, Debug)]
#[command(name = "lnmgr", about = "Lightning Network channel management agent")]
pub struct ArgsConfig {
	/// Path to a TOML configuration file.
	#[arg(long, global = true, env = "LNMGR_CONFIG_FILE")]
	pub config_file: Option<String>,

	#[arg(long, global = true, env = "LNMGR_LIQUIDITY_STICKINESS")]
	pub liquidity_stickiness: Option<f64>,

	#[arg(long, global = true, value_delimiter = ',', env = "LNMGR_LIQUIDITY_THRESHOLDS")]
	pub liquidity_thresholds: Option<Vec<f64>>,

	#[arg(long, global = true, value_delimiter = ',', env = "LNMGR_LIQUIDITY_FEES")]
	pub liquidity_fees: Option<Vec<u32>>,

	#[arg(long, global = true, env = "LNMGR_MIN_CAPACITY")]
	pub min_capacity: Option<u64>,

	#[arg(long, global = true, env = "LNMGR_MIN_CHANNELS")]
	pub min_channels: Option<i64>,

	#[arg(long, global = true, env = "LNMGR_MIN_DISTANCE")]
	pub min_distance: Option<i64>,

	#[arg(long, global = true, env = "LNMGR_MIN_DISTANT_NEIGHBORS")]
	pub min_distant_neighbors: Option<i64>,

	#[arg(long, global = true, env = "LNMGR_MIN_UPDATED")]
	pub min_updated: Option<i64>,

	#[arg(long, global = true, env = "LNMGR_LIMIT")]
	pub limit: Option<usize>,

	#[arg(long, global = true)]
	pub clearnet: bool,

	#[arg(long, global = true, value_delimiter = ',', env = "LNMGR_ASSUME")]
	pub assume: Vec<String>,

	#[arg(long, global = true, env = "LNMGR_LOG_LEVEL")]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: crate::Command,
}

/// Merges defaults, an optional TOML file, and CLI flags/env (highest priority) into a
/// validated [`CliConfig`].
pub fn load_config(args: &ArgsConfig) -> io::Result<CliConfig> {
	let mut builder = ConfigBuilder::defaults();

	let config_path = args.config_file.as_ref().map(PathBuf::from);
	if let Some(path) = config_path {
		let content = fs::read_to_string(&path).map_err(|e| {
			io::Error::new(e.kind(), format!("failed to read config file '{}': {}", path.display(), e))
		})?;
		let toml_config: TomlConfig = toml::from_str(&content).map_err(|e| {
			io::Error::new(io::ErrorKind::InvalidData, format!("config file contains invalid TOML: {e}"))
		})?;
		builder.merge_toml(toml_config);
	}

	builder.merge_args(args);
	builder.build()
}

fn missing_field_err(field: &str) -> io::Error {
	io::Error::new(
		io::ErrorKind::InvalidInput,
		format!("missing `{field}`; provide it via config file, CLI argument, or environment variable"),
	)
}
