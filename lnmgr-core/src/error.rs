//! The engine's single error taxonomy. Every public entry point returns `Result<_, EngineError>`.

use std::fmt;

/// Errors surfaced by the policy engine's public entry points.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
	/// A fee schedule or request was constructed with invalid parameters.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// A node-client operation failed.
	#[error("node client error: {0}")]
	Port(#[source] Box<dyn std::error::Error + Send + Sync>),

	/// The forwarding-history window saturated the node client's event cap; the result
	/// would be misleading, so the reaper refuses to answer rather than guess.
	#[error("forwarding history saturated the node client's event cap")]
	HistorySaturated,

	/// The caller's cancellation handle fired.
	#[error("operation cancelled")]
	Cancelled,
}

impl EngineError {
	pub fn configuration(msg: impl fmt::Display) -> Self {
		EngineError::Configuration(msg.to_string())
	}

	pub fn port(err: impl std::error::Error + Send + Sync + 'static) -> Self {
		EngineError::Port(Box::new(err))
	}
}

pub type Result<T> = std::result::Result<T, EngineError>;
