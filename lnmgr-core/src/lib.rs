//! Policy engine for an autonomous Lightning Network channel-management agent: candidate
//! discovery, liquidity-fee scheduling, an event-driven fee controller, circular rebalancing, and
//! a channel reaper, all built on a single abstract [`port::NodeClient`].

pub mod candidates;
pub mod cancel;
pub mod error;
pub mod fees;
pub mod port;
pub mod reaper;
pub mod rebalance;
pub mod schedule;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use cancel::{CancelHandle, CancelSource};
pub use error::{EngineError, Result};
pub use port::NodeClient;
pub use schedule::FeeSchedule;
