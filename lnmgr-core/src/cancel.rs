//! In-process cancellation, threaded through every node-client call and public entry point.
//!
//! Deliberately not a process signal: a `CancelSource`/`CancelHandle` pair is created per
//! invocation (or per daemon run) and is the only way the core observes "stop now".

use tokio::sync::watch;

use crate::error::EngineError;

/// Owned by the caller; fires every outstanding `CancelHandle` derived from it.
#[derive(Debug)]
pub struct CancelSource {
	tx: watch::Sender<bool>,
}

impl CancelSource {
	pub fn new() -> Self {
		let (tx, _rx) = watch::channel(false);
		Self { tx }
	}

	pub fn handle(&self) -> CancelHandle {
		CancelHandle { rx: self.tx.subscribe() }
	}

	pub fn cancel(&self) {
		// A closed receiver set just means nobody is listening yet; that's fine.
		let _ = self.tx.send(true);
	}
}

impl Default for CancelSource {
	fn default() -> Self {
		Self::new()
	}
}

/// Cloneable handle threaded through the engine; cheap to pass by value.
#[derive(Debug, Clone)]
pub struct CancelHandle {
	rx: watch::Receiver<bool>,
}

impl CancelHandle {
	/// A handle that never fires; used by tests and one-shot call sites with no cancellation need.
	pub fn never() -> Self {
		CancelSource::new().handle()
	}

	pub fn is_cancelled(&self) -> bool {
		*self.rx.borrow()
	}

	/// Returns `Err(EngineError::Cancelled)` if the handle has already fired.
	pub fn check(&self) -> Result<(), EngineError> {
		if self.is_cancelled() {
			Err(EngineError::Cancelled)
		} else {
			Ok(())
		}
	}

	/// Suspends until cancellation fires.
	pub async fn cancelled(&mut self) {
		// An error here means the source was dropped, which we treat the same as cancellation.
		let _ = self.rx.wait_for(|v| *v).await;
	}
}
