use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::watcher::ChangeEvent;

/// One rebuild request, carrying the events that settled into it.
#[derive(Debug, Clone, Default)]
pub struct Trigger {
	pub events: Vec<ChangeEvent>,
}

/// Collapses bursts of change events into single triggers.
///
/// The first event in an idle window arms a timer; events arriving before it
/// fires are buffered, and the timer emits them all as one [`Trigger`].
#[derive(Clone)]
pub struct Debouncer {
	delay: Duration,
	pending: Arc<Mutex<Vec<ChangeEvent>>>,
	triggers: mpsc::UnboundedSender<Trigger>,
}

impl Debouncer {
	pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<Trigger>) {
		let (triggers, rx) = mpsc::unbounded_channel();
		let debouncer = Self {
			delay,
			pending: Arc::new(Mutex::new(Vec::new())),
			triggers,
		};
		(debouncer, rx)
	}

	pub fn delay(&self) -> Duration {
		self.delay
	}

	/// Record an event. Needs a tokio runtime when the delay is non-zero.
	pub fn push(&self, event: ChangeEvent) {
		if self.delay.is_zero() {
			let _ = self.triggers.send(Trigger {
				events: vec![event],
			});
			return;
		}

		let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
		pending.push(event);
		if pending.len() > 1 {
			return;
		}

		let delay = self.delay;
		let buffer = Arc::clone(&self.pending);
		let triggers = self.triggers.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let events = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
			tracing::debug!("debounce: {} event(s) settled", events.len());
			let _ = triggers.send(Trigger { events });
		});
	}

	/// Number of events waiting for the timer.
	pub fn pending(&self) -> usize {
		self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
	}
}
