use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{EventLoop, TaskClass, spawn_on};

/// One-shot timer whose expiry runs a task on an [`EventLoop`].
///
/// Expiry never runs the task directly from the timer task: it is deferred onto the
/// loop, and the cancel check happens again inside the deferred task. A timer
/// cancelled after it expired but before its task ran therefore never runs it.
///
/// Dropping a `Timer` does not cancel it.
#[derive(Debug, Clone)]
pub struct Timer {
	token: CancellationToken,
}

impl Timer {
	/// Arms a timer that runs `task` on `event_loop` once `delay` elapses.
	///
	/// A zero delay skips the runtime timer and defers the task by one turn.
	pub fn after(event_loop: &EventLoop, delay: Duration, task: impl FnOnce() + Send + 'static) -> Self {
		let token = CancellationToken::new();
		let guard = token.clone();
		let fire = move || {
			if guard.is_cancelled() {
				return;
			}
			guard.cancel();
			task();
		};

		tracing::trace!(event_loop = event_loop.name(), delay_ms = delay.as_millis() as u64, "worker.timer.arm");
		if delay.is_zero() {
			event_loop.defer(fire);
			return Self { token };
		}

		let waiter = token.clone();
		let target = event_loop.clone();
		spawn_on(event_loop.handle(), TaskClass::Background, async move {
			tokio::select! {
				_ = waiter.cancelled() => {}
				_ = tokio::time::sleep(delay) => {
					target.defer(fire);
				}
			}
		});
		Self { token }
	}

	/// Cancels the timer. Idempotent; a no-op once the task has run.
	pub fn cancel(&self) {
		if !self.token.is_cancelled() {
			tracing::trace!("worker.timer.cancel");
			self.token.cancel();
		}
	}

	/// Returns `true` while the task may still run.
	pub fn is_armed(&self) -> bool {
		!self.token.is_cancelled()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
		let hits = Arc::new(AtomicUsize::new(0));
		let task_hits = Arc::clone(&hits);
		(hits, move || {
			task_hits.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[tokio::test(start_paused = true)]
	async fn fires_after_delay() {
		let lp = EventLoop::new("timer");
		let (hits, task) = counter();
		let timer = Timer::after(&lp, Duration::from_millis(100), task);

		tokio::time::sleep(Duration::from_millis(50)).await;
		lp.turn().await;
		assert_eq!(hits.load(Ordering::SeqCst), 0);
		assert!(timer.is_armed());

		tokio::time::sleep(Duration::from_millis(60)).await;
		lp.turn().await;
		assert_eq!(hits.load(Ordering::SeqCst), 1);
		assert!(!timer.is_armed());
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_timer_never_fires() {
		let lp = EventLoop::new("timer");
		let (hits, task) = counter();
		let timer = Timer::after(&lp, Duration::from_millis(100), task);
		timer.cancel();
		timer.cancel();

		tokio::time::sleep(Duration::from_millis(200)).await;
		lp.turn().await;
		assert_eq!(hits.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn zero_delay_runs_on_next_turn() {
		let lp = EventLoop::new("timer");
		let (hits, task) = counter();
		let _timer = Timer::after(&lp, Duration::ZERO, task);
		assert_eq!(hits.load(Ordering::SeqCst), 0, "zero delay must still be deferred");
		lp.turn().await;
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn cancel_between_expiry_and_turn_wins() {
		let lp = EventLoop::new("timer");
		let (hits, task) = counter();
		let timer = Timer::after(&lp, Duration::ZERO, task);
		timer.cancel();
		lp.turn().await;
		assert_eq!(hits.load(Ordering::SeqCst), 0);
	}
}
