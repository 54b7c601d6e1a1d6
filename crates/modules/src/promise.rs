//! Single-assignment asynchronous result with fan-out listeners.
//!
//! # Role
//!
//! [`Promise`] is the value every import hands back. It settles at most once, to
//! either a value or an error, and delivers that result to every listener
//! registered on it.
//!
//! # Invariants
//!
//! - The first of [`Completer::resolve`] / [`Completer::reject`] wins; later calls
//!   are no-ops and the stored result never changes.
//! - Listeners never run inside the call that registered them or the call that
//!   settled the promise. Every invocation is queued on the promise's
//!   [`EventLoop`], in registration order. Invocations are queued while the
//!   promise's lock is held, so the order also holds across threads.
//! - A listener for the state the promise did not settle into is dropped unrun.

use std::sync::Arc;

use modlink_worker::EventLoop;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Observable promise state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
	Pending,
	Fulfilled,
	Rejected,
}

type Listener<V> = Box<dyn FnOnce(V) + Send + 'static>;

enum Slot<T, E> {
	Pending,
	Fulfilled(T),
	Rejected(E),
}

struct Shared<T, E> {
	slot: Slot<T, E>,
	on_fulfilled: Vec<Listener<T>>,
	on_rejected: Vec<Listener<E>>,
}

/// Handle to a single-assignment asynchronous result. Clones observe the same promise.
pub struct Promise<T, E> {
	shared: Arc<Mutex<Shared<T, E>>>,
	event_loop: EventLoop,
}

/// The resolve/reject capabilities of one [`Promise`].
pub struct Completer<T, E> {
	shared: Arc<Mutex<Shared<T, E>>>,
	event_loop: EventLoop,
}

impl<T, E> Clone for Promise<T, E> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
			event_loop: self.event_loop.clone(),
		}
	}
}

impl<T, E> Clone for Completer<T, E> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
			event_loop: self.event_loop.clone(),
		}
	}
}

impl<T, E> std::fmt::Debug for Promise<T, E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Promise").field("state", &self.state()).finish_non_exhaustive()
	}
}

impl<T, E> Promise<T, E> {
	/// Returns the current state.
	pub fn state(&self) -> PromiseState {
		match self.shared.lock().slot {
			Slot::Pending => PromiseState::Pending,
			Slot::Fulfilled(_) => PromiseState::Fulfilled,
			Slot::Rejected(_) => PromiseState::Rejected,
		}
	}

	pub fn is_settled(&self) -> bool {
		self.state() != PromiseState::Pending
	}
}

impl<T, E> Promise<T, E>
where
	T: Clone + Send + 'static,
	E: Clone + Send + 'static,
{
	/// Creates a pending promise and its completer.
	pub fn pending(event_loop: &EventLoop) -> (Self, Completer<T, E>) {
		let shared = Arc::new(Mutex::new(Shared {
			slot: Slot::Pending,
			on_fulfilled: Vec::new(),
			on_rejected: Vec::new(),
		}));
		let promise = Self {
			shared: Arc::clone(&shared),
			event_loop: event_loop.clone(),
		};
		let completer = Completer {
			shared,
			event_loop: event_loop.clone(),
		};
		(promise, completer)
	}

	/// Creates a promise and runs `setup` with its completer before returning.
	///
	/// `setup` may settle the promise synchronously or keep a clone of the
	/// completer to settle it later.
	pub fn make(event_loop: &EventLoop, setup: impl FnOnce(&Completer<T, E>)) -> Self {
		let (promise, completer) = Self::pending(event_loop);
		setup(&completer);
		promise
	}

	/// Creates an already fulfilled promise.
	pub fn resolved(event_loop: &EventLoop, value: T) -> Self {
		Self::make(event_loop, |c| {
			c.resolve(value);
		})
	}

	/// Creates an already rejected promise.
	pub fn rejected(event_loop: &EventLoop, error: E) -> Self {
		Self::make(event_loop, |c| {
			c.reject(error);
		})
	}

	/// Returns a copy of the fulfilled value, if fulfilled.
	pub fn value(&self) -> Option<T> {
		match &self.shared.lock().slot {
			Slot::Fulfilled(v) => Some(v.clone()),
			_ => None,
		}
	}

	/// Returns a copy of the rejection error, if rejected.
	pub fn error(&self) -> Option<E> {
		match &self.shared.lock().slot {
			Slot::Rejected(e) => Some(e.clone()),
			_ => None,
		}
	}

	/// Registers a listener for fulfillment.
	pub fn on_fulfilled(&self, listener: impl FnOnce(T) + Send + 'static) -> &Self {
		let mut shared = self.shared.lock();
		match &shared.slot {
			Slot::Pending => shared.on_fulfilled.push(Box::new(listener)),
			Slot::Fulfilled(v) => {
				let v = v.clone();
				// Deferred under the lock so it queues behind listeners a settling
				// thread is still handing to the loop.
				self.event_loop.defer(move || listener(v));
			}
			Slot::Rejected(_) => {}
		}
		self
	}

	/// Registers a listener for rejection.
	pub fn on_rejected(&self, listener: impl FnOnce(E) + Send + 'static) -> &Self {
		let mut shared = self.shared.lock();
		match &shared.slot {
			Slot::Pending => shared.on_rejected.push(Box::new(listener)),
			Slot::Rejected(e) => {
				let e = e.clone();
				// Deferred under the lock so it queues behind listeners a settling
				// thread is still handing to the loop.
				self.event_loop.defer(move || listener(e));
			}
			Slot::Fulfilled(_) => {}
		}
		self
	}

	/// Waits for settlement.
	pub async fn wait(&self) -> Result<T, E> {
		let (tx, rx) = oneshot::channel();
		let tx = Arc::new(Mutex::new(Some(tx)));
		let on_err = Arc::clone(&tx);
		self.on_fulfilled(move |v| {
			if let Some(tx) = tx.lock().take() {
				let _ = tx.send(Ok(v));
			}
		})
		.on_rejected(move |e| {
			if let Some(tx) = on_err.lock().take() {
				let _ = tx.send(Err(e));
			}
		});

		if let Ok(result) = rx.await {
			return result;
		}
		// The listener was dropped unrun, which only happens when the event loop is
		// gone after settlement. Fall back to the stored result.
		match &self.shared.lock().slot {
			Slot::Fulfilled(v) => return Ok(v.clone()),
			Slot::Rejected(e) => return Err(e.clone()),
			Slot::Pending => {}
		}
		std::future::pending().await
	}
}

impl<T, E> Completer<T, E>
where
	T: Clone + Send + 'static,
	E: Clone + Send + 'static,
{
	/// Fulfills the promise. Returns `false` if it was already settled.
	pub fn resolve(&self, value: T) -> bool {
		let mut shared = self.shared.lock();
		if !matches!(shared.slot, Slot::Pending) {
			return false;
		}
		shared.slot = Slot::Fulfilled(value.clone());
		let listeners = std::mem::take(&mut shared.on_fulfilled);
		shared.on_rejected.clear();

		tracing::trace!(listeners = listeners.len(), "modules.promise.fulfilled");
		for listener in listeners {
			let v = value.clone();
			self.event_loop.defer(move || listener(v));
		}
		drop(shared);
		true
	}

	/// Rejects the promise. Returns `false` if it was already settled.
	pub fn reject(&self, error: E) -> bool {
		let mut shared = self.shared.lock();
		if !matches!(shared.slot, Slot::Pending) {
			return false;
		}
		shared.slot = Slot::Rejected(error.clone());
		let listeners = std::mem::take(&mut shared.on_rejected);
		shared.on_fulfilled.clear();

		tracing::trace!(listeners = listeners.len(), "modules.promise.rejected");
		for listener in listeners {
			let e = error.clone();
			self.event_loop.defer(move || listener(e));
		}
		drop(shared);
		true
	}

	/// Returns `true` once the promise has settled.
	pub fn is_settled(&self) -> bool {
		!matches!(self.shared.lock().slot, Slot::Pending)
	}
}
