//! Multi-key import resolution.
//!
//! # Role
//!
//! An import asks for an ordered list of keys and gets one [`ImportPromise`] that
//! fulfills with the values in request order once every key is published, or rejects
//! with [`ImportError::Timeout`] when its timer fires first.
//!
//! # Invariants
//!
//! - Each import owns its own result slots and promise; a publish event reaches
//!   every import waiting on that key.
//! - An import whose keys are all published at call time fulfills without arming a
//!   timer.
//! - Settlement is decided under the import's own lock, so a publish that completes
//!   the import and a timer that expires at the same moment cannot both win.
//! - Loads are requested through the [`LoaderGate`], at most once per key.

use std::sync::Arc;

use modlink_worker::{EventLoop, IdClock, Timer};
use parking_lot::Mutex;

use crate::config::ImportTimeout;
use crate::error::{ImportError, Result};
use crate::gate::LoaderGate;
use crate::key::ModuleKey;
use crate::promise::{Completer, Promise};
use crate::registry::{ModuleRegistry, PublishWaiter};
use crate::value::ModuleValue;

/// Promise returned by an import: the values in request order.
pub type ImportPromise = Promise<Vec<ModuleValue>, ImportError>;

struct ImportSlots {
	keys: Vec<ModuleKey>,
	slots: Vec<Option<ModuleValue>>,
	missing: usize,
	timer: Option<Timer>,
	done: bool,
}

impl ImportSlots {
	fn fill(&mut self, key: &ModuleKey, value: &ModuleValue) {
		for (slot_key, slot) in self.keys.iter().zip(self.slots.iter_mut()) {
			if slot.is_none() && slot_key == key {
				*slot = Some(value.clone());
				self.missing -= 1;
			}
		}
	}

	/// Marks the import settled and hands back the values, once every slot is filled.
	fn take_if_complete(&mut self) -> Option<Vec<ModuleValue>> {
		if self.done || self.missing > 0 {
			return None;
		}
		self.done = true;
		if let Some(timer) = self.timer.take() {
			timer.cancel();
		}
		Some(self.slots.iter_mut().map(|s| s.take().unwrap_or_default()).collect())
	}

	fn missing_keys(&self) -> Vec<ModuleKey> {
		let mut missing: Vec<ModuleKey> = Vec::new();
		for (key, slot) in self.keys.iter().zip(&self.slots) {
			if slot.is_none() && !missing.contains(key) {
				missing.push(key.clone());
			}
		}
		missing
	}
}

struct PendingImport {
	id: u64,
	slots: Mutex<ImportSlots>,
	completer: Completer<Vec<ModuleValue>, ImportError>,
}

impl PublishWaiter for PendingImport {
	fn waiter_id(&self) -> u64 {
		self.id
	}

	fn on_publish(&self, key: &ModuleKey, value: &ModuleValue) {
		let values = {
			let mut slots = self.slots.lock();
			if slots.done {
				return;
			}
			slots.fill(key, value);
			tracing::trace!(import = self.id, key = %key, missing = slots.missing, "modules.import.slot_filled");
			slots.take_if_complete()
		};
		if let Some(values) = values {
			tracing::debug!(import = self.id, "modules.import.fulfilled");
			self.completer.resolve(values);
		}
	}
}

impl PendingImport {
	fn expire(&self, registry: &ModuleRegistry) {
		let missing = {
			let mut slots = self.slots.lock();
			if slots.done {
				return;
			}
			slots.done = true;
			slots.timer = None;
			slots.missing_keys()
		};
		for key in &missing {
			registry.unsubscribe(key, self.id);
		}
		let Some(key) = missing.into_iter().next() else {
			return;
		};
		tracing::warn!(import = self.id, key = %key, "modules.import.timeout");
		self.completer.reject(ImportError::Timeout { key });
	}

	/// Settles nothing and drops every subscription; used when setup fails.
	fn abandon(&self, registry: &ModuleRegistry) {
		let missing = {
			let mut slots = self.slots.lock();
			slots.done = true;
			if let Some(timer) = slots.timer.take() {
				timer.cancel();
			}
			slots.missing_keys()
		};
		for key in &missing {
			registry.unsubscribe(key, self.id);
		}
	}
}

/// Resolves imports against a registry, triggering loads for missing keys.
#[derive(Debug, Clone)]
pub struct Resolver {
	registry: Arc<ModuleRegistry>,
	gate: Arc<LoaderGate>,
	event_loop: EventLoop,
	ids: IdClock,
}

impl Resolver {
	pub fn new(registry: Arc<ModuleRegistry>, gate: Arc<LoaderGate>, event_loop: EventLoop) -> Self {
		Self {
			registry,
			gate,
			event_loop,
			ids: IdClock::new(),
		}
	}

	/// Starts an import of `keys`.
	///
	/// Synchronous failures (a loader that cannot start, such as a missing root URL)
	/// are returned as `Err` and leave no subscription behind. Everything after that
	/// is reported through the returned promise.
	pub fn import(&self, keys: Vec<ModuleKey>, timeout: ImportTimeout) -> Result<ImportPromise> {
		let (promise, completer) = ImportPromise::pending(&self.event_loop);
		let pending = Arc::new(PendingImport {
			id: self.ids.next(),
			slots: Mutex::new(ImportSlots {
				slots: vec![None; keys.len()],
				missing: keys.len(),
				keys,
				timer: None,
				done: false,
			}),
			completer,
		});
		let waiter: Arc<dyn PublishWaiter> = pending.clone();

		let to_load = {
			let mut slots = pending.slots.lock();
			let keys = slots.keys.clone();
			let mut subscribed: Vec<ModuleKey> = Vec::new();
			for key in &keys {
				if subscribed.contains(key) {
					continue;
				}
				match self.registry.lookup_or_subscribe(key, &waiter) {
					Some(value) => slots.fill(key, &value),
					None => subscribed.push(key.clone()),
				}
			}

			tracing::debug!(import = pending.id, keys = keys.len(), missing = subscribed.len(), "modules.import.start");
			if let Some(values) = slots.take_if_complete() {
				drop(slots);
				pending.completer.resolve(values);
				return Ok(promise);
			}
			subscribed
		};

		if let Err(err) = self.gate.preflight() {
			pending.abandon(&self.registry);
			return Err(err);
		}

		if let ImportTimeout::After(delay) = timeout {
			let expiring = Arc::clone(&pending);
			let registry = Arc::clone(&self.registry);
			let timer = Timer::after(&self.event_loop, delay, move || expiring.expire(&registry));
			let mut slots = pending.slots.lock();
			if slots.done {
				timer.cancel();
			} else {
				slots.timer = Some(timer);
			}
		}

		// Loads run without the import lock held: a loader may publish synchronously.
		for key in &to_load {
			if let Err(err) = self.gate.trigger(key) {
				pending.abandon(&self.registry);
				return Err(err);
			}
		}
		Ok(promise)
	}
}
