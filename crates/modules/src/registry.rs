//! Process-lifetime table of published modules.
//!
//! # Role
//!
//! The registry records each module exactly once and fans publish events out to the
//! imports waiting on that key.
//!
//! # Invariants
//!
//! - At most one [`ModuleEntry`] per key; an entry is never replaced or removed
//!   except by [`ModuleRegistry::clear`], which exists for test resets.
//! - A waiter registered through [`ModuleRegistry::lookup_or_subscribe`] either sees
//!   the value immediately or is notified by the publish that creates it. The check
//!   and the subscription happen under one lock, so no publish falls between them.
//! - Waiters are notified after the registry lock is released, and each
//!   subscription is notified at most once.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::{ModuleError, Result};
use crate::key::ModuleKey;
use crate::value::ModuleValue;

/// A published module.
#[derive(Debug, Clone)]
pub struct ModuleEntry {
	key: ModuleKey,
	value: ModuleValue,
}

impl ModuleEntry {
	pub fn key(&self) -> &ModuleKey {
		&self.key
	}

	pub fn value(&self) -> &ModuleValue {
		&self.value
	}
}

/// Receiver of one-shot publish notifications.
pub trait PublishWaiter: Send + Sync {
	/// Identifier used to unsubscribe.
	fn waiter_id(&self) -> u64;

	/// Called once when `key` is published.
	fn on_publish(&self, key: &ModuleKey, value: &ModuleValue);
}

#[derive(Default)]
struct RegistryState {
	entries: FxHashMap<ModuleKey, ModuleEntry>,
	waiters: FxHashMap<ModuleKey, Vec<Arc<dyn PublishWaiter>>>,
}

/// Table mapping module keys to published values.
#[derive(Default)]
pub struct ModuleRegistry {
	state: Mutex<RegistryState>,
}

impl std::fmt::Debug for ModuleRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("ModuleRegistry")
			.field("published", &state.entries.len())
			.field("waiting_keys", &state.waiters.len())
			.finish()
	}
}

impl ModuleRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Publishes `value` under `key` and notifies every waiter on that key.
	///
	/// A missing value publishes the empty sentinel. Publishing an existing key
	/// fails with [`ModuleError::DuplicateExport`] and leaves the original entry.
	pub fn publish(&self, key: ModuleKey, value: Option<ModuleValue>) -> Result<ModuleEntry> {
		let entry = ModuleEntry {
			key,
			value: value.unwrap_or_default(),
		};

		let waiters = {
			let mut state = self.state.lock();
			if state.entries.contains_key(&entry.key) {
				tracing::warn!(key = %entry.key, "modules.registry.duplicate_export");
				return Err(ModuleError::DuplicateExport { key: entry.key });
			}
			state.entries.insert(entry.key.clone(), entry.clone());
			state.waiters.remove(&entry.key).unwrap_or_default()
		};

		tracing::debug!(key = %entry.key, empty = entry.value.is_empty(), waiters = waiters.len(), "modules.registry.publish");
		for waiter in waiters {
			waiter.on_publish(&entry.key, &entry.value);
		}
		Ok(entry)
	}

	/// Returns the entry for `key` if it has been published.
	pub fn lookup(&self, key: &ModuleKey) -> Option<ModuleEntry> {
		self.state.lock().entries.get(key).cloned()
	}

	/// Returns the published value, refusing to wait or load.
	pub fn require_sync(&self, key: &ModuleKey) -> Result<ModuleValue> {
		match self.lookup(key) {
			Some(entry) => Ok(entry.value),
			None => Err(ModuleError::NotPreloaded { key: key.clone() }),
		}
	}

	pub fn is_published(&self, key: &ModuleKey) -> bool {
		self.state.lock().entries.contains_key(key)
	}

	/// Returns the published value, or subscribes `waiter` to the key's publish event.
	pub fn lookup_or_subscribe(&self, key: &ModuleKey, waiter: &Arc<dyn PublishWaiter>) -> Option<ModuleValue> {
		let mut state = self.state.lock();
		if let Some(entry) = state.entries.get(key) {
			return Some(entry.value.clone());
		}
		state.waiters.entry(key.clone()).or_default().push(Arc::clone(waiter));
		None
	}

	/// Drops the subscription of `waiter_id` on `key`, if any.
	pub fn unsubscribe(&self, key: &ModuleKey, waiter_id: u64) {
		let mut state = self.state.lock();
		if let Some(list) = state.waiters.get_mut(key) {
			list.retain(|w| w.waiter_id() != waiter_id);
			if list.is_empty() {
				state.waiters.remove(key);
			}
		}
	}

	/// Number of live subscriptions on `key`.
	pub fn waiter_count(&self, key: &ModuleKey) -> usize {
		self.state.lock().waiters.get(key).map_or(0, Vec::len)
	}

	/// Returns published keys sorted by namespace then name.
	pub fn published_keys(&self) -> Vec<ModuleKey> {
		let mut keys: Vec<_> = self.state.lock().entries.keys().cloned().collect();
		keys.sort();
		keys
	}

	pub fn len(&self) -> usize {
		self.state.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Forgets every entry and subscription. Test harness reset only.
	pub fn clear(&self) {
		let mut state = self.state.lock();
		state.entries.clear();
		state.waiters.clear();
	}
}
