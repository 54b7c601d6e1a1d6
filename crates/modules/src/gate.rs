//! On-demand load triggering with per-key deduplication.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::config::SharedConfig;
use crate::error::{ModuleError, Result};
use crate::key::ModuleKey;
use crate::resource::{AttachOptions, ResourceHost, attach_resource};

/// External mechanism that fetches a module's code.
///
/// Loading is fire-and-forget: success means the fetch was started. A fetch that
/// later fails is only observed by importers as a timeout.
pub trait ModuleLoader: Send + Sync {
	/// Checks that loads can be started at all, before any import state is set up.
	fn preflight(&self) -> Result<()> {
		Ok(())
	}

	/// Starts fetching `key`.
	fn load(&self, key: &ModuleKey) -> Result<()>;
}

/// Deduplicating front of a [`ModuleLoader`].
///
/// Each key is handed to the loader at most once for the life of the gate (or
/// until [`LoaderGate::reset`]), however many imports ask for it. A load that fails
/// synchronously does not count, so a later import can try again.
///
/// A key is marked before its load runs and no lock is held across
/// [`ModuleLoader::load`], so a loader may re-enter the gate. A trigger for the
/// same key that lands while that load is still running returns `Ok(false)`, even
/// if the load then fails; such callers are not retried and observe the failure
/// as an import timeout.
pub struct LoaderGate {
	loader: Arc<dyn ModuleLoader>,
	triggered: Mutex<FxHashSet<ModuleKey>>,
}

impl std::fmt::Debug for LoaderGate {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoaderGate").field("triggered", &self.triggered.lock().len()).finish_non_exhaustive()
	}
}

impl LoaderGate {
	pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
		Self {
			loader,
			triggered: Mutex::new(FxHashSet::default()),
		}
	}

	/// See [`ModuleLoader::preflight`].
	pub fn preflight(&self) -> Result<()> {
		self.loader.preflight()
	}

	/// Starts loading `key` unless it was triggered before.
	///
	/// Returns `Ok(true)` when this call started the load.
	pub fn trigger(&self, key: &ModuleKey) -> Result<bool> {
		if !self.triggered.lock().insert(key.clone()) {
			tracing::trace!(key = %key, "modules.gate.already_triggered");
			return Ok(false);
		}

		if let Err(err) = self.loader.load(key) {
			self.triggered.lock().remove(key);
			tracing::warn!(key = %key, error = %err, "modules.gate.load_failed");
			return Err(err);
		}
		tracing::debug!(key = %key, "modules.gate.triggered");
		Ok(true)
	}

	pub fn was_triggered(&self, key: &ModuleKey) -> bool {
		self.triggered.lock().contains(key)
	}

	pub fn triggered_count(&self) -> usize {
		self.triggered.lock().len()
	}

	/// Forgets every trigger. Test harness reset only.
	pub fn reset(&self) {
		self.triggered.lock().clear();
	}
}

/// [`ModuleLoader`] that attaches each module's script through a [`ResourceHost`].
///
/// The script is attached under `<key.resource_id()>:js` at
/// `<root_url>/<key.resource_path()>`, after the configured rewrite rules.
pub struct ResourceLoader {
	host: Arc<dyn ResourceHost>,
	config: SharedConfig,
}

impl ResourceLoader {
	pub fn new(host: Arc<dyn ResourceHost>, config: SharedConfig) -> Self {
		Self { host, config }
	}

	/// Resource id of a module's script.
	pub fn script_id(key: &ModuleKey) -> String {
		format!("{}:js", key.resource_id())
	}
}

impl ModuleLoader for ResourceLoader {
	fn preflight(&self) -> Result<()> {
		match self.config.read().root_url {
			Some(_) => Ok(()),
			None => Err(ModuleError::Configuration { attribute: "root_url" }),
		}
	}

	fn load(&self, key: &ModuleKey) -> Result<()> {
		let (root, rules) = {
			let config = self.config.read();
			(config.root_url.clone(), config.rewrite_rules.clone())
		};
		let options = AttachOptions::new(Self::script_id(key)).rewrite_rules(rules);
		if attach_resource(self.host.as_ref(), root.as_deref(), &key.resource_path(), &options)?.is_none() {
			tracing::warn!(key = %key, resource_id = %options.resource_id, "modules.loader.script_present");
		}
		Ok(())
	}
}
