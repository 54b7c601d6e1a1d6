//! The public export/import surface.

use std::sync::{Arc, OnceLock};

use modlink_worker::{EventLoop, global_handle};

use crate::config::{ImportTimeout, ModulesConfig, SharedConfig};
use crate::error::Result;
use crate::gate::{LoaderGate, ModuleLoader, ResourceLoader};
use crate::key::ModuleKey;
use crate::registry::{ModuleEntry, ModuleRegistry};
use crate::resolver::{ImportPromise, Resolver};
use crate::resource::{ResourceHost, ResourceTable};
use crate::value::ModuleValue;

/// One isolated module runtime: registry, loader gate, resolver and configuration.
///
/// Contexts are explicitly constructed so tests and multi-tenant hosts can run
/// several side by side. [`ModuleContext::global`] provides the process-wide one.
#[derive(Debug, Clone)]
pub struct ModuleContext {
	config: SharedConfig,
	registry: Arc<ModuleRegistry>,
	gate: Arc<LoaderGate>,
	resolver: Resolver,
	event_loop: EventLoop,
}

struct GlobalModules {
	context: ModuleContext,
	resources: Arc<ResourceTable>,
}

static GLOBAL: OnceLock<GlobalModules> = OnceLock::new();

impl ModuleContext {
	/// Creates a context that loads modules by attaching scripts to `host`.
	pub fn new(config: ModulesConfig, host: Arc<dyn ResourceHost>) -> Self {
		Self::build(config, EventLoop::new("modules"), |shared| {
			Arc::new(ResourceLoader::new(host, shared)) as Arc<dyn ModuleLoader>
		})
	}

	/// Creates a context with a custom loader.
	pub fn with_loader(config: ModulesConfig, loader: Arc<dyn ModuleLoader>) -> Self {
		Self::build(config, EventLoop::new("modules"), |_| loader)
	}

	fn build(config: ModulesConfig, event_loop: EventLoop, loader: impl FnOnce(SharedConfig) -> Arc<dyn ModuleLoader>) -> Self {
		let config = config.into_shared();
		let registry = Arc::new(ModuleRegistry::new());
		let gate = Arc::new(LoaderGate::new(loader(Arc::clone(&config))));
		let resolver = Resolver::new(Arc::clone(&registry), Arc::clone(&gate), event_loop.clone());
		Self {
			config,
			registry,
			gate,
			resolver,
			event_loop,
		}
	}

	/// The process-wide context, created on first use.
	///
	/// Its event loop and timers run on the worker's global runtime so they outlive
	/// any runtime the caller happens to be on. Scripts are attached to
	/// [`ModuleContext::global_resources`].
	pub fn global() -> &'static ModuleContext {
		&global_modules().context
	}

	/// The resource table backing [`ModuleContext::global`].
	pub fn global_resources() -> &'static Arc<ResourceTable> {
		&global_modules().resources
	}

	/// Publishes a module. `None` namespace selects the global namespace and `None`
	/// value publishes the empty sentinel.
	pub fn export(&self, namespace: Option<&str>, name: &str, value: Option<ModuleValue>) -> Result<ModuleEntry> {
		let key = ModuleKey::new(namespace, name)?;
		self.registry.publish(key, value)
	}

	/// Publishes a module under a `namespace:name` key string.
	pub fn export_key(&self, key: &str, value: Option<ModuleValue>) -> Result<ModuleEntry> {
		self.registry.publish(ModuleKey::parse(key)?, value)
	}

	/// Imports modules using the configured default timeout.
	pub fn import(&self, keys: &[&str]) -> Result<ImportPromise> {
		self.import_with_timeout(keys, self.register_timeout())
	}

	/// Imports modules with an explicit timeout.
	pub fn import_with_timeout(&self, keys: &[&str], timeout: impl Into<ImportTimeout>) -> Result<ImportPromise> {
		let keys = keys.iter().map(|k| ModuleKey::parse(k)).collect::<Result<Vec<_>>>()?;
		self.import_keys(keys, timeout.into())
	}

	/// Imports already parsed keys.
	pub fn import_keys(&self, keys: Vec<ModuleKey>, timeout: ImportTimeout) -> Result<ImportPromise> {
		self.resolver.import(keys, timeout)
	}

	/// Returns a published module without waiting or loading.
	pub fn require_sync(&self, key: &str) -> Result<ModuleValue> {
		self.registry.require_sync(&ModuleKey::parse(key)?)
	}

	/// Sets the default timeout for later imports.
	pub fn set_register_timeout(&self, timeout: impl Into<ImportTimeout>) {
		self.config.write().set_register_timeout(timeout.into());
	}

	pub fn register_timeout(&self) -> ImportTimeout {
		self.config.read().register_timeout()
	}

	/// Sets the prefix of module locators. Must happen before the first load.
	pub fn set_root_url(&self, url: &str) -> Result<()> {
		self.config.write().set_root_url(url)?;
		Ok(())
	}

	pub fn root_url(&self) -> Option<String> {
		self.config.read().root_url.clone()
	}

	/// Returns a snapshot of the current configuration.
	pub fn config(&self) -> ModulesConfig {
		self.config.read().clone()
	}

	pub fn registry(&self) -> &Arc<ModuleRegistry> {
		&self.registry
	}

	pub fn gate(&self) -> &Arc<LoaderGate> {
		&self.gate
	}

	pub fn event_loop(&self) -> &EventLoop {
		&self.event_loop
	}

	/// Forgets every published module, subscription and load trigger.
	///
	/// Publication is otherwise permanent; this exists so test cases can share a
	/// context. Imports still pending keep their timers and will time out.
	pub fn reset_for_test(&self) {
		tracing::debug!(published = self.registry.len(), triggered = self.gate.triggered_count(), "modules.context.reset");
		self.registry.clear();
		self.gate.reset();
	}
}

fn global_modules() -> &'static GlobalModules {
	GLOBAL.get_or_init(|| {
		let resources = Arc::new(ResourceTable::new());
		let host: Arc<dyn ResourceHost> = resources.clone();
		let event_loop = EventLoop::with_handle("modules-global", &global_handle());
		let context = ModuleContext::build(ModulesConfig::default(), event_loop, |shared| {
			Arc::new(ResourceLoader::new(host, shared)) as Arc<dyn ModuleLoader>
		});
		GlobalModules { context, resources }
	})
}
