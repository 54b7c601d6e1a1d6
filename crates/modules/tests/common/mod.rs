//! Shared helpers for module runtime integration tests.

use std::sync::Arc;

use modlink_modules::{ModuleContext, ModuleKey, ModuleLoader, ModulesConfig, ResourceTable, Result};
use parking_lot::Mutex;

pub fn init_logging() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Context backed by a fresh resource table, rooted at `/jenkins`.
pub fn jenkins_context() -> (ModuleContext, Arc<ResourceTable>) {
	init_logging();
	let table = Arc::new(ResourceTable::new());
	let mut config = ModulesConfig::default();
	config.set_root_url("/jenkins").expect("valid root");
	(ModuleContext::new(config, table.clone()), table)
}

/// Loader recording every key it is asked to fetch.
#[derive(Default)]
pub struct RecordingLoader {
	pub loads: Mutex<Vec<ModuleKey>>,
}

impl ModuleLoader for RecordingLoader {
	fn load(&self, key: &ModuleKey) -> Result<()> {
		self.loads.lock().push(key.clone());
		Ok(())
	}
}

pub struct MathUtils;

impl MathUtils {
	pub fn add(&self, lhs: i64, rhs: i64) -> i64 {
		lhs + rhs
	}
}

pub struct TimeUtils {
	pub now_millis: u64,
}
