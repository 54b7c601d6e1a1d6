//! Attachment of externally fetched resources.
//!
//! A resource is identified by a stable id. Attaching a second resource under an id
//! that is already attached fails unless the existing one is marked replaceable, in
//! which case the old one is detached first. Two resources with the same id never
//! coexist.

use std::borrow::Cow;

use modlink_worker::IdClock;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::error::{ModuleError, Result};

/// Opaque handle to one attached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(u64);

/// Host that attaches and detaches fetchable resources.
pub trait ResourceHost: Send + Sync {
	/// Attaches a resource, returning `None` when a non-replaceable resource with the
	/// same id is already attached.
	fn attach(&self, resource_id: &str, locator: &str, replaceable: bool) -> Option<ResourceHandle>;

	/// Detaches a resource. Returns `false` if it was not attached.
	fn detach(&self, handle: ResourceHandle) -> bool;
}

/// Literal substring rewrite applied to a resource path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteRule {
	pub from: String,
	pub to: String,
}

impl RewriteRule {
	pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
		Self {
			from: from.into(),
			to: to.into(),
		}
	}
}

/// Options for [`attach_resource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachOptions {
	pub resource_id: String,
	pub rewrite_rules: Vec<RewriteRule>,
	pub replaceable: bool,
}

impl AttachOptions {
	pub fn new(resource_id: impl Into<String>) -> Self {
		Self {
			resource_id: resource_id.into(),
			..Self::default()
		}
	}

	pub fn rewrite_rules(mut self, rules: Vec<RewriteRule>) -> Self {
		self.rewrite_rules = rules;
		self
	}

	pub fn replaceable(mut self, replaceable: bool) -> Self {
		self.replaceable = replaceable;
		self
	}
}

/// Applies the first rule whose `from` occurs in `path`, once.
pub fn rewrite_path<'a>(path: &'a str, rules: &[RewriteRule]) -> Cow<'a, str> {
	rules
		.iter()
		.find(|rule| !rule.from.is_empty() && path.contains(rule.from.as_str()))
		.map_or(Cow::Borrowed(path), |rule| Cow::Owned(path.replacen(rule.from.as_str(), &rule.to, 1)))
}

/// Builds `<root>/<rewritten path>`.
///
/// Fails with [`ModuleError::Configuration`] when no root is configured.
pub fn build_locator(root: Option<&str>, path: &str, rules: &[RewriteRule]) -> Result<String> {
	let root = root.ok_or(ModuleError::Configuration { attribute: "root_url" })?;
	let path = rewrite_path(path, rules);
	Ok(format!("{}/{}", root.trim_end_matches('/'), path.trim_start_matches('/')))
}

/// Builds the locator for `path` and attaches it through `host`.
///
/// Returns `Ok(None)` when the host refused the attach because a non-replaceable
/// resource with the same id is present.
pub fn attach_resource(host: &dyn ResourceHost, root: Option<&str>, path: &str, options: &AttachOptions) -> Result<Option<ResourceHandle>> {
	let locator = build_locator(root, path, &options.rewrite_rules)?;
	Ok(host.attach(&options.resource_id, &locator, options.replaceable))
}

/// Snapshot of one attached resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedResource {
	pub handle: ResourceHandle,
	pub resource_id: String,
	pub locator: String,
	pub replaceable: bool,
}

#[derive(Default)]
struct TableState {
	by_id: FxHashMap<String, AttachedResource>,
	ids: FxHashMap<ResourceHandle, String>,
}

/// In-memory [`ResourceHost`] recording what is attached.
#[derive(Default)]
pub struct ResourceTable {
	handles: IdClock,
	state: Mutex<TableState>,
}

impl ResourceTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the resource currently attached under `resource_id`.
	pub fn get(&self, resource_id: &str) -> Option<AttachedResource> {
		self.state.lock().by_id.get(resource_id).cloned()
	}

	pub fn is_attached(&self, handle: ResourceHandle) -> bool {
		self.state.lock().ids.contains_key(&handle)
	}

	/// Returns the locator of an attached resource.
	pub fn locator(&self, handle: ResourceHandle) -> Option<String> {
		let state = self.state.lock();
		let id = state.ids.get(&handle)?;
		state.by_id.get(id).map(|r| r.locator.clone())
	}

	/// Marks an attached resource (non-)replaceable. Returns `false` if not attached.
	pub fn set_replaceable(&self, handle: ResourceHandle, replaceable: bool) -> bool {
		let mut state = self.state.lock();
		let Some(id) = state.ids.get(&handle).cloned() else {
			return false;
		};
		match state.by_id.get_mut(&id) {
			Some(resource) => {
				resource.replaceable = replaceable;
				true
			}
			None => false,
		}
	}

	pub fn len(&self) -> usize {
		self.state.lock().by_id.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Detaches everything. Test harness reset only.
	pub fn clear(&self) {
		let mut state = self.state.lock();
		state.by_id.clear();
		state.ids.clear();
	}
}

impl ResourceHost for ResourceTable {
	fn attach(&self, resource_id: &str, locator: &str, replaceable: bool) -> Option<ResourceHandle> {
		let mut state = self.state.lock();
		if let Some(existing) = state.by_id.get(resource_id) {
			if !existing.replaceable {
				tracing::warn!(resource_id, "modules.resource.attach_refused");
				return None;
			}
			let old = existing.handle;
			state.ids.remove(&old);
			state.by_id.remove(resource_id);
			tracing::debug!(resource_id, "modules.resource.replaced");
		}

		let handle = ResourceHandle(self.handles.next());
		state.ids.insert(handle, resource_id.to_string());
		state.by_id.insert(
			resource_id.to_string(),
			AttachedResource {
				handle,
				resource_id: resource_id.to_string(),
				locator: locator.to_string(),
				replaceable,
			},
		);
		tracing::debug!(resource_id, locator, "modules.resource.attached");
		Some(handle)
	}

	fn detach(&self, handle: ResourceHandle) -> bool {
		let mut state = self.state.lock();
		match state.ids.remove(&handle) {
			Some(id) => {
				state.by_id.remove(&id);
				true
			}
			None => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;

	const SCRIPT_ID: &str = "adjunct:path/to/script.js";

	#[test]
	fn attach_without_replaceable_refuses_second_attach() {
		let table = ResourceTable::new();
		assert!(table.get(SCRIPT_ID).is_none());

		let options = AttachOptions::new(SCRIPT_ID);
		let first = attach_resource(&table, Some("/jenkins"), "path/to/script.js", &options)
			.unwrap()
			.expect("first attach succeeds");
		assert_eq!(table.locator(first).as_deref(), Some("/jenkins/path/to/script.js"));

		let second = attach_resource(&table, Some("/jenkins"), "path/to/script.js", &options).unwrap();
		assert_eq!(second, None);
		assert!(table.is_attached(first));
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn replaceable_resource_is_swapped() {
		let table = ResourceTable::new();
		let options = AttachOptions::new(SCRIPT_ID);
		let first = attach_resource(&table, Some("/jenkins"), "path/to/script.js", &options).unwrap().unwrap();
		assert!(table.set_replaceable(first, true));

		let second = attach_resource(&table, Some("/jenkins"), "path/to/script.js", &options)
			.unwrap()
			.expect("replaceable resource gives way");
		assert_ne!(second, first);
		assert!(!table.is_attached(first));
		assert!(table.is_attached(second));
		assert_eq!(table.get(SCRIPT_ID).map(|r| r.handle), Some(second));
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn rewrite_rules_apply_before_locator() {
		let table = ResourceTable::new();
		let options = AttachOptions::new(SCRIPT_ID).rewrite_rules(vec![RewriteRule::new("to/script.js", "to/some/other/script.js")]);
		let handle = attach_resource(&table, Some("/jenkins"), "path/to/script.js", &options).unwrap().unwrap();
		assert_eq!(table.locator(handle).as_deref(), Some("/jenkins/path/to/some/other/script.js"));
	}

	#[rstest]
	#[case(&[("nomatch", "x"), ("a", "b")], "a/a.js", "b/a.js")]
	#[case(&[("a/", "first/"), ("a", "second")], "a/a.js", "first/a.js")]
	#[case(&[("zzz", "y")], "a/a.js", "a/a.js")]
	#[case(&[("", "y")], "a/a.js", "a/a.js")]
	fn first_matching_rule_wins_once(#[case] rules: &[(&str, &str)], #[case] path: &str, #[case] expected: &str) {
		let rules: Vec<_> = rules.iter().map(|(f, t)| RewriteRule::new(*f, *t)).collect();
		assert_eq!(rewrite_path(path, &rules), expected);
	}

	#[test]
	fn missing_root_is_a_configuration_error() {
		let err = build_locator(None, "plugin/a/jsmodules/b.js", &[]).unwrap_err();
		assert!(matches!(err, ModuleError::Configuration { attribute: "root_url" }));
	}

	#[test]
	fn root_slashes_are_normalised() {
		assert_eq!(build_locator(Some("/jenkins/"), "/x.js", &[]).unwrap(), "/jenkins/x.js");
		assert_eq!(build_locator(Some(""), "x.js", &[]).unwrap(), "/x.js");
	}

	#[test]
	fn detach_unknown_handle_is_false() {
		let table = ResourceTable::new();
		let handle = table.attach("id", "/x.js", false).unwrap();
		assert!(table.detach(handle));
		assert!(!table.detach(handle));
		assert!(table.is_empty());
	}
}
