//! Namespace-qualified module identity.

use std::fmt;
use std::str::FromStr;

use crate::error::{ModuleError, Result};

/// Separator between namespace and local name in key strings.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Where a module lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
	/// The single shared namespace for modules exported without a plugin.
	Global,
	/// A plugin-owned namespace.
	Plugin(String),
}

/// Identity of a published module: namespace plus local name.
///
/// Equality, ordering and hashing are structural. The string form is
/// `namespace:name` for plugin modules and bare `name` for the global namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleKey {
	namespace: Namespace,
	name: String,
}

impl ModuleKey {
	/// Builds a key from an optional namespace and a local name.
	///
	/// `None` selects the global namespace. Empty parts are rejected, as is a
	/// separator inside a namespace or inside a global name, since neither
	/// would survive a round trip through [`ModuleKey::parse`].
	pub fn new(namespace: Option<&str>, name: &str) -> Result<Self> {
		if name.is_empty() {
			return Err(invalid(namespace, name));
		}
		let namespace = match namespace {
			None if name.contains(NAMESPACE_SEPARATOR) => return Err(invalid(namespace, name)),
			None => Namespace::Global,
			Some(ns) if ns.is_empty() || ns.contains(NAMESPACE_SEPARATOR) => return Err(invalid(namespace, name)),
			Some(ns) => Namespace::Plugin(ns.to_string()),
		};
		Ok(Self {
			namespace,
			name: name.to_string(),
		})
	}

	/// Builds a key in the global namespace.
	pub fn global(name: &str) -> Result<Self> {
		Self::new(None, name)
	}

	/// Builds a key in a plugin namespace.
	pub fn plugin(namespace: &str, name: &str) -> Result<Self> {
		Self::new(Some(namespace), name)
	}

	/// Parses `namespace:name` or bare `name`, splitting on the first separator.
	pub fn parse(input: &str) -> Result<Self> {
		match input.split_once(NAMESPACE_SEPARATOR) {
			Some((namespace, name)) => {
				if namespace.is_empty() || name.is_empty() {
					return Err(ModuleError::InvalidKey(input.to_string()));
				}
				Ok(Self {
					namespace: Namespace::Plugin(namespace.to_string()),
					name: name.to_string(),
				})
			}
			None => Self::global(input),
		}
	}

	pub fn namespace(&self) -> &Namespace {
		&self.namespace
	}

	/// Returns the plugin namespace, or `None` for global modules.
	pub fn plugin_name(&self) -> Option<&str> {
		match &self.namespace {
			Namespace::Global => None,
			Namespace::Plugin(ns) => Some(ns),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns `true` when the module lives in the global namespace.
	pub fn is_global(&self) -> bool {
		self.namespace == Namespace::Global
	}

	/// Stable external identifier of the module's resources.
	pub fn resource_id(&self) -> String {
		match &self.namespace {
			Namespace::Global => format!("global-module:{}", self.name),
			Namespace::Plugin(ns) => format!("plugin-module:{ns}:{}", self.name),
		}
	}

	/// Locator path of the module's script, relative to the configured root.
	pub fn resource_path(&self) -> String {
		match &self.namespace {
			Namespace::Global => format!("jsmodules/{}.js", self.name),
			Namespace::Plugin(ns) => format!("plugin/{ns}/jsmodules/{}.js", self.name),
		}
	}
}

fn invalid(namespace: Option<&str>, name: &str) -> ModuleError {
	match namespace {
		Some(ns) => ModuleError::InvalidKey(format!("{ns}{NAMESPACE_SEPARATOR}{name}")),
		None => ModuleError::InvalidKey(name.to_string()),
	}
}

impl fmt::Display for ModuleKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.namespace {
			Namespace::Global => f.write_str(&self.name),
			Namespace::Plugin(ns) => write!(f, "{ns}{NAMESPACE_SEPARATOR}{}", self.name),
		}
	}
}

impl FromStr for ModuleKey {
	type Err = ModuleError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}
