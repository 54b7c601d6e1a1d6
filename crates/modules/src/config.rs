//! Module runtime configuration.
//!
//! Configuration is TOML:
//!
//! ```toml
//! root_url = "/jenkins"
//! register_timeout_ms = 2000
//!
//! [[rewrite_rules]]
//! from = "jsmodules/legacy"
//! to = "jsmodules/v2"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::resource::RewriteRule;

/// Timeout used by imports that do not pass one.
pub const DEFAULT_REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an import waits for missing modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTimeout {
	/// Reject once the duration elapses. Zero rejects one turn after the import
	/// unless every key is already published.
	After(Duration),
	/// Never time out.
	Never,
}

impl ImportTimeout {
	pub const IMMEDIATE: Self = Self::After(Duration::ZERO);

	pub const fn from_millis(millis: u64) -> Self {
		Self::After(Duration::from_millis(millis))
	}
}

impl Default for ImportTimeout {
	fn default() -> Self {
		Self::After(DEFAULT_REGISTER_TIMEOUT)
	}
}

impl From<u64> for ImportTimeout {
	fn from(millis: u64) -> Self {
		Self::from_millis(millis)
	}
}

impl From<Duration> for ImportTimeout {
	fn from(duration: Duration) -> Self {
		Self::After(duration)
	}
}

/// Runtime configuration shared by the context and its loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModulesConfig {
	/// Prefix of every module locator.
	pub root_url: Option<String>,
	/// Default import timeout in milliseconds.
	pub register_timeout_ms: Option<u64>,
	/// Imports without an explicit timeout wait forever.
	pub wait_forever: bool,
	/// Rewrites applied to module paths before the root is prefixed.
	pub rewrite_rules: Vec<RewriteRule>,
}

/// Configuration handle shared between a context and its loader.
pub type SharedConfig = Arc<RwLock<ModulesConfig>>;

impl ModulesConfig {
	/// Parses and validates TOML configuration.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let mut config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads configuration from a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&input)
	}

	fn validate(&mut self) -> Result<(), ConfigError> {
		if let Some(root) = self.root_url.take() {
			self.root_url = Some(normalize_root(&root)?);
		}
		if let Some(index) = self.rewrite_rules.iter().position(|r| r.from.is_empty()) {
			return Err(ConfigError::EmptyRewritePattern { index });
		}
		Ok(())
	}

	/// Sets the root URL, trimming trailing slashes.
	pub fn set_root_url(&mut self, url: &str) -> Result<(), ConfigError> {
		self.root_url = Some(normalize_root(url)?);
		Ok(())
	}

	pub fn root_url(&self) -> Option<&str> {
		self.root_url.as_deref()
	}

	/// Effective default timeout for imports.
	pub fn register_timeout(&self) -> ImportTimeout {
		if self.wait_forever {
			return ImportTimeout::Never;
		}
		self.register_timeout_ms.map_or_else(ImportTimeout::default, ImportTimeout::from_millis)
	}

	pub fn set_register_timeout(&mut self, timeout: ImportTimeout) {
		match timeout {
			ImportTimeout::Never => {
				self.wait_forever = true;
				self.register_timeout_ms = None;
			}
			ImportTimeout::After(duration) => {
				self.wait_forever = false;
				self.register_timeout_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
			}
		}
	}

	/// Wraps the configuration for sharing.
	pub fn into_shared(self) -> SharedConfig {
		Arc::new(RwLock::new(self))
	}
}

fn normalize_root(url: &str) -> Result<String, ConfigError> {
	if url.chars().any(char::is_whitespace) {
		return Err(ConfigError::InvalidRootUrl(url.to_string()));
	}
	Ok(url.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn parses_full_config() {
		let config = ModulesConfig::from_toml_str(
			r#"
			root_url = "/jenkins/"
			register_timeout_ms = 2000

			[[rewrite_rules]]
			from = "to/script.js"
			to = "to/some/other/script.js"
			"#,
		)
		.unwrap();

		assert_eq!(config.root_url(), Some("/jenkins"));
		assert_eq!(config.register_timeout(), ImportTimeout::from_millis(2000));
		assert_eq!(config.rewrite_rules, vec![RewriteRule::new("to/script.js", "to/some/other/script.js")]);
	}

	#[test]
	fn empty_config_uses_defaults() {
		let config = ModulesConfig::from_toml_str("").unwrap();
		assert_eq!(config, ModulesConfig::default());
		assert_eq!(config.register_timeout(), ImportTimeout::After(DEFAULT_REGISTER_TIMEOUT));
		assert_eq!(config.root_url(), None);
	}

	#[test]
	fn wait_forever_overrides_timeout() {
		let config = ModulesConfig::from_toml_str("wait_forever = true\nregister_timeout_ms = 5").unwrap();
		assert_eq!(config.register_timeout(), ImportTimeout::Never);
	}

	#[test]
	fn unknown_fields_are_rejected() {
		let err = ModulesConfig::from_toml_str("resURL = \"/jenkins\"").unwrap_err();
		assert!(matches!(err, ConfigError::Toml(_)));
	}

	#[test]
	fn invalid_values_are_rejected() {
		assert!(matches!(
			ModulesConfig::from_toml_str("root_url = \"/jen kins\""),
			Err(ConfigError::InvalidRootUrl(_))
		));
		assert!(matches!(
			ModulesConfig::from_toml_str("[[rewrite_rules]]\nfrom = \"\"\nto = \"x\""),
			Err(ConfigError::EmptyRewritePattern { index: 0 })
		));
	}

	#[test]
	fn set_register_timeout_round_trips() {
		let mut config = ModulesConfig::default();
		config.set_register_timeout(ImportTimeout::Never);
		assert_eq!(config.register_timeout(), ImportTimeout::Never);
		config.set_register_timeout(ImportTimeout::IMMEDIATE);
		assert_eq!(config.register_timeout(), ImportTimeout::IMMEDIATE);
		config.set_register_timeout(ImportTimeout::from(100_u64));
		assert_eq!(config.register_timeout(), ImportTimeout::from_millis(100));
	}

	#[test]
	fn loads_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "root_url = \"/ci\"").unwrap();
		let config = ModulesConfig::load(file.path()).unwrap();
		assert_eq!(config.root_url(), Some("/ci"));

		let missing = ModulesConfig::load(file.path().with_extension("missing")).unwrap_err();
		assert!(matches!(missing, ConfigError::Io { .. }));
	}
}
