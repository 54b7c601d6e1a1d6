//! Error types for module export, import and loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::key::ModuleKey;

/// Synchronous errors reported to the immediate caller.
#[derive(Debug, Error)]
pub enum ModuleError {
	/// A key string or key part could not be turned into a [`ModuleKey`].
	#[error("invalid module key '{0}'")]
	InvalidKey(String),

	/// A module was exported twice under the same key.
	#[error("module '{key}' has already been exported")]
	DuplicateExport {
		/// The key that was already published.
		key: ModuleKey,
	},

	/// A synchronous require asked for a module that has not been published.
	#[error(
		"Unable to perform synchronous 'require' for module '{key}'. This module is not pre-loaded. The module needs to have been asynchronously pre-loaded via an outer call to 'import'."
	)]
	NotPreloaded {
		/// The unpublished key.
		key: ModuleKey,
	},

	/// A configuration attribute needed to trigger a load is missing.
	#[error("configuration attribute '{attribute}' is not defined")]
	Configuration {
		/// Name of the missing attribute.
		attribute: &'static str,
	},

	/// Configuration could not be read or parsed.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Asynchronous import failures, delivered only through promise rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
	/// The import timeout elapsed with at least one key still unpublished.
	#[error("Timed out waiting on module '{key}' to load.")]
	Timeout {
		/// One of the keys that was still missing.
		key: ModuleKey,
	},
}

impl ImportError {
	/// Machine-checkable reason code.
	pub fn reason(&self) -> &'static str {
		match self {
			Self::Timeout { .. } => "timeout",
		}
	}

	/// Human-readable detail naming the offending key.
	pub fn detail(&self) -> String {
		self.to_string()
	}

	/// The key the failure is about.
	pub fn key(&self) -> &ModuleKey {
		match self {
			Self::Timeout { key } => key,
		}
	}
}

/// Errors that can occur when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The root URL contains characters that cannot appear in a locator prefix.
	#[error("invalid root URL: {0:?}")]
	InvalidRootUrl(String),

	/// A rewrite rule has an empty `from` pattern.
	#[error("rewrite rule {index} has an empty 'from' pattern")]
	EmptyRewritePattern {
		/// Position of the rule in the configured list.
		index: usize,
	},
}

/// Result type for synchronous module operations.
pub type Result<T, E = ModuleError> = std::result::Result<T, E>;
