//! Plugin module registry with asynchronous multi-key import resolution.
//!
//! Independently deployed plugin bundles publish named modules with
//! [`ModuleContext::export`]; consumers ask for one or more modules with
//! [`ModuleContext::import`] and get a [`Promise`] that fulfills once every
//! requested module has been published, or rejects with
//! [`ImportError::Timeout`] when one never shows up.
//!
//! * [`promise`]: single-assignment result with deferred fan-out listeners
//! * [`registry`]: publish-once table with one-shot publish notifications
//! * [`resolver`]: multi-key wait with timeout
//! * [`gate`]: per-key deduplication of load triggers, and the script loader
//! * [`resource`]: replace-on-conflict resource attachment and locator rewriting
//!
//! ```no_run
//! use modlink_modules::{ModuleContext, ModuleValue, ModulesConfig, ResourceTable};
//! use std::sync::Arc;
//!
//! struct MathUtils;
//! impl MathUtils {
//!     fn add(&self, a: i32, b: i32) -> i32 { a + b }
//! }
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = ModuleContext::new(ModulesConfig::default(), Arc::new(ResourceTable::new()));
//! ctx.export(Some("pluginA"), "mathUtils", Some(ModuleValue::new(MathUtils)))?;
//! let modules = ctx.import_with_timeout(&["pluginA:mathUtils"], 0_u64)?.wait().await?;
//! assert_eq!(modules[0].downcast_ref::<MathUtils>().map(|m| m.add(2, 2)), Some(4));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod key;
pub mod promise;
pub mod registry;
pub mod resolver;
pub mod resource;
mod value;

pub use config::{DEFAULT_REGISTER_TIMEOUT, ImportTimeout, ModulesConfig, SharedConfig};
pub use context::ModuleContext;
pub use error::{ConfigError, ImportError, ModuleError, Result};
pub use gate::{LoaderGate, ModuleLoader, ResourceLoader};
pub use key::{ModuleKey, Namespace};
pub use promise::{Completer, Promise, PromiseState};
pub use registry::{ModuleEntry, ModuleRegistry, PublishWaiter};
pub use resolver::{ImportPromise, Resolver};
pub use resource::{AttachOptions, AttachedResource, ResourceHandle, ResourceHost, ResourceTable, RewriteRule};
pub use value::ModuleValue;
