//! End-to-end export/import behaviour through [`ModuleContext`].

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MathUtils, RecordingLoader, TimeUtils, init_logging, jenkins_context};
use modlink_modules::{ImportTimeout, ModuleContext, ModuleError, ModuleKey, ModuleValue, ModulesConfig, PromiseState, ResourceLoader};
use pretty_assertions::assert_eq;

fn math() -> Option<ModuleValue> {
	Some(ModuleValue::new(MathUtils))
}

fn time() -> Option<ModuleValue> {
	Some(ModuleValue::new(TimeUtils {
		now_millis: 1_000_000_000_000,
	}))
}

#[tokio::test(start_paused = true)]
async fn import_without_export_times_out() {
	let (ctx, _) = jenkins_context();
	let err = ctx.require_sync("pluginA:mathUtils").unwrap_err();
	assert!(matches!(err, ModuleError::NotPreloaded { .. }));

	ctx.set_register_timeout(100_u64);
	let started = tokio::time::Instant::now();
	let err = ctx.import(&["pluginA:mathUtils"]).unwrap().wait().await.unwrap_err();
	assert_eq!(err.reason(), "timeout");
	assert_eq!(err.detail(), "Timed out waiting on module 'pluginA:mathUtils' to load.");
	assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn async_export_fulfills_waiting_imports_with_one_script() {
	let (ctx, table) = jenkins_context();

	let first = ctx.import_with_timeout(&["pluginA:mathUtils"], 2000_u64).unwrap();
	let second = ctx.import_with_timeout(&["pluginA:mathUtils"], 1000_u64).unwrap();

	let script_id = ResourceLoader::script_id(&ModuleKey::parse("pluginA:mathUtils").unwrap());
	let script = table.get(&script_id).expect("script attached");
	assert_eq!(script.locator, "/jenkins/plugin/pluginA/jsmodules/mathUtils.js");
	assert_eq!(table.len(), 1, "second import must not attach another script");

	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();

	for promise in [first, second] {
		let modules = promise.wait().await.unwrap();
		assert_eq!(modules[0].downcast_ref::<MathUtils>().map(|m| m.add(2, 2)), Some(4));
	}
	assert!(ctx.require_sync("pluginA:mathUtils").is_ok());
}

#[tokio::test]
async fn export_before_import_fulfills_on_next_turn() {
	let (ctx, table) = jenkins_context();
	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();

	let promise = ctx.import_with_timeout(&["pluginA:mathUtils"], ImportTimeout::IMMEDIATE).unwrap();
	assert_eq!(promise.state(), PromiseState::Fulfilled);

	let (tx, rx) = tokio::sync::oneshot::channel();
	promise.on_fulfilled(move |modules| {
		let _ = tx.send(modules[0].downcast_ref::<MathUtils>().map(|m| m.add(2, 2)));
	});
	assert_eq!(rx.await.unwrap(), Some(4));
	assert!(table.is_empty(), "nothing needed loading");
}

#[tokio::test]
async fn multi_plugin_import_waits_for_both() {
	let (ctx, _) = jenkins_context();
	ctx.set_register_timeout(2000_u64);
	let promise = ctx.import(&["pluginA:mathUtils", "pluginB:timeUtils"]).unwrap();

	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();
	assert_eq!(promise.state(), PromiseState::Pending);
	ctx.export(Some("pluginB"), "timeUtils", time()).unwrap();

	let modules = promise.wait().await.unwrap();
	assert_eq!(modules[0].downcast_ref::<MathUtils>().map(|m| m.add(2, 2)), Some(4));
	assert_eq!(modules[1].downcast_ref::<TimeUtils>().map(|t| t.now_millis), Some(1_000_000_000_000));
	assert!(!ModuleKey::parse("pluginA:mathUtils").unwrap().is_global());
}

#[tokio::test]
async fn already_exported_modules_import_with_zero_default_timeout() {
	let (ctx, _) = jenkins_context();
	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();
	ctx.export(Some("pluginB"), "timeUtils", time()).unwrap();
	ctx.set_register_timeout(ImportTimeout::IMMEDIATE);

	let modules = ctx.import(&["pluginA:mathUtils", "pluginB:timeUtils"]).unwrap().wait().await.unwrap();
	assert_eq!(modules.len(), 2);
	assert!(modules.iter().all(|m| !m.is_empty()));
}

#[tokio::test]
async fn global_namespace_modules() {
	let (ctx, table) = jenkins_context();
	let promise = ctx.import_with_timeout(&["mathUtils", "timeUtils"], 2000_u64).unwrap();
	assert_eq!(
		table.get("global-module:mathUtils:js").map(|s| s.locator),
		Some("/jenkins/jsmodules/mathUtils.js".to_string())
	);

	ctx.export(None, "mathUtils", math()).unwrap();
	ctx.export(None, "timeUtils", time()).unwrap();

	let modules = promise.wait().await.unwrap();
	assert_eq!(modules[0].downcast_ref::<MathUtils>().map(|m| m.add(2, 2)), Some(4));
	assert!(ModuleKey::parse("mathUtils").unwrap().is_global());
}

#[tokio::test]
async fn modules_exported_without_payload_still_resolve() {
	let (ctx, _) = jenkins_context();
	let promise = ctx.import_with_timeout(&["x", "pluginB:y"], 2000_u64).unwrap();
	ctx.export(None, "x", None).unwrap();
	ctx.export(Some("pluginB"), "y", None).unwrap();

	let modules = promise.wait().await.unwrap();
	assert_eq!(modules.len(), 2);
	assert!(modules.iter().all(ModuleValue::is_empty));
}

#[tokio::test]
async fn second_export_is_rejected_and_original_kept() {
	let (ctx, _) = jenkins_context();
	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();
	let err = ctx.export(Some("pluginA"), "mathUtils", Some(ModuleValue::new("impostor"))).unwrap_err();
	assert!(matches!(err, ModuleError::DuplicateExport { .. }));
	assert_eq!(err.to_string(), "module 'pluginA:mathUtils' has already been exported");

	let value = ctx.require_sync("pluginA:mathUtils").unwrap();
	assert!(value.downcast_ref::<MathUtils>().is_some());
}

#[tokio::test]
async fn missing_root_url_fails_import_synchronously() {
	init_logging();
	let table = Arc::new(modlink_modules::ResourceTable::new());
	let ctx = ModuleContext::new(ModulesConfig::default(), table.clone());

	let err = ctx.import(&["pluginA:mathUtils"]).unwrap_err();
	assert!(matches!(err, ModuleError::Configuration { attribute: "root_url" }));
	assert!(table.is_empty());

	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();
	ctx.set_root_url("/jenkins").unwrap();
	let promise = ctx.import(&["pluginA:mathUtils", "pluginA:other"]).unwrap();
	assert_eq!(promise.state(), PromiseState::Pending);
	assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn custom_loader_needs_no_root_url() {
	init_logging();
	let loader = Arc::new(RecordingLoader::default());
	let ctx = ModuleContext::with_loader(ModulesConfig::default(), loader.clone());

	let promise = ctx.import_with_timeout(&["pluginA:a", "pluginA:a", "b"], ImportTimeout::Never).unwrap();
	let again = ctx.import_with_timeout(&["b"], ImportTimeout::Never).unwrap();
	assert_eq!(*loader.loads.lock(), vec![ModuleKey::parse("pluginA:a").unwrap(), ModuleKey::parse("b").unwrap()]);

	ctx.export_key("pluginA:a", None).unwrap();
	ctx.export_key("b", None).unwrap();
	assert_eq!(promise.wait().await.unwrap().len(), 3);
	assert_eq!(again.wait().await.unwrap().len(), 1);
}

#[tokio::test]
async fn reset_allows_republishing() {
	let (ctx, table) = jenkins_context();
	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();
	ctx.reset_for_test();
	table.clear();

	assert!(ctx.require_sync("pluginA:mathUtils").is_err());
	let promise = ctx.import_with_timeout(&["pluginA:mathUtils"], ImportTimeout::Never).unwrap();
	assert_eq!(table.len(), 1, "load is triggered again after reset");
	ctx.export(Some("pluginA"), "mathUtils", math()).unwrap();
	assert!(promise.wait().await.is_ok());
}
