use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::TaskClass;

static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

/// Returns the handle of the process-wide fallback runtime, building it on first use.
///
/// Process-lifetime state (the global module context) lives here so it survives the
/// short-lived runtimes that tests and embedders create.
pub fn global_handle() -> Handle {
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("modlink-worker-global")
			.build()
			.expect("failed to build modlink-worker global tokio runtime")
	});
	runtime.handle().clone()
}

/// Returns the current runtime handle, or the global fallback outside a runtime.
pub fn runtime_handle() -> Handle {
	if let Ok(handle) = Handle::try_current() {
		return handle;
	}
	global_handle()
}

/// Spawns an async task with shared worker classification metadata.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	spawn_on(&runtime_handle(), class, fut)
}

/// Spawns an async task on an explicit runtime handle.
pub fn spawn_on<F>(handle: &Handle, class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	handle.spawn(fut)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn spawn_outside_runtime_uses_global_fallback() {
		let handle = spawn(TaskClass::Background, async { 40 + 2 });
		let value = global_handle().block_on(handle).expect("task should complete");
		assert_eq!(value, 42);
	}

	#[tokio::test]
	async fn spawn_inside_runtime_uses_current_handle() {
		let current = Handle::current();
		assert_eq!(runtime_handle().id(), current.id());
		let out = spawn(TaskClass::Interactive, async { "done" }).await.expect("task should complete");
		assert_eq!(out, "done");
	}
}
