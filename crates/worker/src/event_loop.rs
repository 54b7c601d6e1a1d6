use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::{TaskClass, panic_message, runtime_handle, spawn_on};

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Turn {
	Run(Task),
	Barrier(oneshot::Sender<()>),
}

struct LoopInner {
	name: Arc<str>,
	tx: mpsc::UnboundedSender<Turn>,
	handle: Handle,
}

/// Serialized FIFO task queue drained by one dispatcher task.
///
/// A task handed to [`EventLoop::defer`] never runs inside the call that queued it;
/// it runs on a later turn, after every task queued before it. Tasks run one at a
/// time, so state touched only from loop tasks needs no further ordering.
///
/// The dispatcher exits once every handle has been dropped.
#[derive(Clone)]
pub struct EventLoop {
	inner: Arc<LoopInner>,
}

impl std::fmt::Debug for EventLoop {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventLoop").field("name", &self.inner.name).finish_non_exhaustive()
	}
}

impl EventLoop {
	/// Starts a loop on the current runtime, or on the global fallback runtime.
	pub fn new(name: impl Into<Arc<str>>) -> Self {
		Self::with_handle(name, &runtime_handle())
	}

	/// Starts a loop whose dispatcher and timers live on `handle`.
	pub fn with_handle(name: impl Into<Arc<str>>, handle: &Handle) -> Self {
		let name = name.into();
		let (tx, rx) = mpsc::unbounded_channel();
		spawn_on(handle, TaskClass::Interactive, dispatch(Arc::clone(&name), rx));
		Self {
			inner: Arc::new(LoopInner {
				name,
				tx,
				handle: handle.clone(),
			}),
		}
	}

	/// Returns the loop name used in log fields.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Returns the runtime the dispatcher runs on.
	pub fn handle(&self) -> &Handle {
		&self.inner.handle
	}

	/// Queues `task` to run on a later turn.
	///
	/// Returns `false` when the dispatcher is gone; the task is dropped unrun.
	pub fn defer(&self, task: impl FnOnce() + Send + 'static) -> bool {
		if self.inner.tx.send(Turn::Run(Box::new(task))).is_err() {
			tracing::warn!(event_loop = %self.inner.name, "worker.event_loop.closed");
			return false;
		}
		true
	}

	/// Resolves once every task queued before this call has run.
	pub async fn turn(&self) {
		let (tx, rx) = oneshot::channel();
		if self.inner.tx.send(Turn::Barrier(tx)).is_err() {
			return;
		}
		let _ = rx.await;
	}
}

async fn dispatch(name: Arc<str>, mut rx: mpsc::UnboundedReceiver<Turn>) {
	tracing::trace!(event_loop = %name, "worker.event_loop.start");
	while let Some(turn) = rx.recv().await {
		match turn {
			Turn::Run(task) => {
				if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
					let msg = panic_message(payload.as_ref()).unwrap_or_else(|| "opaque panic payload".to_string());
					tracing::error!(event_loop = %name, panic = %msg, "worker.event_loop.task_panicked");
				}
			}
			Turn::Barrier(done) => {
				let _ = done.send(());
			}
		}
	}
	tracing::trace!(event_loop = %name, "worker.event_loop.stop");
}
