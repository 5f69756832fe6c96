use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::WorkClass;

fn runtime_handle() -> tokio::runtime::Handle {
	static FALLBACK: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

	match tokio::runtime::Handle::try_current() {
		Ok(handle) => handle,
		Err(_) => FALLBACK
			.get_or_init(|| {
				tokio::runtime::Builder::new_multi_thread()
					.enable_all()
					.worker_threads(2)
					.thread_name("strata-worker-global")
					.build()
					.expect("failed to build strata-worker global tokio runtime")
			})
			.handle()
			.clone(),
	}
}

/// Spawns an async task with shared worker classification metadata.
///
/// Runs on the ambient tokio runtime when one exists, otherwise on a small
/// process-global fallback runtime.
pub fn spawn<F>(class: WorkClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Spawns a dedicated named OS thread with shared worker classification metadata.
pub fn spawn_named_thread<F, R>(class: WorkClass, name: impl Into<String>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_named_thread");
	std::thread::Builder::new().name(name.into()).spawn(f)
}
