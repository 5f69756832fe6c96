use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::WorkClass;

type Job = Box<dyn FnOnce() + Send>;

/// Single-consumer job queue for work that must never overlap itself.
///
/// Jobs submitted to one queue run strictly in submission order on a
/// dedicated consumer task. Producers may submit from any thread, inside or
/// outside a tokio runtime. Clones share the queue.
#[derive(Clone)]
pub struct SerialQueue {
	tx: mpsc::UnboundedSender<Job>,
	cancel: CancellationToken,
}

impl SerialQueue {
	/// Creates a queue and starts its consumer task.
	pub fn new(class: WorkClass, name: impl Into<String>) -> Self {
		let name = name.into();
		let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
		let cancel = CancellationToken::new();
		let task_cancel = cancel.clone();
		crate::spawn(class, async move {
			loop {
				let job = tokio::select! {
					biased;
					_ = task_cancel.cancelled() => break,
					maybe_job = rx.recv() => {
						let Some(job) = maybe_job else {
							break;
						};
						job
					}
				};
				job();
			}
			tracing::trace!(queue = %name, "worker.serial.stopped");
		});
		Self { tx, cancel }
	}

	/// Enqueues a job. Returns false when the queue has been closed.
	pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
		if self.cancel.is_cancelled() {
			return false;
		}
		self.tx.send(Box::new(job)).is_ok()
	}

	/// Waits until every job submitted before this call has finished.
	///
	/// Returns immediately when the queue is closed.
	pub async fn flush(&self) {
		let (done_tx, done_rx) = oneshot::channel::<()>();
		if !self.submit(move || {
			let _ = done_tx.send(());
		}) {
			return;
		}
		// Err means the queue closed before the barrier ran; either way
		// nothing submitted earlier is still pending.
		let _ = done_rx.await;
	}

	/// Closes the queue. The running job finishes; jobs still queued are
	/// dropped and later submissions are rejected.
	pub fn close(&self) {
		self.cancel.cancel();
	}

	/// True once [`SerialQueue::close`] has been called.
	pub fn is_closed(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

impl std::fmt::Debug for SerialQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SerialQueue").field("closed", &self.is_closed()).finish()
	}
}
