use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use strata_worker::{EpochClock, WorkClass, spawn_named_thread};
use tracing::{debug, info, trace, warn};

use super::{LocalSession, PhaseRunner};
use crate::engine::AnalysisEngine;
use crate::session::AnalysisSession;
use crate::task::{FileTask, IndexingMode, Priority, TaskContext};
use crate::{FileKey, Phase};

/// Task identity inside the engine: the address of the registered `Arc`.
///
/// Addresses can be reused once a registration is dropped, so every queued
/// run also carries its registration's generation; stale runs are dropped
/// at drain time.
type TaskPtr = usize;

fn task_ptr(task: &Arc<dyn FileTask>) -> TaskPtr {
	Arc::as_ptr(task) as *const () as usize
}

struct Registration {
	generation: u64,
	session: Arc<dyn AnalysisSession>,
	task: Arc<dyn FileTask>,
	phase: Phase,
	priority: Priority,
	indexing: IndexingMode,
}

/// One queued execution of a registered task.
struct PendingRun {
	priority: Priority,
	seq: u64,
	task: TaskPtr,
	generation: u64,
}

impl PartialEq for PendingRun {
	fn eq(&self, other: &Self) -> bool {
		self.priority == other.priority && self.seq == other.seq
	}
}

impl Eq for PendingRun {}

impl PartialOrd for PendingRun {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for PendingRun {
	/// Max-heap order: higher priority first, older submissions first
	/// within one priority.
	fn cmp(&self, other: &Self) -> Ordering {
		self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
	}
}

#[derive(Default)]
struct EngineState {
	regs: FxHashMap<TaskPtr, Registration>,
	queue: BinaryHeap<PendingRun>,
	/// Scan-gated runs held back while a scan is in progress.
	parked: Vec<PendingRun>,
	scanning: bool,
	running: Option<TaskPtr>,
	shutdown: bool,
}

/// Everything the analysis thread needs to pick and perform one run.
struct RunJob {
	session: Arc<dyn AnalysisSession>,
	task: Arc<dyn FileTask>,
	phase: Phase,
}

/// In-process [`AnalysisEngine`] draining a priority-ordered run queue on
/// one dedicated analysis thread.
///
/// Registering a task schedules its first run; [`AnalysisEngine::rerun`]
/// schedules further ones. Each run escalates the file's session to the
/// registered phase and then executes the task body. Runs registered as
/// [`IndexingMode::DisallowedDuringScan`] are parked while
/// [`LocalEngine::set_scanning`] holds the gate closed and released when it
/// opens again. A run that fails or panics is logged and dropped; the
/// thread moves on to the next run.
pub struct LocalEngine {
	inner: Arc<EngineInner>,
	worker: Mutex<Option<JoinHandle<()>>>,
}

struct EngineInner {
	runner: Arc<dyn PhaseRunner>,
	state: Mutex<EngineState>,
	wake: Condvar,
	seq: EpochClock,
}

impl LocalEngine {
	/// Starts an engine and its analysis thread over `runner`.
	pub fn new(runner: Arc<dyn PhaseRunner>) -> Self {
		let inner = Arc::new(EngineInner {
			runner,
			state: Mutex::new(EngineState::default()),
			wake: Condvar::new(),
			seq: EpochClock::new(),
		});
		let drain = Arc::clone(&inner);
		let worker = spawn_named_thread(WorkClass::Analysis, "strata-analysis", move || drain.drain())
			.expect("failed to spawn strata analysis thread");
		info!("analysis engine started");
		Self { inner, worker: Mutex::new(Some(worker)) }
	}

	/// Opens or closes the scan gate.
	///
	/// While closed, runs registered as
	/// [`IndexingMode::DisallowedDuringScan`] are parked instead of
	/// executed; opening the gate releases them in priority order.
	pub fn set_scanning(&self, scanning: bool) {
		let mut state = self.inner.state.lock();
		if state.scanning == scanning {
			return;
		}
		state.scanning = scanning;
		if scanning {
			debug!("scan started, gating runs");
		} else {
			let parked = std::mem::take(&mut state.parked);
			if !parked.is_empty() {
				debug!(released = parked.len(), "scan finished, parked runs released");
			}
			for run in parked {
				state.queue.push(run);
			}
		}
		self.inner.wake.notify_all();
	}

	/// True while the scan gate is closed.
	pub fn is_scanning(&self) -> bool {
		self.inner.state.lock().scanning
	}

	/// Number of runs waiting to execute, queued plus parked.
	pub fn pending_runs(&self) -> usize {
		let state = self.inner.state.lock();
		state.queue.len() + state.parked.len()
	}

	/// Number of tasks currently registered.
	pub fn registered_tasks(&self) -> usize {
		self.inner.state.lock().regs.len()
	}

	/// Stops the analysis thread and joins it.
	///
	/// The run in progress finishes; runs still queued are dropped.
	/// Idempotent.
	pub fn shutdown(&self) {
		{
			let mut state = self.inner.state.lock();
			state.shutdown = true;
			self.inner.wake.notify_all();
		}
		if let Some(worker) = self.worker.lock().take() {
			if worker.join().is_err() {
				warn!("analysis thread panicked before shutdown");
			}
			info!("analysis engine stopped");
		}
	}
}

impl Drop for LocalEngine {
	fn drop(&mut self) {
		// Signal without joining; dropping must not block on a long run.
		let mut state = self.inner.state.lock();
		state.shutdown = true;
		self.inner.wake.notify_all();
	}
}

impl AnalysisEngine for LocalEngine {
	fn session_for(&self, file: &FileKey) -> Option<Arc<dyn AnalysisSession>> {
		if !self.inner.runner.accepts(file) {
			return None;
		}
		Some(Arc::new(LocalSession::new(file.clone(), Arc::clone(&self.inner.runner))))
	}

	fn register(
		&self,
		session: Arc<dyn AnalysisSession>,
		task: Arc<dyn FileTask>,
		phase: Phase,
		priority: Priority,
		indexing: IndexingMode,
	) {
		let ptr = task_ptr(&task);
		let mut state = self.inner.state.lock();
		if state.shutdown {
			return;
		}
		debug!(file = %session.file(), phase = %phase, "task registered with engine");
		let generation = self.inner.seq.next();
		state.regs.insert(ptr, Registration { generation, session, task, phase, priority, indexing });
		state.queue.push(PendingRun { priority, seq: self.inner.seq.next(), task: ptr, generation });
		self.inner.wake.notify_all();
	}

	fn deregister(&self, task: &Arc<dyn FileTask>) {
		let ptr = task_ptr(task);
		let mut state = self.inner.state.lock();
		let Some(reg) = state.regs.remove(&ptr) else {
			return;
		};
		if state.running == Some(ptr) {
			// Advisory only; the body decides how quickly it backs out.
			reg.task.cancel();
		}
		debug!(file = %reg.session.file(), "task deregistered from engine");
	}

	fn rerun(&self, task: &Arc<dyn FileTask>) {
		let ptr = task_ptr(task);
		let mut state = self.inner.state.lock();
		if state.shutdown {
			return;
		}
		let Some(reg) = state.regs.get(&ptr) else {
			trace!("rerun for unregistered task ignored");
			return;
		};
		let (priority, generation, running_task) = (reg.priority, reg.generation, Arc::clone(&reg.task));
		if state.running == Some(ptr) {
			// The next run wants fresh results, not the ones in flight.
			running_task.cancel();
		}
		state.queue.push(PendingRun { priority, seq: self.inner.seq.next(), task: ptr, generation });
		self.inner.wake.notify_all();
	}
}

impl EngineInner {
	fn drain(&self) {
		loop {
			let job = {
				let mut state = self.state.lock();
				loop {
					if state.shutdown {
						return;
					}
					match self.pop_eligible(&mut state) {
						Some(job) => break job,
						None => self.wake.wait(&mut state),
					}
				}
			};
			self.execute(job);
			self.state.lock().running = None;
		}
	}

	/// Pops the next runnable entry, parking scan-gated runs and dropping
	/// runs whose registration is gone.
	fn pop_eligible(&self, state: &mut EngineState) -> Option<RunJob> {
		while let Some(run) = state.queue.pop() {
			let Some(reg) = state.regs.get(&run.task) else {
				trace!("dropping run for deregistered task");
				continue;
			};
			if reg.generation != run.generation {
				// Same address, different registration: the run predates a
				// reuse of the slot.
				trace!("dropping run for a stale registration");
				continue;
			}
			if state.scanning && reg.indexing == IndexingMode::DisallowedDuringScan {
				state.parked.push(run);
				continue;
			}
			let job = RunJob {
				session: Arc::clone(&reg.session),
				task: Arc::clone(&reg.task),
				phase: reg.phase,
			};
			state.running = Some(run.task);
			return Some(job);
		}
		None
	}

	/// Escalates the session and runs the task body, outside all locks.
	///
	/// Panics from the pipeline or the task body are caught and logged;
	/// the drain loop keeps serving the runs behind them.
	fn execute(&self, job: RunJob) {
		let run = panic::catch_unwind(AssertUnwindSafe(|| match job.session.escalate_to(job.phase) {
			Ok(reached) if reached >= job.phase => {
				let ctx = TaskContext { file: job.session.file(), reached, session: &job.session };
				if let Err(error) = job.task.run(&ctx) {
					warn!(file = %job.session.file(), error = %error, "analysis task failed");
				}
			}
			Ok(reached) => {
				// Escalation was cut short by an invalidation; whoever
				// invalidated is responsible for the follow-up reschedule.
				trace!(
					file = %job.session.file(),
					wanted = %job.phase,
					reached = %reached,
					"run skipped, session below requested phase"
				);
			}
			Err(error) => {
				warn!(file = %job.session.file(), error = %error, "phase escalation failed");
			}
		}));
		if run.is_err() {
			warn!(file = %job.session.file(), "analysis run panicked");
		}
	}
}
