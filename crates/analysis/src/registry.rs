//! The file-to-task registry: membership reconciliation and reschedule
//! forwarding.
//!
//! One registry owns one family of tasks. It answers two questions:
//! * which files currently deserve a task (driven by a
//!   [`MembershipSource`] snapshot and the set differ)
//! * when an existing task must run again (driven by
//!   [`TaskRegistry::reschedule`])
//!
//! The registry never executes anything itself. It constructs tasks
//! through its [`TaskSource`], binds them to sessions from the
//! [`AnalysisEngine`], and forwards run requests; ordering and execution
//! stay the engine's business.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use strata_worker::SerialQueue;
use tracing::{debug, trace};

use crate::engine::AnalysisEngine;
use crate::membership::diff;
use crate::session::AnalysisSession;
use crate::task::{FileTask, IndexingMode, Priority};
use crate::{FileKey, Phase};

/// Builds the one task attached to each tracked file.
pub trait TaskSource: Send + Sync {
	/// Returns a freshly constructed task for `file`.
	///
	/// Every call must hand out a distinct task, never a shared `Arc`:
	/// the engine identifies tasks by pointer, so one task serving two
	/// files would make deregistration and rerun ambiguous between them.
	/// Must be quick and must never return `None`: a missing task would
	/// silently drop analysis coverage for the file, so the registry
	/// treats `None` as a fatal contract violation and panics.
	fn create_task(&self, file: &FileKey) -> Option<Arc<dyn FileTask>>;
}

/// Computes the current membership snapshot on demand.
pub trait MembershipSource: Send + Sync {
	/// Files that should currently have a task.
	///
	/// Queried outside the registry lock, so implementations may scan
	/// directories or consult other subsystems. Duplicate keys are
	/// tolerated and collapse silently.
	fn snapshot(&self) -> Vec<FileKey>;
}

/// Scheduling attributes every task from one registry is registered with.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
	/// The phase tasks want their file's session to reach before running.
	pub phase: Phase,
	/// Execution order among tasks waiting at the same phase.
	pub priority: Priority,
	/// Whether tasks may run while the engine is scanning roots.
	pub indexing: IndexingMode,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			phase: Phase::Resolved,
			priority: Priority::Normal,
			indexing: IndexingMode::DisallowedDuringScan,
		}
	}
}

/// How membership-change notifications reach reconciliation.
#[derive(Debug, Clone)]
pub enum DeliveryMode {
	/// Reconcile on the notifying thread. Deterministic; for tests and
	/// callers that control their own threading.
	Immediate,
	/// Post reconcile jobs to a serial worker. Reconciles for registries
	/// sharing one queue never overlap each other.
	Queued(SerialQueue),
}

struct TaskEntry {
	task: Arc<dyn FileTask>,
	session: Arc<dyn AnalysisSession>,
}

struct RegistryState {
	entries: FxHashMap<FileKey, TaskEntry>,
	disposed: bool,
}

struct RegistryInner {
	cfg: RegistryConfig,
	delivery: DeliveryMode,
	engine: Arc<dyn AnalysisEngine>,
	tasks: Arc<dyn TaskSource>,
	membership: Arc<dyn MembershipSource>,
	state: Mutex<RegistryState>,
}

/// Tracks a changing file set and keeps exactly one live analysis task per
/// tracked file.
///
/// Clones are cheap handles onto one registry. All map mutations happen
/// under a single lock and each reconcile computes its delta before
/// mutating, so no caller ever observes a tracked set mixing two
/// snapshots. Entries are owned by the registry alone; the outside world
/// reaches them only through call-through operations like
/// [`TaskRegistry::reschedule`].
#[derive(Clone)]
pub struct TaskRegistry {
	inner: Arc<RegistryInner>,
}

impl TaskRegistry {
	/// Creates a registry. Nothing is tracked until the first reconcile.
	pub fn new(
		cfg: RegistryConfig,
		delivery: DeliveryMode,
		engine: Arc<dyn AnalysisEngine>,
		tasks: Arc<dyn TaskSource>,
		membership: Arc<dyn MembershipSource>,
	) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				cfg,
				delivery,
				engine,
				tasks,
				membership,
				state: Mutex::new(RegistryState { entries: FxHashMap::default(), disposed: false }),
			}),
		}
	}

	/// Signals that tracked membership may have changed.
	///
	/// Takes a fresh snapshot from the membership source and reconciles
	/// against it, either inline or on the serial worker depending on the
	/// configured [`DeliveryMode`].
	pub fn membership_changed(&self) {
		match &self.inner.delivery {
			DeliveryMode::Immediate => self.inner.reconcile_from_source(),
			DeliveryMode::Queued(queue) => {
				let inner = Arc::clone(&self.inner);
				if !queue.submit(move || inner.reconcile_from_source()) {
					trace!("membership change dropped, reconcile queue closed");
				}
			}
		}
	}

	/// Brings the tracked set in line with `snapshot`, synchronously.
	///
	/// Files leaving the set are deregistered before files entering it are
	/// registered, so a key that leaves and returns within one snapshot
	/// boundary always gets a freshly constructed task. Reconciling
	/// against an unchanged snapshot does nothing.
	pub fn reconcile(&self, snapshot: Vec<FileKey>) {
		self.inner.reconcile_with(snapshot);
	}

	/// Asks the engine to run the task attached to `file` again.
	///
	/// Untracked files are a silent no-op: under queued delivery a
	/// reschedule legitimately races with a reconcile that just removed
	/// the file.
	pub fn reschedule(&self, file: &FileKey) {
		let state = self.inner.state.lock();
		if state.disposed {
			return;
		}
		match state.entries.get(file) {
			Some(entry) => self.inner.engine.rerun(&entry.task),
			None => trace!(file = %file, "reschedule for untracked file ignored"),
		}
	}

	/// Asks the engine to run every tracked task again, for example after
	/// an analysis-settings change.
	pub fn reschedule_all(&self) {
		let state = self.inner.state.lock();
		if state.disposed {
			return;
		}
		debug!(tasks = state.entries.len(), "rescheduling all tracked tasks");
		for entry in state.entries.values() {
			self.inner.engine.rerun(&entry.task);
		}
	}

	/// Deregisters every tracked task and empties the registry.
	///
	/// Idempotent; all later operations on this registry are no-ops. A
	/// serial queue shared with other registries stays open.
	pub fn dispose(&self) {
		let mut state = self.inner.state.lock();
		if state.disposed {
			return;
		}
		state.disposed = true;
		let count = state.entries.len();
		for (_, entry) in state.entries.drain() {
			self.inner.engine.deregister(&entry.task);
		}
		debug!(tasks = count, "registry disposed");
	}

	/// True once [`TaskRegistry::dispose`] has run.
	pub fn is_disposed(&self) -> bool {
		self.inner.state.lock().disposed
	}

	/// The tracked keys, sorted.
	pub fn tracked_files(&self) -> Vec<FileKey> {
		let state = self.inner.state.lock();
		let mut files: Vec<FileKey> = state.entries.keys().cloned().collect();
		files.sort();
		files
	}

	/// True when `file` currently has a task.
	pub fn is_tracked(&self, file: &FileKey) -> bool {
		self.inner.state.lock().entries.contains_key(file)
	}

	/// Number of tracked files.
	pub fn len(&self) -> usize {
		self.inner.state.lock().entries.len()
	}

	/// True when nothing is tracked.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl RegistryInner {
	fn reconcile_from_source(&self) {
		// Snapshot before taking the state lock; sources may do real work.
		let snapshot = self.membership.snapshot();
		self.reconcile_with(snapshot);
	}

	fn reconcile_with(&self, snapshot: Vec<FileKey>) {
		let mut state = self.state.lock();
		if state.disposed {
			return;
		}
		let delta = diff(state.entries.keys(), &snapshot);
		if delta.is_empty() {
			return;
		}
		debug!(
			added = delta.added.len(),
			removed = delta.removed.len(),
			tracked = state.entries.len(),
			"reconciling tracked set"
		);

		// Removals first: a surviving key keeps its entry untouched, a key
		// that left must be fully gone before anything new registers.
		for file in &delta.removed {
			if let Some(entry) = state.entries.remove(file) {
				self.engine.deregister(&entry.task);
				trace!(file = %file, phase = %entry.session.phase(), "task deregistered");
			}
		}
		for file in &delta.added {
			let Some(session) = self.engine.session_for(file) else {
				trace!(file = %file, "file not analyzable, skipped");
				continue;
			};
			let Some(task) = self.tasks.create_task(file) else {
				panic!("task source returned no task for {file}; every tracked file must get one");
			};
			self.engine.register(
				Arc::clone(&session),
				Arc::clone(&task),
				self.cfg.phase,
				self.cfg.priority,
				self.cfg.indexing,
			);
			state.entries.insert(file.clone(), TaskEntry { task, session });
			trace!(file = %file, phase = %self.cfg.phase, "task registered");
		}
	}
}
