//! Scheduler-level scenarios: the registry against a recording engine, the
//! two delivery modes, and the registry driving the in-process engine end
//! to end.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::engine::AnalysisEngine;
use crate::local::{LocalEngine, PhaseRunner};
use crate::registry::{DeliveryMode, MembershipSource, RegistryConfig, TaskRegistry, TaskSource};
use crate::session::AnalysisSession;
use crate::task::{FileTask, IndexingMode, Priority, TaskContext};
use crate::{FileKey, Phase, Result, SerialQueue, WorkClass};

const LONG_WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn key(name: &str) -> FileKey {
	FileKey::new(name)
}

fn ptr_of(task: &Arc<dyn FileTask>) -> usize {
	Arc::as_ptr(task) as *const () as usize
}

struct StubSession {
	file: FileKey,
}

impl AnalysisSession for StubSession {
	fn file(&self) -> &FileKey {
		&self.file
	}

	fn escalate_to(&self, target: Phase) -> Result<Phase> {
		Ok(target)
	}

	fn invalidate(&self) {}

	fn phase(&self) -> Phase {
		Phase::Modified
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineCall {
	Register(FileKey),
	Deregister(FileKey),
	Rerun(FileKey),
}

/// Engine double that records every registration-surface call in order.
#[derive(Default)]
struct RecordingEngine {
	calls: Mutex<Vec<EngineCall>>,
	keys: Mutex<FxHashMap<usize, FileKey>>,
	rejects: Mutex<Vec<FileKey>>,
}

impl RecordingEngine {
	fn calls(&self) -> Vec<EngineCall> {
		self.calls.lock().clone()
	}

	fn count(&self, call: &EngineCall) -> usize {
		self.calls.lock().iter().filter(|c| *c == call).count()
	}
}

impl AnalysisEngine for RecordingEngine {
	fn session_for(&self, file: &FileKey) -> Option<Arc<dyn AnalysisSession>> {
		if self.rejects.lock().contains(file) {
			return None;
		}
		Some(Arc::new(StubSession { file: file.clone() }))
	}

	fn register(
		&self,
		session: Arc<dyn AnalysisSession>,
		task: Arc<dyn FileTask>,
		_phase: Phase,
		_priority: Priority,
		_indexing: IndexingMode,
	) {
		let file = session.file().clone();
		self.keys.lock().insert(ptr_of(&task), file.clone());
		self.calls.lock().push(EngineCall::Register(file));
	}

	fn deregister(&self, task: &Arc<dyn FileTask>) {
		if let Some(file) = self.keys.lock().remove(&ptr_of(task)) {
			self.calls.lock().push(EngineCall::Deregister(file));
		}
	}

	fn rerun(&self, task: &Arc<dyn FileTask>) {
		if let Some(file) = self.keys.lock().get(&ptr_of(task)).cloned() {
			self.calls.lock().push(EngineCall::Rerun(file));
		}
	}
}

struct NoopTask;

impl FileTask for NoopTask {
	fn run(&self, _ctx: &TaskContext<'_>) -> Result<()> {
		Ok(())
	}
}

/// Task source that logs constructions and can be told to break the
/// never-`None` contract.
#[derive(Default)]
struct CountingSource {
	created: Mutex<Vec<FileKey>>,
	refuse: Mutex<Vec<FileKey>>,
}

impl CountingSource {
	fn created_count(&self, file: &FileKey) -> usize {
		self.created.lock().iter().filter(|f| *f == file).count()
	}
}

impl TaskSource for CountingSource {
	fn create_task(&self, file: &FileKey) -> Option<Arc<dyn FileTask>> {
		if self.refuse.lock().contains(file) {
			return None;
		}
		self.created.lock().push(file.clone());
		Some(Arc::new(NoopTask))
	}
}

#[derive(Default)]
struct ListSource {
	files: Mutex<Vec<FileKey>>,
}

impl ListSource {
	fn set(&self, files: Vec<FileKey>) {
		*self.files.lock() = files;
	}
}

impl MembershipSource for ListSource {
	fn snapshot(&self) -> Vec<FileKey> {
		self.files.lock().clone()
	}
}

struct Harness {
	registry: TaskRegistry,
	engine: Arc<RecordingEngine>,
	source: Arc<CountingSource>,
	membership: Arc<ListSource>,
}

fn harness(delivery: DeliveryMode) -> Harness {
	let engine = Arc::new(RecordingEngine::default());
	let source = Arc::new(CountingSource::default());
	let membership = Arc::new(ListSource::default());
	let registry = TaskRegistry::new(
		RegistryConfig::default(),
		delivery,
		Arc::clone(&engine) as Arc<dyn AnalysisEngine>,
		Arc::clone(&source) as Arc<dyn TaskSource>,
		Arc::clone(&membership) as Arc<dyn MembershipSource>,
	);
	Harness { registry, engine, source, membership }
}

#[test]
fn test_reconcile_tracks_snapshot_files() {
	init_tracing();
	let h = harness(DeliveryMode::Immediate);

	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);

	assert_eq!(h.registry.tracked_files(), vec![key("a.rs"), key("b.rs")]);
	assert_eq!(h.registry.len(), 2);
	assert_eq!(
		h.engine.calls(),
		vec![EngineCall::Register(key("a.rs")), EngineCall::Register(key("b.rs"))]
	);
}

#[test]
fn test_overlapping_reconcile_keeps_surviving_entries() {
	let h = harness(DeliveryMode::Immediate);

	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);
	h.registry.reconcile(vec![key("b.rs"), key("c.rs")]);

	assert_eq!(h.registry.tracked_files(), vec![key("b.rs"), key("c.rs")]);
	// The surviving entry is untouched: constructed once, never deregistered.
	assert_eq!(h.source.created_count(&key("b.rs")), 1);
	assert_eq!(h.engine.count(&EngineCall::Deregister(key("b.rs"))), 0);
	assert_eq!(h.engine.count(&EngineCall::Deregister(key("a.rs"))), 1);

	h.registry.reconcile(Vec::new());

	assert!(h.registry.is_empty());
	assert_eq!(h.engine.count(&EngineCall::Deregister(key("b.rs"))), 1);
	assert_eq!(h.engine.count(&EngineCall::Deregister(key("c.rs"))), 1);
}

#[test]
fn test_reconcile_is_idempotent() {
	let h = harness(DeliveryMode::Immediate);

	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);
	let calls = h.engine.calls();

	h.registry.reconcile(vec![key("b.rs"), key("a.rs")]);

	assert_eq!(h.engine.calls(), calls);
	assert_eq!(h.source.created_count(&key("a.rs")), 1);
	assert_eq!(h.source.created_count(&key("b.rs")), 1);
}

#[test]
fn test_removals_happen_before_additions() {
	let h = harness(DeliveryMode::Immediate);

	h.registry.reconcile(vec![key("a.rs")]);
	h.registry.reconcile(vec![key("b.rs")]);

	assert_eq!(
		h.engine.calls(),
		vec![
			EngineCall::Register(key("a.rs")),
			EngineCall::Deregister(key("a.rs")),
			EngineCall::Register(key("b.rs")),
		]
	);
}

#[test]
fn test_duplicate_snapshot_keys_collapse() {
	let h = harness(DeliveryMode::Immediate);

	h.registry.reconcile(vec![key("a.rs"), key("a.rs")]);

	assert_eq!(h.registry.len(), 1);
	assert_eq!(h.source.created_count(&key("a.rs")), 1);
}

#[test]
fn test_each_tracked_file_gets_its_own_task() {
	let h = harness(DeliveryMode::Immediate);

	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);

	// Tasks are engine identities; two files sharing one would make
	// deregistration ambiguous.
	assert_eq!(h.engine.keys.lock().len(), 2);
}

#[test]
fn test_reschedule_tracked_file_reruns_exactly_once() {
	let h = harness(DeliveryMode::Immediate);
	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);

	h.registry.reschedule(&key("a.rs"));

	assert_eq!(h.engine.count(&EngineCall::Rerun(key("a.rs"))), 1);
	assert_eq!(h.engine.count(&EngineCall::Rerun(key("b.rs"))), 0);
}

#[test]
fn test_reschedule_untracked_file_is_a_silent_noop() {
	init_tracing();
	let h = harness(DeliveryMode::Immediate);
	h.registry.reconcile(vec![key("a.rs")]);

	h.registry.reschedule(&key("ghost.rs"));

	assert!(h.engine.calls().iter().all(|c| !matches!(c, EngineCall::Rerun(_))));
}

#[test]
fn test_reschedule_all_hits_every_entry() {
	let h = harness(DeliveryMode::Immediate);
	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);

	h.registry.reschedule_all();

	assert_eq!(h.engine.count(&EngineCall::Rerun(key("a.rs"))), 1);
	assert_eq!(h.engine.count(&EngineCall::Rerun(key("b.rs"))), 1);
}

#[test]
fn test_unanalyzable_files_are_skipped() {
	let h = harness(DeliveryMode::Immediate);
	h.engine.rejects.lock().push(key("blob.bin"));

	h.registry.reconcile(vec![key("a.rs"), key("blob.bin")]);

	assert_eq!(h.registry.tracked_files(), vec![key("a.rs")]);
	assert_eq!(h.source.created_count(&key("blob.bin")), 0);
	// A later snapshot without the file must not try to deregister it.
	h.registry.reconcile(vec![key("a.rs")]);
	assert_eq!(h.registry.tracked_files(), vec![key("a.rs")]);
}

#[test]
#[should_panic(expected = "task source returned no task")]
fn test_task_source_contract_violation_panics() {
	let h = harness(DeliveryMode::Immediate);
	h.source.refuse.lock().push(key("a.rs"));

	h.registry.reconcile(vec![key("a.rs")]);
}

#[test]
fn test_dispose_deregisters_everything_and_freezes() {
	let h = harness(DeliveryMode::Immediate);
	h.registry.reconcile(vec![key("a.rs"), key("b.rs")]);

	h.registry.dispose();

	assert!(h.registry.is_disposed());
	assert!(h.registry.is_empty());
	assert_eq!(h.engine.count(&EngineCall::Deregister(key("a.rs"))), 1);
	assert_eq!(h.engine.count(&EngineCall::Deregister(key("b.rs"))), 1);

	let calls = h.engine.calls();
	h.registry.reconcile(vec![key("c.rs")]);
	h.registry.reschedule(&key("a.rs"));
	h.registry.reschedule_all();
	h.registry.dispose();

	assert_eq!(h.engine.calls(), calls);
	assert!(h.registry.tracked_files().is_empty());
}

#[test]
fn test_membership_changed_immediate_pulls_a_fresh_snapshot() {
	let h = harness(DeliveryMode::Immediate);

	h.membership.set(vec![key("a.rs")]);
	h.registry.membership_changed();

	assert_eq!(h.registry.tracked_files(), vec![key("a.rs")]);
}

#[tokio::test]
async fn test_queued_delivery_reconciles_on_the_worker() {
	init_tracing();
	let queue = SerialQueue::new(WorkClass::Scheduling, "reconcile.queued");
	let h = harness(DeliveryMode::Queued(queue.clone()));

	h.membership.set(vec![key("a.rs"), key("b.rs")]);
	h.registry.membership_changed();
	queue.flush().await;
	assert_eq!(h.registry.tracked_files(), vec![key("a.rs"), key("b.rs")]);

	h.membership.set(vec![key("b.rs"), key("c.rs")]);
	h.registry.membership_changed();
	queue.flush().await;
	assert_eq!(h.registry.tracked_files(), vec![key("b.rs"), key("c.rs")]);
	assert_eq!(h.source.created_count(&key("b.rs")), 1);

	queue.close();
}

#[tokio::test]
async fn test_queued_notifications_settle_on_the_latest_snapshot() {
	let queue = SerialQueue::new(WorkClass::Scheduling, "reconcile.settle");
	let h = harness(DeliveryMode::Queued(queue.clone()));

	// Both notifications are pending when the worker runs; each job takes
	// a fresh snapshot, so the tracked set lands on the newest one.
	h.membership.set(vec![key("a.rs")]);
	h.registry.membership_changed();
	h.membership.set(vec![key("b.rs")]);
	h.registry.membership_changed();
	queue.flush().await;

	assert_eq!(h.registry.tracked_files(), vec![key("b.rs")]);
	queue.close();
}

#[tokio::test]
async fn test_closed_queue_drops_notifications() {
	let queue = SerialQueue::new(WorkClass::Scheduling, "reconcile.closed");
	let h = harness(DeliveryMode::Queued(queue.clone()));
	queue.close();

	h.membership.set(vec![key("a.rs")]);
	h.registry.membership_changed();
	queue.flush().await;

	assert!(h.registry.is_empty());
}

struct OkRunner;

impl PhaseRunner for OkRunner {
	fn run_phase(&self, _file: &FileKey, _phase: Phase) -> Result<()> {
		Ok(())
	}
}

/// Task that reports each run's file and reached phase on a channel.
struct ReportingTask {
	notify: Mutex<mpsc::Sender<(FileKey, Phase)>>,
}

impl FileTask for ReportingTask {
	fn run(&self, ctx: &TaskContext<'_>) -> Result<()> {
		let _ = self.notify.lock().send((ctx.file.clone(), ctx.reached));
		Ok(())
	}
}

struct ReportingSource {
	tx: Mutex<mpsc::Sender<(FileKey, Phase)>>,
}

impl TaskSource for ReportingSource {
	fn create_task(&self, _file: &FileKey) -> Option<Arc<dyn FileTask>> {
		Some(Arc::new(ReportingTask { notify: Mutex::new(self.tx.lock().clone()) }))
	}
}

#[test]
fn test_registry_drives_the_local_engine_end_to_end() {
	init_tracing();
	let engine = Arc::new(LocalEngine::new(Arc::new(OkRunner) as Arc<dyn PhaseRunner>));
	let (tx, rx) = mpsc::channel();
	let registry = TaskRegistry::new(
		RegistryConfig {
			phase: Phase::Resolved,
			priority: Priority::Normal,
			indexing: IndexingMode::AllowedDuringScan,
		},
		DeliveryMode::Immediate,
		Arc::clone(&engine) as Arc<dyn AnalysisEngine>,
		Arc::new(ReportingSource { tx: Mutex::new(tx) }),
		Arc::new(ListSource::default()),
	);

	registry.reconcile(vec![key("a.rs"), key("b.rs")]);
	let mut first: Vec<(FileKey, Phase)> =
		(0..2).map(|_| rx.recv_timeout(LONG_WAIT).unwrap()).collect();
	first.sort();
	assert_eq!(
		first,
		vec![(key("a.rs"), Phase::Resolved), (key("b.rs"), Phase::Resolved)]
	);

	registry.reschedule(&key("a.rs"));
	assert_eq!(rx.recv_timeout(LONG_WAIT).unwrap(), (key("a.rs"), Phase::Resolved));

	registry.dispose();
	engine.shutdown();
}
