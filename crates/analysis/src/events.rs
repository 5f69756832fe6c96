//! Structure-change notifications and their synchronous fan-out.
//!
//! Sessions that discover declared-type or compilation-root changes hand a
//! [`StructureChange`] to [`StructureEvents`], which delivers it to every
//! registered [`StructureListener`]. Dispatch is pure fan-out: no batching,
//! no coalescing, no persistence. A listener that panics is logged and
//! skipped; it never suppresses delivery to the listeners after it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use strata_worker::EpochClock;
use tracing::warn;
use url::Url;

/// Handle to one declared type inside a compilation root.
///
/// Carries the qualified name only. Resolving the handle back to a live
/// element is the index's business, not the scheduler's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeHandle {
	qualified_name: Arc<str>,
}

impl TypeHandle {
	/// Creates a handle for `qualified_name`.
	pub fn new(qualified_name: impl Into<Arc<str>>) -> Self {
		Self { qualified_name: qualified_name.into() }
	}

	/// The fully qualified name of the type.
	pub fn qualified_name(&self) -> &str {
		&self.qualified_name
	}
}

/// Declared types added, removed or changed under one compilation root.
///
/// Immutable once constructed; clones share the payload.
#[derive(Debug, Clone)]
pub struct TypesDelta {
	root: Url,
	module: Option<Arc<str>>,
	types: Arc<[TypeHandle]>,
}

impl TypesDelta {
	/// Builds a delta for `root`, optionally scoped to one module.
	pub fn new(root: Url, module: Option<&str>, types: impl IntoIterator<Item = TypeHandle>) -> Self {
		Self { root, module: module.map(Arc::from), types: types.into_iter().collect() }
	}

	/// The compilation root the change happened under.
	pub fn root(&self) -> &Url {
		&self.root
	}

	/// The module the change is scoped to, when the root is modular.
	pub fn module(&self) -> Option<&str> {
		self.module.as_deref()
	}

	/// The affected type handles.
	pub fn types(&self) -> &[TypeHandle] {
		&self.types
	}
}

/// Compilation roots added to or removed from a tracked root collection.
#[derive(Debug, Clone)]
pub struct RootsDelta {
	roots: Arc<[Url]>,
}

impl RootsDelta {
	/// Builds a delta over `roots`.
	pub fn new(roots: impl IntoIterator<Item = Url>) -> Self {
		Self { roots: roots.into_iter().collect() }
	}

	/// The affected roots.
	pub fn roots(&self) -> &[Url] {
		&self.roots
	}
}

/// One structural change reported by an analysis session.
#[derive(Debug, Clone)]
pub enum StructureChange {
	/// Types newly declared under a root.
	TypesAdded(TypesDelta),
	/// Types no longer declared under a root.
	TypesRemoved(TypesDelta),
	/// Types whose declarations changed in place.
	TypesChanged(TypesDelta),
	/// Roots that joined the tracked collection.
	RootsAdded(RootsDelta),
	/// Roots that left the tracked collection.
	RootsRemoved(RootsDelta),
}

/// Receives structure-change notifications.
///
/// Every method defaults to a no-op so listeners implement only what they
/// watch. Methods are called synchronously on the dispatching thread and
/// should return quickly.
pub trait StructureListener: Send + Sync {
	/// Types appeared under a root.
	fn types_added(&self, delta: &TypesDelta) {
		let _ = delta;
	}

	/// Types disappeared from a root.
	fn types_removed(&self, delta: &TypesDelta) {
		let _ = delta;
	}

	/// Type declarations changed in place.
	fn types_changed(&self, delta: &TypesDelta) {
		let _ = delta;
	}

	/// Roots joined the tracked collection.
	fn roots_added(&self, delta: &RootsDelta) {
		let _ = delta;
	}

	/// Roots left the tracked collection.
	fn roots_removed(&self, delta: &RootsDelta) {
		let _ = delta;
	}
}

/// Identifies one listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
	id: ListenerId,
	listener: Arc<dyn StructureListener>,
}

/// Synchronous fan-out of [`StructureChange`]s to registered listeners.
pub struct StructureEvents {
	listeners: RwLock<Vec<ListenerEntry>>,
	ids: EpochClock,
	failures: AtomicU64,
}

impl StructureEvents {
	/// Creates an empty dispatcher.
	pub fn new() -> Self {
		Self { listeners: RwLock::new(Vec::new()), ids: EpochClock::new(), failures: AtomicU64::new(0) }
	}

	/// Registers a listener; the returned id removes it again.
	pub fn add_listener(&self, listener: Arc<dyn StructureListener>) -> ListenerId {
		let id = ListenerId(self.ids.next());
		self.listeners.write().push(ListenerEntry { id, listener });
		id
	}

	/// Removes a listener registration. Returns false when the id was
	/// already gone.
	pub fn remove_listener(&self, id: ListenerId) -> bool {
		let mut listeners = self.listeners.write();
		let before = listeners.len();
		listeners.retain(|entry| entry.id != id);
		listeners.len() != before
	}

	/// Number of live registrations.
	pub fn listener_count(&self) -> usize {
		self.listeners.read().len()
	}

	/// Number of listener invocations that panicked since construction.
	pub fn dispatch_failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Delivers `change` to every listener registered at this moment, in
	/// registration order, exactly once each.
	///
	/// Runs on the calling thread. Listener panics are caught, counted and
	/// logged; delivery continues with the next listener.
	pub fn dispatch(&self, change: &StructureChange) {
		let snapshot: Vec<(ListenerId, Arc<dyn StructureListener>)> = self
			.listeners
			.read()
			.iter()
			.map(|entry| (entry.id, Arc::clone(&entry.listener)))
			.collect();
		for (id, listener) in snapshot {
			let delivery = panic::catch_unwind(AssertUnwindSafe(|| match change {
				StructureChange::TypesAdded(delta) => listener.types_added(delta),
				StructureChange::TypesRemoved(delta) => listener.types_removed(delta),
				StructureChange::TypesChanged(delta) => listener.types_changed(delta),
				StructureChange::RootsAdded(delta) => listener.roots_added(delta),
				StructureChange::RootsRemoved(delta) => listener.roots_removed(delta),
			}));
			if delivery.is_err() {
				self.failures.fetch_add(1, Ordering::Relaxed);
				warn!(listener = id.0, "structure listener panicked during dispatch");
			}
		}
	}
}

impl Default for StructureEvents {
	fn default() -> Self {
		Self::new()
	}
}
