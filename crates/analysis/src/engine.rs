//! The engine contract the registry is a client of.

use std::sync::Arc;

use crate::session::AnalysisSession;
use crate::task::{FileTask, IndexingMode, Priority};
use crate::{FileKey, Phase};

/// Registration surface of an analysis engine.
///
/// The registry drives this API while holding its own lock, so
/// implementations must keep [`AnalysisEngine::register`],
/// [`AnalysisEngine::deregister`] and [`AnalysisEngine::rerun`] quick
/// bookkeeping that never calls back into the registry on the caller's
/// thread. Task identity is `Arc` pointer identity: the registry passes the
/// same `Arc` it registered.
pub trait AnalysisEngine: Send + Sync {
	/// Returns the session analyzing `file`, or `None` when the file
	/// cannot be analyzed at all (unreadable, unrecognized). Callers skip
	/// such files without treating them as errors.
	fn session_for(&self, file: &FileKey) -> Option<Arc<dyn AnalysisSession>>;

	/// Binds `task` to `session` and schedules its first run for when the
	/// session reaches `phase`.
	fn register(
		&self,
		session: Arc<dyn AnalysisSession>,
		task: Arc<dyn FileTask>,
		phase: Phase,
		priority: Priority,
		indexing: IndexingMode,
	);

	/// Drops the registration for `task`. Pending runs are discarded; a
	/// currently running task gets an advisory [`FileTask::cancel`].
	fn deregister(&self, task: &Arc<dyn FileTask>);

	/// Schedules another run of a registered task. Unknown tasks are
	/// ignored.
	fn rerun(&self, task: &Arc<dyn FileTask>);
}
