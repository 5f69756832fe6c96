//! The phase-gated task contract and its scheduling attributes.

use std::sync::Arc;

use crate::session::AnalysisSession;
use crate::{FileKey, Phase, Result};

/// Relative urgency of task execution within one phase.
///
/// Orders execution among tasks waiting at the same rung; it carries no
/// uniqueness constraint. Variants are declared low to high so `Ord`
/// follows urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
	/// Run last.
	Min,
	/// Below normal.
	Low,
	/// The default.
	Normal,
	/// Above normal.
	High,
	/// Run first.
	Max,
}

/// Whether a task may run while the engine is scanning roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexingMode {
	/// Run even while a scan is in progress.
	AllowedDuringScan,
	/// Parked until the scan finishes.
	DisallowedDuringScan,
}

/// Everything a task sees when the engine runs it.
pub struct TaskContext<'a> {
	/// The file whose registry entry scheduled this run.
	pub file: &'a FileKey,
	/// The phase the session stood at when the run started.
	pub reached: Phase,
	/// The session handle, for further escalation or invalidation.
	pub session: &'a Arc<dyn AnalysisSession>,
}

/// One unit of analysis work bound to a single file.
///
/// The registry constructs exactly one task per tracked file and owns its
/// lifetime. The engine runs the task whenever the file's session reaches
/// the registered phase or a rerun is requested.
pub trait FileTask: Send + Sync {
	/// Performs the work. Errors are logged by the engine, never
	/// propagated; a failed run does not unregister the task.
	fn run(&self, ctx: &TaskContext<'_>) -> Result<()>;

	/// Advisory cancellation: a running or queued task should return
	/// early. Called from scheduler threads that may hold engine state, so
	/// implementations must be quick, must not block, and must not call
	/// back into the registry. Defaults to ignoring the request.
	fn cancel(&self) {}
}
