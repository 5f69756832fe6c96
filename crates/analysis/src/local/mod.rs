//! The in-process engine and its sessions.
//!
//! The scheduler proper consumes [`crate::AnalysisEngine`] and
//! [`crate::AnalysisSession`] as contracts; this module implements both for
//! pipelines running inside the current process. The per-phase work stays
//! behind [`PhaseRunner`], injected at engine construction, so everything
//! here is scheduling: rung-by-rung escalation, a priority-ordered run
//! queue, the scan gate, and advisory cancellation.

mod engine;
mod session;

pub use engine::LocalEngine;
pub(crate) use session::LocalSession;

use crate::{FileKey, Phase, Result};

/// Executes the opaque analysis work for single ladder rungs.
pub trait PhaseRunner: Send + Sync {
	/// Performs the work that moves `file` onto `phase`, one rung up from
	/// where it stands.
	///
	/// Called rung by rung in ladder order, outside any scheduler lock.
	/// An error aborts the climb and surfaces unchanged from
	/// [`crate::AnalysisSession::escalate_to`].
	fn run_phase(&self, file: &FileKey, phase: Phase) -> Result<()>;

	/// Whether this runner analyzes `file` at all. Files it refuses get no
	/// session and are skipped by the registry. Defaults to accepting
	/// everything.
	fn accepts(&self, file: &FileKey) -> bool {
		let _ = file;
		true
	}
}
