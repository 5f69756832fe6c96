//! The per-file session contract the scheduler drives.

use crate::{FileKey, Phase, Result};

/// One file's analysis pipeline, driven through the phase ladder.
///
/// Implementations are external to the scheduler: any pipeline honoring the
/// escalation contract can sit behind this trait. The [`crate::local`]
/// module provides the in-process implementation.
pub trait AnalysisSession: Send + Sync {
	/// The file this session analyzes.
	fn file(&self) -> &FileKey;

	/// Advances the pipeline at least to `target` and returns the phase
	/// actually reached.
	///
	/// A session already at or beyond `target` does no work and reports its
	/// current phase. The call may block for the duration of the opaque
	/// analysis work, so callers must not hold scheduler locks across it.
	/// [`Error::SourceUnavailable`] and [`Error::AnalysisFailed`] propagate
	/// to the caller unchanged; nothing here retries.
	///
	/// An invalidation landing mid-climb stops the climb early: the call
	/// reports the phase still standing, which may be below `target`.
	///
	/// [`Error::SourceUnavailable`]: crate::Error::SourceUnavailable
	/// [`Error::AnalysisFailed`]: crate::Error::AnalysisFailed
	fn escalate_to(&self, target: Phase) -> Result<Phase>;

	/// Marks everything derived from the file stale. The next escalation
	/// restarts from [`Phase::Modified`]. Idempotent.
	fn invalidate(&self);

	/// Highest phase currently standing for this session.
	fn phase(&self) -> Phase;
}
