//! The analysis phase ladder and per-session escalation bookkeeping.

use std::fmt;

use crate::{Error, Result};

/// One milestone in a file's analysis pipeline.
///
/// Phases form a strict total order. Within one session a file only climbs
/// the ladder; it never descends except through invalidation, which drops
/// the session back to [`Phase::Modified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
	/// Source changed or was never analyzed; nothing derived is trustworthy.
	Modified,
	/// Syntax tree built.
	Parsed,
	/// Top-level declarations entered into scope.
	ElementsResolved,
	/// Bodies attributed and references resolved.
	Resolved,
	/// Nothing left to compute for the current source.
	UpToDate,
}

impl Phase {
	/// Ladder rungs in ascending order.
	pub const LADDER: [Phase; 5] = [
		Phase::Modified,
		Phase::Parsed,
		Phase::ElementsResolved,
		Phase::Resolved,
		Phase::UpToDate,
	];

	/// The immediate successor rung, or `None` at the top of the ladder.
	pub const fn next(self) -> Option<Phase> {
		match self {
			Phase::Modified => Some(Phase::Parsed),
			Phase::Parsed => Some(Phase::ElementsResolved),
			Phase::ElementsResolved => Some(Phase::Resolved),
			Phase::Resolved => Some(Phase::UpToDate),
			Phase::UpToDate => None,
		}
	}

	/// True at the top of the ladder.
	pub const fn is_terminal(self) -> bool {
		matches!(self, Phase::UpToDate)
	}

	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Phase::Modified => "modified",
			Phase::Parsed => "parsed",
			Phase::ElementsResolved => "elements-resolved",
			Phase::Resolved => "resolved",
			Phase::UpToDate => "up-to-date",
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Highest rung recorded for one analysis session.
///
/// Recording only moves up. [`PhaseWatermark::invalidate`] resets to
/// [`Phase::Modified`] so the next escalation restarts from the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseWatermark {
	reached: Phase,
}

impl PhaseWatermark {
	/// Creates a watermark at the ladder floor.
	pub const fn new() -> Self {
		Self { reached: Phase::Modified }
	}

	/// Highest phase recorded so far.
	pub const fn reached(&self) -> Phase {
		self.reached
	}

	/// Records that `phase` has been reached and returns the new watermark.
	///
	/// Recording the current rung again is a no-op. A rung below the
	/// watermark fails with [`Error::InvalidPhaseRequest`] and leaves the
	/// watermark untouched.
	pub fn record(&mut self, phase: Phase) -> Result<Phase> {
		if phase < self.reached {
			return Err(Error::InvalidPhaseRequest { requested: phase, current: self.reached });
		}
		self.reached = phase;
		Ok(self.reached)
	}

	/// Resets the watermark to the ladder floor.
	pub fn invalidate(&mut self) {
		self.reached = Phase::Modified;
	}
}

impl Default for PhaseWatermark {
	fn default() -> Self {
		Self::new()
	}
}
