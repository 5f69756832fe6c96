use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic clock handing out run sequence numbers and listener IDs.
///
/// Clones share the counter, so every clone of one clock draws from the
/// same sequence.
#[derive(Debug, Default, Clone)]
pub struct EpochClock {
	next: Arc<AtomicU64>,
}

impl EpochClock {
	/// Creates a new clock whose first value is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next value.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}
