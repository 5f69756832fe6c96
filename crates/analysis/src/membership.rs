//! Membership snapshots and the set differ that windows them.

use rustc_hash::FxHashSet;

use crate::FileKey;

/// Files to start and stop tracking, computed from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
	/// In the snapshot but not yet tracked.
	pub added: Vec<FileKey>,
	/// Tracked but gone from the snapshot.
	pub removed: Vec<FileKey>,
}

impl MembershipDelta {
	/// True when the snapshot matches the tracked set exactly.
	pub fn is_empty(&self) -> bool {
		self.added.is_empty() && self.removed.is_empty()
	}
}

/// Splits a fresh membership snapshot against the currently tracked keys.
///
/// Pure set arithmetic over whole keys: `added` is the snapshot minus the
/// tracked set, `removed` is the tracked set minus the snapshot. Duplicate
/// keys on either side collapse silently. Both outputs come back sorted so
/// reconcile logs and tests are deterministic.
pub fn diff<'a, I>(current: I, snapshot: &[FileKey]) -> MembershipDelta
where
	I: IntoIterator<Item = &'a FileKey>,
{
	let fresh: FxHashSet<&FileKey> = snapshot.iter().collect();
	let mut tracked: FxHashSet<&FileKey> = FxHashSet::default();
	let mut removed = Vec::new();
	for key in current {
		if tracked.insert(key) && !fresh.contains(key) {
			removed.push(key.clone());
		}
	}

	let mut added = Vec::new();
	let mut seen: FxHashSet<&FileKey> = FxHashSet::default();
	for key in snapshot {
		if seen.insert(key) && !tracked.contains(key) {
			added.push(key.clone());
		}
	}

	added.sort();
	removed.sort();
	MembershipDelta { added, removed }
}
