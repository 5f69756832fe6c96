use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::PhaseRunner;
use crate::session::AnalysisSession;
use crate::{FileKey, Phase, PhaseWatermark, Result};

struct SessionCore {
	watermark: PhaseWatermark,
	epoch: u64,
}

/// In-process session driving one file up the phase ladder.
///
/// Escalation walks one rung at a time and runs the opaque work outside the
/// session lock, so [`AnalysisSession::invalidate`] never blocks behind a
/// slow pipeline. An invalidation landing mid-climb stops the climb: the
/// interrupted escalation reports whatever phase still stands and the next
/// one restarts from [`Phase::Modified`].
pub(crate) struct LocalSession {
	file: FileKey,
	runner: Arc<dyn PhaseRunner>,
	/// Serializes escalations; `core` stays free for invalidate/phase.
	climb: Mutex<()>,
	core: Mutex<SessionCore>,
}

impl LocalSession {
	pub(super) fn new(file: FileKey, runner: Arc<dyn PhaseRunner>) -> Self {
		Self {
			file,
			runner,
			climb: Mutex::new(()),
			core: Mutex::new(SessionCore { watermark: PhaseWatermark::new(), epoch: 0 }),
		}
	}
}

impl AnalysisSession for LocalSession {
	fn file(&self) -> &FileKey {
		&self.file
	}

	fn escalate_to(&self, target: Phase) -> Result<Phase> {
		let _climb = self.climb.lock();

		let (start_epoch, mut rung) = {
			let core = self.core.lock();
			let reached = core.watermark.reached();
			if reached >= target {
				return Ok(reached);
			}
			// reached < target, so a successor rung exists.
			let Some(rung) = reached.next() else { return Ok(reached) };
			(core.epoch, rung)
		};

		loop {
			self.runner.run_phase(&self.file, rung)?;

			let mut core = self.core.lock();
			if core.epoch != start_epoch {
				// Invalidated while the rung ran. The work just done is
				// stale; report what stands and let the next escalation
				// start over from the floor.
				let standing = core.watermark.reached();
				trace!(file = %self.file, phase = %standing, "escalation interrupted by invalidation");
				return Ok(standing);
			}
			let reached = core.watermark.record(rung)?;
			trace!(file = %self.file, phase = %reached, "phase reached");
			if reached >= target {
				return Ok(reached);
			}
			match reached.next() {
				Some(next) => rung = next,
				None => return Ok(reached),
			}
		}
	}

	fn invalidate(&self) {
		let mut core = self.core.lock();
		core.watermark.invalidate();
		core.epoch = core.epoch.wrapping_add(1);
		trace!(file = %self.file, "session invalidated");
	}

	fn phase(&self) -> Phase {
		self.core.lock().watermark.reached()
	}
}
