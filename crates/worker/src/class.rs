/// Execution classes attached to every spawned worker, for scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkClass {
	/// Registry bookkeeping: membership reconciliation and reschedule forwarding.
	Scheduling,
	/// Phase escalation and task execution on dedicated analysis threads.
	Analysis,
}

impl WorkClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Scheduling => "scheduling",
			Self::Analysis => "analysis",
		}
	}
}
