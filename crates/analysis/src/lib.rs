//! Phase-gated analysis scheduling over a changing set of source files.
//!
//! The crate is centered on three cooperating pieces:
//! - [`TaskRegistry`]: tracks which files currently matter and keeps exactly
//!   one live analysis task per tracked file, reconciling against membership
//!   snapshots as files appear and disappear.
//! - [`AnalysisEngine`] / [`AnalysisSession`]: the contracts the registry
//!   drives. A session climbs the [`Phase`] ladder one rung at a time; the
//!   engine decides when registered tasks run and in what order.
//! - [`StructureEvents`]: synchronous fan-out of declared-type and
//!   compilation-root changes to interested listeners, with per-listener
//!   panic isolation.
//!
//! The [`local`] module provides the in-process engine used when the
//! pipeline runs inside the current process. The per-phase analysis work
//! itself stays behind [`PhaseRunner`]; parsing and resolution are somebody
//! else's business.
#![warn(missing_docs)]

mod file;
mod membership;
mod phase;

pub use file::FileKey;
pub use membership::{MembershipDelta, diff};
pub use phase::{Phase, PhaseWatermark};

pub mod engine;
pub mod events;
pub mod local;
pub mod registry;
pub mod session;
pub mod task;

pub use engine::AnalysisEngine;
pub use events::{
	ListenerId, RootsDelta, StructureChange, StructureEvents, StructureListener, TypeHandle,
	TypesDelta,
};
pub use local::{LocalEngine, PhaseRunner};
pub use registry::{DeliveryMode, MembershipSource, RegistryConfig, TaskRegistry, TaskSource};
pub use session::AnalysisSession;
pub use task::{FileTask, IndexingMode, Priority, TaskContext};

/// Re-export of the queue type [`DeliveryMode::Queued`] is built from.
pub use strata_worker::{SerialQueue, WorkClass};

#[cfg(test)]
mod tests;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Escalation bookkeeping was asked to move a session backward.
	///
	/// Sessions only climb; going back down happens through invalidation,
	/// never through a phase request. Seeing this means the pipeline driver
	/// is buggy, not the caller's input.
	#[error("phase {requested} is not reachable from {current}")]
	InvalidPhaseRequest {
		/// The rung that was requested.
		requested: Phase,
		/// The rung the session currently stands at.
		current: Phase,
	},
	/// The file behind a session could not be read when escalation needed it.
	#[error("source unavailable: {0}")]
	SourceUnavailable(FileKey),
	/// The opaque analysis pipeline reported a failure.
	#[error("analysis failed: {0}")]
	AnalysisFailed(String),
}
