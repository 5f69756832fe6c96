//! Shared worker runtime primitives for the strata analysis scheduler.
//!
//! This crate owns the low-level execution plumbing the scheduler crates
//! build on:
//! * classed spawn helpers that work inside and outside a tokio runtime
//! * a serial job queue for work that must never overlap itself
//! * a monotonic clock for run sequencing and listener identity

mod class;
mod epoch;
mod serial;
mod spawn;

pub use class::WorkClass;
pub use epoch::EpochClock;
pub use serial::SerialQueue;
pub use spawn::{spawn, spawn_named_thread};
