//! Shared types for the class schedule concurrency core.
//!
//! Everything that crosses a process boundary lives here: the schedule entity and its
//! version token, the patch format used by writes, broadcast events and the JSON bodies
//! exchanged over HTTP and the event channel. Both the server (`sched-core`,
//! `sched-server`) and the client (`sched-sync`) depend on this crate so the two sides
//! cannot drift apart.

pub mod event;
pub mod failure;
pub mod schedule;
pub mod wire;

pub use event::{ChangeEvent, SessionId, Topic};
pub use failure::{Effect, Transience, WriteFailure};
pub use schedule::{
	Actor, Day, ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, SchoolYear, Semester,
	TimeSlot, ValidationError, Version,
};
