//! Services exposed to the transport layer

pub mod schedule;

pub use schedule::ScheduleService;
