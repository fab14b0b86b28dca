//! Write-path coordination: who wins a concurrent write, and in which order the
//! winners are announced.

pub mod arbiter;
pub mod sequencer;

pub use arbiter::{arbitrate, AdminGrant, AuthError, Expectation, Verdict};
pub use sequencer::{LaneGuard, WriteSequencer};
