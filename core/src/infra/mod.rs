//! Infrastructure layer: storage, coordination and fan-out

pub mod db;
pub mod event;
pub mod store;
pub mod sync;
