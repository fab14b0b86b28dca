//! Database entities

pub mod schedule;

pub use schedule::Entity as Schedule;
