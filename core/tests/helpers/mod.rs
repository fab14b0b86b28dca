//! Shared fixtures for sched-core integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveTime;
use sched_core::{BroadcastConfig, Core, MemoryStore, ServerConfig};
use sched_types::{Day, ScheduleFields, SchedulePatch, SchoolYear, Semester, TimeSlot};

pub fn fields() -> ScheduleFields {
	ScheduleFields {
		instructor: "inst-1".to_string(),
		room: "R101".to_string(),
		section: "BSIT-1A".to_string(),
		slot: TimeSlot {
			day: Day::Wednesday,
			start: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
			end: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
		},
		school_year: SchoolYear::parse("2024-2025").unwrap(),
		semester: Semester::Second,
		archived: false,
	}
}

pub fn room(name: impl Into<String>) -> SchedulePatch {
	SchedulePatch {
		room: Some(name.into()),
		..Default::default()
	}
}

/// Core over a memory store, with echo delivered so tests can observe their own writes
pub fn memory_core(dir: &std::path::Path) -> Core {
	let mut config = ServerConfig::default_with_dir(dir.to_path_buf());
	config.broadcast = BroadcastConfig {
		suppress_echo: false,
		queue_depth: 1024,
		..BroadcastConfig::default()
	};
	Core::with_store(config, Arc::new(MemoryStore::new()))
}
