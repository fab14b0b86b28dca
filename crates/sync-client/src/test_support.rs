use chrono::{NaiveTime, Utc};
use sched_types::{
	Actor, Day, ScheduleEntity, ScheduleFields, ScheduleId, SchedulePatch, SchoolYear, Semester,
	TimeSlot, Version,
};

pub fn entity(version: u64) -> ScheduleEntity {
	ScheduleEntity {
		id: ScheduleId::new(),
		version: Version::new(version),
		fields: ScheduleFields {
			instructor: "inst-1".to_string(),
			room: "R101".to_string(),
			section: "BSIT-1A".to_string(),
			slot: TimeSlot {
				day: Day::Monday,
				start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
				end: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
			},
			school_year: SchoolYear::parse("2024-2025").unwrap(),
			semester: Semester::First,
			archived: false,
		},
		updated_at: Utc::now(),
		updated_by: Actor::anonymous(),
	}
}

pub fn room(name: &str) -> SchedulePatch {
	SchedulePatch {
		room: Some(name.to_string()),
		..Default::default()
	}
}
