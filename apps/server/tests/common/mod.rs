#![allow(dead_code)]

use std::sync::Arc;

use axum::{
	body::{to_bytes, Body},
	http::{Request, Response},
};
use chrono::NaiveTime;
use sched_core::{Core, MemoryStore, ServerConfig};
use sched_types::{Day, ScheduleFields, SchoolYear, Semester, TimeSlot};
use serde::de::DeserializeOwned;

pub const ADMIN_TOKEN: &str = "registrar-secret";

pub fn core(admin_token: Option<&str>) -> Arc<Core> {
	let mut config = ServerConfig::default_with_dir(std::env::temp_dir().join("sched-server-tests"));
	config.admin_token = admin_token.map(str::to_string);
	config.broadcast.heartbeat_secs = 1;
	Arc::new(Core::with_store(config, Arc::new(MemoryStore::new())))
}

pub fn fields() -> ScheduleFields {
	ScheduleFields {
		instructor: "inst-7".to_string(),
		room: "LAB-2".to_string(),
		section: "BSCS-2B".to_string(),
		slot: TimeSlot {
			day: Day::Thursday,
			start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
			end: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
		},
		school_year: SchoolYear::parse("2025-2026").unwrap(),
		semester: Semester::First,
		archived: false,
	}
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
	Request::builder()
		.method(method)
		.uri(uri)
		.header("content-type", "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
	let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}
