use std::sync::Arc;

use axum::{extract::State, Json};
use sched_core::Core;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
	status: &'static str,
	sessions: usize,
}

pub async fn health_handler(State(core): State<Arc<Core>>) -> Json<Health> {
	Json(Health {
		status: "ok",
		sessions: core.broadcaster().session_count(),
	})
}
