//! HTTP and WebSocket surface of the schedule service

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
	http::{
		header::{AUTHORIZATION, CONTENT_TYPE},
		HeaderName, Method,
	},
	routing::{get, put},
	Router,
};
use sched_core::Core;
use sched_types::wire::{ACTOR_HEADER, SESSION_HEADER};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod error;
pub mod extract;
pub mod routes;
pub mod utils;

use routes::{
	admin::force_write_handler,
	events::events_handler,
	health::health_handler,
	schedules::{create_handler, list_handler, read_handler, write_handler},
};

pub fn build_router(core: Arc<Core>) -> Router {
	let cors = CorsLayer::new()
		.allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
		.allow_headers([
			CONTENT_TYPE,
			AUTHORIZATION,
			HeaderName::from_static(SESSION_HEADER),
			HeaderName::from_static(ACTOR_HEADER),
		])
		.max_age(Duration::from_secs(60 * 60));

	Router::new()
		.route("/schedules", get(list_handler).post(create_handler))
		.route("/schedules/:id", get(read_handler).put(write_handler))
		.route("/admin/schedules/:id", put(force_write_handler))
		.route("/events", get(events_handler))
		.route("/health", get(health_handler))
		.layer(TraceLayer::new_for_http())
		.layer(cors)
		.with_state(core)
}

/// Serve until `shutdown` resolves, then disconnect event sessions and drain requests
pub async fn serve<F>(core: Arc<Core>, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
	F: Future<Output = ()> + Send + 'static,
{
	let app = build_router(core.clone());

	let address = listener.local_addr()?;
	info!("Server running on {address}");

	axum::serve(listener, app)
		.with_graceful_shutdown(async move {
			shutdown.await;
			// Event sockets never finish on their own
			core.shutdown();
		})
		.await?;

	info!("Server stopped");
	Ok(())
}
