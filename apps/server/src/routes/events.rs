//! Event channel
//!
//! One WebSocket per session. The first frame names the session so the client can tag its
//! writes for echo suppression; after that the socket carries change events and periodic
//! heartbeats until either side goes away or the broadcaster drops the session.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	extract::{
		ws::{Message, WebSocket},
		State, WebSocketUpgrade,
	},
	response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use sched_core::{Core, Subscription};
use sched_types::{wire::ServerMessage, SessionId};
use tracing::{debug, info, warn};

use crate::error::ApiError;

pub async fn events_handler(
	State(core): State<Arc<Core>>,
	ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
	// Register before upgrading so a full registry is refused with a plain HTTP error
	let subscription = core.broadcaster().subscribe(SessionId::new())?;
	let heartbeat = Duration::from_secs(core.config().broadcast.heartbeat_secs.max(1));

	Ok(ws.on_upgrade(move |socket| run_session(socket, subscription, heartbeat)))
}

async fn run_session(socket: WebSocket, mut subscription: Subscription, heartbeat: Duration) {
	let session_id = subscription.session_id();
	let (mut sender, mut receiver) = socket.split();

	info!(session_id = %session_id, "Event session opened");

	if send(&mut sender, &ServerMessage::Hello { session_id }).await.is_err() {
		return;
	}

	let mut ticker = tokio::time::interval(heartbeat);
	ticker.tick().await;

	loop {
		tokio::select! {
			event = subscription.recv() => {
				let Some(event) = event else {
					warn!(
						session_id = %session_id,
						reason = ?subscription.drop_reason(),
						"Session dropped by broadcaster"
					);
					let _ = sender.send(Message::Close(None)).await;
					break;
				};
				if send(&mut sender, &ServerMessage::Event(event)).await.is_err() {
					break;
				}
			}
			_ = ticker.tick() => {
				if send(&mut sender, &ServerMessage::Heartbeat { at: Utc::now() }).await.is_err() {
					break;
				}
			}
			incoming = receiver.next() => match incoming {
				Some(Ok(Message::Close(_))) | None => break,
				Some(Err(e)) => {
					debug!(session_id = %session_id, "Socket error: {}", e);
					break;
				}
				// Clients have nothing to say on this channel; pings are answered by axum
				Some(Ok(_)) => {}
			}
		}
	}

	info!(session_id = %session_id, "Event session closed");
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> Result<(), ()>
where
	S: SinkExt<Message> + Unpin,
{
	let text = match serde_json::to_string(message) {
		Ok(text) => text,
		Err(e) => {
			warn!("Failed to encode frame: {}", e);
			return Ok(());
		}
	};
	sender.send(Message::Text(text)).await.map_err(|_| ())
}
