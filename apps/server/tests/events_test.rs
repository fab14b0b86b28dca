//! End-to-end tests of the event channel over a real socket

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{core, fields};
use futures::StreamExt;
use sched_core::Core;
use sched_types::{wire::ServerMessage, Actor, SchedulePatch, SessionId, Topic, Version};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(core: Arc<Core>) -> (String, oneshot::Sender<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let url = format!("ws://{}/events", listener.local_addr().unwrap());
	let (stop_tx, stop_rx) = oneshot::channel();

	tokio::spawn(sched_server::serve(core, listener, async move {
		let _ = stop_rx.await;
	}));

	(url, stop_tx)
}

async fn next_message(socket: &mut Socket) -> Option<ServerMessage> {
	loop {
		let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
			.await
			.expect("timed out waiting for a frame")?
			.ok()?;
		match frame {
			Message::Text(text) => return Some(serde_json::from_str(&text).unwrap()),
			Message::Close(_) => return None,
			_ => continue,
		}
	}
}

/// Skip heartbeats
async fn next_event(socket: &mut Socket) -> Option<sched_types::ChangeEvent> {
	loop {
		match next_message(socket).await? {
			ServerMessage::Event(event) => return Some(event),
			ServerMessage::Heartbeat { .. } => continue,
			ServerMessage::Hello { .. } => panic!("second hello"),
		}
	}
}

async fn connect(url: &str) -> (Socket, SessionId) {
	let (mut socket, _) = connect_async(url).await.unwrap();
	match next_message(&mut socket).await {
		Some(ServerMessage::Hello { session_id }) => (socket, session_id),
		other => panic!("expected hello, got {other:?}"),
	}
}

#[tokio::test]
async fn test_hello_then_events() {
	let core = core(None);
	let (url, _stop) = start(core.clone()).await;
	let (mut socket, _) = connect(&url).await;

	let entity = core
		.schedules()
		.create(fields(), Actor::anonymous(), None)
		.await
		.unwrap();
	core.schedules()
		.write(
			entity.id,
			entity.version,
			&SchedulePatch::archive(),
			Actor::anonymous(),
			None,
		)
		.await
		.unwrap();

	let created = next_event(&mut socket).await.unwrap();
	assert_eq!(created.topic, Topic::Created);
	assert_eq!(created.version, Version::INITIAL);

	let deleted = next_event(&mut socket).await.unwrap();
	assert_eq!(deleted.topic, Topic::Deleted);
	assert_eq!(deleted.version, Version::new(2));
}

#[tokio::test]
async fn test_originating_session_gets_no_echo() {
	let core = core(None);
	let (url, _stop) = start(core.clone()).await;
	let (mut writer, writer_session) = connect(&url).await;
	let (mut watcher, _) = connect(&url).await;

	core.schedules()
		.create(fields(), Actor::anonymous(), Some(writer_session))
		.await
		.unwrap();

	let seen = next_event(&mut watcher).await.unwrap();
	assert_eq!(seen.origin, Some(writer_session));

	// Only heartbeats reach the writer
	let quiet = tokio::time::timeout(Duration::from_millis(1500), next_event(&mut writer)).await;
	assert!(quiet.is_err());
}

#[tokio::test]
async fn test_heartbeats_flow_on_idle_channel() {
	let core = core(None);
	let (url, _stop) = start(core).await;
	let (mut socket, _) = connect(&url).await;

	match next_message(&mut socket).await {
		Some(ServerMessage::Heartbeat { .. }) => {}
		other => panic!("expected heartbeat, got {other:?}"),
	}
}

#[tokio::test]
async fn test_shutdown_closes_event_sessions() {
	let core = core(None);
	let (url, stop) = start(core.clone()).await;
	let (mut socket, _) = connect(&url).await;
	assert_eq!(core.broadcaster().session_count(), 1);

	stop.send(()).unwrap();

	loop {
		match next_message(&mut socket).await {
			Some(ServerMessage::Heartbeat { .. }) => continue,
			None => break,
			Some(other) => panic!("unexpected frame {other:?}"),
		}
	}
	assert_eq!(core.broadcaster().session_count(), 0);
}
