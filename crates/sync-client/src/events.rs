//! Event channel client
//!
//! Keeps one WebSocket to the server open for as long as the session lives, reconnecting
//! with backoff. Frames are translated into [`Inbound`] messages and pushed into the
//! session queue; a dropped connection is reported as [`Inbound::ConnectionLost`] so the
//! agent can stop trusting its cache until the next resync.

use futures::{Stream, StreamExt};
use reqwest::Url;
use sched_types::wire::ServerMessage;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{agent::Inbound, config::SyncConfig};

/// Run the channel until the session queue goes away
pub fn spawn(url: Url, config: SyncConfig, inbound: mpsc::WeakSender<Inbound>) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut attempt = 0;

		loop {
			let Some(tx) = inbound.upgrade() else {
				break;
			};

			match connect_async(url.as_str()).await {
				Ok((socket, _)) => {
					info!(%url, "Event channel open");
					attempt = 0;
					let (_write, read) = socket.split();
					pump(read, &tx).await;
					if tx.send(Inbound::ConnectionLost).await.is_err() {
						break;
					}
				}
				Err(e) => warn!(%url, "Event channel connect failed: {}", e),
			}
			drop(tx);

			let delay = config.backoff(attempt);
			attempt = attempt.saturating_add(1);
			debug!(?delay, "Reconnecting event channel");
			tokio::time::sleep(delay).await;
		}

		debug!("Event channel stopped");
	})
}

async fn pump<S>(mut read: S, tx: &mpsc::Sender<Inbound>)
where
	S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
	while let Some(next) = read.next().await {
		let text = match next {
			Ok(Message::Text(text)) => text,
			Ok(Message::Close(_)) => break,
			Ok(_) => continue,
			Err(e) => {
				warn!("Event channel read error: {}", e);
				break;
			}
		};

		let inbound = match serde_json::from_str::<ServerMessage>(&text) {
			Ok(ServerMessage::Hello { session_id }) => Inbound::Connected { session_id },
			Ok(ServerMessage::Event(event)) => Inbound::Event(event),
			Ok(ServerMessage::Heartbeat { .. }) => Inbound::Heartbeat,
			Err(e) => {
				debug!("Skipping unreadable frame: {}", e);
				continue;
			}
		};

		if tx.send(inbound).await.is_err() {
			break;
		}
	}
}
