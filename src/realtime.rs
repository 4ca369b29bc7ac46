//! Live insert feed: an in-process hub plus the WebSocket listener that
//! feeds it from the hosted backend.
//!
//! Views subscribe to [`FeedHub`] with an [`InsertFilter`] and receive every
//! matching message inserted while the subscription is alive.  A
//! [`FeedSubscription`] is a scoped acquisition: dropping it unsubscribes,
//! so no delivery outlives the view that asked for it.  In a deployed
//! process [`spawn_insert_listener`] keeps the hub fed from the backend's
//! WebSocket feed; in tests `MemoryStore::with_feed` publishes directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use crate::glog;
use crate::store::Message;

/// Which inserted rows a subscriber wants: equality on `recipient_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertFilter {
    recipient_id: String,
}

impl InsertFilter {
    /// Match messages addressed to `id`.
    pub fn recipient(id: impl Into<String>) -> Self {
        Self {
            recipient_id: id.into(),
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        message.recipient_id == self.recipient_id
    }
}

struct Subscriber {
    filter: InsertFilter,
    tx: mpsc::UnboundedSender<Message>,
}

struct HubInner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

/// Fan-out point for insert events. Cheap to clone; all clones share the
/// same subscriber table.
#[derive(Clone)]
pub struct FeedHub {
    inner: Arc<HubInner>,
}

impl FeedHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a subscriber. The returned handle receives every message
    /// published after this call that matches `filter`, until dropped.
    pub fn subscribe(&self, filter: InsertFilter) -> FeedSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .insert(id, Subscriber { filter, tx });
        FeedSubscription {
            id,
            hub: self.clone(),
            rx,
        }
    }

    /// Deliver one inserted message to every matching subscriber.
    pub fn publish(&self, message: &Message) {
        let subscribers = self.inner.subscribers.lock().unwrap();
        for sub in subscribers.values() {
            if sub.filter.matches(message) {
                let _ = sub.tx.send(message.clone());
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.lock().unwrap().remove(&id);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }
}

impl Default for FeedHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live feed handle. Unsubscribes from the hub when dropped, on every
/// exit path.
pub struct FeedSubscription {
    id: u64,
    hub: FeedHub,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl FeedSubscription {
    /// Pop the next buffered message without waiting.
    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next message. `None` means the hub is gone.
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

// ---------------------------------------------------------------------------
// Backend WebSocket listener
// ---------------------------------------------------------------------------

/// One frame pushed by the backend's feed endpoint.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FeedFrame {
    Subscribed { table: String },
    Insert { record: Message },
    Error { message: String },
}

fn handle_frame(text: &str, hub: &FeedHub) {
    match serde_json::from_str::<FeedFrame>(text) {
        Ok(FeedFrame::Insert { record }) => {
            glog!(
                "feed: insert {} for {}",
                crate::logging::msg_id(&record.id),
                crate::logging::user_id(&record.recipient_id)
            );
            hub.publish(&record);
        }
        Ok(FeedFrame::Subscribed { table }) => {
            glog!("feed: subscription to {table} confirmed");
        }
        Ok(FeedFrame::Error { message }) => {
            glog!("feed: backend error: {message}");
        }
        Err(e) => {
            glog!("feed: unparseable frame ({e}), ignoring");
        }
    }
}

/// Connects to the backend's WebSocket feed, subscribes to inserts on the
/// `messages` collection addressed to `recipient_id`, and republishes every
/// pushed row into `hub`.
///
/// Reconnects with exponential backoff on disconnect or error. Hub-side
/// filters still apply to whatever the transport delivers.
pub async fn insert_listen_loop(
    feed_url: String,
    api_key: String,
    recipient_id: String,
    hub: FeedHub,
) {
    let mut backoff_secs = 2u64;
    const MAX_BACKOFF_SECS: u64 = 60;

    loop {
        match tokio_tungstenite::connect_async(&feed_url).await {
            Ok((ws_stream, _response)) => {
                backoff_secs = 2; // reset on successful connect
                glog!("feed: connected to {feed_url}");

                let (mut write, mut read) = ws_stream.split();

                let subscribe = serde_json::json!({
                    "type": "subscribe",
                    "table": "messages",
                    "event": "insert",
                    "recipient_id": recipient_id,
                    "api_key": api_key,
                });
                if let Ok(text) = serde_json::to_string(&subscribe) {
                    let _ = write.send(WsMessage::Text(text)).await;
                }
                // write half is kept alive for the duration of the connection.

                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => handle_frame(&text, &hub),
                        Ok(WsMessage::Close(_)) => break,
                        Err(e) => {
                            glog!("feed: ws error: {e}");
                            break;
                        }
                        _ => {}
                    }
                }

                glog!("feed: disconnected, reconnecting in {backoff_secs}s");
            }
            Err(e) => {
                glog!("feed: connection failed (retry in {backoff_secs}s): {e}");
            }
        }

        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
    }
}

/// Spawn [`insert_listen_loop`] as a background task.
pub fn spawn_insert_listener(
    feed_url: String,
    api_key: String,
    recipient_id: String,
    hub: FeedHub,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(insert_listen_loop(feed_url, api_key, recipient_id, hub))
}
