//! Message and profile model plus the data-store interface.
//!
//! The hosted backend exposes two collections, `messages` and
//! `user_profiles`, through generic filtered/ordered query and insert
//! operations.  [`Store`] is the typed face this crate puts over those
//! operations: each method is one query shape a view actually issues.
//! [`MemoryStore`] implements it over in-process state for tests and local
//! experiments; `rest::RestStore` implements it over HTTP.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::realtime::FeedHub;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    Http(String),
    Backend { status: u16, message: String },
    Serde(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Http(msg) => write!(f, "http error: {msg}"),
            StoreError::Backend { status, message } => {
                write!(f, "backend error ({status}): {message}")
            }
            StoreError::Serde(e) => write!(f, "serialization error: {e}"),
            StoreError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Account flavour recorded on a profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Anonymous,
    Normal,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Anonymous => "anonymous",
            AccountType::Normal => "normal",
        }
    }
}

/// Per-identity record in the `user_profiles` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub account_type: AccountType,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A row in the `messages` collection. Immutable once created; the backend
/// assigns `id` and `created_at` on insert.
///
/// `sender_id` is absent for anonymous one-way sends. `created_at` is epoch
/// milliseconds. `is_view_once` is accepted at creation and carried on the
/// wire; no read path consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub recipient_id: String,
    pub content: String,
    pub created_at: u64,
    #[serde(default)]
    pub is_view_once: bool,
}

/// Payload for inserting a message. The backend fills in the rest.
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub content: String,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub is_view_once: bool,
}

impl NewMessage {
    /// A message inside a two-party thread, attributed to its sender.
    pub fn direct(
        content: impl Into<String>,
        recipient: impl Into<String>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            recipient_id: recipient.into(),
            sender_id: Some(sender.into()),
            is_view_once: false,
        }
    }

    /// An anonymous one-way message with no sender attribution.
    pub fn anonymous(content: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            recipient_id: recipient.into(),
            sender_id: None,
            is_view_once: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// Typed query faces over the backend's `messages` and `user_profiles`
/// collections. One method per query shape the views issue.
pub trait Store: Send + Sync {
    /// Messages addressed to `recipient_id`, newest first.
    fn inbox_messages(&self, recipient_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Messages where `user_id` is sender or recipient, newest first.
    fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>, StoreError>;

    /// The two-party history between `a` and `b`, oldest first.
    fn thread_messages(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError>;

    /// Insert one message. The backend assigns id and creation time and
    /// returns the stored row. Single attempt, no retry.
    fn insert_message(&self, new: NewMessage) -> Result<Message, StoreError>;

    /// Fetch the profile for `id`, if one exists.
    fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError>;

    /// Idempotent profile creation. Returns whether a row was created;
    /// an already-existing row is success (`false`), never an error.
    fn create_profile(&self, id: &str, account_type: AccountType) -> Result<bool, StoreError>;
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-process [`Store`] standing in for the hosted backend. Assigns ids and
/// timestamps on insert and, when constructed with a [`FeedHub`], publishes
/// every inserted message to it the way the backend's change feed would.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    hub: Option<FeedHub>,
}

struct MemoryInner {
    messages: Vec<Message>,
    profiles: HashMap<String, Profile>,
    next_id: u64,
    clock: u64,
}

impl MemoryInner {
    /// Timestamps are strictly monotonic so rapid inserts keep a total order.
    fn stamp(&mut self) -> u64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A store wired to a feed hub: inserts fan out as live insert events.
    pub fn with_feed(hub: FeedHub) -> Self {
        Self::build(Some(hub))
    }

    fn build(hub: Option<FeedHub>) -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                messages: Vec::new(),
                profiles: HashMap::new(),
                next_id: 1,
                clock: 0,
            }),
            hub,
        }
    }

    /// Insert a fully formed row, keeping the id and timestamp it carries.
    /// Models rows that already existed in the backend before this client
    /// connected; does not fire the change feed.
    pub fn seed_message(&self, message: Message) {
        self.inner.lock().unwrap().messages.push(message);
    }

    /// Insert a fully formed profile row.
    pub fn seed_profile(&self, profile: Profile) {
        let mut inner = self.inner.lock().unwrap();
        inner.profiles.insert(profile.id.clone(), profile);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn inbox_messages(&self, recipient_id: &str) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.recipient_id == recipient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| m.recipient_id == user_id || m.sender_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    fn thread_messages(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Message> = inner
            .messages
            .iter()
            .filter(|m| {
                (m.recipient_id == a && m.sender_id.as_deref() == Some(b))
                    || (m.recipient_id == b && m.sender_id.as_deref() == Some(a))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    fn insert_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let msg = {
            let mut inner = self.inner.lock().unwrap();
            let id = format!("mem-{}", inner.next_id);
            inner.next_id += 1;
            let created_at = inner.stamp();
            let msg = Message {
                id,
                sender_id: new.sender_id,
                recipient_id: new.recipient_id,
                content: new.content,
                created_at,
                is_view_once: new.is_view_once,
            };
            inner.messages.push(msg.clone());
            msg
        };
        // Lock released before fanning out to the feed.
        if let Some(hub) = &self.hub {
            hub.publish(&msg);
        }
        Ok(msg)
    }

    fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.profiles.get(id).cloned())
    }

    fn create_profile(&self, id: &str, account_type: AccountType) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.profiles.contains_key(id) {
            return Ok(false);
        }
        inner.profiles.insert(
            id.to_string(),
            Profile {
                id: id.to_string(),
                account_type,
                display_name: None,
            },
        );
        Ok(true)
    }
}
