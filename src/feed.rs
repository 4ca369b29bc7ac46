//! Inbox view-model: the live, descending feed of messages addressed to
//! the signed-in user.
//!
//! Consistency strategy: subscribe first, query second, so no insert can
//! fall between the two. Live events prepend without re-querying; the
//! initial (or any later) query merges in behind them; duplicate delivery
//! of the same row collapses by message id. A failed load is reported and
//! leaves the list usable, never tears the view down.

use std::collections::HashSet;
use std::sync::Arc;

use crate::glog;
use crate::logging;
use crate::realtime::{FeedHub, FeedSubscription, InsertFilter};
use crate::store::{Message, Store, StoreError};

pub struct Inbox {
    user_id: String,
    store: Arc<dyn Store>,
    subscription: Option<FeedSubscription>,
    messages: Vec<Message>,
    seen: HashSet<String>,
    last_error: Option<StoreError>,
}

impl Inbox {
    /// Subscribe to live inserts for `user_id` without running the initial
    /// query. Callers that want history call [`reload`](Self::reload) next;
    /// [`open`](Self::open) does both.
    pub fn attach(store: Arc<dyn Store>, hub: &FeedHub, user_id: &str) -> Self {
        let subscription = hub.subscribe(InsertFilter::recipient(user_id));
        Self {
            user_id: user_id.to_string(),
            store,
            subscription: Some(subscription),
            messages: Vec::new(),
            seen: HashSet::new(),
            last_error: None,
        }
    }

    /// Subscribe and load: the standard way to bring up the inbox.
    pub fn open(store: Arc<dyn Store>, hub: &FeedHub, user_id: &str) -> Self {
        let mut inbox = Self::attach(store, hub, user_id);
        inbox.reload();
        inbox
    }

    /// Run the inbox query and merge the result in. New rows slot into
    /// descending `created_at` order; rows already delivered live are kept
    /// once. On failure the current list stands and the error is retained
    /// for the caller to surface.
    pub fn reload(&mut self) {
        match self.store.inbox_messages(&self.user_id) {
            Ok(loaded) => {
                for message in loaded {
                    if self.seen.insert(message.id.clone()) {
                        self.messages.push(message);
                    }
                }
                self.messages
                    .sort_by(|a, b| b.created_at.cmp(&a.created_at));
                self.last_error = None;
            }
            Err(e) => {
                glog!("inbox: load failed for {}: {e}", logging::user_id(&self.user_id));
                self.last_error = Some(e);
            }
        }
    }

    fn apply_insert(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        glog!("inbox: live insert {}", logging::msg_id(&message.id));
        self.messages.insert(0, message);
        true
    }

    /// Apply every buffered live event. Returns how many new messages
    /// appeared (duplicates of already-rendered ids count for nothing).
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(message) = match self.subscription.as_mut() {
            Some(sub) => sub.try_next(),
            None => None,
        } {
            if self.apply_insert(message) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next live message and apply it. Skips duplicates
    /// internally; returns `None` once the subscription is closed.
    pub async fn next_live(&mut self) -> Option<Message> {
        loop {
            let message = self.subscription.as_mut()?.next().await?;
            if self.apply_insert(message.clone()) {
                return Some(message);
            }
        }
    }

    /// Release the live subscription. The loaded list remains readable.
    pub fn close(&mut self) {
        self.subscription = None;
    }

    /// Whether the live subscription is still held.
    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Messages addressed to the user, newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent load failure, if the list is possibly stale.
    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }
}
