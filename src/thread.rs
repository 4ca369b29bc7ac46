//! Two-party conversation view: the full bidirectional history with one
//! counterpart, oldest first, plus its composer.
//!
//! Unlike the inbox, this view holds no live subscription; only the
//! single-recipient inbox feed is pushed. A sent message appears
//! immediately through an optimistic append of the stored row and may be
//! returned again by a later [`reload`](ChatThread::reload), where it
//! collapses by id. Switching counterpart means opening a new thread.

use std::sync::Arc;

use crate::composer::{Composer, ComposeError};
use crate::store::{Message, Store, StoreError};

pub struct ChatThread {
    self_id: String,
    counterpart_id: String,
    store: Arc<dyn Store>,
    messages: Vec<Message>,
    composer: Composer,
}

impl ChatThread {
    /// Load the history between `self_id` and `counterpart_id`.
    pub fn open(
        store: Arc<dyn Store>,
        self_id: &str,
        counterpart_id: &str,
    ) -> Result<Self, StoreError> {
        let messages = store.thread_messages(self_id, counterpart_id)?;
        Ok(Self {
            self_id: self_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
            store,
            messages,
            composer: Composer::new(),
        })
    }

    /// Refetch the history. The optimistic copy of anything sent from here
    /// is superseded by the authoritative row with the same id.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.messages = self
            .store
            .thread_messages(&self.self_id, &self.counterpart_id)?;
        Ok(())
    }

    /// Submit the current draft to the counterpart. On success the stored
    /// row is appended locally (no refetch) and the draft clears; on any
    /// failure the draft and the list stand as they were.
    pub fn send(&mut self) -> Result<Message, ComposeError> {
        let sent =
            self.composer
                .send_direct(self.store.as_ref(), &self.counterpart_id, &self.self_id)?;
        if !self.messages.iter().any(|m| m.id == sent.id) {
            self.messages.push(sent.clone());
        }
        Ok(sent)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.composer.set_draft(text);
    }

    pub fn draft(&self) -> &str {
        self.composer.draft()
    }

    /// The history, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
