//! Outbound message composition: validation ahead of the network, a single
//! best-effort submit, and draft state that survives failure.

use crate::store::{Message, NewMessage, Store, StoreError};

/// Longest content accepted, in characters.
pub const MAX_MESSAGE_LEN: usize = 500;

#[derive(Debug)]
pub enum ComposeError {
    Empty,
    TooLong { chars: usize },
    Store(StoreError),
}

impl std::fmt::Display for ComposeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposeError::Empty => write!(f, "message is empty"),
            ComposeError::TooLong { chars } => {
                write!(f, "message is {chars} characters, the limit is {MAX_MESSAGE_LEN}")
            }
            ComposeError::Store(e) => write!(f, "send failed: {e}"),
        }
    }
}

impl std::error::Error for ComposeError {}

impl From<StoreError> for ComposeError {
    fn from(e: StoreError) -> Self {
        ComposeError::Store(e)
    }
}

/// Check a draft before anything touches the store: trimmed content must be
/// non-empty and within [`MAX_MESSAGE_LEN`] characters. Returns the trimmed
/// content, which is what gets sent.
pub fn validate(draft: &str) -> Result<&str, ComposeError> {
    let trimmed = draft.trim();
    if trimmed.is_empty() {
        return Err(ComposeError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_MESSAGE_LEN {
        return Err(ComposeError::TooLong { chars });
    }
    Ok(trimmed)
}

/// Draft state for one send surface. Validation failures and store
/// failures both leave the draft in place for another attempt; only a
/// successful send clears it. Every send is one insert call, no retry.
#[derive(Debug, Default)]
pub struct Composer {
    draft: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Send inside a two-party thread, attributed to `sender`.
    pub fn send_direct(
        &mut self,
        store: &dyn Store,
        recipient: &str,
        sender: &str,
    ) -> Result<Message, ComposeError> {
        let content = validate(&self.draft)?.to_string();
        self.submit(store, NewMessage::direct(content, recipient, sender))
    }

    /// Send through the public link with no sender attribution.
    pub fn send_anonymous(
        &mut self,
        store: &dyn Store,
        recipient: &str,
    ) -> Result<Message, ComposeError> {
        let content = validate(&self.draft)?.to_string();
        self.submit(store, NewMessage::anonymous(content, recipient))
    }

    fn submit(&mut self, store: &dyn Store, new: NewMessage) -> Result<Message, ComposeError> {
        let sent = store.insert_message(new)?;
        self.draft.clear();
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn empty_and_whitespace_drafts_are_rejected_before_the_store() {
        let store = MemoryStore::new();
        let mut composer = Composer::new();

        composer.set_draft("");
        assert!(matches!(
            composer.send_anonymous(&store, "me"),
            Err(ComposeError::Empty)
        ));

        composer.set_draft("   \n\t ");
        assert!(matches!(
            composer.send_anonymous(&store, "me"),
            Err(ComposeError::Empty)
        ));

        assert!(store.inbox_messages("me").unwrap().is_empty());
    }

    #[test]
    fn over_length_draft_is_rejected_at_the_limit() {
        let store = MemoryStore::new();
        let mut composer = Composer::new();

        composer.set_draft("x".repeat(MAX_MESSAGE_LEN + 1));
        assert!(matches!(
            composer.send_anonymous(&store, "me"),
            Err(ComposeError::TooLong { chars: 501 })
        ));
        assert!(store.inbox_messages("me").unwrap().is_empty());

        composer.set_draft("x".repeat(MAX_MESSAGE_LEN));
        composer.send_anonymous(&store, "me").unwrap();
        assert_eq!(store.inbox_messages("me").unwrap().len(), 1);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 500 multi-byte characters stay within the limit.
        assert!(validate(&"é".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(validate(&"é".repeat(MAX_MESSAGE_LEN + 1)).is_err());
    }

    #[test]
    fn sent_content_is_the_trimmed_draft() {
        let store = MemoryStore::new();
        let mut composer = Composer::new();
        composer.set_draft("  hello there  ");
        let sent = composer.send_direct(&store, "peer", "me").unwrap();
        assert_eq!(sent.content, "hello there");
        assert_eq!(sent.sender_id.as_deref(), Some("me"));
    }

    #[test]
    fn success_clears_the_draft_and_rejection_keeps_it() {
        let store = MemoryStore::new();
        let mut composer = Composer::new();

        composer.set_draft("x".repeat(MAX_MESSAGE_LEN + 1));
        let _ = composer.send_anonymous(&store, "me");
        assert_eq!(composer.draft().chars().count(), MAX_MESSAGE_LEN + 1);

        composer.set_draft("hello");
        composer.send_anonymous(&store, "me").unwrap();
        assert!(composer.draft().is_empty());
    }

    #[test]
    fn anonymous_sends_carry_no_sender() {
        let store = MemoryStore::new();
        let mut composer = Composer::new();
        composer.set_draft("psst");
        let sent = composer.send_anonymous(&store, "me").unwrap();
        assert!(sent.sender_id.is_none());
    }
}
