//! Chat list: grouping the flat message feed into one conversation per
//! counterpart, labelling each, and filtering the result.

use std::collections::HashSet;

use crate::store::{Message, Store, StoreError};

/// One conversation in the chat list, derived on load and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub counterpart_id: String,
    pub label: String,
    pub last_message: String,
    pub last_at: u64,
}

/// Fallback label for a counterpart with no profile display name:
/// `User ` plus the first eight characters of the id.
pub fn placeholder_label(counterpart_id: &str) -> String {
    let end = counterpart_id
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(counterpart_id.len());
    format!("User {}", &counterpart_id[..end])
}

/// Group a descending-ordered message feed into one summary per distinct
/// counterpart.
///
/// The counterpart of a message is the recipient when `self_id` sent it,
/// otherwise the sender. Messages with no resolvable counterpart (anonymous
/// sends carry no sender) are excluded. Because the input is newest-first,
/// the first message seen for a counterpart is its most recent one and
/// becomes the summary; later ones are skipped. Output order is therefore
/// by conversation recency.
pub fn group_conversations(self_id: &str, messages_desc: &[Message]) -> Vec<ChatSummary> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut chats = Vec::new();

    for message in messages_desc {
        let counterpart = if message.sender_id.as_deref() == Some(self_id) {
            Some(message.recipient_id.as_str())
        } else {
            message.sender_id.as_deref()
        };
        let Some(counterpart) = counterpart else {
            continue;
        };
        if !seen.insert(counterpart) {
            continue;
        }
        chats.push(ChatSummary {
            counterpart_id: counterpart.to_string(),
            label: placeholder_label(counterpart),
            last_message: message.content.clone(),
            last_at: message.created_at,
        });
    }

    chats
}

/// The chat list view-model: grouped conversations plus a non-destructive
/// label filter.
pub struct ChatList {
    chats: Vec<ChatSummary>,
    filter: String,
}

impl ChatList {
    /// Query every message involving `self_id`, group, and resolve labels:
    /// a profile display name wins, the placeholder stands in otherwise.
    /// A failed profile lookup keeps the placeholder rather than losing
    /// the list.
    pub fn load(store: &dyn Store, self_id: &str) -> Result<Self, StoreError> {
        let messages = store.messages_involving(self_id)?;
        let mut chats = group_conversations(self_id, &messages);
        for chat in &mut chats {
            if let Ok(Some(profile)) = store.get_profile(&chat.counterpart_id) {
                if let Some(name) = profile.display_name {
                    chat.label = name;
                }
            }
        }
        Ok(Self {
            chats,
            filter: String::new(),
        })
    }

    /// Construct from an already-grouped set, for embedders that manage
    /// their own queries.
    pub fn from_chats(chats: Vec<ChatSummary>) -> Self {
        Self {
            chats,
            filter: String::new(),
        }
    }

    /// Every conversation, unfiltered, by recency.
    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    /// Set the label filter. The grouped set is untouched; only
    /// [`visible`](Self::visible) changes.
    pub fn set_filter(&mut self, text: impl Into<String>) {
        self.filter = text.into();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Conversations whose label contains the filter, case-insensitively.
    /// An empty filter shows everything.
    pub fn visible(&self) -> Vec<&ChatSummary> {
        let needle = self.filter.to_lowercase();
        self.chats
            .iter()
            .filter(|c| needle.is_empty() || c.label.to_lowercase().contains(&needle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccountType, MemoryStore, Profile};

    fn msg(id: &str, sender: Option<&str>, recipient: &str, content: &str, at: u64) -> Message {
        Message {
            id: id.to_string(),
            sender_id: sender.map(str::to_string),
            recipient_id: recipient.to_string(),
            content: content.to_string(),
            created_at: at,
            is_view_once: false,
        }
    }

    #[test]
    fn one_summary_per_counterpart_keeps_the_most_recent() {
        // Newest first, two counterparts interleaved.
        let feed = vec![
            msg("m4", Some("alice"), "me", "latest from alice", 4),
            msg("m3", Some("me"), "bob", "latest with bob", 3),
            msg("m2", Some("bob"), "me", "older from bob", 2),
            msg("m1", Some("me"), "alice", "older to alice", 1),
        ];
        let chats = group_conversations("me", &feed);
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].counterpart_id, "alice");
        assert_eq!(chats[0].last_message, "latest from alice");
        assert_eq!(chats[0].last_at, 4);
        assert_eq!(chats[1].counterpart_id, "bob");
        assert_eq!(chats[1].last_message, "latest with bob");
    }

    #[test]
    fn counterpart_is_recipient_for_outbound_and_sender_for_inbound() {
        let feed = vec![msg("m1", Some("me"), "carol", "hi carol", 1)];
        let chats = group_conversations("me", &feed);
        assert_eq!(chats[0].counterpart_id, "carol");

        let feed = vec![msg("m1", Some("carol"), "me", "hi me", 1)];
        let chats = group_conversations("me", &feed);
        assert_eq!(chats[0].counterpart_id, "carol");
    }

    #[test]
    fn anonymous_messages_have_no_conversation() {
        let feed = vec![msg("m1", None, "me", "secret admirer", 1)];
        assert!(group_conversations("me", &feed).is_empty());
    }

    #[test]
    fn mixed_feed_drops_only_the_anonymous_rows() {
        let feed = vec![
            msg("m3", Some("alice"), "me", "from alice", 3),
            msg("m2", None, "me", "anonymous", 2),
            msg("m1", Some("me"), "bob", "to bob", 1),
        ];
        let chats = group_conversations("me", &feed);
        let ids: Vec<&str> = chats.iter().map(|c| c.counterpart_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);
    }

    #[test]
    fn placeholder_takes_an_eight_char_prefix() {
        assert_eq!(
            placeholder_label("9f83e01d-2c44-4f30"),
            "User 9f83e01d"
        );
        assert_eq!(placeholder_label("bob"), "User bob");
    }

    #[test]
    fn load_prefers_profile_display_names() {
        let store = MemoryStore::new();
        store.seed_message(msg("m2", Some("alice-0001"), "me", "hello", 2));
        store.seed_message(msg("m1", Some("bob-00001"), "me", "hey", 1));
        store.seed_profile(Profile {
            id: "alice-0001".to_string(),
            account_type: AccountType::Normal,
            display_name: Some("Alice".to_string()),
        });
        // bob-00001 has a profile but no display name.
        store.seed_profile(Profile {
            id: "bob-00001".to_string(),
            account_type: AccountType::Anonymous,
            display_name: None,
        });

        let list = ChatList::load(&store, "me").unwrap();
        assert_eq!(list.chats()[0].label, "Alice");
        assert_eq!(list.chats()[1].label, "User bob-0000");
    }

    #[test]
    fn filter_is_case_insensitive_and_non_destructive() {
        let mut list = ChatList::from_chats(vec![
            ChatSummary {
                counterpart_id: "a".to_string(),
                label: "Alice".to_string(),
                last_message: "hi".to_string(),
                last_at: 2,
            },
            ChatSummary {
                counterpart_id: "b".to_string(),
                label: "User bob-0000".to_string(),
                last_message: "yo".to_string(),
                last_at: 1,
            },
        ]);

        list.set_filter("ALI");
        let visible: Vec<&str> = list.visible().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(visible, vec!["Alice"]);
        assert_eq!(list.len(), 2);

        list.set_filter("");
        assert_eq!(list.visible().len(), 2);
    }
}
