//! Integration tests wiring the view models to the in-process collaborators:
//!
//! - `bootstrap` provisions a profile on first sign-in and never re-creates it.
//! - `Composer` performs exactly one insert per successful send.
//! - An anonymous note travels store -> change feed -> inbox, and a reply
//!   thread sees its own send without a refetch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ghostnote::auth::MemoryAuth;
use ghostnote::chats::ChatList;
use ghostnote::composer::{ComposeError, Composer};
use ghostnote::feed::Inbox;
use ghostnote::realtime::FeedHub;
use ghostnote::session::{self, Bootstrap};
use ghostnote::store::{
    AccountType, MemoryStore, Message, NewMessage, Profile, Store, StoreError,
};
use ghostnote::thread::ChatThread;

const ORIGIN: &str = "https://ghostnote.app";

// ---------------------------------------------------------------------------
// Helper: a Store wrapper that records how often each face is hit
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    profile_reads: AtomicUsize,
    profile_creates: AtomicUsize,
    inserts: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            ..Default::default()
        }
    }
}

impl Store for CountingStore {
    fn inbox_messages(&self, recipient_id: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.inbox_messages(recipient_id)
    }

    fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.messages_involving(user_id)
    }

    fn thread_messages(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.thread_messages(a, b)
    }

    fn insert_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_message(new)
    }

    fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_profile(id)
    }

    fn create_profile(&self, id: &str, account_type: AccountType) -> Result<bool, StoreError> {
        self.profile_creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_profile(id, account_type)
    }
}

// ---------------------------------------------------------------------------
// Helper: a Store that always loses the profile-creation race
// ---------------------------------------------------------------------------

struct RacingStore {
    inner: MemoryStore,
}

impl Store for RacingStore {
    fn inbox_messages(&self, recipient_id: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.inbox_messages(recipient_id)
    }

    fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.messages_involving(user_id)
    }

    fn thread_messages(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        self.inner.thread_messages(a, b)
    }

    fn insert_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        self.inner.insert_message(new)
    }

    // The row looks absent at check time, and by the time the create lands
    // another session has already inserted it.
    fn get_profile(&self, _id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(None)
    }

    fn create_profile(&self, _id: &str, _account_type: AccountType) -> Result<bool, StoreError> {
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Session bootstrap
// ---------------------------------------------------------------------------

#[test]
fn bootstrap_signed_out_touches_nothing() {
    let auth = MemoryAuth::signed_out("ghost-new", "123456");
    let store = CountingStore::new();

    let outcome = session::bootstrap(&auth, &store, ORIGIN).expect("bootstrap");
    assert!(matches!(outcome, Bootstrap::SignedOut));
    assert_eq!(store.profile_reads.load(Ordering::SeqCst), 0);
    assert_eq!(store.profile_creates.load(Ordering::SeqCst), 0);
}

#[test]
fn bootstrap_provisions_profile_exactly_once() {
    let auth = MemoryAuth::signed_in("ghost-owner");
    let store = CountingStore::new();

    let outcome = session::bootstrap(&auth, &store, ORIGIN).expect("first bootstrap");
    let session = match outcome {
        Bootstrap::Ready(session) => session,
        Bootstrap::SignedOut => panic!("expected a ready session"),
    };
    assert_eq!(session.identity.id, "ghost-owner");
    assert_eq!(session.public_link, "https://ghostnote.app/u/ghost-owner");
    assert_eq!(store.profile_reads.load(Ordering::SeqCst), 1);
    assert_eq!(store.profile_creates.load(Ordering::SeqCst), 1);

    let profile = store
        .get_profile("ghost-owner")
        .expect("profile read")
        .expect("profile row");
    assert_eq!(profile.account_type, AccountType::Anonymous);

    // A later bootstrap finds the row and creates nothing.
    let outcome = session::bootstrap(&auth, &store, ORIGIN).expect("second bootstrap");
    assert!(matches!(outcome, Bootstrap::Ready(_)));
    assert_eq!(store.profile_creates.load(Ordering::SeqCst), 1);
}

#[test]
fn bootstrap_survives_losing_the_creation_race() {
    let auth = MemoryAuth::signed_in("ghost-owner");
    let store = RacingStore {
        inner: MemoryStore::new(),
    };

    // Creation reported the row as already present; that is success, not
    // an error.
    let outcome = session::bootstrap(&auth, &store, ORIGIN).expect("bootstrap");
    assert!(matches!(outcome, Bootstrap::Ready(_)));
}

// ---------------------------------------------------------------------------
// Composer insert discipline
// ---------------------------------------------------------------------------

#[test]
fn composer_inserts_exactly_once_per_send() {
    let store = CountingStore::new();
    let mut composer = Composer::new();

    composer.set_draft("   ");
    let err = composer
        .send_direct(&store, "ghost-friend", "ghost-owner")
        .expect_err("blank draft");
    assert!(matches!(err, ComposeError::Empty));
    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);

    composer.set_draft("hello over there");
    composer
        .send_direct(&store, "ghost-friend", "ghost-owner")
        .expect("send");
    assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(composer.draft(), "");
}

// ---------------------------------------------------------------------------
// End to end: anonymous note, live inbox, reply thread
// ---------------------------------------------------------------------------

#[test]
fn anonymous_note_flows_to_inbox_and_reply_flows_back() {
    let hub = FeedHub::new();
    let store = Arc::new(MemoryStore::with_feed(hub.clone()));

    // The owner signs in for the first time.
    let auth = MemoryAuth::signed_in("ghost-owner");
    let outcome = session::bootstrap(&auth, store.as_ref(), ORIGIN).expect("bootstrap");
    let session = match outcome {
        Bootstrap::Ready(session) => session,
        Bootstrap::SignedOut => panic!("expected a ready session"),
    };

    // A visitor follows the public link and leaves a note.
    let mut visitor = Composer::new();
    visitor.set_draft("you are brilliant, never change");
    visitor
        .send_anonymous(store.as_ref(), &session.identity.id)
        .expect("anonymous send");

    // The owner opens their inbox: the note is there, unattributed.
    let mut inbox = Inbox::open(store.clone(), &hub, &session.identity.id);
    assert!(inbox.last_error().is_none());
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox.messages()[0].sender_id, None);

    // A signed-in friend messages the owner while the inbox is open.
    store.seed_profile(Profile {
        id: "ghost-friend".to_string(),
        account_type: AccountType::Normal,
        display_name: Some("Casper".to_string()),
    });
    let mut friend = Composer::new();
    friend.set_draft("saw your link on my feed");
    friend
        .send_direct(store.as_ref(), &session.identity.id, "ghost-friend")
        .expect("direct send");

    assert_eq!(inbox.pump(), 1);
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox.messages()[0].content, "saw your link on my feed");
    assert_eq!(inbox.messages()[1].sender_id, None);

    // The chat list groups the friend's thread and skips the anonymous
    // note, which has no counterpart to converse with.
    let chats = ChatList::load(store.as_ref(), &session.identity.id).expect("chat list");
    assert_eq!(chats.len(), 1);
    assert_eq!(chats.chats()[0].counterpart_id, "ghost-friend");
    assert_eq!(chats.chats()[0].label, "Casper");

    // The owner replies from the thread view; the send lands in the local
    // list without a refetch.
    let mut thread =
        ChatThread::open(store.clone(), &session.identity.id, "ghost-friend").expect("thread");
    assert_eq!(thread.len(), 1);
    thread.set_draft("hey, who is this?");
    let reply = thread.send().expect("reply");
    assert_eq!(thread.len(), 2);
    assert_eq!(
        thread.messages()[1].sender_id.as_deref(),
        Some("ghost-owner")
    );

    // The friend's own inbox sees the reply.
    let friend_view = store
        .inbox_messages("ghost-friend")
        .expect("friend inbox");
    assert_eq!(friend_view.len(), 1);
    assert_eq!(friend_view[0].id, reply.id);

    inbox.close();
}
