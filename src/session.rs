//! Session bootstrap: who is signed in, their shareable link, and a
//! guaranteed profile row.

use crate::auth::{AuthError, AuthProvider, Identity};
use crate::glog;
use crate::logging;
use crate::store::{AccountType, Store, StoreError};

#[derive(Debug)]
pub enum SessionError {
    Auth(AuthError),
    Store(StoreError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Auth(e) => write!(f, "auth error: {e}"),
            SessionError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<AuthError> for SessionError {
    fn from(e: AuthError) -> Self {
        SessionError::Auth(e)
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e)
    }
}

/// An established session: the signed-in identity plus the public link
/// visitors use to reach them.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub public_link: String,
}

/// Outcome of a bootstrap attempt. `SignedOut` means the caller routes to
/// the login flow; nothing else was touched.
#[derive(Debug)]
pub enum Bootstrap {
    SignedOut,
    Ready(Session),
}

/// Build the public link for an identity: `origin` + `/u/` + id, with any
/// trailing slash on the origin normalized away.
pub fn public_link(origin: &str, identity_id: &str) -> String {
    format!("{}/u/{}", origin.trim_end_matches('/'), identity_id)
}

/// Establish the session for whoever is signed in.
///
/// With no identity, returns [`Bootstrap::SignedOut`] without touching the
/// store. Otherwise ensures a profile row exists: exactly one existence
/// check, and a creation only when none was found. The creation is
/// idempotent, so two bootstraps racing for the same identity both succeed.
pub fn bootstrap(
    auth: &dyn AuthProvider,
    store: &dyn Store,
    origin: &str,
) -> Result<Bootstrap, SessionError> {
    let Some(identity) = auth.current_identity()? else {
        return Ok(Bootstrap::SignedOut);
    };

    if store.get_profile(&identity.id)?.is_none() {
        let created = store.create_profile(&identity.id, AccountType::Anonymous)?;
        if created {
            glog!(
                "session: provisioned profile for {}",
                logging::user_id(&identity.id)
            );
        }
    }

    let public_link = public_link(origin, &identity.id);
    Ok(Bootstrap::Ready(Session {
        identity,
        public_link,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuth;
    use crate::store::MemoryStore;

    #[test]
    fn signed_out_bootstrap_touches_nothing() {
        let auth = MemoryAuth::signed_out("u1", "424242");
        let store = MemoryStore::new();
        match bootstrap(&auth, &store, "https://ghostnote.app").unwrap() {
            Bootstrap::SignedOut => {}
            Bootstrap::Ready(_) => panic!("no identity should mean signed out"),
        }
        assert!(store.get_profile("u1").unwrap().is_none());
    }

    #[test]
    fn bootstrap_creates_the_missing_profile() {
        let auth = MemoryAuth::signed_in("u1");
        let store = MemoryStore::new();
        let session = match bootstrap(&auth, &store, "https://ghostnote.app").unwrap() {
            Bootstrap::Ready(s) => s,
            Bootstrap::SignedOut => panic!("identity present"),
        };
        assert_eq!(session.identity.id, "u1");
        assert_eq!(session.public_link, "https://ghostnote.app/u/u1");

        let profile = store.get_profile("u1").unwrap().unwrap();
        assert_eq!(profile.account_type, AccountType::Anonymous);
    }

    #[test]
    fn bootstrap_twice_leaves_one_profile() {
        let auth = MemoryAuth::signed_in("u1");
        let store = MemoryStore::new();
        bootstrap(&auth, &store, "https://ghostnote.app").unwrap();
        bootstrap(&auth, &store, "https://ghostnote.app").unwrap();
        assert!(store.get_profile("u1").unwrap().is_some());
    }

    #[test]
    fn origin_trailing_slash_is_normalized() {
        assert_eq!(
            public_link("https://ghostnote.app/", "u1"),
            "https://ghostnote.app/u/u1"
        );
        assert_eq!(public_link("http://localhost:3000", "u1"), "http://localhost:3000/u/u1");
    }
}
