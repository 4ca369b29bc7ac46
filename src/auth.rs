//! Authentication collaborator: current identity, one-time-code email
//! login, sign-out.
//!
//! [`HostedAuth`] speaks the backend's auth endpoints over HTTP and keeps
//! the verified session in `session.json` under the data directory, so a
//! process stays signed in between runs.  [`MemoryAuth`] holds the whole
//! state in memory for tests.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::glog;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum AuthError {
    InvalidEmail(String),
    CodeRejected,
    Http(String),
    Backend { status: u16, message: String },
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidEmail(email) => write!(f, "invalid email address: {email}"),
            AuthError::CodeRejected => write!(f, "login code rejected"),
            AuthError::Http(msg) => write!(f, "http error: {msg}"),
            AuthError::Backend { status, message } => {
                write!(f, "auth backend error ({status}): {message}")
            }
            AuthError::Io(e) => write!(f, "io error: {e}"),
            AuthError::Serde(e) => write!(f, "serialization error: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<std::io::Error> for AuthError {
    fn from(e: std::io::Error) -> Self {
        AuthError::Io(e)
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An authenticated user as the auth collaborator reports it. The id is
/// opaque and globally unique; everything else keys off it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Check an email address before it goes anywhere near the network:
/// non-empty, exactly one `@`, non-empty parts either side. Returns the
/// trimmed address.
pub fn validate_email(email: &str) -> Result<&str, AuthError> {
    let trimmed = email.trim();
    let mut parts = trimmed.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {
            Ok(trimmed)
        }
        _ => Err(AuthError::InvalidEmail(trimmed.to_string())),
    }
}

/// The auth collaborator's contract.
pub trait AuthProvider: Send + Sync {
    /// Whoever is currently signed in, if anyone.
    fn current_identity(&self) -> Result<Option<Identity>, AuthError>;

    /// Ask the backend to email a one-time login code. Malformed addresses
    /// are rejected before any network call.
    fn request_login_code(&self, email: &str) -> Result<(), AuthError>;

    /// Exchange the emailed code for a signed-in identity.
    fn verify_login_code(&self, email: &str, code: &str) -> Result<Identity, AuthError>;

    /// End the current session.
    fn sign_out(&self) -> Result<(), AuthError>;
}

// ---------------------------------------------------------------------------
// Hosted implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    access_token: String,
    user_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    access_token: String,
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Auth over the backend's HTTP endpoints: `POST /otp`, `POST /verify`,
/// `POST /logout`. The verified session lives in `session.json` under the
/// data directory; `current_identity` reads it without a network round trip.
pub struct HostedAuth {
    auth_url: String,
    api_key: String,
    data_dir: PathBuf,
}

impl HostedAuth {
    pub fn new(
        auth_url: impl Into<String>,
        api_key: impl Into<String>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            data_dir,
        }
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    fn load_session(&self) -> Result<Option<SavedSession>, AuthError> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn save_session(&self, session: &SavedSession) -> Result<(), AuthError> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir)?;
        }
        let json = serde_json::to_string_pretty(session)?;
        fs::write(self.session_path(), json)?;
        Ok(())
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        let path = self.session_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// The saved session's access token, for wiring store requests as the
    /// signed-in user.
    pub fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.load_session()?.map(|s| s.access_token))
    }
}

fn map_ureq(e: ureq::Error) -> AuthError {
    match e {
        ureq::Error::Status(status, response) => AuthError::Backend {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        other => AuthError::Http(other.to_string()),
    }
}

impl AuthProvider for HostedAuth {
    fn current_identity(&self) -> Result<Option<Identity>, AuthError> {
        Ok(self.load_session()?.map(|s| Identity {
            id: s.user_id,
            email: s.email,
        }))
    }

    fn request_login_code(&self, email: &str) -> Result<(), AuthError> {
        let email = validate_email(email)?;
        let url = format!("{}/otp", self.auth_url);
        ureq::post(&url)
            .set("apikey", &self.api_key)
            .send_json(serde_json::json!({
                "email": email,
                "create_user": true,
            }))
            .map_err(map_ureq)?;
        glog!("auth: login code requested for {email}");
        Ok(())
    }

    fn verify_login_code(&self, email: &str, code: &str) -> Result<Identity, AuthError> {
        let email = validate_email(email)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::CodeRejected);
        }

        let url = format!("{}/verify", self.auth_url);
        let response = ureq::post(&url)
            .set("apikey", &self.api_key)
            .send_json(serde_json::json!({
                "type": "email",
                "email": email,
                "token": code,
            }))
            .map_err(|e| match e {
                // A rejected or expired code comes back as a 4xx.
                ureq::Error::Status(400..=499, _) => AuthError::CodeRejected,
                other => map_ureq(other),
            })?;

        let verified: VerifyResponse = response.into_json()?;
        self.save_session(&SavedSession {
            access_token: verified.access_token,
            user_id: verified.user.id.clone(),
            email: verified.user.email.clone(),
        })?;
        glog!(
            "auth: signed in as {}",
            crate::logging::user_id(&verified.user.id)
        );
        Ok(Identity {
            id: verified.user.id,
            email: verified.user.email,
        })
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.load_session()? {
            let url = format!("{}/logout", self.auth_url);
            let revoke = ureq::post(&url)
                .set("apikey", &self.api_key)
                .set("Authorization", &format!("Bearer {}", session.access_token))
                .call();
            if let Err(e) = revoke {
                // The local session is cleared regardless.
                glog!("auth: logout revoke failed: {e}");
            }
        }
        self.clear_session()
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct MemoryAuthState {
    identity: Option<Identity>,
    pending_email: Option<String>,
}

/// In-process [`AuthProvider`] for tests: verifies against a fixed login
/// code and mints a preset identity id.
pub struct MemoryAuth {
    state: Mutex<MemoryAuthState>,
    login_code: String,
    next_id: String,
}

impl MemoryAuth {
    /// Already signed in as `id`.
    pub fn signed_in(id: &str) -> Self {
        Self {
            state: Mutex::new(MemoryAuthState {
                identity: Some(Identity {
                    id: id.to_string(),
                    email: None,
                }),
                pending_email: None,
            }),
            login_code: "424242".to_string(),
            next_id: id.to_string(),
        }
    }

    /// Signed out; a successful login mints `next_id` when `login_code`
    /// is presented.
    pub fn signed_out(next_id: &str, login_code: &str) -> Self {
        Self {
            state: Mutex::new(MemoryAuthState {
                identity: None,
                pending_email: None,
            }),
            login_code: login_code.to_string(),
            next_id: next_id.to_string(),
        }
    }
}

impl AuthProvider for MemoryAuth {
    fn current_identity(&self) -> Result<Option<Identity>, AuthError> {
        Ok(self.state.lock().unwrap().identity.clone())
    }

    fn request_login_code(&self, email: &str) -> Result<(), AuthError> {
        let email = validate_email(email)?;
        self.state.lock().unwrap().pending_email = Some(email.to_string());
        Ok(())
    }

    fn verify_login_code(&self, email: &str, code: &str) -> Result<Identity, AuthError> {
        let email = validate_email(email)?;
        let mut state = self.state.lock().unwrap();
        let requested = state.pending_email.as_deref() == Some(email);
        if !requested || code.trim() != self.login_code {
            return Err(AuthError::CodeRejected);
        }
        let identity = Identity {
            id: self.next_id.clone(),
            email: Some(email.to_string()),
        };
        state.identity = Some(identity.clone());
        state.pending_email = None;
        Ok(identity)
    }

    fn sign_out(&self) -> Result<(), AuthError> {
        self.state.lock().unwrap().identity = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_dir() -> PathBuf {
        let pid = std::process::id();
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("ghostnote-auth-test-{pid}-{ts}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn email_validation_accepts_and_trims() {
        assert_eq!(validate_email("  user@example.com ").unwrap(), "user@example.com");
    }

    #[test]
    fn email_validation_rejects_malformed_addresses() {
        for bad in ["", "   ", "no-at-sign", "@example.com", "user@", "a@b@c"] {
            assert!(matches!(
                validate_email(bad),
                Err(AuthError::InvalidEmail(_))
            ));
        }
    }

    #[test]
    fn memory_auth_full_login_round_trip() {
        let auth = MemoryAuth::signed_out("u1", "424242");
        assert!(auth.current_identity().unwrap().is_none());

        auth.request_login_code("me@example.com").unwrap();
        let identity = auth.verify_login_code("me@example.com", "424242").unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.email.as_deref(), Some("me@example.com"));

        let current = auth.current_identity().unwrap().unwrap();
        assert_eq!(current.id, "u1");

        auth.sign_out().unwrap();
        assert!(auth.current_identity().unwrap().is_none());
    }

    #[test]
    fn memory_auth_rejects_wrong_code() {
        let auth = MemoryAuth::signed_out("u1", "424242");
        auth.request_login_code("me@example.com").unwrap();
        assert!(matches!(
            auth.verify_login_code("me@example.com", "000000"),
            Err(AuthError::CodeRejected)
        ));
        assert!(auth.current_identity().unwrap().is_none());
    }

    #[test]
    fn memory_auth_rejects_verify_without_request() {
        let auth = MemoryAuth::signed_out("u1", "424242");
        assert!(matches!(
            auth.verify_login_code("me@example.com", "424242"),
            Err(AuthError::CodeRejected)
        ));
    }

    #[test]
    fn malformed_email_never_reaches_the_backend() {
        // An unroutable URL: any network attempt would error differently.
        let auth = HostedAuth::new("http://127.0.0.1:1", "key", test_dir());
        assert!(matches!(
            auth.request_login_code("not-an-email"),
            Err(AuthError::InvalidEmail(_))
        ));
    }

    #[test]
    fn saved_session_reads_back_as_identity() {
        let dir = test_dir();
        let auth = HostedAuth::new("http://127.0.0.1:1", "key", dir.clone());
        assert!(auth.current_identity().unwrap().is_none());

        auth.save_session(&SavedSession {
            access_token: "tok".to_string(),
            user_id: "u-abc".to_string(),
            email: Some("me@example.com".to_string()),
        })
        .unwrap();

        let identity = auth.current_identity().unwrap().unwrap();
        assert_eq!(identity.id, "u-abc");
        assert_eq!(identity.email.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn sign_out_clears_the_session_even_when_revoke_fails() {
        let dir = test_dir();
        // Port 1 refuses connections, so the revoke call fails fast.
        let auth = HostedAuth::new("http://127.0.0.1:1", "key", dir.clone());
        auth.save_session(&SavedSession {
            access_token: "tok".to_string(),
            user_id: "u-abc".to_string(),
            email: None,
        })
        .unwrap();

        auth.sign_out().unwrap();
        assert!(auth.current_identity().unwrap().is_none());
        assert!(!dir.join("session.json").exists());
    }
}
