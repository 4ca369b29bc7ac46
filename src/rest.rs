//! [`Store`] over the hosted row store's HTTP API.
//!
//! The backend exposes `messages` and `user_profiles` behind a
//! PostgREST-style surface: equality filters as `column=eq.value` query
//! parameters, OR-of-equality as `or=(...)`, ordering as
//! `order=column.direction`, inserts as POST with a `Prefer` header asking
//! for the stored representation back. Requests authenticate with the
//! project api key plus a bearer token (the signed-in user's access token,
//! or the api key itself for anonymous visitors).

use serde::Serialize;

use crate::store::{AccountType, Message, NewMessage, Profile, Store, StoreError};

pub struct RestStore {
    base_url: String,
    api_key: String,
    bearer: String,
}

fn normalize_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn map_ureq(e: ureq::Error) -> StoreError {
    match e {
        ureq::Error::Status(status, response) => StoreError::Backend {
            status,
            message: response.into_string().unwrap_or_default(),
        },
        other => StoreError::Http(other.to_string()),
    }
}

fn inbox_query(recipient_id: &str) -> String {
    format!("select=*&recipient_id=eq.{recipient_id}&order=created_at.desc")
}

fn involving_query(user_id: &str) -> String {
    format!("select=*&or=(recipient_id.eq.{user_id},sender_id.eq.{user_id})&order=created_at.desc")
}

fn thread_query(a: &str, b: &str) -> String {
    format!(
        "select=*&or=(and(recipient_id.eq.{a},sender_id.eq.{b}),and(recipient_id.eq.{b},sender_id.eq.{a}))&order=created_at.asc"
    )
}

impl RestStore {
    /// A store for anonymous visitors: the api key doubles as the bearer.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        Self {
            base_url: normalize_base(&base_url.into()),
            bearer: api_key.clone(),
            api_key,
        }
    }

    /// A store acting as a signed-in user, via their access token.
    pub fn with_bearer(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: normalize_base(&base_url.into()),
            api_key: api_key.into(),
            bearer: access_token.into(),
        }
    }

    fn get(&self, url: &str) -> ureq::Request {
        ureq::get(url)
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.bearer))
    }

    fn post(&self, url: &str) -> ureq::Request {
        ureq::post(url)
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.bearer))
    }

    fn fetch_messages(&self, query: &str) -> Result<Vec<Message>, StoreError> {
        let url = format!("{}/messages?{query}", self.base_url);
        let response = self.get(&url).call().map_err(map_ureq)?;
        Ok(response.into_json()?)
    }

    fn insert_returning<T: Serialize>(
        &self,
        url: &str,
        prefer: &str,
        body: &T,
    ) -> Result<ureq::Response, StoreError> {
        self.post(url)
            .set("Prefer", prefer)
            .send_json(body)
            .map_err(map_ureq)
    }
}

impl Store for RestStore {
    fn inbox_messages(&self, recipient_id: &str) -> Result<Vec<Message>, StoreError> {
        self.fetch_messages(&inbox_query(recipient_id))
    }

    fn messages_involving(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        self.fetch_messages(&involving_query(user_id))
    }

    fn thread_messages(&self, a: &str, b: &str) -> Result<Vec<Message>, StoreError> {
        self.fetch_messages(&thread_query(a, b))
    }

    fn insert_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let url = format!("{}/messages", self.base_url);
        let response = self.insert_returning(&url, "return=representation", &new)?;
        let status = response.status();
        let rows: Vec<Message> = response.into_json()?;
        rows.into_iter().next().ok_or_else(|| StoreError::Backend {
            status,
            message: "insert returned no representation".to_string(),
        })
    }

    fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let url = format!("{}/user_profiles?select=*&id=eq.{id}&limit=1", self.base_url);
        let mut rows: Vec<Profile> = self.get(&url).call().map_err(map_ureq)?.into_json()?;
        Ok(rows.pop())
    }

    fn create_profile(&self, id: &str, account_type: AccountType) -> Result<bool, StoreError> {
        let url = format!("{}/user_profiles?on_conflict=id", self.base_url);
        let body = serde_json::json!({
            "id": id,
            "account_type": account_type,
        });
        match self
            .post(&url)
            .set("Prefer", "resolution=ignore-duplicates,return=representation")
            .send_json(body)
        {
            Ok(response) => {
                // With ignore-duplicates the representation is empty when
                // the row already existed.
                let rows: Vec<Profile> = response.into_json()?;
                Ok(!rows.is_empty())
            }
            // A backend that rejects the duplicate outright still reads as
            // already-present, which is success here.
            Err(ureq::Error::Status(409, _)) => Ok(false),
            Err(e) => Err(map_ureq(e)),
        }
    }
}
